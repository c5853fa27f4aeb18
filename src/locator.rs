use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use tracing::{debug, info};

use crate::archive::transcode;
use crate::domain::{Pollutant, Region};
use crate::error::BraceError;
use crate::fetch::{Fetcher, ScratchBuffer};

pub const DEFAULT_BASE_URL: &str = "http://www.brace.sinanet.apat.it/zipper";

const DOWNLOAD_PREFIX: &str = "../download/";

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").unwrap());
static LITERAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]*)""#).unwrap());

/// Resolves the portal's two-step download: a query returns a small HTML
/// page whose script points at the generated archive, which is then
/// fetched on its own.
pub struct Locator<F: Fetcher> {
    fetcher: F,
    base_url: String,
}

impl<F: Fetcher> Locator<F> {
    pub fn new(fetcher: F, base_url: &str) -> Result<Self, BraceError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|err| BraceError::ConfigParse(format!("base_url {base_url}: {err}")))?;
        Ok(Self { fetcher, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query URL for one unit of work. Names are sent upper-cased, as the
    /// portal expects.
    pub fn query_url(
        &self,
        region: &Region,
        pollutant: &Pollutant,
        year: i32,
    ) -> Result<Url, BraceError> {
        let endpoint = format!("{}/servlet/zipper", self.base_url);
        Url::parse_with_params(
            &endpoint,
            &[
                ("p_comp", pollutant.code.to_string()),
                ("p_comp_name", pollutant.formula.to_uppercase()),
                ("p_reg", region.code.to_string()),
                ("p_reg_name", region.name.to_uppercase()),
                ("p_anno", year.to_string()),
            ],
        )
        .map_err(|err| BraceError::ConfigParse(format!("query url {endpoint}: {err}")))
    }

    pub fn archive_url(&self, location: &str) -> String {
        format!("{}/download/{}", self.base_url, location)
    }

    /// First double-quoted literal inside a script element, with a leading
    /// `../download/` removed.
    pub fn extract_location(&self, page: &str) -> Option<String> {
        SCRIPT
            .captures_iter(page)
            .filter_map(|script| script.get(1))
            .find_map(|body| LITERAL.captures(body.as_str()).and_then(|literal| literal.get(1)))
            .map(|literal| {
                let literal = literal.as_str().trim();
                literal.strip_prefix(DOWNLOAD_PREFIX).unwrap_or(literal).to_string()
            })
            .filter(|location| !location.is_empty())
    }

    pub fn locate(
        &self,
        region: &Region,
        pollutant: &Pollutant,
        year: i32,
    ) -> Result<ScratchBuffer, BraceError> {
        let query = self.query_url(region, pollutant, year)?;
        let page = self.fetcher.fetch(query.as_str())?;
        let bytes = page
            .into_bytes()
            .map_err(|err| BraceError::Filesystem(err.to_string()))?;
        let html = transcode(&bytes);

        let location = self
            .extract_location(&html)
            .ok_or_else(|| BraceError::ParseFailure {
                url: query.to_string(),
                reason: if html.trim().is_empty() {
                    "empty page".to_string()
                } else {
                    "no quoted literal in any script element".to_string()
                },
            })?;
        debug!(%location, "resolved archive location");

        let url = self.archive_url(&location);
        let archive = self.fetcher.fetch(&url)?;
        info!(%url, bytes = archive.len(), "fetched archive");
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::{PollutantCode, RegionCode};

    #[derive(Default)]
    struct PageFetcher {
        page: String,
        urls: Mutex<Vec<String>>,
    }

    impl Fetcher for &PageFetcher {
        fn fetch(&self, url: &str) -> Result<ScratchBuffer, BraceError> {
            self.urls.lock().unwrap().push(url.to_string());
            let body = if url.contains("/servlet/") {
                self.page.as_bytes().to_vec()
            } else {
                b"PK-archive".to_vec()
            };
            Ok(ScratchBuffer::from_bytes(&body).unwrap())
        }
    }

    fn lazio() -> Region {
        Region {
            code: RegionCode(12),
            name: "Lazio".to_string(),
            latitude: 41.9,
            longitude: 12.5,
        }
    }

    fn nox() -> Pollutant {
        Pollutant {
            code: PollutantCode(9),
            formula: "NOx".to_string(),
            name: "Nitrogen Oxides".to_string(),
        }
    }

    #[test]
    fn query_url_upper_cases_names() {
        let fetcher = PageFetcher::default();
        let locator = Locator::new(&fetcher, "http://portal.test/zipper/").unwrap();
        let url = locator.query_url(&lazio(), &nox(), 2009).unwrap();
        assert_eq!(
            url.as_str(),
            "http://portal.test/zipper/servlet/zipper?p_comp=9&p_comp_name=NOX&p_reg=12&p_reg_name=LAZIO&p_anno=2009"
        );
    }

    #[test]
    fn extracts_first_literal_from_script() {
        let fetcher = PageFetcher::default();
        let locator = Locator::new(&fetcher, DEFAULT_BASE_URL).unwrap();
        let page = r#"<html><head><SCRIPT type="text/javascript">
            window.location = "../download/LAZIO_NOX_2009.zip"; var x = "other";
        </SCRIPT></head></html>"#;
        assert_eq!(
            locator.extract_location(page).as_deref(),
            Some("LAZIO_NOX_2009.zip")
        );
    }

    #[test]
    fn missing_script_is_parse_failure() {
        let fetcher = PageFetcher {
            page: "<html><body>Nessun dato</body></html>".to_string(),
            ..Default::default()
        };
        let locator = Locator::new(&fetcher, "http://portal.test/zipper").unwrap();
        let err = locator.locate(&lazio(), &nox(), 2009).unwrap_err();
        assert_matches!(err, BraceError::ParseFailure { .. });
        assert_eq!(fetcher.urls.lock().unwrap().len(), 1);
    }

    #[test]
    fn script_without_literal_is_parse_failure() {
        let fetcher = PageFetcher {
            page: "<html><script>var x = 1;</script></html>".to_string(),
            ..Default::default()
        };
        let locator = Locator::new(&fetcher, "http://portal.test/zipper").unwrap();
        let err = locator.locate(&lazio(), &nox(), 2009).unwrap_err();
        assert_matches!(err, BraceError::ParseFailure { reason, .. } if reason.contains("quoted literal"));
        assert_eq!(fetcher.urls.lock().unwrap().len(), 1);
    }

    #[test]
    fn only_leading_download_prefix_is_stripped() {
        let fetcher = PageFetcher::default();
        let locator = Locator::new(&fetcher, DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            locator
                .extract_location(r#"<script>go("files/../download/x.zip")</script>"#)
                .as_deref(),
            Some("files/../download/x.zip")
        );
        assert_eq!(
            locator
                .extract_location(r#"<script>go("../download/../download/x.zip")</script>"#)
                .as_deref(),
            Some("../download/x.zip")
        );
    }

    #[test]
    fn locate_fetches_resolved_archive() {
        let fetcher = PageFetcher {
            page: r#"<script>document.location.href="../download/LAZIO_NOX_2009.zip";</script>"#
                .to_string(),
            ..Default::default()
        };
        let locator = Locator::new(&fetcher, "http://portal.test/zipper").unwrap();
        let archive = locator.locate(&lazio(), &nox(), 2009).unwrap();
        assert_eq!(archive.into_bytes().unwrap(), b"PK-archive");
        let urls = fetcher.urls.lock().unwrap();
        assert_eq!(urls[1], "http://portal.test/zipper/download/LAZIO_NOX_2009.zip");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let fetcher = PageFetcher::default();
        let err = Locator::new(&fetcher, "not a url").err().unwrap();
        assert_matches!(err, BraceError::ConfigParse(_));
    }
}
