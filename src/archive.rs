use std::borrow::Cow;
use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::error::BraceError;

/// Upper bound on the decompressed size of a single entry. The size an
/// archive declares for itself is never trusted.
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

const INITIAL_CAPACITY: u64 = 64 * 1024;

/// Decodes the portal's ISO-8859-1 text. Every byte maps to the code point
/// of the same value, so decoding never fails.
pub fn transcode(bytes: &[u8]) -> Cow<'_, str> {
    encoding_rs::mem::decode_latin1(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub text: String,
}

/// Read-only view over a downloaded ZIP. Entries are decompressed and
/// transcoded one at a time.
pub struct CsvArchive<R> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> CsvArchive<R> {
    pub fn open(reader: R) -> Result<Self, BraceError> {
        let archive =
            ZipArchive::new(reader).map_err(|err| BraceError::ArchiveCorrupt(err.to_string()))?;
        Ok(Self { archive })
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Returns `None` for directory entries.
    pub fn entry(&mut self, index: usize) -> Result<Option<ArchiveEntry>, BraceError> {
        let mut entry = self
            .archive
            .by_index(index)
            .map_err(|err| BraceError::ArchiveCorrupt(err.to_string()))?;
        if entry.is_dir() {
            return Ok(None);
        }
        if entry.enclosed_name().is_none() {
            return Err(BraceError::ArchiveCorrupt(
                "zip entry path traversal detected".to_string(),
            ));
        }
        let name = entry.name().to_string();
        let mut bytes = Vec::with_capacity(entry.size().min(INITIAL_CAPACITY) as usize);
        entry
            .by_ref()
            .take(MAX_ENTRY_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| BraceError::ArchiveCorrupt(format!("{name}: {err}")))?;
        if bytes.len() as u64 > MAX_ENTRY_BYTES {
            return Err(BraceError::ArchiveCorrupt(format!(
                "{name}: entry larger than {MAX_ENTRY_BYTES} bytes"
            )));
        }
        Ok(Some(ArchiveEntry {
            name,
            text: transcode(&bytes).into_owned(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    #[test]
    fn transcodes_latin1() {
        assert_eq!(transcode(b"Citt\xe0 di Castello"), "Città di Castello");
        assert_eq!(transcode(b"plain"), "plain");
        // C1 range stays as control characters
        assert_eq!(transcode(b"\x80\x9f"), "\u{80}\u{9f}");
    }

    #[test]
    fn reads_entries_and_skips_directories() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_directory("data/", SimpleFileOptions::default())
            .unwrap();
        writer
            .start_file("data/rows.csv", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"Aosta \xab Piazza\xbb,,01-01-2010 01,3.5\n").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut archive = CsvArchive::open(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entry(0).unwrap(), None);
        let entry = archive.entry(1).unwrap().unwrap();
        assert_eq!(entry.name, "data/rows.csv");
        assert!(entry.text.starts_with("Aosta « Piazza»"));
    }

    #[test]
    fn inflated_declared_size_does_not_abort() {
        let body: &[u8] = b"Courmayeur,,01-01-2005 01,12\n";
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(
                "rows.csv",
                SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Stored)
                    .large_file(true),
            )
            .unwrap();
        writer.write_all(body).unwrap();
        let mut bytes = writer.finish().unwrap().into_inner();

        // Rewrite the uncompressed size in every zip64 extra field.
        let actual = (body.len() as u64).to_le_bytes();
        let bogus = (u64::MAX / 2).to_le_bytes();
        let mut patched = 0;
        for i in 0..bytes.len().saturating_sub(12) {
            if bytes[i..i + 2] == [0x01, 0x00] && bytes[i + 4..i + 12] == actual {
                bytes[i + 4..i + 12].copy_from_slice(&bogus);
                patched += 1;
            }
        }
        assert!(patched > 0);

        let outcome = CsvArchive::open(Cursor::new(bytes)).and_then(|mut archive| archive.entry(0));
        assert_matches!(outcome, Ok(_) | Err(BraceError::ArchiveCorrupt(_)));
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = CsvArchive::open(Cursor::new(b"<html>not a zip</html>".to_vec()))
            .err()
            .unwrap();
        assert_matches!(err, BraceError::ArchiveCorrupt(_));
    }
}
