use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::Backoff;
use crate::error::BraceError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Pause taken after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor)
            }
        }
    }
}

/// Downloaded body, spooled to an anonymous temporary file. The file is
/// removed by the OS when the buffer is dropped.
#[derive(Debug)]
pub struct ScratchBuffer {
    file: File,
    len: u64,
}

impl ScratchBuffer {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
            len: 0,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut buffer = Self::new()?;
        buffer.file.write_all(bytes)?;
        buffer.len = bytes.len() as u64;
        buffer.rewind()?;
        Ok(buffer)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        self.rewind()?;
        let mut bytes = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Read for ScratchBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for ScratchBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Worth another attempt: I/O, timeouts, refused connections, 5xx.
    #[error("{0}")]
    Transient(String),

    #[error("status {0}")]
    Status(u16),
}

/// One blocking GET, streaming the body into `sink`. Returns the number of
/// bytes written.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, sink: &mut dyn Write) -> Result<u64, TransportError>;
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<ScratchBuffer, BraceError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, BraceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("brace/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BraceError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BraceError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, sink: &mut dyn Write) -> Result<u64, TransportError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| TransportError::Transient(err.to_string()))?;
        let status = response.status().as_u16();
        if is_retryable_status(status) {
            return Err(TransportError::Transient(format!("status {status}")));
        }
        if !response.status().is_success() {
            return Err(TransportError::Status(status));
        }
        io::copy(&mut response, sink).map_err(|err| TransportError::Transient(err.to_string()))
    }
}

pub struct RetryingFetcher<T: Transport, S: Sleeper = ThreadSleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingFetcher<T, ThreadSleeper> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self::with_sleeper(transport, ThreadSleeper, policy)
    }
}

impl<T: Transport, S: Sleeper> RetryingFetcher<T, S> {
    pub fn with_sleeper(transport: T, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Downloads `url` into a fresh scratch buffer, rewound to the start.
    ///
    /// Transient failures are retried until `max_attempts` attempts have
    /// been made (at least one), sleeping between attempts but not after
    /// the last. An empty body is a success.
    pub fn fetch_with_policy(
        &self,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<ScratchBuffer, BraceError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            debug!(url, attempt, "downloading");
            // A partially written buffer from a failed attempt is dropped here.
            let mut buffer =
                ScratchBuffer::new().map_err(|err| BraceError::Filesystem(err.to_string()))?;
            match self.transport.get(url, &mut buffer.file) {
                Ok(written) => {
                    buffer.len = written;
                    buffer
                        .rewind()
                        .map_err(|err| BraceError::Filesystem(err.to_string()))?;
                    info!(url, bytes = written, "downloaded");
                    return Ok(buffer);
                }
                Err(TransportError::Status(status)) => {
                    return Err(BraceError::HttpStatus {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(TransportError::Transient(message)) => {
                    warn!(url, attempt, max_attempts, error = %message, "download attempt failed");
                    last_error = message;
                    if attempt < max_attempts {
                        self.sleeper.sleep(policy.delay_after(attempt));
                    }
                }
            }
        }

        Err(BraceError::FetchExhausted {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }
}

impl<T: Transport, S: Sleeper> Fetcher for RetryingFetcher<T, S> {
    fn fetch(&self, url: &str) -> Result<ScratchBuffer, BraceError> {
        self.fetch_with_policy(url, &self.policy)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
