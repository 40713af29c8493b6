//! Line source: acquisition, streaming decompression, line splitting
//!
//! Produces a lazy sequence of UTF-8 text lines from either an HTTP(S) URL
//! or a local file, both gzip-compressed. Decompression is streaming; the
//! payload is never materialized. Restartable only by re-opening with the
//! same locator.

use std::path::PathBuf;
use std::str::FromStr;

use async_compression::tokio::bufread::GzipDecoder;
use futures::TryStreamExt;
use reqwest::header::LOCATION;
use reqwest::{redirect, Client, StatusCode, Url};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

use crate::error::IngestError;

/// Hop cap for 301/302 chains. A looping source must fail instead of
/// hanging the run.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Where the feed lives: a URL to fetch or a path to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Url(String),
    Path(PathBuf),
}

impl FromStr for SourceLocator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(SourceLocator::Url(s.to_string()))
        } else {
            Ok(SourceLocator::Path(PathBuf::from(s)))
        }
    }
}

impl std::fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLocator::Url(url) => f.write_str(url),
            SourceLocator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

type ByteReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// A lazy stream of decompressed feed lines.
pub struct LineSource {
    lines: Lines<BufReader<GzipDecoder<ByteReader>>>,
}

impl LineSource {
    /// Open the locator and stand up the decompression and line-splitting
    /// chain. Fails with `SourceUnavailable`, `Fetch` or `TooManyRedirects`
    /// when the input cannot be obtained at all.
    pub async fn open(locator: &SourceLocator) -> Result<Self, IngestError> {
        let reader: ByteReader = match locator {
            SourceLocator::Url(url) => open_url(url).await?,
            SourceLocator::Path(path) => open_path(path).await?,
        };

        let mut decoder = GzipDecoder::new(reader);
        // Some feed dumps are concatenated gzip members.
        decoder.multiple_members(true);

        Ok(Self {
            lines: BufReader::new(decoder).lines(),
        })
    }

    /// The next decompressed line, `None` at end of stream. A final line
    /// without a trailing newline is still emitted. Corruption in the
    /// compressed stream surfaces here as `Decode`.
    pub async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        self.lines
            .next_line()
            .await
            .map_err(|e| IngestError::Decode(e.to_string()))
    }
}

/// GET the URL, following at most [`MAX_REDIRECT_HOPS`] 301/302 hops by
/// hand, and return the status-200 body as a byte stream.
async fn open_url(url: &str) -> Result<ByteReader, IngestError> {
    // Redirects are resolved here with an explicit hop counter, not by the
    // client, so a redirect loop terminates with a clear reason.
    let client = Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .map_err(|e| IngestError::SourceUnavailable(e.to_string()))?;

    let mut url: Url = url
        .parse()
        .map_err(|e| IngestError::SourceUnavailable(format!("invalid url {url:?}: {e}")))?;

    for _hop in 0..MAX_REDIRECT_HOPS {
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| IngestError::SourceUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let stream = response
                    .bytes_stream()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
                return Ok(Box::new(tokio_util::io::StreamReader::new(stream)));
            }
            status @ (StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND) => {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| IngestError::Fetch {
                        status: status.as_u16(),
                        message: "redirect without Location header".to_string(),
                    })?;

                // Location may be relative; resolve against the current URL.
                url = url.join(location).map_err(|e| {
                    IngestError::SourceUnavailable(format!(
                        "invalid redirect target {location:?}: {e}"
                    ))
                })?;

                debug!(target_url = %url, "following redirect");
            }
            status => {
                return Err(IngestError::Fetch {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("").to_string(),
                });
            }
        }
    }

    Err(IngestError::TooManyRedirects {
        limit: MAX_REDIRECT_HOPS,
    })
}

async fn open_path(path: &std::path::Path) -> Result<ByteReader, IngestError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        IngestError::SourceUnavailable(format!("cannot open {}: {e}", path.display()))
    })?;
    Ok(Box::new(BufReader::new(file)))
}
