//! Byte sources for media URLs: local paths and HTTP(S) with range requests.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

/// Range fetch tuning.
#[derive(Clone, Debug)]
pub(crate) struct RangeConfig {
    pub(crate) block_size: usize,
    pub(crate) timeout: Duration,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            block_size: 256 * 1024,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Open `url` as a seekable media source plus an extension hint for the prober.
///
/// `http://` and `https://` URLs are fetched in blocks with range requests; anything
/// else is a local path, optionally prefixed with `file://`.
pub(crate) fn open_source(
    url: &str,
    cancel: Arc<AtomicBool>,
) -> Result<(Box<dyn MediaSource>, Hint)> {
    let mut hint = Hint::new();
    if let Some(ext) = extension_of(url) {
        hint.with_extension(ext);
    }
    if is_remote(url) {
        let mut source = HttpRangeSource::new(url.to_string(), RangeConfig::default(), cancel);
        source
            .ensure_len()
            .with_context(|| format!("fetch {url}"))?;
        return Ok((Box::new(source), hint));
    }
    let path = url.strip_prefix("file://").unwrap_or(url);
    let file = File::open(path).with_context(|| format!("open {path}"))?;
    Ok((Box::new(file), hint))
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// File extension of the URL path, ignoring query and fragment.
fn extension_of(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// HTTP range reader holding one fetched block in memory.
pub(crate) struct HttpRangeSource {
    url: String,
    config: RangeConfig,
    pos: u64,
    len: Option<u64>,
    buf: Vec<u8>,
    buf_start: u64,
    cancel: Arc<AtomicBool>,
}

impl HttpRangeSource {
    pub(crate) fn new(url: String, config: RangeConfig, cancel: Arc<AtomicBool>) -> Self {
        Self {
            url,
            config,
            pos: 0,
            len: None,
            buf: Vec::new(),
            buf_start: 0,
            cancel,
        }
    }

    fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Learn the total length, prefetching the first block on the way.
    fn ensure_len(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let end = (self.config.block_size as u64).saturating_sub(1);
        let (data, len) = self.fetch_range(0, end)?;
        let len = len.ok_or_else(|| io::Error::other("content length unavailable"))?;
        self.buf_start = 0;
        self.buf = data;
        self.len = Some(len);
        Ok(len)
    }

    fn fetch_range(&self, start: u64, end: u64) -> io::Result<(Vec<u8>, Option<u64>)> {
        let range = format!("bytes={start}-{end}");
        let began = Instant::now();
        let resp = ureq::get(&self.url)
            .config()
            .timeout_per_call(Some(self.config.timeout))
            .build()
            .header("Range", &range)
            .call()
            .map_err(|e| io::Error::other(format!("http range request failed: {e}")))?;

        let status = resp.status();
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_range = header("Content-Range");
        let content_length = header("Content-Length").and_then(|s| s.parse::<u64>().ok());

        let mut buf = Vec::new();
        let (_, body) = resp.into_parts();
        body.into_reader()
            .read_to_end(&mut buf)
            .map_err(|e| io::Error::other(format!("http read failed: {e}")))?;

        let elapsed = began.elapsed();
        if elapsed > Duration::from_millis(250) {
            tracing::warn!(
                took_ms = elapsed.as_millis() as u64,
                bytes = buf.len(),
                range = range.as_str(),
                "slow range fetch"
            );
        }

        let len = match status {
            ureq::http::StatusCode::PARTIAL_CONTENT => content_range
                .as_deref()
                .and_then(content_range_total)
                .or(content_length),
            ureq::http::StatusCode::OK => content_length,
            _ => None,
        };
        Ok((buf, len))
    }

    fn refill(&mut self) -> io::Result<()> {
        let start = self.pos;
        let mut end = start.saturating_add(self.config.block_size as u64 - 1);
        if let Some(len) = self.len.filter(|len| *len > 0) {
            end = end.min(len - 1);
        }
        let (buf, len) = self.fetch_range(start, end)?;
        if len.is_some() {
            self.len = len;
        }
        self.buf = buf;
        self.buf_start = start;
        Ok(())
    }

    fn buffered(&self, pos: u64) -> bool {
        pos >= self.buf_start && pos < self.buf_start.saturating_add(self.buf.len() as u64)
    }
}

impl Read for HttpRangeSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.is_canceled() {
            return Ok(0);
        }
        if self.len.is_some_and(|len| self.pos >= len) {
            return Ok(0);
        }
        if !self.buffered(self.pos) {
            self.refill()?;
            if !self.buffered(self.pos) {
                return Ok(0);
            }
        }
        let offset = (self.pos - self.buf_start) as usize;
        let n = (self.buf.len() - offset).min(out.len());
        out[..n].copy_from_slice(&self.buf[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpRangeSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(x) => x,
            SeekFrom::Current(d) => add_signed(self.pos, d),
            SeekFrom::End(d) => add_signed(self.ensure_len()?, d),
        };
        Ok(self.pos)
    }
}

impl MediaSource for HttpRangeSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Total from a `Content-Range: bytes start-end/total` header.
fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.split_once('/')?;
    total.trim().parse().ok()
}

fn add_signed(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}
