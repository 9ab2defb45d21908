//! HTTP range-GET backend: treats a remote URL as a flat byte array by
//! issuing `Range:` requests per read. Intended for archives served over
//! plain HTTP rather than mounted as local files.

use parking_lot::Mutex;

use super::{check_bounds, MapperBackend};
use crate::error::{Error, Result};

pub struct HttpBackend {
    agent: ureq::Agent,
    url: String,
    size: u64,
    // `ureq::Agent` is internally synchronized, but we serialize our own
    // bookkeeping (none at the moment) behind a mutex so the type stays
    // `Sync` without relying on that being an implementation detail.
    _lock: Mutex<()>,
}

impl HttpBackend {
    /// Issues a `HEAD` request to discover the resource's size. The server
    /// must support byte ranges (`Accept-Ranges: bytes`); servers that don't
    /// are rejected rather than silently falling back to full-body fetches.
    pub fn open(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let agent = ureq::Agent::new();
        let response = agent
            .head(&url)
            .call()
            .map_err(|e| Error::InvalidArgument(head_error_kind(&e)))?;

        let accepts_ranges = response
            .header("Accept-Ranges")
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);
        if !accepts_ranges {
            return Err(Error::InvalidArgument(
                "HTTP source does not advertise byte-range support",
            ));
        }

        let size: u64 = response
            .header("Content-Length")
            .and_then(|v| v.parse().ok())
            .ok_or(Error::InvalidArgument(
                "HTTP source did not report Content-Length",
            ))?;

        Ok(Self {
            agent,
            url,
            size,
            _lock: Mutex::new(()),
        })
    }
}

fn head_error_kind(_e: &ureq::Error) -> &'static str {
    "HTTP HEAD request failed while opening archive"
}

impl MapperBackend for HttpBackend {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len() as u64, self.size)?;
        if buf.is_empty() {
            return Ok(());
        }
        let last = offset + buf.len() as u64 - 1;
        let range = format!("bytes={}-{}", offset, last);
        let response = self
            .agent
            .get(&self.url)
            .set("Range", &range)
            .call()
            .map_err(|_| Error::InvalidArgument("HTTP range request failed"))?;

        if response.status() != 206 {
            return Err(Error::InvalidArgument(
                "HTTP source ignored range request (expected 206)",
            ));
        }

        let mut reader = response.into_reader();
        std::io::Read::read_exact(&mut reader, buf)?;
        Ok(())
    }
}
