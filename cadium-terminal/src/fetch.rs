/// Model fetchers for the terminal host: HTTP(S) plus local files
use std::time::Duration;

use cadium_core::loader::read_limited;
use cadium_core::{Fetch, FileFetcher, ViewerError};
use log::debug;

/// Blocking HTTP(S) fetcher
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// `timeout` bounds the whole request, body included
    pub fn new(timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new().user_agent(concat!("cadium/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, ViewerError> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, response) => {
                ViewerError::fetch(url, format!("HTTP {code} {}", response.status_text()))
            }
            ureq::Error::Transport(transport) => ViewerError::fetch(url, transport),
        })?;

        let declared = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(bytes) = declared.filter(|&b| b > limit) {
            return Err(ViewerError::TooLarge { bytes, limit });
        }
        debug!("GET {url}: {} bytes declared", declared.map_or("unknown".to_string(), |b| b.to_string()));

        read_limited(response.into_reader(), url, limit)
    }
}

/// Dispatches on the URL scheme: `http(s)://` over the network, everything
/// else (`file://` or a bare path) from disk.
pub struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            http: HttpFetcher::new(timeout),
            file: FileFetcher,
        }
    }
}

fn scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once("://")?;
    Some(scheme)
}

impl Fetch for SourceFetcher {
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, ViewerError> {
        match scheme(url).map(str::to_ascii_lowercase).as_deref() {
            Some("http" | "https") => self.http.fetch(url, limit),
            Some("file") | None => self.file.fetch(url, limit),
            Some(other) => Err(ViewerError::fetch(url, format!("unsupported scheme '{other}'"))),
        }
    }
}
