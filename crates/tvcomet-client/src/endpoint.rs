//! Server endpoint URLs derived from the console base URL.

use reqwest::Url;
use tvcomet_core::{CometError, Result};

/// Resolved comet endpoints.
#[derive(Clone, Debug)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse `base_url`; it must be http or https.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base =
            Url::parse(base_url).map_err(|e| CometError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(CometError::InvalidUrl(format!(
                "{base_url}: scheme must be http or https"
            )));
        }
        // Relative joins need a trailing slash on the directory.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    /// Base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Long-poll endpoint.
    pub fn poll_url(&self) -> Result<Url> {
        self.join("comet/poll")
    }

    /// Debug toggle endpoint for `boxid`.
    pub fn debug_url(&self, boxid: &str) -> Result<Url> {
        let mut url = self.join("comet/debug")?;
        let _ = url.query_pairs_mut().append_pair("boxid", boxid);
        Ok(url)
    }

    /// WebSocket endpoint, resuming `boxid` when known.
    pub fn socket_url(&self, boxid: Option<&str>) -> Result<Url> {
        let mut url = self.join("comet/ws")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| CometError::InvalidUrl(format!("cannot use {scheme} for {url}")))?;
        if let Some(id) = boxid {
            let _ = url.query_pairs_mut().append_pair("boxid", id);
        }
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| CometError::InvalidUrl(format!("{}{path}: {e}", self.base)))
    }
}
