//! `ws://`/`wss://` URL parsing.
//!
//! Delegates to the `url` crate for the heavy lifting, with one addition: a
//! listener wildcard host (`ws://*:9001/path`, meaning "bind all
//! interfaces") is not a syntactically valid host per the URL standard, so a
//! literal `*` is rewritten to `0.0.0.0` before handing the string to
//! `Url::parse`.

use url::Url;

use crate::error::{Error, Result};

/// The host, port, path, and query parsed out of a `ws://`/`wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub tls: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
}

impl Endpoint {
    /// `path`, or `path?query` if a query string was present.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Parse `ws://host[:port]/path[?query]` or `wss://…`. Path defaults to
/// `/` when absent. A `*` host (listener-only) is normalized to `0.0.0.0`.
pub fn parse(raw: &str) -> Result<Endpoint> {
    let normalized = if let Some(rest) = raw.strip_prefix("ws://*") {
        format!("ws://0.0.0.0{rest}")
    } else if let Some(rest) = raw.strip_prefix("wss://*") {
        format!("wss://0.0.0.0{rest}")
    } else {
        raw.to_string()
    };

    let url = Url::parse(&normalized).map_err(|e| Error::AddrInval(e.to_string()))?;

    let tls = match url.scheme() {
        "ws" => false,
        "wss" => true,
        other => return Err(Error::AddrInval(format!("unsupported scheme {other:?}"))),
    };
    let default_port = if tls { 443 } else { 80 };

    let host = url
        .host_str()
        .ok_or_else(|| Error::AddrInval(format!("missing host in {raw:?}")))?
        .to_string();
    let port = url.port().unwrap_or(default_port);

    let path = if url.path().is_empty() {
        "/".to_string()
    } else {
        url.path().to_string()
    };
    let query = url.query().map(|q| q.to_string());

    Ok(Endpoint {
        tls,
        host,
        port,
        path,
        query,
    })
}
