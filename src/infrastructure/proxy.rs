use crate::error::{GatewayError, Result};
use reqwest::redirect::Policy;
use reqwest::{Client, Proxy};
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One network egress point.
///
/// Cheap to clone and shared read-only by every task dispatched through it.
/// Redirects are never followed: the settlement check needs the raw `Location`.
#[derive(Clone)]
pub struct ProxyHandle {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    label: String,
    client: Client,
}

impl ProxyHandle {
    /// Routes every request through `url` (`http://`, `https://` or `socks5://`).
    pub fn new(url: &str) -> Result<Self> {
        let proxy = Proxy::all(url)
            .map_err(|e| GatewayError::Validation(format!("invalid proxy '{url}': {e}")))?;
        let client = Self::builder()
            .proxy(proxy)
            .build()
            .map_err(|e| GatewayError::Validation(format!("invalid proxy '{url}': {e}")))?;
        Ok(Self::from_client(url, client))
    }

    /// Talks to the bank from this host's own address.
    pub fn direct() -> Self {
        let client = Self::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::from_client("direct", client)
    }

    fn builder() -> reqwest::ClientBuilder {
        Client::builder()
            .redirect(Policy::none())
            .timeout(REQUEST_TIMEOUT)
    }

    fn from_client(label: &str, client: Client) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                label: label.to_string(),
                client,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// True when both handles share one underlying client.
    pub fn same_client(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Parses a proxy list: one URL per line, blank lines and `#` comments skipped.
    pub fn parse_list<R: BufRead>(source: R) -> Result<Vec<Self>> {
        let mut proxies = Vec::new();
        for line in source.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            proxies.push(Self::new(line)?);
        }
        Ok(proxies)
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProxyHandle").field(&self.inner.label).finish()
    }
}
