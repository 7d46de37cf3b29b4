//! `GrayContext`: per-request attribute bag
//!
//! Built once per request by the transport layer and never mutated while a
//! decision runs. Matchers read it; absent fields mean "cannot match".

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Case-insensitive header map.
///
/// Names are stored lowercased (as HTTP/2 does on the wire), so lookups with
/// any casing hit the same entry. When two inserted names differ only by
/// case, the last one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, String>", into = "HashMap<String, String>")]
pub struct HeaderMap {
    entries: HashMap<String, String>,
}

impl HeaderMap {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing value under the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(lowercased name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<HashMap<String, String>> for HeaderMap {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<HeaderMap> for HashMap<String, String> {
    fn from(headers: HeaderMap) -> Self {
        headers.entries
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Request attributes a gray-release decision is made from.
///
/// # Example
///
/// ```
/// use grayroute::GrayContext;
///
/// let ctx = GrayContext::builder()
///     .user_id(42)
///     .path("/api/orders")
///     .method("GET")
///     .header("X-Gray", "1")
///     .build();
///
/// assert_eq!(ctx.user_id(), Some(42));
/// assert_eq!(ctx.header("x-gray"), Some("1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrayContext {
    user_id: Option<i64>,
    tenant_id: Option<i64>,
    request_path: String,
    request_method: String,
    #[serde(alias = "clientIpAddress")]
    client_ip: Option<String>,
    headers: HeaderMap,
    extensions: HashMap<String, serde_json::Value>,
}

impl GrayContext {
    /// Start building a context.
    #[must_use]
    pub fn builder() -> GrayContextBuilder {
        GrayContextBuilder::default()
    }

    /// The authenticated user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// The tenant, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant_id
    }

    /// Request path (empty when unknown).
    #[must_use]
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// Request method (empty when unknown).
    #[must_use]
    pub fn request_method(&self) -> &str {
        &self.request_method
    }

    /// The client address as reported by the transport layer, unparsed.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// The client address, parsed and canonicalized.
    ///
    /// Accepts a bare address or a socket address (`addr:port`,
    /// `[v6]:port`); the port is dropped. IPv4-mapped IPv6 addresses
    /// (`::ffff:a.b.c.d`) come back as IPv4. `None` when missing or
    /// unparseable.
    #[must_use]
    pub fn client_addr(&self) -> Option<IpAddr> {
        let raw = self.client_ip.as_deref()?.trim();
        let addr = raw
            .parse::<IpAddr>()
            .ok()
            .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))?;
        Some(match addr {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
            v4 @ IpAddr::V4(_) => v4,
        })
    }

    /// Header lookup (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// All request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Opaque extension value set by the transport layer.
    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&serde_json::Value> {
        self.extensions.get(key)
    }

    /// All extension values.
    #[must_use]
    pub fn extensions(&self) -> &HashMap<String, serde_json::Value> {
        &self.extensions
    }
}

/// Builder for [`GrayContext`].
#[derive(Debug, Clone, Default)]
pub struct GrayContextBuilder {
    inner: GrayContext,
}

impl GrayContextBuilder {
    /// Set the user id.
    #[must_use]
    pub fn user_id(mut self, user_id: i64) -> Self {
        self.inner.user_id = Some(user_id);
        self
    }

    /// Set the tenant id.
    #[must_use]
    pub fn tenant_id(mut self, tenant_id: i64) -> Self {
        self.inner.tenant_id = Some(tenant_id);
        self
    }

    /// Set the request path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.inner.request_path = path.into();
        self
    }

    /// Set the request method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.inner.request_method = method.into();
        self
    }

    /// Set the client address.
    #[must_use]
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.inner.client_ip = Some(ip.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.inner.headers.insert(name, value);
        self
    }

    /// Add an extension value.
    #[must_use]
    pub fn extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inner.extensions.insert(key.into(), value);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> GrayContext {
        self.inner
    }
}
