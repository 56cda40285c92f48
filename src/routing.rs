//! The routing contract the handshake relies on.
//!
//! Routing decides which requests reach the Negotiate driver at all. The
//! handshake only needs to ask "does this path require Negotiate?", so the
//! contract is a [`MatcherFactory`] that turns a list of endpoints into a
//! [`Matcher`].

/// A routable endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pattern: String,
    negotiate: bool,
}

impl Endpoint {
    /// An endpoint matching every path under `pattern`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Endpoint {
            pattern: pattern.into(),
            negotiate: false,
        }
    }

    /// Mark the endpoint as requiring Negotiate authentication.
    pub fn negotiate(mut self) -> Self {
        self.negotiate = true;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn requires_negotiate(&self) -> bool {
        self.negotiate
    }
}

/// Finds the endpoint a request path belongs to.
pub trait Matcher: Send + Sync {
    fn find(&self, path: &str) -> Option<&Endpoint>;

    /// Whether requests to `path` must go through the Negotiate driver.
    fn requires_negotiate(&self, path: &str) -> bool {
        self.find(path).map_or(false, Endpoint::requires_negotiate)
    }
}

/// Builds a [`Matcher`] from a set of endpoints.
pub trait MatcherFactory {
    type Matcher: Matcher;

    fn create_matcher(&self, endpoints: Vec<Endpoint>) -> Self::Matcher;
}

/// Matches on path segments, preferring the longest matching prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrefixMatcherFactory;

impl MatcherFactory for PrefixMatcherFactory {
    type Matcher = PrefixMatcher;

    fn create_matcher(&self, mut endpoints: Vec<Endpoint>) -> PrefixMatcher {
        // Longest first, so the first hit is the most specific.
        endpoints.sort_by(|a, b| b.pattern.len().cmp(&a.pattern.len()));
        PrefixMatcher { endpoints }
    }
}

#[derive(Clone, Debug)]
pub struct PrefixMatcher {
    endpoints: Vec<Endpoint>,
}

impl Matcher for PrefixMatcher {
    fn find(&self, path: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| segment_prefix(e.pattern.trim_end_matches('/'), path))
    }
}

fn segment_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.is_empty(),
        None => false,
    }
}
