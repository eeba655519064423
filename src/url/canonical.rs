use std::fmt;
use url::Url;

/// A normalized absolute http(s) URL used as the identity key for deduplication
///
/// Values are only produced by [`Canonicalizer`](super::Canonicalizer), so two
/// `CanonicalUrl`s compare equal exactly when they name the same page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub(crate) fn from_normalized(url: Url) -> Self {
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Lowercase host; canonical URLs always have one
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Host plus an explicit non-default port, e.g. `127.0.0.1:8080`
    ///
    /// Rate limiting and the on-disk domain directory are keyed on this.
    pub fn host_key(&self) -> String {
        match self.0.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.0.query()
    }

    pub fn into_url(self) -> Url {
        self.0
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
