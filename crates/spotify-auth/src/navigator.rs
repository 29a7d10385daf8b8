//! User-agent navigation seam
//!
//! The authorization flow has two effects that belong to the hosting
//! shell, not this library: sending the user agent to the authorization
//! endpoint, and rewriting the visible location after the callback so a
//! reload does not re-submit a spent code. [`Navigator`] is the injected
//! abstraction over both, plus the current location the redirect target is
//! recomputed from.

use std::sync::Mutex;

/// The current location of the user agent, decomposed the way the flow
/// consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Scheme + host (+ port), e.g. `https://app.example.com`
    pub origin: String,
    /// Path component, e.g. `/` or `/app`
    pub path: String,
    /// Raw query string without the leading `?`, possibly empty
    pub query: String,
}

impl Location {
    pub fn new(origin: impl Into<String>, path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
            query: query.into(),
        }
    }

    /// The redirect target: current origin + path, recomputed on every
    /// use so initiation and exchange always agree byte-for-byte.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.origin, self.path)
    }
}

/// Abstraction over user-agent effects, injected into the flow.
pub trait Navigator: Send + Sync {
    /// The location the user agent currently shows.
    fn location(&self) -> Location;

    /// Full-page navigation to `url`. Does not return meaningfully to the
    /// flow that triggered it.
    fn navigate(&self, url: &str);

    /// Drop the query string from the visible location without reloading,
    /// so the spent authorization response cannot be replayed from a
    /// bookmark or refresh.
    fn strip_query(&self);
}

/// In-memory [`Navigator`] that records navigations instead of performing
/// them. Used by tests and by embedding shells that drive navigation
/// themselves.
pub struct MemoryNavigator {
    location: Mutex<Location>,
    navigations: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(location: Location) -> Self {
        Self {
            location: Mutex::new(location),
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// The most recent navigation target, if any.
    pub fn last_navigation(&self) -> Option<String> {
        self.navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn set_location(&self, location: Location) {
        *self.location.lock().unwrap_or_else(|e| e.into_inner()) = location;
    }
}

impl Navigator for MemoryNavigator {
    fn location(&self) -> Location {
        self.location.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn navigate(&self, url: &str) {
        self.navigations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
    }

    fn strip_query(&self) {
        self.location
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .query
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_is_origin_plus_path() {
        let loc = Location::new("https://app.example.com", "/player", "code=abc");
        assert_eq!(loc.redirect_uri(), "https://app.example.com/player");
    }

    #[test]
    fn memory_navigator_records_navigations() {
        let nav = MemoryNavigator::new(Location::new("https://a", "/", ""));
        assert!(nav.last_navigation().is_none());

        nav.navigate("https://accounts.example.com/authorize?x=1");
        assert_eq!(nav.navigation_count(), 1);
        assert_eq!(
            nav.last_navigation().as_deref(),
            Some("https://accounts.example.com/authorize?x=1")
        );
    }

    #[test]
    fn strip_query_clears_only_the_query() {
        let nav = MemoryNavigator::new(Location::new("https://a", "/app", "code=spent"));
        nav.strip_query();
        let loc = nav.location();
        assert_eq!(loc.query, "");
        assert_eq!(loc.redirect_uri(), "https://a/app");
    }
}
