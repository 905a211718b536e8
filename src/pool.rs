//! Ordered pool of candidate server URLs.
//!
//! The pool tracks which entry is current. Reconnection always dials the
//! current entry; only a server-directed move or a manual switch changes it.

#[derive(Clone, Debug, Default)]
pub struct AddressPool {
    urls: Vec<String>,
    current: usize,
}

impl AddressPool {
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls, current: 0 }
    }

    /// The URL the session should be connected to.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.urls.get(self.current).map(String::as_str)
    }

    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Apply a server-directed move to `target`.
    ///
    /// The stale current entry is dropped unless it is the primary entry at
    /// position 0, which stays as a fallback. Any existing copy of `target`
    /// is removed before it is appended, so the pool never holds duplicates.
    pub fn migrate(&mut self, target: &str) {
        if self.current > 0 && self.current < self.urls.len() {
            self.urls.remove(self.current);
        }
        self.urls.retain(|url| url != target);
        self.urls.push(target.to_owned());
        self.current = self.urls.len() - 1;
    }

    /// Make `target` current, appending it when it is not in the pool yet.
    pub fn select(&mut self, target: &str) {
        if let Some(index) = self.urls.iter().position(|url| url == target) {
            self.current = index;
        } else {
            self.urls.push(target.to_owned());
            self.current = self.urls.len() - 1;
        }
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
