//! Convenience builder for HTTP query parameters.
//!
//! Listing filters use this to turn optional criteria into URL query pairs,
//! including prefixed families such as `tag.{name}`.

use std::fmt::Display;

/// Builder for assembling query parameter pairs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Create a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Append a key/value pair when the value is present.
    pub fn push_opt<T>(&mut self, key: &str, value: Option<T>)
    where
        T: ToString,
    {
        if let Some(value) = value {
            self.pairs.push((key.to_string(), value.to_string()));
        }
    }

    /// Append one `{prefix}{key}` pair per map entry.
    pub fn push_prefixed<'a, I, V>(&mut self, prefix: &str, entries: I)
    where
        I: IntoIterator<Item = (&'a String, V)>,
        V: Display,
    {
        for (key, value) in entries {
            self.pairs.push((format!("{prefix}{key}"), value.to_string()));
        }
    }

    /// Return the collected key/value pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }

    /// Returns true if no parameters have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
