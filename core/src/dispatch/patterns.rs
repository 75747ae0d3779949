use std::collections::HashMap;

use regex::Regex;

/// Compiled filter patterns keyed by their source text.
///
/// Filled while routes are set up, then shared read-only by every
/// dispatcher.
#[derive(Debug, Default)]
pub struct PatternCache {
    patterns: HashMap<String, Regex>,
}

impl PatternCache {
    /// Compiles `source` unless it's already cached.
    pub fn compile(&mut self, source: &str) -> Result<&Regex, regex::Error> {
        if !self.patterns.contains_key(source) {
            let regex = Regex::new(source)?;
            self.patterns.insert(source.to_string(), regex);
        }
        Ok(&self.patterns[source])
    }

    pub fn get(&self, source: &str) -> Option<&Regex> {
        self.patterns.get(source)
    }

    /// Whether `value` matches the cached pattern. Uncached patterns never match.
    pub fn is_match(&self, source: &str, value: &str) -> bool {
        self.get(source).is_some_and(|regex| regex.is_match(value))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
