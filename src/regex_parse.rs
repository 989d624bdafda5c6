//! Regular expression matching with a minimum count of captured groups.

use regex::Regex;
use tracing::debug;

/// Capture storage with a fixed capacity.
///
/// Slot 0 holds the whole match, and slot `i` holds capture group `i`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Match {
    captures: Vec<String>,
}

impl Match {
    pub fn new(capacity: usize) -> Self {
        Self { captures: vec![String::new(); capacity] }
    }

    pub fn capacity(&self) -> usize {
        self.captures.len()
    }

    /// Captured text of slot `index`. Slots not filled by the last match are empty.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(String::as_str)
    }
}

/// Pattern compiled once, then matched against many inputs.
#[derive(Clone, Debug)]
pub struct RegexParser {
    regex: Option<Regex>,
}

impl RegexParser {
    /// Compile `pattern`. An invalid pattern yields a parser that never matches.
    pub fn new(pattern: &str) -> Self {
        let regex = match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                debug!(%err, pattern, "invalid pattern");
                None
            },
        };

        Self { regex }
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    /// Match `input`, copying the leading participating groups into `m`.
    ///
    /// Returns `true` if at least `min_matches` slots were filled, or, for a
    /// `min_matches` of 0, if every slot of `m` was filled.
    pub fn execute(&self, input: &str, m: &mut Match, min_matches: usize) -> bool {
        let regex = match &self.regex {
            Some(regex) => regex,
            None => return false,
        };

        let captures = match regex.captures(input) {
            Some(captures) => captures,
            None => return false,
        };

        for slot in m.captures.iter_mut() {
            slot.clear();
        }

        let mut copied = 0;

        for (slot, group) in m.captures.iter_mut().zip(captures.iter()) {
            match group {
                Some(group) => {
                    slot.push_str(group.as_str());
                    copied += 1;
                },
                None => break,
            }
        }

        let required = if min_matches == 0 { m.capacity() } else { min_matches };

        copied >= required
    }
}
