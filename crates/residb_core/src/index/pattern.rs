//! Wildcard patterns for pattern queries.

/// A case-insensitive wildcard pattern.
///
/// `*` matches zero or more characters and may appear anywhere:
/// `"ali*"` (prefix), `"*son"` (suffix), `"*li*"` (contains), `"a*e"`,
/// or no wildcard at all (whole-string match). Matching is performed on
/// lower-cased text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<String>,
    anchored_start: bool,
    anchored_end: bool,
}

impl Pattern {
    /// Parses a pattern.
    pub fn parse(text: &str) -> Self {
        let folded = fold(text);
        Self {
            anchored_start: !folded.starts_with('*'),
            anchored_end: !folded.ends_with('*'),
            segments: folded
                .split('*')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            raw: text.to_string(),
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if the pattern has no wildcard.
    pub fn is_exact(&self) -> bool {
        !self.raw.contains('*')
    }

    /// The folded literal every match must start with, if any.
    pub fn literal_prefix(&self) -> Option<&str> {
        if self.anchored_start {
            self.segments.first().map(String::as_str)
        } else {
            None
        }
    }

    /// Matches `candidate`, folding it first.
    pub fn matches(&self, candidate: &str) -> bool {
        self.matches_folded(&fold(candidate))
    }

    /// Matches text that is already lower-cased.
    pub fn matches_folded(&self, folded: &str) -> bool {
        if self.segments.is_empty() {
            // "" only matches "", any run of stars matches everything.
            return !self.is_exact() || folded.is_empty();
        }

        let last = self.segments.len() - 1;
        let mut rest = folded;
        for (i, segment) in self.segments.iter().enumerate() {
            if i == 0 && self.anchored_start {
                match rest.strip_prefix(segment.as_str()) {
                    Some(tail) => rest = tail,
                    None => return false,
                }
            } else if i == last && self.anchored_end {
                return rest.ends_with(segment.as_str());
            } else {
                match rest.find(segment.as_str()) {
                    Some(pos) => rest = &rest[pos + segment.len()..],
                    None => return false,
                }
            }
        }

        !self.anchored_end || rest.is_empty()
    }
}

/// Case folding used by text keys and patterns.
pub(crate) fn fold(text: &str) -> String {
    text.to_lowercase()
}
