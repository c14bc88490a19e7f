//! Synapse identifier matching with context capture
//!
//! An identifier is `syn` followed by 7 to 12 ASCII digits, not glued to a
//! digit on either side. Context windows are measured in characters.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use synmine_core::Finding;

/// Shortest accepted digit run
const MIN_DIGITS: usize = 7;
/// Longest accepted digit run
const MAX_DIGITS: usize = 12;

/// `syn` plus the whole digit run; the length bound is checked afterwards so a
/// 13-digit run is rejected instead of matching its first 12 digits.
static SYN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"syn[0-9]+").expect("invalid synapse pattern"));

/// Scans text for identifiers. Stateless between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatcher {
    context_size: usize,
    deduplicate: bool,
}

impl PatternMatcher {
    pub fn new(context_size: usize, deduplicate: bool) -> Self {
        Self {
            context_size,
            deduplicate,
        }
    }

    pub fn from_config(config: &crate::MinerConfig) -> Self {
        Self::new(config.context_size, config.deduplicate)
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }

    pub fn deduplicate(&self) -> bool {
        self.deduplicate
    }

    /// Lazily yield findings in position order.
    pub fn find<'a>(&self, text: &'a str, source_id: &'a str) -> Matches<'a> {
        Matches {
            text,
            source_id,
            inner: SYN_PATTERN.find_iter(text),
            context_size: self.context_size,
            seen: self.deduplicate.then(HashSet::new),
            byte_cursor: 0,
            char_cursor: 0,
        }
    }

    /// Collect all findings for one document
    pub fn find_all(&self, text: &str, source_id: &str) -> Vec<Finding> {
        self.find(text, source_id).collect()
    }
}

/// Iterator over the findings of one document
pub struct Matches<'a> {
    text: &'a str,
    source_id: &'a str,
    inner: regex::Matches<'static, 'a>,
    context_size: usize,
    /// `Some` when deduplicating
    seen: Option<HashSet<&'a str>>,
    // Incremental char offset tracking
    byte_cursor: usize,
    char_cursor: usize,
}

impl<'a> Matches<'a> {
    fn is_valid(&self, m: &regex::Match<'a>) -> bool {
        let digits = m.len() - 3;
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits) {
            return false;
        }
        !self.text[..m.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn char_offset(&mut self, byte: usize) -> usize {
        self.char_cursor += self.text[self.byte_cursor..byte].chars().count();
        self.byte_cursor = byte;
        self.char_cursor
    }
}

impl Iterator for Matches<'_> {
    type Item = Finding;

    fn next(&mut self) -> Option<Finding> {
        loop {
            let m = self.inner.next()?;
            if !self.is_valid(&m) {
                continue;
            }
            let id = m.as_str();
            if let Some(seen) = self.seen.as_mut() {
                if !seen.insert(id) {
                    continue;
                }
            }
            let position = self.char_offset(m.start());
            return Some(Finding {
                source_id: self.source_id.to_string(),
                synapse_id: id.to_string(),
                context_before: last_chars(&self.text[..m.start()], self.context_size).to_string(),
                context_after: first_chars(&self.text[m.end()..], self.context_size).to_string(),
                position,
            });
        }
    }
}

/// Suffix of at most `n` characters
fn last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

/// Prefix of at most `n` characters
fn first_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.synapse_id.as_str()).collect()
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let text = "See syn1234567 and again syn1234567 near syn99999999.";
        let found = PatternMatcher::new(5, true).find_all(text, "doc1");

        assert_eq!(ids(&found), vec!["syn1234567", "syn99999999"]);
        assert_eq!(found[0].source_id, "doc1");
        assert_eq!(found[0].context_before, "See ");
        assert_eq!(found[0].context_after, " and ");
        assert_eq!(found[0].position, 4);
        assert_eq!(found[1].context_before, "near ");
        assert_eq!(found[1].context_after, ".");
    }

    #[test]
    fn no_dedup_keeps_every_occurrence() {
        let text = "See syn1234567 and again syn1234567 near syn99999999.";
        let found = PatternMatcher::new(5, false).find_all(text, "doc1");
        assert_eq!(ids(&found), vec!["syn1234567", "syn1234567", "syn99999999"]);
        assert!(found[0].position < found[1].position);
    }

    #[test]
    fn digit_count_bounds() {
        let m = PatternMatcher::new(3, false);
        assert!(m.find_all("syn123456", "d").is_empty());
        assert_eq!(ids(&m.find_all("syn1234567", "d")), vec!["syn1234567"]);
        assert_eq!(ids(&m.find_all("syn123456789012", "d")), vec!["syn123456789012"]);
        assert!(m.find_all("syn1234567890123", "d").is_empty());
    }

    #[test]
    fn preceding_digit_rejects() {
        let m = PatternMatcher::new(3, false);
        assert!(m.find_all("9syn1234567", "d").is_empty());
        assert_eq!(ids(&m.find_all("xsyn1234567", "d")), vec!["syn1234567"]);
        assert_eq!(ids(&m.find_all("(syn1234567)", "d")), vec!["syn1234567"]);
    }

    #[test]
    fn uppercase_not_matched() {
        let m = PatternMatcher::new(3, false);
        assert!(m.find_all("SYN1234567 Syn1234567", "d").is_empty());
    }

    #[test]
    fn context_clamped_at_bounds() {
        let found = PatternMatcher::new(100, true).find_all("syn1234567", "d");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].context_before, "");
        assert_eq!(found[0].context_after, "");
        assert_eq!(found[0].context(), "syn1234567");
    }

    #[test]
    fn context_counts_characters_not_bytes() {
        let text = "αβγδε syn1234567 ζηθικ";
        let found = PatternMatcher::new(3, true).find_all(text, "d");
        assert_eq!(found[0].context_before, "δε ");
        assert_eq!(found[0].context_after, " ζη");
        assert_eq!(found[0].position, 6);
    }

    #[test]
    fn positions_track_across_multibyte_text() {
        let text = "é syn1234567 ü syn7654321";
        let found = PatternMatcher::new(1, false).find_all(text, "d");
        assert_eq!(found[0].position, 2);
        assert_eq!(found[1].position, 15);
        let chars: Vec<char> = text.chars().collect();
        let at: String = chars[15..25].iter().collect();
        assert_eq!(at, "syn7654321");
    }

    #[test]
    fn context_never_exceeds_window() {
        let text = "a".repeat(500) + " syn1234567 " + &"b".repeat(500);
        let found = PatternMatcher::new(10, true).find_all(&text, "d");
        assert_eq!(found[0].context_before.chars().count(), 10);
        assert_eq!(found[0].context_after.chars().count(), 10);
    }

    #[test]
    fn dedup_is_per_call() {
        let m = PatternMatcher::new(5, true);
        assert_eq!(m.find_all("syn1234567", "a").len(), 1);
        assert_eq!(m.find_all("syn1234567", "b").len(), 1);
    }

    #[test]
    fn adjacent_prefix_is_skipped() {
        let m = PatternMatcher::new(2, false);
        assert_eq!(ids(&m.find_all("synsyn1234567", "d")), vec!["syn1234567"]);
    }

    #[test]
    fn empty_text() {
        assert!(PatternMatcher::new(5, true).find_all("", "d").is_empty());
    }
}
