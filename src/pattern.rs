//! Glob-style topic patterns.
//!
//! Patterns select which topics a listener receives:
//! - `users.created` - exact match
//! - `users.*` - anything starting with `users.`, including `users.a.b`
//! - `*.created` - any created event
//! - `*` - every topic, including the empty one
//!
//! `*` is not stopped by `.` or any other separator, and a run such as `**`
//! means the same as a single `*`. `?` is an ordinary character. Bracket
//! classes (`[ab]`) and alternations (`{a,b}`) are accepted; an unterminated
//! one is rejected at compile time. A `]` or `}` that closes nothing is an
//! ordinary character.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};

use crate::{Error, Result};

/// A compiled topic pattern.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    /// The original pattern string
    pattern: Arc<str>,
    /// Compiled glob matcher (None for exact matches)
    matcher: Option<GlobMatcher>,
}

impl TopicPattern {
    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the glob is malformed.
    pub fn new(pattern: impl AsRef<str>) -> Result<Self> {
        let pattern = pattern.as_ref();

        let matcher = if is_glob(pattern) {
            let glob = GlobBuilder::new(&to_glob(pattern))
                .literal_separator(false)
                .backslash_escape(true)
                .case_insensitive(false)
                .build()
                .map_err(|e| Error::invalid_pattern(pattern, e.kind().to_string()))?;
            Some(glob.compile_matcher())
        } else {
            None
        };

        Ok(Self {
            pattern: Arc::from(pattern),
            matcher,
        })
    }

    /// Check a topic against this pattern
    pub fn matches(&self, topic: &str) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.is_match(topic),
            None => *self.pattern == *topic,
        }
    }

    /// The pattern as written at registration
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Shared handle to the pattern string
    pub(crate) fn key(&self) -> Arc<str> {
        self.pattern.clone()
    }

    /// Whether the pattern has no wildcards
    pub fn is_exact(&self) -> bool {
        self.matcher.is_none()
    }
}

impl PartialEq for TopicPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for TopicPattern {}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl TryFrom<&str> for TopicPattern {
    type Error = Error;

    fn try_from(pattern: &str) -> Result<Self> {
        Self::new(pattern)
    }
}

impl TryFrom<String> for TopicPattern {
    type Error = Error;

    fn try_from(pattern: String) -> Result<Self> {
        Self::new(pattern)
    }
}

/// Compile `pattern` and test `topic` against it.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] if the glob is malformed.
pub fn matches(pattern: &str, topic: &str) -> Result<bool> {
    Ok(TopicPattern::new(pattern)?.matches(topic))
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '[', ']', '{', '}', '\\'])
}

// Rewrite a topic pattern into globset syntax. globset gives `?` and `**`
// their own meaning and rejects a `}` with no open group; topics treat all
// three as plain text or as a single `*`.
fn to_glob(pattern: &str) -> Cow<'_, str> {
    if !pattern.contains(['?', '}']) && !pattern.contains("**") {
        return Cow::Borrowed(pattern);
    }

    let mut out = String::with_capacity(pattern.len() + 4);
    let mut class: Option<usize> = None;
    let mut groups = 0usize;
    let mut escaped = false;
    let mut after_star = false;
    for ch in pattern.chars() {
        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }
        if let Some(len) = class.as_mut() {
            // `]` directly after `[` or `[!` is a member, not the end.
            let opening = *len == 0 || (*len == 1 && out.ends_with(['!', '^']));
            if ch == ']' && !opening {
                class = None;
            } else {
                *len += 1;
            }
            out.push(ch);
            continue;
        }

        let star = ch == '*';
        match ch {
            '\\' => {
                escaped = true;
                out.push(ch);
            }
            '*' if after_star => {}
            '[' => {
                class = Some(0);
                out.push(ch);
            }
            '{' => {
                groups += 1;
                out.push(ch);
            }
            '}' if groups > 0 => {
                groups -= 1;
                out.push(ch);
            }
            '}' => out.push_str("\\}"),
            '?' => out.push_str("\\?"),
            _ => out.push(ch),
        }
        after_star = star;
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_everything() {
        let any = TopicPattern::new("*").unwrap();
        assert!(any.matches(""));
        assert!(any.matches("event"));
        assert!(any.matches("a.b.c"));
        assert!(any.matches("with spaces/and/slashes"));
    }

    #[test]
    fn test_star_crosses_separators() {
        assert!(matches("a.*", "a.b").unwrap());
        assert!(matches("a.*", "a.b.c").unwrap());
        assert!(matches("a.*", "a.").unwrap());
        assert!(!matches("a.*", "a").unwrap());
        assert!(!matches("a.*", "b.a.c").unwrap());
    }

    #[test]
    fn test_namespace_patterns() {
        let users = TopicPattern::new("users.*").unwrap();
        assert!(users.matches("users.created"));
        assert!(!users.matches("orders.created"));

        let created = TopicPattern::new("*.created").unwrap();
        assert!(created.matches("users.created"));
        assert!(created.matches("a.b.created"));
        assert!(!created.matches("users.deleted"));

        let middle = TopicPattern::new("users.*.done").unwrap();
        assert!(middle.matches("users.x.done"));
        assert!(middle.matches("users.x.y.done"));
        assert!(!middle.matches("users.done"));
    }

    #[test]
    fn test_exact_patterns() {
        let exact = TopicPattern::new("users.created").unwrap();
        assert!(exact.is_exact());
        assert!(exact.matches("users.created"));
        assert!(!exact.matches("users.created.v2"));
        assert!(!exact.matches("Users.Created"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!matches("Users.*", "users.created").unwrap());
        assert!(matches("Users.*", "Users.created").unwrap());
    }

    #[test]
    fn test_question_mark_is_literal() {
        assert!(matches("what?", "what?").unwrap());
        assert!(!matches("what?", "whats").unwrap());
        assert!(matches("*?", "really?").unwrap());
        assert!(!matches("*?", "really").unwrap());
        assert!(matches("[?x]", "?").unwrap());
    }

    #[test]
    fn test_star_runs_collapse() {
        assert!(!matches("**/x", "x").unwrap());
        assert!(matches("**/x", "a/x").unwrap());
        assert!(!matches("a/**/b", "a/b").unwrap());
        assert!(matches("a/**/b", "a/x/b").unwrap());
        assert!(matches("a/**/b", "a/x/y/b").unwrap());
        assert!(matches("**", "a.b").unwrap());
        assert!(matches("**", "").unwrap());
        assert!(matches("users.***", "users.created").unwrap());

        // an escaped star stays literal next to a wildcard
        assert!(matches(r"\**", "*x").unwrap());
        assert!(!matches(r"\**", "x").unwrap());
    }

    #[test]
    fn test_unmatched_closers_are_literal() {
        assert!(matches("a]", "a]").unwrap());
        assert!(matches("a}", "a}").unwrap());
        assert!(!matches("a}", "a").unwrap());
        assert!(matches("{a,b}}", "b}").unwrap());
        assert!(matches("*}", "x.y}").unwrap());
        assert!(matches("[}]x", "}x").unwrap());
        assert!(matches("[]]x", "]x").unwrap());
    }

    #[test]
    fn test_classes_and_alternates() {
        assert!(matches("user[sz].*", "userz.created").unwrap());
        assert!(matches("{users,orders}.*", "orders.created").unwrap());
        assert!(!matches("{users,orders}.*", "carts.created").unwrap());
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["users.[abc", "{users,orders.*"] {
            let err = TopicPattern::new(bad).unwrap_err();
            match err {
                Error::InvalidPattern { pattern, .. } => assert_eq!(pattern, bad),
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(matches("users.[abc", "users.a").is_err());
    }

    #[test]
    fn test_pattern_identity() {
        let a = TopicPattern::new("a.*").unwrap();
        let b = TopicPattern::try_from("a.*").unwrap();
        let c = TopicPattern::try_from("a.b".to_string()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "a.*");
        assert_eq!(a.as_str(), "a.*");
    }
}
