//! Query canonicalization.
//!
//! Subscriptions are matched by exact string equality on canonical query
//! text. How a predicate becomes canonical text is up to the caller; this
//! module defines the seam and two simple implementations.

use std::fmt;

/// Converts caller query text into the canonical form used for matching.
///
/// Implementations must be pure: the same input always yields the same output.
pub trait QueryCanonicalizer: Send + Sync + fmt::Debug {
    fn canonicalize(&self, object_type: &str, query: &str) -> String;
}

/// Uses the query text as given.
#[derive(Clone, Copy, Debug, Default)]
pub struct Verbatim;

impl QueryCanonicalizer for Verbatim {
    fn canonicalize(&self, _object_type: &str, query: &str) -> String {
        query.to_string()
    }
}

/// Trims the query and collapses whitespace runs outside quoted literals.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollapseWhitespace;

impl QueryCanonicalizer for CollapseWhitespace {
    fn canonicalize(&self, _object_type: &str, query: &str) -> String {
        let mut out = String::with_capacity(query.len());
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut pending_space = false;

        for c in query.trim().chars() {
            if let Some(q) = quote {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }

            if c.is_whitespace() {
                pending_space = true;
                continue;
            }

            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            if c == '"' || c == '\'' {
                quote = Some(c);
            }
            out.push(c);
        }

        out
    }
}
