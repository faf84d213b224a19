//! Access-control table: consumer to permitted-method-pattern index.
//!
//! Built once at startup from a JSON document mapping consumer names to
//! lists of method patterns and immutable afterwards, so lookups need no
//! locking no matter how many calls check access concurrently.
//!
//! A pattern is either a fully-qualified method path
//! (`"/gateway.Biz/Check"`) or a prefix terminated with `*`
//! (`"/gateway.Admin/*"`) permitting every method under that prefix.

use crate::errors::GatewayError;
use std::collections::HashMap;

/// Wildcard marker terminating a prefix pattern.
const WILDCARD: char = '*';

/// One parsed ACL entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MethodPattern {
    /// Matches exactly this fully-qualified method path.
    Exact(String),
    /// Matches any method path starting with this prefix.
    Prefix(String),
}

impl MethodPattern {
    fn parse(raw: &str) -> Self {
        match raw.strip_suffix(WILDCARD) {
            Some(prefix) => MethodPattern::Prefix(prefix.to_string()),
            None => MethodPattern::Exact(raw.to_string()),
        }
    }

    fn matches(&self, method: &str) -> bool {
        match self {
            MethodPattern::Exact(path) => method == path,
            MethodPattern::Prefix(prefix) => method.starts_with(prefix.as_str()),
        }
    }
}

/// Immutable consumer to permitted-method-pattern index.
#[derive(Debug, Clone)]
pub struct AccessControlTable {
    entries: HashMap<String, Vec<MethodPattern>>,
}

impl AccessControlTable {
    /// Parse the ACL document: a JSON object mapping consumer name to an
    /// ordered list of method-pattern strings.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when the document does not parse
    /// into the consumer to pattern-list shape.
    pub fn from_json(raw: &str) -> Result<Self, GatewayError> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(raw)
            .map_err(|e| GatewayError::Config(format!("malformed ACL document: {e}")))?;

        let entries = parsed
            .into_iter()
            .map(|(consumer, patterns)| {
                let patterns = patterns.iter().map(|p| MethodPattern::parse(p)).collect();
                (consumer, patterns)
            })
            .collect();

        Ok(Self { entries })
    }

    /// Whether `consumer` may invoke `method` (a fully-qualified path such
    /// as `/gateway.Biz/Check`). Unknown consumers are always denied.
    #[must_use]
    pub fn allows(&self, consumer: &str, method: &str) -> bool {
        self.entries
            .get(consumer)
            .is_some_and(|patterns| patterns.iter().any(|p| p.matches(method)))
    }

    /// Number of configured consumers (startup logging).
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.entries.len()
    }
}
