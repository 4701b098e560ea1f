//! Cluster-wide namespace allow/ignore policy.
//!
//! Both lists are comma-separated regular expressions matched anywhere in
//! the namespace name. A non-empty allow-list wins over the ignore-list.

use regex::Regex;

use crate::error::SelectionError;

#[derive(Debug, Clone, Default)]
pub struct NamespacePolicy {
    allowed: Vec<Regex>,
    ignored: Vec<Regex>,
}

fn compile(list: &str) -> Result<Vec<Regex>, SelectionError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Regex::new(s).map_err(|e| {
                SelectionError::InvalidSelector(format!("namespace pattern {:?}: {}", s, e))
            })
        })
        .collect()
}

impl NamespacePolicy {
    pub fn new(allowed: &str, ignored: &str) -> Result<Self, SelectionError> {
        Ok(NamespacePolicy {
            allowed: compile(allowed)?,
            ignored: compile(ignored)?,
        })
    }

    /// Read `ALLOWED_NAMESPACES` and `IGNORED_NAMESPACES`.
    pub fn from_env() -> Result<Self, SelectionError> {
        let allowed = std::env::var("ALLOWED_NAMESPACES").unwrap_or_default();
        let ignored = std::env::var("IGNORED_NAMESPACES").unwrap_or_default();
        Self::new(&allowed, &ignored)
    }

    pub fn is_allowed(&self, namespace: &str) -> bool {
        if !self.allowed.is_empty() {
            return self.allowed.iter().any(|re| re.is_match(namespace));
        }
        if !self.ignored.is_empty() {
            return !self.ignored.iter().any(|re| re.is_match(namespace));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        let policy = NamespacePolicy::new("allow", "").unwrap();
        for ns in ["allow", "allow-app", "app-allow"] {
            assert!(policy.is_allowed(ns), "{}", ns);
        }
        for ns in ["ignore", "ignore-app", "app-ignore"] {
            assert!(!policy.is_allowed(ns), "{}", ns);
        }
    }

    #[test]
    fn test_ignore_list() {
        let policy = NamespacePolicy::new("", "ignore").unwrap();
        for ns in ["allow", "allow-app", "app-allow"] {
            assert!(policy.is_allowed(ns), "{}", ns);
        }
        for ns in ["ignore", "ignore-app", "app-ignore"] {
            assert!(!policy.is_allowed(ns), "{}", ns);
        }
    }

    #[test]
    fn test_allow_takes_precedence() {
        let policy = NamespacePolicy::new("^prod$", "prod").unwrap();
        assert!(policy.is_allowed("prod"));
        assert!(!policy.is_allowed("staging"));
    }

    #[test]
    fn test_empty_policy_and_bad_pattern() {
        assert!(NamespacePolicy::default().is_allowed("anything"));
        assert!(NamespacePolicy::new("(", "").is_err());
    }
}
