//! Finalizer keys and the insertion-ordered finalizer set.
//!
//! A key records that one target carries an injected fault:
//! - plain: `<namespace>/<name>`
//! - directional: `source<namespace>/<name>` or `target<namespace>/<name>`
//! - instance-suffixed: `<namespace>/<name>/<instance>` (stress processes)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::models::ObjectKey;

/// Width of the direction prefix; both prefixes are six characters.
pub const DIRECTION_PREFIX_LEN: usize = 6;

/// Side of a bidirectional fault a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Source,
    Target,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Target => "target",
        }
    }
}

/// Parsed form of a finalizer key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FinalizerKey {
    pub role: Option<Role>,
    pub pod: ObjectKey,
    pub instance: Option<String>,
}

impl FinalizerKey {
    pub fn plain(pod: ObjectKey) -> Self {
        FinalizerKey {
            role: None,
            pod,
            instance: None,
        }
    }

    pub fn directional(role: Role, pod: ObjectKey) -> Self {
        FinalizerKey {
            role: Some(role),
            pod,
            instance: None,
        }
    }

    pub fn with_instance(pod: ObjectKey, instance: impl Into<String>) -> Self {
        FinalizerKey {
            role: None,
            pod,
            instance: Some(instance.into()),
        }
    }

    /// Parse a stored key. `directional` selects whether the first six
    /// characters are a role prefix.
    pub fn parse(raw: &str, directional: bool) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFinalizerKey(raw.to_string());

        let (role, rest) = if directional {
            if raw.len() <= DIRECTION_PREFIX_LEN || !raw.is_char_boundary(DIRECTION_PREFIX_LEN) {
                return Err(invalid());
            }
            let (prefix, rest) = raw.split_at(DIRECTION_PREFIX_LEN);
            let role = match prefix {
                "source" => Role::Source,
                "target" => Role::Target,
                _ => return Err(invalid()),
            };
            (Some(role), rest)
        } else {
            (None, raw)
        };

        let mut parts = rest.splitn(3, '/');
        let namespace = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let name = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let instance = parts.next().map(str::to_string);
        if instance.as_deref() == Some("") {
            return Err(invalid());
        }

        Ok(FinalizerKey {
            role,
            pod: ObjectKey::new(namespace, name),
            instance,
        })
    }
}

impl fmt::Display for FinalizerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(role) = self.role {
            f.write_str(role.as_str())?;
        }
        write!(f, "{}", self.pod)?;
        if let Some(instance) = &self.instance {
            write!(f, "/{}", instance)?;
        }
        Ok(())
    }
}

/// Insertion-ordered set of finalizer keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Finalizers(Vec<String>);

impl Finalizers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key; returns false if it was already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.contains(&key) {
            return false;
        }
        self.0.push(key);
        true
    }

    /// Remove a key; returns false if it was absent.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|k| k != key);
        before != self.0.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl From<Vec<String>> for Finalizers {
    fn from(keys: Vec<String>) -> Self {
        let mut set = Finalizers::new();
        for key in keys {
            set.insert(key);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_key_round_trip() {
        let key = FinalizerKey::directional(Role::Source, ObjectKey::new("default", "peer-0"));
        assert_eq!(key.to_string(), "sourcedefault/peer-0");
        assert_eq!(FinalizerKey::parse("sourcedefault/peer-0", true).unwrap(), key);

        let parsed = FinalizerKey::parse("targetdefault/peer-1", true).unwrap();
        assert_eq!(parsed.role, Some(Role::Target));
        assert_eq!(parsed.pod, ObjectKey::new("default", "peer-1"));
    }

    #[test]
    fn test_plain_key_does_not_strip_prefix() {
        let parsed = FinalizerKey::parse("sourcens/pod", false).unwrap();
        assert_eq!(parsed.role, None);
        assert_eq!(parsed.pod.namespace, "sourcens");
    }

    #[test]
    fn test_instance_suffix() {
        let key = FinalizerKey::with_instance(ObjectKey::new("app", "web-0"), "1b4e28ba");
        assert_eq!(key.to_string(), "app/web-0/1b4e28ba");
        let parsed = FinalizerKey::parse("app/web-0/1b4e28ba", false).unwrap();
        assert_eq!(parsed.instance.as_deref(), Some("1b4e28ba"));
    }

    #[test]
    fn test_malformed_keys() {
        assert!(FinalizerKey::parse("no-slash", false).is_err());
        assert!(FinalizerKey::parse("other/ns", true).is_err());
        assert!(FinalizerKey::parse("source", true).is_err());
        assert!(FinalizerKey::parse("ns/", false).is_err());
    }

    #[test]
    fn test_finalizer_set_is_idempotent_and_ordered() {
        let mut set = Finalizers::new();
        assert!(set.insert("default/b"));
        assert!(set.insert("default/a"));
        assert!(!set.insert("default/b"));
        assert_eq!(set.to_vec(), vec!["default/b", "default/a"]);

        assert!(set.remove("default/b"));
        assert!(!set.remove("default/b"));
        assert_eq!(set.len(), 1);
    }
}
