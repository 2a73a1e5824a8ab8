// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! The `path` module provides the `ActorPath` type. The `ActorPath` type is a path to an actor in the actor system.
//!

use crate::Error;

use serde::{Deserialize, Serialize};

use std::fmt::Formatter;
use std::str::FromStr;

/// Separator between the system name and the first segment in the string form of a path.
const SCHEME_SEPARATOR: &str = "://";

/// Punctuation accepted in a name besides ASCII letters and digits.
const SAFE_PUNCTUATION: &[char] =
    &['-', '_', '.', '$', '+', '!', '*', '\'', '(', ')', ','];

/// Hierarchical path providing unique addressing for actors within an actor system.
///
/// An `ActorPath` is the name of the owning system plus an ordered sequence of name
/// segments, one per level of the supervision tree. The path with no segments addresses
/// the system itself; `orders://billing/invoices` addresses the actor `invoices`
/// supervised by the top-level actor `billing` of the system `orders`.
///
/// # Validation
///
/// Paths are only built through [`ActorPath::root`] and [`ActorPath::child`], which
/// validate every name: a name is a non-empty string made of ASCII letters, digits and
/// the punctuation `-_.$+!*'(),`. Whitespace is never accepted.
///
/// # Equality
///
/// Two paths are equal iff their system names and segments are equal.
///
/// ```ignore
/// use actor::ActorPath;
///
/// let root = ActorPath::root("orders")?;
/// let billing = root.child("billing")?;
/// let invoices = billing.child("invoices")?;
///
/// assert_eq!(invoices.to_string(), "orders://billing/invoices");
/// assert!(billing.is_parent_of(&invoices));
/// assert!(invoices.is_descendant_of(&root));
/// assert!(root.child("has space").is_err());
/// ```
#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorPath {
    system: String,
    segments: Vec<String>,
}

impl ActorPath {
    /// Creates the root path of a system: the path with no segments.
    ///
    /// # Error
    ///
    /// Returns `Error::InvalidName` if the system name fails validation.
    ///
    pub fn root(system: &str) -> Result<Self, Error> {
        if !is_valid_name(system) {
            return Err(Error::InvalidName(system.to_owned()));
        }
        Ok(ActorPath {
            system: system.to_owned(),
            segments: Vec::new(),
        })
    }

    /// Creates the path of a child named `name` under this path.
    ///
    /// The resulting segments are this path's segments followed by `name`.
    ///
    /// # Error
    ///
    /// Returns `Error::InvalidName` if `name` fails validation or this path does not
    /// belong to a named system.
    ///
    pub fn child(&self, name: &str) -> Result<Self, Error> {
        if self.system.is_empty() || !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Ok(ActorPath {
            system: self.system.clone(),
            segments,
        })
    }

    /// Name of the system owning this path.
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Name segments from the top-level actor down to the addressed actor.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Obtains the parent path by removing the last segment. The parent of a top-level
    /// actor is the system root, and the root is its own parent.
    pub fn parent(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.pop();
        ActorPath {
            system: self.system.clone(),
            segments,
        }
    }

    /// Last segment of the path, the actor's own name. Empty for the system root.
    pub fn key(&self) -> String {
        self.segments.last().cloned().unwrap_or_default()
    }

    /// Depth of the path; the system root is at level 0.
    pub fn level(&self) -> usize {
        self.segments.len()
    }

    /// True if the path addresses the system itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if the path addresses a direct child of the system.
    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    /// True if `other` lives strictly below this path in the same system.
    pub fn is_ancestor_of(&self, other: &ActorPath) -> bool {
        self.system == other.system
            && other.segments.len() > self.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    /// True if this path lives strictly below `other` in the same system.
    pub fn is_descendant_of(&self, other: &ActorPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// True if this path is the direct parent of `other`.
    pub fn is_parent_of(&self, other: &ActorPath) -> bool {
        !other.is_root() && *self == other.parent()
    }

    /// True if this path is a direct child of `other`.
    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        other.is_parent_of(self)
    }
}

/// Checks a system name or path segment: non-empty, ASCII letters, digits and the
/// punctuation `-_.$+!*'(),` only.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || SAFE_PUNCTUATION.contains(&c))
}

/// Parses the string form `<system>://<segment>/<segment>/...`, validating every name.
impl FromStr for ActorPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((system, rest)) = s.split_once(SCHEME_SEPARATOR) else {
            return Err(Error::InvalidName(s.to_owned()));
        };
        let mut path = ActorPath::root(system)?;
        if !rest.is_empty() {
            for segment in rest.split('/') {
                path = path.child(segment)?;
            }
        }
        Ok(path)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.system,
            SCHEME_SEPARATOR,
            self.segments.join("/")
        )
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ActorPath {
        s.parse().unwrap()
    }

    #[test]
    fn parse_root() {
        let root = path("acme://");
        assert!(root.is_root());
        assert_eq!(root.system(), "acme");
        assert_eq!(root.level(), 0);
        assert_eq!(root.to_string(), "acme://");
    }

    #[test]
    fn parse_three_deep() {
        let path = path("acme://building/room/sensor");
        assert_eq!(path.segments(), &["building", "room", "sensor"]);
        assert_eq!(path.level(), 3);
        assert_eq!(path.key(), "sensor");
    }

    #[test]
    fn parse_rejects_invalid_forms() {
        assert!("no-scheme".parse::<ActorPath>().is_err());
        assert!("://child".parse::<ActorPath>().is_err());
        assert!("acme://a//b".parse::<ActorPath>().is_err());
        assert!("acme://a b".parse::<ActorPath>().is_err());
    }

    #[test]
    fn test_child_appends_segment() {
        let root = ActorPath::root("acme").unwrap();
        let child = root.child("building").unwrap();
        let grandchild = child.child("room").unwrap();
        assert_eq!(grandchild.segments(), &["building", "room"]);
        assert_eq!(grandchild.system(), "acme");
        assert_eq!(grandchild.to_string(), "acme://building/room");
    }

    #[test]
    fn test_invalid_names() {
        let root = ActorPath::root("acme").unwrap();
        for name in ["", " ", "a b", "tab\tname", "new\nline", "slash/", "é", "#hash", "q?"] {
            assert_eq!(
                root.child(name),
                Err(Error::InvalidName(name.to_owned())),
                "{:?} should be rejected",
                name
            );
        }
        assert!(ActorPath::root("").is_err());
        assert!(ActorPath::root("sys tem").is_err());
    }

    #[test]
    fn test_valid_names() {
        let root = ActorPath::root("acme").unwrap();
        for name in ["a", "A1", "with-dash", "under_score", "dot.ted", "$+!*'(),", "0"] {
            let child = root.child(name).unwrap();
            assert_eq!(child.key(), name);
        }
    }

    #[test]
    fn test_undefined_system() {
        let orphan = ActorPath {
            system: String::new(),
            segments: Vec::new(),
        };
        assert!(orphan.child("child").is_err());
    }

    #[test]
    fn test_parent() {
        let path = path("acme://building/room/sensor");
        assert_eq!(path.parent(), self::path("acme://building/room"));
        assert_eq!(path.parent().parent().parent(), self::path("acme://"));
        assert_eq!(self::path("acme://").parent(), self::path("acme://"));
    }

    #[test]
    fn test_if_parent_child() {
        let path = path("acme://building/room/sensor");
        let parent = path.parent();
        assert!(parent.is_parent_of(&path));
        assert!(path.is_child_of(&parent));
        assert!(!path.is_parent_of(&parent));
        let root = self::path("acme://");
        assert!(!root.is_parent_of(&root));
    }

    #[test]
    fn test_if_ancestor_descendant() {
        let path = path("acme://building/room/sensor");
        let root = self::path("acme://");
        assert!(root.is_ancestor_of(&path));
        assert!(path.is_descendant_of(&root));
        assert!(!path.is_descendant_of(&path));
        assert!(!path.is_ancestor_of(&path));
    }

    #[test]
    fn test_other_system_is_unrelated() {
        let ours = path("acme://building");
        let theirs = path("other://building/room");
        assert!(!ours.is_ancestor_of(&theirs));
        assert!(!theirs.is_child_of(&ours));
        assert_ne!(ours, path("other://building"));
    }

    #[test]
    fn test_top_level() {
        assert!(path("acme://building").is_top_level());
        assert!(!path("acme://building/room").is_top_level());
        assert!(!path("acme://").is_top_level());
    }
}
