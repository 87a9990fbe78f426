//! Scope algebra - pure set operations over policy-scoped access levels.
//!
//! A [`ScopeSet`] holds at most one [`AccessLevel`] per policy key. All
//! resolution paths (direct grants, group grants, visa grants) funnel into
//! this module so precedence and narrowing behave identically everywhere.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered access tier. The enum order is the precedence order: when two
/// grants target the same policy, the higher level wins.
///
/// `Deny` is a recorded level, not an absence: a deny-level grant still
/// beats having no grant at all for that policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Deny,
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Deny => "deny",
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deny" => Some(AccessLevel::Deny),
            "read" => Some(AccessLevel::Read),
            "write" => Some(AccessLevel::Write),
            "admin" => Some(AccessLevel::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved (policy, level) pair as attached to a credential.
///
/// Value equality: two scopes are the same scope when they name the same
/// policy key at the same level, regardless of which grants produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub policy: String,
    pub level: AccessLevel,
}

impl Scope {
    pub fn new(policy: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            policy: policy.into(),
            level,
        }
    }

    /// Claims-payload form: `<policy-key>:<level>`.
    pub fn to_scope_string(&self) -> String {
        format!("{}:{}", self.policy, self.level)
    }

    /// Parse the claims-payload form back into a scope.
    pub fn parse(s: &str) -> Option<Self> {
        let (policy, level) = s.rsplit_once(':')?;
        if policy.is_empty() {
            return None;
        }
        Some(Scope {
            policy: policy.to_string(),
            level: AccessLevel::parse(level)?,
        })
    }
}

/// Policy key used for the sentinel no-access scope.
pub const DEFAULT_SCOPE_POLICY: &str = "default";

/// An effective scope set: one access level per policy key.
///
/// Backed by a `BTreeMap` so iteration (and therefore claims output and
/// log lines) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSet(BTreeMap<String, AccessLevel>);

impl ScopeSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The sentinel no-access set substituted when a resolution legitimately
    /// finds zero grants. Callers must never see an empty set and read it as
    /// "no constraints".
    pub fn default_scope() -> Self {
        let mut set = BTreeMap::new();
        set.insert(DEFAULT_SCOPE_POLICY.to_string(), AccessLevel::Deny);
        Self(set)
    }

    /// True when this is exactly the sentinel produced by [`default_scope`].
    ///
    /// [`default_scope`]: ScopeSet::default_scope
    pub fn is_default(&self) -> bool {
        self.0.len() == 1
            && self.0.get(DEFAULT_SCOPE_POLICY) == Some(&AccessLevel::Deny)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn level_for(&self, policy: &str) -> Option<AccessLevel> {
        self.0.get(policy).copied()
    }

    /// Insert a scope, keeping the higher level if the policy is already
    /// present.
    pub fn insert_max(&mut self, scope: Scope) {
        self.0
            .entry(scope.policy)
            .and_modify(|existing| {
                if scope.level > *existing {
                    *existing = scope.level;
                }
            })
            .or_insert(scope.level);
    }

    /// Union of two pre-resolved sets; on policy collision the higher level
    /// is kept.
    pub fn union(&self, other: &ScopeSet) -> ScopeSet {
        let mut merged = self.clone();
        for (policy, level) in &other.0 {
            merged.insert_max(Scope::new(policy.clone(), *level));
        }
        merged
    }

    /// Narrow a holder's *current* rights by the scopes recorded at
    /// issuance time: for each policy present in both sets, the lesser of
    /// the two levels. Policies present in only one set are dropped, so a
    /// grant broadened after issuance never widens an already-issued
    /// credential, and an issued credential never exceeds current rights.
    pub fn narrow(&self, issued: &ScopeSet) -> ScopeSet {
        let mut out = BTreeMap::new();
        for (policy, issued_level) in &issued.0 {
            if let Some(current_level) = self.0.get(policy) {
                out.insert(policy.clone(), (*issued_level).min(*current_level));
            }
        }
        ScopeSet(out)
    }

    /// Requested scopes this set cannot satisfy: every entry of `want` that
    /// is absent here or held at a lower level. Empty result means the
    /// request is fully satisfiable.
    pub fn missing(&self, want: &ScopeSet) -> ScopeSet {
        let mut out = BTreeMap::new();
        for (policy, wanted) in &want.0 {
            match self.0.get(policy) {
                Some(held) if held >= wanted => {}
                _ => {
                    out.insert(policy.clone(), *wanted);
                }
            }
        }
        ScopeSet(out)
    }

    /// True when every entry of this set appears in `other` at the same or
    /// a higher level.
    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        other.missing(self).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0
            .iter()
            .map(|(policy, level)| Scope::new(policy.clone(), *level))
    }

    /// Claims-payload form of the whole set.
    pub fn to_scope_strings(&self) -> Vec<String> {
        self.iter().map(|s| s.to_scope_string()).collect()
    }

    /// Rebuild a set from claims-payload strings; malformed entries are
    /// rejected rather than skipped.
    pub fn from_scope_strings<'a, I>(strings: I) -> Option<ScopeSet>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = ScopeSet::new();
        for s in strings {
            set.insert_max(Scope::parse(s)?);
        }
        Some(set)
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = Scope>>(iter: T) -> Self {
        let mut set = ScopeSet::new();
        for scope in iter {
            set.insert_max(scope);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(&str, AccessLevel)]) -> ScopeSet {
        entries
            .iter()
            .map(|(p, l)| Scope::new(*p, *l))
            .collect()
    }

    #[test]
    fn test_level_ordering_is_precedence() {
        assert!(AccessLevel::Deny < AccessLevel::Read);
        assert!(AccessLevel::Read < AccessLevel::Write);
        assert!(AccessLevel::Write < AccessLevel::Admin);
    }

    #[test]
    fn test_union_keeps_higher_level_on_collision() {
        let a = set(&[("dataset-a", AccessLevel::Read), ("dataset-b", AccessLevel::Admin)]);
        let b = set(&[("dataset-a", AccessLevel::Write)]);

        let merged = a.union(&b);
        assert_eq!(merged.level_for("dataset-a"), Some(AccessLevel::Write));
        assert_eq!(merged.level_for("dataset-b"), Some(AccessLevel::Admin));
    }

    #[test]
    fn test_narrow_takes_the_lesser_side() {
        let current = set(&[("dataset-a", AccessLevel::Read), ("dataset-b", AccessLevel::Admin)]);
        let issued = set(&[("dataset-a", AccessLevel::Write), ("dataset-b", AccessLevel::Read)]);

        let narrowed = current.narrow(&issued);
        // Downgraded since issuance: current read caps the issued write.
        assert_eq!(narrowed.level_for("dataset-a"), Some(AccessLevel::Read));
        // Issued read caps the broader current admin.
        assert_eq!(narrowed.level_for("dataset-b"), Some(AccessLevel::Read));
    }

    #[test]
    fn test_narrow_drops_policies_missing_from_either_side() {
        let current = set(&[("dataset-a", AccessLevel::Write)]);
        let issued = set(&[("dataset-b", AccessLevel::Read)]);

        assert!(current.narrow(&issued).is_empty());
    }

    #[test]
    fn test_narrow_never_escalates() {
        let current = set(&[("p", AccessLevel::Write)]);
        let issued = set(&[("p", AccessLevel::Read)]);

        let narrowed = current.narrow(&issued);
        let out = narrowed.level_for("p").unwrap();
        assert!(out <= AccessLevel::Write);
        assert!(out <= AccessLevel::Read);
    }

    #[test]
    fn test_missing_reports_absent_and_underheld_policies() {
        let have = set(&[("dataset-a", AccessLevel::Read)]);
        let want = set(&[("dataset-a", AccessLevel::Write), ("dataset-b", AccessLevel::Read)]);

        let missing = have.missing(&want);
        assert_eq!(missing.level_for("dataset-a"), Some(AccessLevel::Write));
        assert_eq!(missing.level_for("dataset-b"), Some(AccessLevel::Read));
    }

    #[test]
    fn test_missing_is_empty_when_satisfiable() {
        let have = set(&[("dataset-a", AccessLevel::Admin)]);
        let want = set(&[("dataset-a", AccessLevel::Read)]);

        assert!(have.missing(&want).is_empty());
    }

    #[test]
    fn test_default_scope_is_not_empty() {
        let sentinel = ScopeSet::default_scope();
        assert!(!sentinel.is_empty());
        assert!(sentinel.is_default());
        assert_eq!(sentinel.level_for(DEFAULT_SCOPE_POLICY), Some(AccessLevel::Deny));
    }

    #[test]
    fn test_scope_string_round_trip() {
        let scope = Scope::new("dataset-a", AccessLevel::Write);
        assert_eq!(scope.to_scope_string(), "dataset-a:write");
        assert_eq!(Scope::parse("dataset-a:write"), Some(scope));
        assert_eq!(Scope::parse("dataset-a"), None);
        assert_eq!(Scope::parse("dataset-a:root"), None);
    }

    #[test]
    fn test_subset_respects_levels() {
        let small = set(&[("p", AccessLevel::Read)]);
        let big = set(&[("p", AccessLevel::Write), ("q", AccessLevel::Read)]);

        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
    }
}
