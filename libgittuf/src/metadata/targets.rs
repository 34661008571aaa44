// This file is part of gittuf-link
// <https://github.com/gittuf-link/gittuf-link>
//
// Copyright (C) 2025-2026 The gittuf-link Team <dev@gittuf-link.org>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License version 3 or
// later as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Error, Principal, SCHEMA_VERSION};
use crate::{keys::KeyId, pattern::Pattern};

/// A policy file.
///
/// The top-level policy is the reserved `targets` role; further policy
/// files are introduced transitively by delegations that name a role.
/// Delegation order is significant and part of the signed payload:
/// matching delegations are tried in declared order, and a terminating
/// match halts the search whether or not it authorizes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetsMetadata {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    pub version: NonZeroU64,

    pub expires: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub principals: BTreeMap<KeyId, Principal>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegations: Vec<Delegation>,

    /// Repository-wide constraints, independent of delegations. Only
    /// meaningful on the top-level policy file.
    #[serde(rename = "globalRules", default, skip_serializing_if = "Vec::is_empty")]
    pub global_rules: Vec<GlobalRule>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub name: String,

    /// Protected-namespace patterns, e.g. `git:refs/heads/*`.
    pub paths: Vec<Pattern>,

    #[serde(rename = "principalIDs")]
    pub principal_ids: BTreeSet<KeyId>,

    pub threshold: usize,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminating: bool,

    /// Hand the matched namespace on to another policy file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Delegation {
    pub fn matches(&self, term: &str) -> bool {
        self.paths.iter().any(|p| p.matches(term))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GlobalRule {
    /// Every update to a matched namespace must carry at least `threshold`
    /// authorized signatures, across any applicable delegation.
    Threshold {
        name: String,
        paths: Vec<Pattern>,
        threshold: usize,
    },

    /// Every update to a matched namespace must be a fast-forward over the
    /// previous logged target for the same reference.
    BlockForcePushes { name: String, paths: Vec<Pattern> },
}

impl GlobalRule {
    pub fn name(&self) -> &str {
        match self {
            Self::Threshold { name, .. } | Self::BlockForcePushes { name, .. } => name,
        }
    }

    pub fn matches(&self, term: &str) -> bool {
        let paths = match self {
            Self::Threshold { paths, .. } | Self::BlockForcePushes { paths, .. } => paths,
        };
        paths.iter().any(|p| p.matches(term))
    }
}

impl TargetsMetadata {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            version: NonZeroU64::MIN,
            expires,
            principals: BTreeMap::new(),
            delegations: Vec::new(),
            global_rules: Vec::new(),
        }
    }

    /// Parse from payload bytes, gating on the schema version.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        let targets: Self = serde_json::from_slice(payload)?;
        if targets.schema_version != SCHEMA_VERSION {
            return Err(Error::UnknownSchemaVersion(targets.schema_version));
        }
        targets.validate()?;
        Ok(targets)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = BTreeSet::new();
        for delegation in &self.delegations {
            if !seen.insert(delegation.name.as_str()) {
                return Err(Error::DuplicateName(delegation.name.clone()));
            }
            let context = format!("delegation {}", delegation.name);
            for id in &delegation.principal_ids {
                if !self.principals.contains_key(id) {
                    return Err(Error::UnknownPrincipal {
                        context,
                        id: id.clone(),
                    });
                }
            }
            if delegation.threshold == 0 || delegation.threshold > delegation.principal_ids.len() {
                return Err(Error::InvalidThreshold { context });
            }
        }

        let mut seen = BTreeSet::new();
        for rule in &self.global_rules {
            if !seen.insert(rule.name()) {
                return Err(Error::DuplicateName(rule.name().to_owned()));
            }
            if let GlobalRule::Threshold { name, threshold, .. } = rule {
                if *threshold == 0 {
                    return Err(Error::InvalidThreshold {
                        context: format!("global rule {}", name),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn add_principal(&mut self, principal: Principal) {
        self.principals.insert(principal.id(), principal);
    }

    pub fn delegation(&self, name: &str) -> Option<&Delegation> {
        self.delegations.iter().find(|d| d.name == name)
    }

    /// Append a delegation; order of addition is the evaluation order.
    pub fn add_delegation(&mut self, delegation: Delegation) -> Result<(), Error> {
        if self.delegation(&delegation.name).is_some() {
            return Err(Error::DuplicateName(delegation.name));
        }
        self.delegations.push(delegation);
        Ok(())
    }

    pub fn remove_delegation(&mut self, name: &str) -> Result<Delegation, Error> {
        let at = self
            .delegations
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| Error::MissingDelegation(name.into()))?;
        Ok(self.delegations.remove(at))
    }

    /// Rewrite the delegation order in one update. `order` must name every
    /// existing delegation exactly once.
    pub fn reorder_delegations(&mut self, order: &[&str]) -> Result<(), Error> {
        let mut remaining: BTreeMap<&str, usize> = self
            .delegations
            .iter()
            .enumerate()
            .map(|(at, d)| (d.name.as_str(), at))
            .collect();

        let mut reordered = Vec::with_capacity(self.delegations.len());
        for name in order {
            let at = remaining
                .remove(name)
                .ok_or_else(|| Error::MissingDelegation((*name).into()))?;
            reordered.push(self.delegations[at].clone());
        }
        if let Some((name, _)) = remaining.into_iter().next() {
            return Err(Error::MissingDelegation(name.into()));
        }

        self.delegations = reordered;
        Ok(())
    }

    pub fn add_global_rule(&mut self, rule: GlobalRule) -> Result<(), Error> {
        if self.global_rules.iter().any(|r| r.name() == rule.name()) {
            return Err(Error::DuplicateName(rule.name().to_owned()));
        }
        self.global_rules.push(rule);
        Ok(())
    }

    pub fn remove_global_rule(&mut self, name: &str) -> Result<GlobalRule, Error> {
        let at = self
            .global_rules
            .iter()
            .position(|r| r.name() == name)
            .ok_or_else(|| Error::MissingGlobalRule(name.into()))?;
        Ok(self.global_rules.remove(at))
    }

    pub fn bump_version(&mut self) {
        self.version = self
            .version
            .checked_add(1)
            .expect("version counter overflow");
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::keys::SecretKey;

    lazy_static! {
        static ref K2: SecretKey = SecretKey::from_seed(&[13; 32]);
    }

    fn protect(name: &str, pattern: &str) -> Delegation {
        Delegation {
            name: name.into(),
            paths: vec![Pattern::new(pattern).unwrap()],
            principal_ids: [K2.public().key_id()].into_iter().collect(),
            threshold: 1,
            terminating: false,
            role: None,
        }
    }

    fn targets() -> TargetsMetadata {
        let mut targets = TargetsMetadata::new(Utc::now() + Duration::days(365));
        targets.add_principal(Principal::from_public_key("k2", K2.public()));
        targets
    }

    #[test]
    fn delegation_order_is_addition_order() {
        let mut targets = targets();
        targets.add_delegation(protect("a", "git:refs/heads/a")).unwrap();
        targets.add_delegation(protect("b", "git:refs/heads/b")).unwrap();
        targets.add_delegation(protect("c", "git:refs/heads/c")).unwrap();

        let names: Vec<_> = targets.delegations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        targets.reorder_delegations(&["c", "a", "b"]).unwrap();
        let names: Vec<_> = targets.delegations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn reorder_must_cover_every_delegation() {
        let mut targets = targets();
        targets.add_delegation(protect("a", "git:refs/heads/a")).unwrap();
        targets.add_delegation(protect("b", "git:refs/heads/b")).unwrap();

        assert_matches!(
            targets.reorder_delegations(&["a"]),
            Err(Error::MissingDelegation(_))
        );
        assert_matches!(
            targets.reorder_delegations(&["a", "b", "ghost"]),
            Err(Error::MissingDelegation(_))
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut targets = targets();
        targets.add_delegation(protect("a", "git:refs/heads/a")).unwrap();
        assert_matches!(
            targets.add_delegation(protect("a", "git:refs/heads/b")),
            Err(Error::DuplicateName(_))
        );
    }

    #[test]
    fn unknown_delegation_principals_rejected() {
        let mut targets = targets();
        let mut delegation = protect("a", "git:refs/heads/a");
        delegation.principal_ids.insert(KeyId::from("stranger"));
        targets.add_delegation(delegation).unwrap();
        assert_matches!(targets.validate(), Err(Error::UnknownPrincipal { .. }));
    }

    #[test]
    fn global_rule_roundtrip() {
        let mut targets = targets();
        targets
            .add_global_rule(GlobalRule::Threshold {
                name: "require-two".into(),
                paths: vec![Pattern::new("git:refs/heads/*").unwrap()],
                threshold: 2,
            })
            .unwrap();
        targets
            .add_global_rule(GlobalRule::BlockForcePushes {
                name: "no-rewrites".into(),
                paths: vec![Pattern::new("git:refs/heads/main").unwrap()],
            })
            .unwrap();

        let payload = serde_json::to_vec(&targets).unwrap();
        assert_eq!(TargetsMetadata::from_payload(&payload).unwrap(), targets);

        targets.remove_global_rule("require-two").unwrap();
        assert_matches!(
            targets.remove_global_rule("require-two"),
            Err(Error::MissingGlobalRule(_))
        );
    }
}
