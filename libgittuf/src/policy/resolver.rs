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

//! Rule resolution: which authorizing sets protect a namespace term under
//! a given policy state, and which global rules apply to it.

use std::collections::{BTreeMap, BTreeSet};

use super::{Error, PolicyState};
use crate::{
    keys::KeyId,
    metadata::{GlobalRule, Principal, TargetsMetadata, TARGETS_ROLE},
};

/// One matching delegation, with its principals resolved.
#[derive(Clone, Debug)]
pub struct AuthorizingSet {
    pub name: String,
    pub principals: BTreeMap<KeyId, Principal>,
    pub threshold: usize,
}

/// Everything the policy has to say about one term.
#[derive(Clone, Debug, Default)]
pub struct ResolvedPolicy {
    /// Matching delegations, in evaluation order. Every one of them must be
    /// satisfied by an update to the term.
    pub authorizing: Vec<AuthorizingSet>,

    /// Global rules whose patterns match the term.
    pub global_rules: Vec<GlobalRule>,
}

impl ResolvedPolicy {
    /// The union of all principal IDs across the authorizing sets: the
    /// population `threshold` global rules count over.
    pub fn authorized_union(&self) -> BTreeSet<KeyId> {
        self.authorizing
            .iter()
            .flat_map(|set| set.principals.keys().cloned())
            .collect()
    }
}

/// Resolve `term` against the policy in `state`.
///
/// Delegations are walked in declared order from the top-level policy,
/// recursing into delegated policy files. A terminating matching delegation
/// halts the search at its own level, whether or not its threshold will be
/// met later.
pub fn resolve(state: &PolicyState, term: &str) -> Result<ResolvedPolicy, Error> {
    let mut resolved = ResolvedPolicy::default();
    let Some(targets) = state.targets()? else {
        return Ok(resolved);
    };

    let mut visited = BTreeSet::new();
    visited.insert(TARGETS_ROLE.to_owned());
    collect(state, &targets, term, &mut resolved.authorizing, &mut visited)?;

    resolved.global_rules = targets
        .global_rules
        .iter()
        .filter(|rule| rule.matches(term))
        .cloned()
        .collect();
    Ok(resolved)
}

fn collect(
    state: &PolicyState,
    targets: &TargetsMetadata,
    term: &str,
    out: &mut Vec<AuthorizingSet>,
    visited: &mut BTreeSet<String>,
) -> Result<(), Error> {
    for delegation in &targets.delegations {
        if !delegation.matches(term) {
            continue;
        }

        let mut principals = BTreeMap::new();
        for id in &delegation.principal_ids {
            let principal = targets.principals.get(id).ok_or_else(|| {
                crate::metadata::Error::UnknownPrincipal {
                    context: format!("delegation {}", delegation.name),
                    id: id.clone(),
                }
            })?;
            principals.insert(id.clone(), principal.clone());
        }
        out.push(AuthorizingSet {
            name: delegation.name.clone(),
            principals,
            threshold: delegation.threshold,
        });

        if let Some(role) = &delegation.role {
            // The visited set breaks delegation cycles.
            if visited.insert(role.clone()) {
                let child = state.targets_for(role)?;
                collect(state, &child, term, out, visited)?;
            }
        }

        if delegation.terminating {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        envelope::Envelope,
        keys::SecretKey,
        metadata::{Delegation, TargetsMetadata, PAYLOAD_TYPE},
        pattern::Pattern,
    };

    lazy_static! {
        static ref K1: SecretKey = SecretKey::from_seed(&[51; 32]);
        static ref K2: SecretKey = SecretKey::from_seed(&[52; 32]);
    }

    fn delegation(name: &str, pattern: &str, key: &SecretKey) -> Delegation {
        Delegation {
            name: name.into(),
            paths: vec![Pattern::new(pattern).unwrap()],
            principal_ids: [key.public().key_id()].into_iter().collect(),
            threshold: 1,
            terminating: false,
            role: None,
        }
    }

    fn state_with(targets: TargetsMetadata, delegated: Vec<(&str, TargetsMetadata)>) -> PolicyState {
        // The resolver only reads policy files; an unsigned root is enough.
        let root = crate::metadata::RootMetadata::new(Utc::now() + Duration::days(365));
        PolicyState {
            root_envelope: Envelope::from_payload(PAYLOAD_TYPE, &root).unwrap(),
            targets_envelope: Some(Envelope::from_payload(PAYLOAD_TYPE, &targets).unwrap()),
            delegated_envelopes: delegated
                .into_iter()
                .map(|(role, t)| {
                    (
                        role.to_owned(),
                        Envelope::from_payload(PAYLOAD_TYPE, &t).unwrap(),
                    )
                })
                .collect(),
        }
    }

    fn targets() -> TargetsMetadata {
        let mut targets = TargetsMetadata::new(Utc::now() + Duration::days(365));
        targets.add_principal(crate::metadata::Principal::from_public_key(
            "k1",
            K1.public(),
        ));
        targets.add_principal(crate::metadata::Principal::from_public_key(
            "k2",
            K2.public(),
        ));
        targets
    }

    #[test]
    fn matching_in_declared_order() {
        let mut top = targets();
        top.add_delegation(delegation("first", "git:refs/heads/*", &K1))
            .unwrap();
        top.add_delegation(delegation("second", "git:refs/heads/main", &K2))
            .unwrap();
        top.add_delegation(delegation("other", "git:refs/tags/*", &K2))
            .unwrap();

        let resolved = resolve(&state_with(top, vec![]), "git:refs/heads/main").unwrap();
        let names: Vec<_> = resolved.authorizing.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn terminating_delegation_halts_the_search() {
        let mut top = targets();
        let mut gate = delegation("gate", "git:refs/heads/main", &K1);
        gate.terminating = true;
        top.add_delegation(gate).unwrap();
        top.add_delegation(delegation("unreachable", "git:refs/heads/main", &K2))
            .unwrap();

        let resolved = resolve(&state_with(top, vec![]), "git:refs/heads/main").unwrap();
        let names: Vec<_> = resolved.authorizing.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["gate"]);
    }

    #[test]
    fn recurses_into_delegated_roles() {
        let mut top = targets();
        let mut handoff = delegation("handoff", "git:refs/heads/**", &K1);
        handoff.role = Some("team".into());
        top.add_delegation(handoff).unwrap();

        let mut team = targets();
        team.add_delegation(delegation("team-main", "git:refs/heads/main", &K2))
            .unwrap();

        let state = state_with(top, vec![("team", team)]);
        let resolved = resolve(&state, "git:refs/heads/main").unwrap();
        let names: Vec<_> = resolved.authorizing.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["handoff", "team-main"]);

        // The union covers both files' principals.
        assert_eq!(resolved.authorized_union().len(), 2);
    }

    #[test]
    fn non_matching_terms_resolve_to_nothing() {
        let mut top = targets();
        top.add_delegation(delegation("main-only", "git:refs/heads/main", &K1))
            .unwrap();

        let resolved = resolve(&state_with(top, vec![]), "git:refs/tags/v1").unwrap();
        assert!(resolved.authorizing.is_empty());
        assert!(resolved.global_rules.is_empty());
    }

    #[test]
    fn global_rules_filter_by_pattern() {
        let mut top = targets();
        top.add_global_rule(GlobalRule::Threshold {
            name: "two-on-branches".into(),
            paths: vec![Pattern::new("git:refs/heads/*").unwrap()],
            threshold: 2,
        })
        .unwrap();
        top.add_global_rule(GlobalRule::BlockForcePushes {
            name: "tags-frozen".into(),
            paths: vec![Pattern::new("git:refs/tags/*").unwrap()],
        })
        .unwrap();

        let state = state_with(top, vec![]);
        let on_branch = resolve(&state, "git:refs/heads/main").unwrap();
        assert_eq!(on_branch.global_rules.len(), 1);
        assert_eq!(on_branch.global_rules[0].name(), "two-on-branches");

        let on_tag = resolve(&state, "git:refs/tags/v1").unwrap();
        assert_eq!(on_tag.global_rules.len(), 1);
        assert_eq!(on_tag.global_rules[0].name(), "tags-frozen");
    }
}
