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

//! The verification engine.
//!
//! Walks the log for a reference, resolves the policy that was in force at
//! each entry, and decides whether every update was authorized by an
//! adequate, unrevoked set of signatures. Signatures are gathered from four
//! vehicles (the entry commit, detached reference authorizations, the head
//! commit or tag itself, and forge merge approvals) and deduplicated
//! against one shared principal set per entry; a principal counts once no
//! matter how many vehicles carried it.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{
    attestations::{self, Attestations},
    cancel::CancellationToken,
    envelope,
    git::{self, Repository},
    hash::Hash,
    keys::KeyId,
    metadata::{self, GlobalRule, Principal, TargetsMetadata, ROOT_ROLE, TARGETS_ROLE},
    pattern,
    policy::{self, resolver, PolicyState, POLICY_REF},
    rsl::{self, Entry, LogEntry, ReferenceEntry, Rsl, Search},
};


#[derive(Debug, Error)]
pub enum Error {
    #[error("entry {0}: no authorized principal signed the log entry")]
    UnauthorizedSignature(Hash),

    #[error("entry {entry}: rule {rule} requires {want} signatures, have {have}")]
    InsufficientSignatures {
        entry: Hash,
        rule: String,
        have: usize,
        want: usize,
    },

    #[error("entry {entry}: update to {reference} is not a fast-forward")]
    ForcePushBlocked { entry: Hash, reference: String },

    #[error("{reference} is at {actual}, but replaying the log expects {expected}")]
    RefStateDoesNotMatchLog {
        reference: String,
        expected: Hash,
        actual: Hash,
    },

    #[error("entry {0} predates any applied policy")]
    NoPolicy(Hash),

    #[error("entry {entry}: {role} metadata version did not increase")]
    MetadataVersionRegression { entry: Hash, role: String },

    #[error("anchor entry {0} is not on the log")]
    AnchorNotFound(Hash),

    #[error(transparent)]
    Envelope(#[from] envelope::Error),

    #[error(transparent)]
    Metadata(#[from] metadata::Error),

    #[error(transparent)]
    Attestations(#[from] attestations::Error),

    #[error(transparent)]
    Policy(#[from] policy::Error),

    #[error(transparent)]
    Rsl(#[from] rsl::Error),

    #[error(transparent)]
    Git(#[from] git::Error),
}

pub struct Verifier<'a> {
    repo: &'a Repository,
    rsl: &'a Rsl<'a>,
}

impl<'a> Verifier<'a> {
    pub fn new(repo: &'a Repository, rsl: &'a Rsl<'a>) -> Self {
        Self { repo, rsl }
    }

    /// Verify the full history of `ref_name`, from its first entry to the
    /// tip, then check the live reference against the replayed log.
    pub fn verify_full(&self, cancel: &CancellationToken, ref_name: &str) -> Result<(), Error> {
        self.verify_history(cancel, ref_name, None)
    }

    /// Like [`Verifier::verify_full`], but trust `anchor` as known-good and
    /// verify only what came after it.
    pub fn verify_from(
        &self,
        cancel: &CancellationToken,
        ref_name: &str,
        anchor: Hash,
    ) -> Result<(), Error> {
        self.verify_history(cancel, ref_name, Some(anchor))
    }

    /// Advisory check of the latest non-skipped entry for `ref_name` only;
    /// history is not re-verified.
    pub fn verify_latest(&self, cancel: &CancellationToken, ref_name: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("Verifier::verify_latest", ref_name);
        let _guard = span.enter();

        let entry = self.rsl.latest_reference_entry(cancel, ref_name)?;
        let state = policy::applied_state_at(self.repo, self.rsl, cancel, entry.id).map_err(
            |e| match e {
                policy::Error::NoAppliedState => Error::NoPolicy(entry.id),
                e => Error::Policy(e),
            },
        )?;

        let previous = match self.rsl.find(
            cancel,
            &Search::new()
                .for_reference(ref_name)
                .unskipped()
                .before_id(entry.id),
        ) {
            Ok(Entry::Reference(previous)) => Some(previous.target),
            Ok(Entry::Annotation(_)) | Err(rsl::Error::NoMatchingEntry) => None,
            Err(e) => return Err(e.into()),
        };

        self.verify_entry(cancel, &state, &entry, previous)
    }

    fn verify_history(
        &self,
        cancel: &CancellationToken,
        ref_name: &str,
        anchor: Option<Hash>,
    ) -> Result<(), Error> {
        let span = tracing::debug_span!("Verifier::verify_history", ref_name);
        let _guard = span.enter();

        // Newest-first down to the anchor (inclusive) or the log origin,
        // then reversed into chronological order.
        let mut entries = Vec::new();
        let mut anchor_seen = false;
        for item in self.rsl.walk(cancel)? {
            let entry = item?;
            let id = entry.id();
            entries.push(entry);
            if Some(id) == anchor {
                anchor_seen = true;
                break;
            }
        }
        if let Some(anchor) = anchor {
            if !anchor_seen {
                return Err(Error::AnchorNotFound(anchor));
            }
        }
        entries.reverse();

        // Annotations always postdate what they skip, so one pass over the
        // collected range yields the complete skip set for it.
        let skipped: BTreeSet<Hash> = entries
            .iter()
            .filter_map(Entry::as_annotation)
            .filter(|a| a.skip)
            .flat_map(|a| a.entry_ids.iter().copied())
            .collect();

        let mut state: Option<PolicyState> = None;
        if let Some(anchor) = anchor {
            state = match policy::applied_state_at(self.repo, self.rsl, cancel, anchor) {
                Ok(state) => Some(state),
                Err(policy::Error::NoAppliedState) => None,
                Err(e) => return Err(e.into()),
            };
        }

        let mut previous_target: Option<Hash> = None;
        for entry in &entries {
            let Entry::Reference(reference) = entry else {
                continue;
            };
            let is_anchor = Some(reference.id) == anchor;

            if reference.ref_name == POLICY_REF && !skipped.contains(&reference.id) {
                if reference.ref_name == ref_name {
                    previous_target = Some(reference.target);
                }
                if is_anchor {
                    continue;
                }
                let new_state = PolicyState::load(self.repo, cancel, reference.target)?;

                // The promotion entry must be signed by a principal the
                // policy in force knows; at bootstrap that is the new state
                // itself.
                let check_state = state.as_ref().unwrap_or(&new_state);
                let known = check_state.all_principals()?;
                if self.object_signers(cancel, reference.id, &known)?.is_empty() {
                    return Err(Error::UnauthorizedSignature(reference.id));
                }

                match &state {
                    None => new_state.verify_signatures()?,
                    Some(previous) => {
                        self.verify_policy_transition(previous, &new_state, reference.id)?
                    },
                }
                state = Some(new_state);
                continue;
            }

            if reference.ref_name != ref_name {
                continue;
            }
            if is_anchor {
                previous_target = Some(reference.target);
                continue;
            }
            if skipped.contains(&reference.id) {
                // Bypassed entirely; the fast-forward base for the next
                // entry stays at the last non-skipped target.
                continue;
            }

            let state = state.as_ref().ok_or(Error::NoPolicy(reference.id))?;
            self.verify_entry(cancel, state, reference, previous_target)?;
            previous_target = Some(reference.target);
        }

        let expected = previous_target.ok_or(Error::Rsl(rsl::Error::NoMatchingEntry))?;
        let actual = self
            .repo
            .try_resolve_reference(cancel, ref_name)?
            .unwrap_or_else(Hash::zero);
        if expected != actual {
            return Err(Error::RefStateDoesNotMatchLog {
                reference: ref_name.to_owned(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check one reference entry against the policy in force at it.
    fn verify_entry(
        &self,
        cancel: &CancellationToken,
        state: &PolicyState,
        entry: &ReferenceEntry,
        previous_target: Option<Hash>,
    ) -> Result<(), Error> {
        let span = tracing::debug_span!("Verifier::verify_entry", entry = %entry.id);
        let _guard = span.enter();

        let known = state.all_principals()?;

        // The entry commit itself must be signed by some known principal.
        let mut signers = self.object_signers(cancel, entry.id, &known)?;
        if signers.is_empty() {
            return Err(Error::UnauthorizedSignature(entry.id));
        }

        // Remaining vehicles: detached authorization, the head itself,
        // forge approvals. All land in the one shared signer set.
        let from = previous_target.unwrap_or_else(Hash::zero);
        let attestations = Attestations::new(self.repo);
        let principal_refs: Vec<&Principal> = known.values().collect();

        if let Some(authorization) =
            self.find_authorization(cancel, &attestations, entry, from)?
        {
            signers.extend(authorization.signers(&principal_refs));
        }
        signers.extend(self.object_signers(cancel, entry.target, &known)?);
        if let Some(approval) = self.find_merge_approval(cancel, &attestations, entry, from)? {
            for approver in approval.live_approvers() {
                if known.contains_key(approver) {
                    signers.insert(approver.clone());
                }
            }
        }

        let term = pattern::git_term(&entry.ref_name);
        let resolved = resolver::resolve(state, &term)?;

        // Every matching delegation must reach its threshold.
        for set in &resolved.authorizing {
            let have = signers
                .iter()
                .filter(|id| set.principals.contains_key(*id))
                .count();
            if have < set.threshold {
                return Err(Error::InsufficientSignatures {
                    entry: entry.id,
                    rule: set.name.clone(),
                    have,
                    want: set.threshold,
                });
            }
        }

        let union = resolved.authorized_union();
        for rule in &resolved.global_rules {
            match rule {
                GlobalRule::Threshold {
                    name, threshold, ..
                } => {
                    let have = signers.iter().filter(|id| union.contains(*id)).count();
                    if have < *threshold {
                        return Err(Error::InsufficientSignatures {
                            entry: entry.id,
                            rule: name.clone(),
                            have,
                            want: *threshold,
                        });
                    }
                },
                GlobalRule::BlockForcePushes { .. } => {
                    if let Some(previous) = previous_target {
                        if !self.repo.is_ancestor(cancel, previous, entry.target)? {
                            return Err(Error::ForcePushBlocked {
                                entry: entry.id,
                                reference: entry.ref_name.clone(),
                            });
                        }
                    }
                },
            }
        }
        Ok(())
    }

    /// A detached authorization for this transition: recorded against the
    /// target itself, or against the tree a pre-approved merge produces.
    fn find_authorization(
        &self,
        cancel: &CancellationToken,
        attestations: &Attestations,
        entry: &ReferenceEntry,
        from: Hash,
    ) -> Result<Option<envelope::Envelope>, Error> {
        if let Some(envelope) =
            attestations.reference_authorization(cancel, &entry.ref_name, from, entry.target)?
        {
            return Ok(Some(envelope));
        }
        match self.repo.tree_of(cancel, entry.target) {
            Ok(tree) => Ok(attestations.reference_authorization(
                cancel,
                &entry.ref_name,
                from,
                tree,
            )?),
            Err(git::Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find_merge_approval(
        &self,
        cancel: &CancellationToken,
        attestations: &Attestations,
        entry: &ReferenceEntry,
        from: Hash,
    ) -> Result<Option<attestations::MergeApproval>, Error> {
        if let Some(approval) =
            attestations.merge_approval(cancel, &entry.ref_name, from, entry.target)?
        {
            return Ok(Some(approval));
        }
        match self.repo.tree_of(cancel, entry.target) {
            Ok(tree) => {
                Ok(attestations.merge_approval(cancel, &entry.ref_name, from, tree)?)
            },
            Err(git::Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// A changed root must advance its version and satisfy the previous
    /// root role; every envelope of the new state must meet its own
    /// thresholds; no policy file's version may fail to advance when its
    /// payload changed.
    fn verify_policy_transition(
        &self,
        previous: &PolicyState,
        new: &PolicyState,
        entry: Hash,
    ) -> Result<(), Error> {
        if new.root_envelope.payload() != previous.root_envelope.payload() {
            let previous_root = previous.root()?;
            let new_root = new.root()?;
            if new_root.version <= previous_root.version {
                return Err(Error::MetadataVersionRegression {
                    entry,
                    role: ROOT_ROLE.into(),
                });
            }
            let role = previous_root.expect_role(ROOT_ROLE)?;
            let principals = previous_root.role_principals(ROOT_ROLE)?;
            new.root_envelope
                .verify_with_threshold(&principals, role.threshold)?;
        }

        new.verify_signatures()?;

        check_version_advance(
            entry,
            TARGETS_ROLE,
            previous.targets_envelope.as_ref(),
            new.targets_envelope.as_ref(),
        )?;
        for (role, new_envelope) in &new.delegated_envelopes {
            check_version_advance(
                entry,
                role,
                previous.delegated_envelopes.get(role),
                Some(new_envelope),
            )?;
        }
        Ok(())
    }

    /// The known principals with a valid signature on the commit or tag
    /// `id`. Mismatches are silence, not errors.
    fn object_signers(
        &self,
        cancel: &CancellationToken,
        id: Hash,
        principals: &BTreeMap<KeyId, Principal>,
    ) -> Result<BTreeSet<KeyId>, Error> {
        let mut signers = BTreeSet::new();
        for (key_id, principal) in principals {
            match self.repo.verify_object_signature(cancel, id, principal) {
                Ok(()) => {
                    signers.insert(key_id.clone());
                },
                Err(e) if e.is_signature_mismatch() => {},
                Err(git::Error::NotFound(_)) => {},
                Err(e) => return Err(e.into()),
            }
        }
        Ok(signers)
    }
}

fn check_version_advance(
    entry: Hash,
    role: &str,
    previous: Option<&envelope::Envelope>,
    new: Option<&envelope::Envelope>,
) -> Result<(), Error> {
    let (Some(previous), Some(new)) = (previous, new) else {
        return Ok(());
    };
    if previous.payload() == new.payload() {
        return Ok(());
    }
    let previous = TargetsMetadata::from_payload(previous.payload())?;
    let new = TargetsMetadata::from_payload(new.payload())?;
    if new.version <= previous.version {
        return Err(Error::MetadataVersionRegression {
            entry,
            role: role.into(),
        });
    }
    Ok(())
}
