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

use std::collections::BTreeSet;

use super::{
    envelope_for, Error, PolicyState, POLICY_REF, POLICY_STAGING_REF,
};
use crate::{
    cancel::CancellationToken,
    dev,
    git::Repository,
    hash::Hash,
    keys::{KeyId, Signer},
    metadata::{
        Delegation, GlobalRule, Principal, RootMetadata, TargetsMetadata, ROOT_ROLE, TARGETS_ROLE,
    },
    rsl::Rsl,
};

/// Mutation surface over the staged policy.
///
/// Every mutation loads the currently staged root, derives the signer's key
/// ID, and requires that key in the role authorized to change what is being
/// changed: the root role for root mutations, the delegating authority for
/// policy-file mutations. Unauthorized mutations fail before anything is
/// written. A mutation that leaves the payload unchanged stages nothing.
pub struct PolicyStore<'a> {
    repo: &'a Repository,
}

impl<'a> PolicyStore<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    fn staging_tip(&self, cancel: &CancellationToken) -> Result<Option<Hash>, Error> {
        Ok(self.repo.try_resolve_reference(cancel, POLICY_STAGING_REF)?)
    }

    fn applied_tip(&self, cancel: &CancellationToken) -> Result<Option<Hash>, Error> {
        Ok(self.repo.try_resolve_reference(cancel, POLICY_REF)?)
    }

    /// The staged state, as mutations will see it.
    pub fn staged(&self, cancel: &CancellationToken) -> Result<PolicyState, Error> {
        let tip = self.staging_tip(cancel)?.ok_or(Error::NotInitialized)?;
        PolicyState::load(self.repo, cancel, tip)
    }

    /// The applied state, as verification sees it today.
    pub fn applied(&self, cancel: &CancellationToken) -> Result<PolicyState, Error> {
        let tip = self.applied_tip(cancel)?.ok_or(Error::NoAppliedState)?;
        PolicyState::load(self.repo, cancel, tip)
    }

    // Initialization

    /// Stage the first root of trust. The signer must hold one of the new
    /// root role's keys: trust starts self-referential.
    pub fn init_root(
        &self,
        cancel: &CancellationToken,
        root: RootMetadata,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        if self.staging_tip(cancel)?.is_some() {
            return Err(Error::CannotReinitialize(ROOT_ROLE.into()));
        }
        root.validate()?;
        let root_role = root.expect_role(ROOT_ROLE)?;
        if !root_role.principal_ids.contains(&signer.key_id()) {
            return Err(Error::UnauthorizedKey(signer.key_id()));
        }

        let mut envelope = envelope_for(&root)?;
        envelope.sign(signer)?;
        let state = PolicyState {
            root_envelope: envelope,
            targets_envelope: None,
            delegated_envelopes: Default::default(),
        };
        self.stage(cancel, &state, signer, "initialize root of trust")
    }

    /// Stage the top-level policy file.
    pub fn init_targets(
        &self,
        cancel: &CancellationToken,
        targets: TargetsMetadata,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        let mut state = self.staged(cancel)?;
        if state.targets_envelope.is_some() {
            return Err(Error::CannotReinitialize(TARGETS_ROLE.into()));
        }
        targets.validate()?;
        self.authorize(&state, TARGETS_ROLE, signer)?;

        let mut envelope = envelope_for(&targets)?;
        envelope.sign(signer)?;
        state.targets_envelope = Some(envelope);
        self.stage(cancel, &state, signer, "initialize policy")
    }

    /// Stage a delegated policy file. `role` must already be named by a
    /// delegation, and must not collide with the reserved names.
    pub fn init_delegated_targets(
        &self,
        cancel: &CancellationToken,
        role: &str,
        targets: TargetsMetadata,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        if role == ROOT_ROLE || role == TARGETS_ROLE {
            return Err(Error::InvalidPolicyName(role.into()));
        }
        let mut state = self.staged(cancel)?;
        if state.has_role(role) {
            return Err(Error::CannotReinitialize(role.into()));
        }
        targets.validate()?;
        self.authorize(&state, role, signer)?;

        let mut envelope = envelope_for(&targets)?;
        envelope.sign(signer)?;
        state.delegated_envelopes.insert(role.to_owned(), envelope);
        self.stage(cancel, &state, signer, "initialize delegated policy")
    }

    // Root mutations

    pub fn add_root_principal(
        &self,
        cancel: &CancellationToken,
        principal: Principal,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_root(cancel, signer, "add principal", |root| {
            root.add_principal(principal);
            Ok(())
        })
    }

    pub fn remove_root_principal(
        &self,
        cancel: &CancellationToken,
        id: &KeyId,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_root(cancel, signer, "remove principal", |root| {
            Ok(root.remove_principal(id)?)
        })
    }

    /// Introduce `principal` (if new) and authorize it for `role`.
    pub fn add_role_principal(
        &self,
        cancel: &CancellationToken,
        role: &str,
        principal: Principal,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_root(cancel, signer, "authorize principal for role", |root| {
            let id = principal.id();
            root.add_principal(principal);
            Ok(root.add_role_principal(role, id)?)
        })
    }

    pub fn remove_role_principal(
        &self,
        cancel: &CancellationToken,
        role: &str,
        id: &KeyId,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_root(cancel, signer, "deauthorize principal for role", |root| {
            Ok(root.remove_role_principal(role, id)?)
        })
    }

    pub fn set_role_threshold(
        &self,
        cancel: &CancellationToken,
        role: &str,
        threshold: usize,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_root(cancel, signer, "set role threshold", |root| {
            Ok(root.set_role_threshold(role, threshold)?)
        })
    }

    // Policy-file mutations

    /// Introduce a principal into the policy file `role`, so delegations
    /// there can reference it.
    pub fn add_principal(
        &self,
        cancel: &CancellationToken,
        role: &str,
        principal: Principal,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_targets(cancel, role, signer, "add principal", |targets| {
            targets.add_principal(principal);
            Ok(())
        })
    }

    pub fn add_delegation(
        &self,
        cancel: &CancellationToken,
        role: &str,
        delegation: Delegation,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        if let Some(delegated) = &delegation.role {
            if delegated == ROOT_ROLE || delegated == TARGETS_ROLE {
                return Err(Error::InvalidPolicyName(delegated.clone()));
            }
        }
        self.mutate_targets(cancel, role, signer, "add delegation", |targets| {
            Ok(targets.add_delegation(delegation)?)
        })
    }

    /// Replace the delegation with the same name, keeping its position.
    pub fn update_delegation(
        &self,
        cancel: &CancellationToken,
        role: &str,
        delegation: Delegation,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_targets(cancel, role, signer, "update delegation", |targets| {
            let at = targets
                .delegations
                .iter()
                .position(|d| d.name == delegation.name)
                .ok_or_else(|| {
                    crate::metadata::Error::MissingDelegation(delegation.name.clone())
                })?;
            targets.delegations[at] = delegation;
            Ok(())
        })
    }

    pub fn remove_delegation(
        &self,
        cancel: &CancellationToken,
        role: &str,
        name: &str,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_targets(cancel, role, signer, "remove delegation", |targets| {
            targets.remove_delegation(name)?;
            Ok(())
        })
    }

    /// Delegation order is part of the signed payload; reordering is its
    /// own mutation, rewriting the list in one update.
    pub fn reorder_delegations(
        &self,
        cancel: &CancellationToken,
        role: &str,
        order: &[&str],
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_targets(cancel, role, signer, "reorder delegations", |targets| {
            Ok(targets.reorder_delegations(order)?)
        })
    }

    pub fn add_global_rule(
        &self,
        cancel: &CancellationToken,
        rule: GlobalRule,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_targets(cancel, TARGETS_ROLE, signer, "add global rule", |targets| {
            Ok(targets.add_global_rule(rule)?)
        })
    }

    pub fn remove_global_rule(
        &self,
        cancel: &CancellationToken,
        name: &str,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        self.mutate_targets(
            cancel,
            TARGETS_ROLE,
            signer,
            "remove global rule",
            |targets| {
                targets.remove_global_rule(name)?;
                Ok(())
            },
        )
    }

    // Detached signing

    /// Append a signature to the staged root envelope. Payload and version
    /// are untouched; this is how further key holders co-sign towards the
    /// root threshold.
    pub fn sign_root(&self, cancel: &CancellationToken, signer: &dyn Signer) -> Result<(), Error> {
        let mut state = self.staged(cancel)?;
        let root = state.root()?;
        if !root
            .expect_role(ROOT_ROLE)?
            .principal_ids
            .contains(&signer.key_id())
        {
            return Err(Error::UnauthorizedKey(signer.key_id()));
        }
        state.root_envelope.sign(signer)?;
        self.stage(cancel, &state, signer, "co-sign root")
    }

    /// Append a signature to a staged policy-file envelope.
    pub fn sign_targets(
        &self,
        cancel: &CancellationToken,
        role: &str,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        let mut state = self.staged(cancel)?;
        self.authorize(&state, role, signer)?;

        match role {
            TARGETS_ROLE => {
                let envelope = state
                    .targets_envelope
                    .as_mut()
                    .ok_or_else(|| Error::MetadataNotFound(role.into()))?;
                envelope.sign(signer)?;
            },
            delegated => {
                let envelope = state
                    .delegated_envelopes
                    .get_mut(delegated)
                    .ok_or_else(|| Error::MetadataNotFound(role.into()))?;
                envelope.sign(signer)?;
            },
        }
        self.stage(cancel, &state, signer, "co-sign policy")
    }

    // Promotion

    /// Promote staging to applied.
    ///
    /// The staged state must meet every signing threshold. The applied
    /// reference moves to the staging commit, and a reference entry naming
    /// the applied reference is recorded in the log; that entry is the
    /// promotion. Applying an already-applied state is a no-op.
    pub fn apply(
        &self,
        cancel: &CancellationToken,
        rsl: &Rsl,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        let span = tracing::debug_span!("PolicyStore::apply");
        let _guard = span.enter();

        let staged_tip = self.staging_tip(cancel)?.ok_or(Error::NotInitialized)?;
        let applied_tip = self.applied_tip(cancel)?;
        if applied_tip == Some(staged_tip) {
            tracing::debug!("staging already applied");
            return Ok(());
        }

        let staged = PolicyState::load(self.repo, cancel, staged_tip)?;
        staged.verify_signatures()?;

        self.repo
            .update_reference(cancel, POLICY_REF, applied_tip, staged_tip)?;
        rsl.append_reference_entry(cancel, POLICY_REF, staged_tip, signer)?;
        Ok(())
    }

    /// Throw away staged-but-unapplied changes, resetting staging to the
    /// applied state. Destructive, so gated behind `GITTUF_DEV`.
    pub fn discard_staging(&self, cancel: &CancellationToken) -> Result<(), Error> {
        dev::require_dev_mode()?;

        let staging_tip = self.staging_tip(cancel)?.ok_or(Error::NotInitialized)?;
        let applied_tip = self.applied_tip(cancel)?.ok_or(Error::NoAppliedState)?;
        if staging_tip != applied_tip {
            self.repo.update_reference(
                cancel,
                POLICY_STAGING_REF,
                Some(staging_tip),
                applied_tip,
            )?;
        }
        Ok(())
    }

    /// Clone-time pinning: the applied root role must be held by exactly
    /// the expected principals.
    pub fn check_expected_root_principals(
        &self,
        cancel: &CancellationToken,
        expected: &BTreeSet<KeyId>,
    ) -> Result<(), Error> {
        let root = self.applied(cancel)?.root()?;
        let actual = &root.expect_role(ROOT_ROLE)?.principal_ids;
        if actual != expected {
            return Err(Error::ExpectedRootKeysMismatch);
        }
        Ok(())
    }

    // Internals

    /// Is `signer` allowed to modify the policy file `role`?
    fn authorize(
        &self,
        state: &PolicyState,
        role: &str,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        let (authority, _) = state.signing_authority(role)?;
        if !authority.contains_key(&signer.key_id()) {
            return Err(Error::UnauthorizedKey(signer.key_id()));
        }
        Ok(())
    }

    fn mutate_root<F>(
        &self,
        cancel: &CancellationToken,
        signer: &dyn Signer,
        what: &str,
        mutation: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut RootMetadata) -> Result<(), Error>,
    {
        let mut state = self.staged(cancel)?;
        let original = state.root()?;
        if !original
            .expect_role(ROOT_ROLE)?
            .principal_ids
            .contains(&signer.key_id())
        {
            return Err(Error::UnauthorizedKey(signer.key_id()));
        }

        let mut root = original.clone();
        mutation(&mut root)?;
        if root == original {
            tracing::debug!(what, "mutation is a no-op");
            return Ok(());
        }
        root.bump_version();
        root.validate()?;

        let mut envelope = envelope_for(&root)?;
        envelope.sign(signer)?;
        state.root_envelope = envelope;
        self.stage(cancel, &state, signer, what)
    }

    fn mutate_targets<F>(
        &self,
        cancel: &CancellationToken,
        role: &str,
        signer: &dyn Signer,
        what: &str,
        mutation: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut TargetsMetadata) -> Result<(), crate::metadata::Error>,
    {
        let mut state = self.staged(cancel)?;
        self.authorize(&state, role, signer)?;

        let original = state.targets_for(role)?;
        let mut targets = original.clone();
        mutation(&mut targets)?;
        if targets == original {
            tracing::debug!(what, "mutation is a no-op");
            return Ok(());
        }
        targets.bump_version();
        targets.validate()?;

        let mut envelope = envelope_for(&targets)?;
        envelope.sign(signer)?;
        match role {
            TARGETS_ROLE => state.targets_envelope = Some(envelope),
            delegated => {
                state
                    .delegated_envelopes
                    .insert(delegated.to_owned(), envelope);
            },
        }
        self.stage(cancel, &state, signer, what)
    }

    /// Write `state` to staging unless it is byte-identical to what is
    /// already there.
    fn stage(
        &self,
        cancel: &CancellationToken,
        state: &PolicyState,
        signer: &dyn Signer,
        what: &str,
    ) -> Result<(), Error> {
        let tree = state.write_tree(self.repo, cancel)?;
        let tip = self.staging_tip(cancel)?;
        if let Some(tip_id) = tip {
            if self.repo.read_commit(cancel, tip_id)?.tree == tree {
                tracing::debug!(what, "state unchanged, nothing staged");
                return Ok(());
            }
        }

        let parents: Vec<Hash> = tip.into_iter().collect();
        let commit = self
            .repo
            .create_commit(cancel, tree, &parents, what, Some(signer))?;
        self.repo
            .update_reference(cancel, POLICY_STAGING_REF, tip, commit)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        keys::SecretKey,
        pattern::Pattern,
        rsl::{Entry, LogEntry},
        testutil::TmpRepo,
    };

    lazy_static! {
        static ref K1: SecretKey = SecretKey::from_seed(&[41; 32]);
        static ref K2: SecretKey = SecretKey::from_seed(&[42; 32]);
        static ref K3: SecretKey = SecretKey::from_seed(&[43; 32]);
    }

    fn expires() -> chrono::DateTime<Utc> {
        Utc::now() + Duration::days(365)
    }

    fn initial_root() -> RootMetadata {
        let mut root = RootMetadata::new(expires());
        root.add_principal(Principal::from_public_key("k1", K1.public()));
        root.add_role_principal(ROOT_ROLE, K1.public().key_id())
            .unwrap();
        root
    }

    fn setup(repo: &TmpRepo) -> PolicyStore<'_> {
        let cancel = CancellationToken::new();
        let store = PolicyStore::new(repo);
        store.init_root(&cancel, initial_root(), &*K1).unwrap();
        store
            .add_role_principal(
                &cancel,
                TARGETS_ROLE,
                Principal::from_public_key("k2", K2.public()),
                &*K1,
            )
            .unwrap();
        store
            .init_targets(&cancel, TargetsMetadata::new(expires()), &*K2)
            .unwrap();
        store
    }

    #[test]
    fn init_then_reinit_fails() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);

        assert_matches!(
            store.init_root(&cancel, initial_root(), &*K1),
            Err(Error::CannotReinitialize(_))
        );
        assert_matches!(
            store.init_targets(&cancel, TargetsMetadata::new(expires()), &*K2),
            Err(Error::CannotReinitialize(_))
        );
    }

    #[test]
    fn init_requires_a_root_key() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = PolicyStore::new(&repo);

        assert_matches!(
            store.init_root(&cancel, initial_root(), &*K3),
            Err(Error::UnauthorizedKey(_))
        );
        // Nothing was written.
        assert_matches!(store.staged(&cancel), Err(Error::NotInitialized));
    }

    #[test]
    fn mutations_are_authorized_against_staged_root() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);

        // K3 holds no role at all.
        assert_matches!(
            store.add_root_principal(
                &cancel,
                Principal::from_public_key("k3", K3.public()),
                &*K3
            ),
            Err(Error::UnauthorizedKey(_))
        );

        // K1 holds root but not targets; policy-file mutations refuse it.
        assert_matches!(
            store.add_principal(
                &cancel,
                TARGETS_ROLE,
                Principal::from_public_key("k3", K3.public()),
                &*K1
            ),
            Err(Error::UnauthorizedKey(_))
        );

        // K2 holds targets but not root.
        assert_matches!(
            store.set_role_threshold(&cancel, ROOT_ROLE, 1, &*K2),
            Err(Error::UnauthorizedKey(_))
        );
    }

    #[test]
    fn version_counters_advance_per_mutation() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);

        let before = store.staged(&cancel).unwrap().root().unwrap().version;
        store
            .add_root_principal(
                &cancel,
                Principal::from_public_key("k3", K3.public()),
                &*K1,
            )
            .unwrap();
        let after = store.staged(&cancel).unwrap().root().unwrap().version;
        assert_eq!(u64::from(after), u64::from(before) + 1);
    }

    #[test]
    fn identical_mutation_stages_nothing() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);

        store
            .add_root_principal(
                &cancel,
                Principal::from_public_key("k3", K3.public()),
                &*K1,
            )
            .unwrap();
        let tip_before = store.staging_tip(&cancel).unwrap();

        // Same principal again: payload unchanged, no new staging commit.
        store
            .add_root_principal(
                &cancel,
                Principal::from_public_key("k3", K3.public()),
                &*K1,
            )
            .unwrap();
        assert_eq!(store.staging_tip(&cancel).unwrap(), tip_before);
    }

    #[test]
    fn reserved_policy_names_are_rejected() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);

        assert_matches!(
            store.init_delegated_targets(
                &cancel,
                ROOT_ROLE,
                TargetsMetadata::new(expires()),
                &*K2
            ),
            Err(Error::InvalidPolicyName(_))
        );

        let delegation = Delegation {
            name: "escalate".into(),
            paths: vec![Pattern::new("git:refs/heads/*").unwrap()],
            principal_ids: [K2.public().key_id()].into_iter().collect(),
            threshold: 1,
            terminating: false,
            role: Some(ROOT_ROLE.into()),
        };
        store
            .add_principal(
                &cancel,
                TARGETS_ROLE,
                Principal::from_public_key("k2", K2.public()),
                &*K2,
            )
            .unwrap();
        assert_matches!(
            store.add_delegation(&cancel, TARGETS_ROLE, delegation, &*K2),
            Err(Error::InvalidPolicyName(_))
        );
    }

    #[test]
    fn apply_promotes_staging_and_logs_it() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);
        let rsl = Rsl::new(&repo);

        store.apply(&cancel, &rsl, &*K1).unwrap();

        let staged_tip = store.staging_tip(&cancel).unwrap().unwrap();
        let applied_tip = store.applied_tip(&cancel).unwrap().unwrap();
        assert_eq!(staged_tip, applied_tip);

        let tip = rsl.latest(&cancel).unwrap().unwrap();
        match &tip {
            Entry::Reference(entry) => {
                assert_eq!(entry.ref_name, POLICY_REF);
                assert_eq!(entry.target, applied_tip);
            },
            Entry::Annotation(_) => panic!("expected a reference entry"),
        }

        // Applying the same state again records nothing.
        store.apply(&cancel, &rsl, &*K1).unwrap();
        assert_eq!(rsl.latest(&cancel).unwrap().unwrap().id(), tip.id());
    }

    #[test]
    fn detached_signing_reaches_thresholds() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);
        let rsl = Rsl::new(&repo);

        // Escalate root to a 2-of-2 threshold; K2's mutation-time signature
        // alone no longer satisfies the root role.
        store
            .add_role_principal(
                &cancel,
                ROOT_ROLE,
                Principal::from_public_key("k2", K2.public()),
                &*K1,
            )
            .unwrap();
        store
            .set_role_threshold(&cancel, ROOT_ROLE, 2, &*K1)
            .unwrap();
        assert_matches!(
            store.apply(&cancel, &rsl, &*K1),
            Err(Error::Envelope(
                crate::envelope::Error::InsufficientSignatures { .. }
            ))
        );

        store.sign_root(&cancel, &*K2).unwrap();
        store.sign_root(&cancel, &*K1).unwrap();
        store.apply(&cancel, &rsl, &*K1).unwrap();
    }

    #[test]
    fn expected_root_principals_pinning() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);
        let rsl = Rsl::new(&repo);
        store.apply(&cancel, &rsl, &*K1).unwrap();

        let expected: BTreeSet<KeyId> = [K1.public().key_id()].into_iter().collect();
        store
            .check_expected_root_principals(&cancel, &expected)
            .unwrap();

        let wrong: BTreeSet<KeyId> = [K3.public().key_id()].into_iter().collect();
        assert_matches!(
            store.check_expected_root_principals(&cancel, &wrong),
            Err(Error::ExpectedRootKeysMismatch)
        );
    }

    #[test]
    fn discard_staging_is_dev_gated() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let store = setup(&repo);
        let rsl = Rsl::new(&repo);
        store.apply(&cancel, &rsl, &*K1).unwrap();

        store
            .add_root_principal(
                &cancel,
                Principal::from_public_key("k3", K3.public()),
                &*K1,
            )
            .unwrap();
        let applied = store.applied_tip(&cancel).unwrap().unwrap();
        assert_ne!(store.staging_tip(&cancel).unwrap().unwrap(), applied);

        std::env::set_var(crate::dev::DEV_MODE_ENV, "1");
        let outcome = store.discard_staging(&cancel);
        std::env::remove_var(crate::dev::DEV_MODE_ENV);
        outcome.unwrap();

        assert_eq!(store.staging_tip(&cancel).unwrap().unwrap(), applied);
    }
}
