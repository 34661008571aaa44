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

//! The trust and policy state machine.
//!
//! Policy lives on two control references: mutations stage new state on
//! [`POLICY_STAGING_REF`], and [`PolicyStore::apply`] promotes the staged
//! state to [`POLICY_REF`] by recording a reference entry in the log. A
//! state is a commit whose tree holds one envelope blob per role
//! (`root.json`, `targets.json`, `<role>.json`), so states are immutable
//! snapshots and successive applies form a chain that can be replayed for
//! any point in history.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{
    cancel::CancellationToken,
    dev,
    envelope::{self, Envelope},
    git::{self, Repository, TreeEntry},
    hash::Hash,
    keys::KeyId,
    metadata::{
        self, Principal, RootMetadata, TargetsMetadata, PAYLOAD_TYPE, ROOT_ROLE, TARGETS_ROLE,
    },
    rsl::{self, Entry, Rsl},
};

pub mod resolver;
mod store;

pub use store::PolicyStore;

/// The applied policy: what verification trusts.
pub const POLICY_REF: &str = "refs/gittuf/policy";

/// Where mutations accumulate until applied.
pub const POLICY_STAGING_REF: &str = "refs/gittuf/policy-staging";

const ROOT_FILE: &str = "root.json";

fn role_file(role: &str) -> String {
    format!("{}.json", role)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("policy role {0} already exists")]
    CannotReinitialize(String),

    #[error("{0} is a reserved policy name")]
    InvalidPolicyName(String),

    #[error("no metadata for role {0} in this policy state")]
    MetadataNotFound(String),

    #[error("key {0} is not authorized for this change")]
    UnauthorizedKey(KeyId),

    #[error("root principals do not match the expected set")]
    ExpectedRootKeysMismatch,

    #[error("policy has not been initialized")]
    NotInitialized,

    #[error("no applied policy state")]
    NoAppliedState,

    #[error(transparent)]
    Metadata(#[from] metadata::Error),

    #[error(transparent)]
    Envelope(#[from] envelope::Error),

    #[error(transparent)]
    Rsl(#[from] rsl::Error),

    #[error(transparent)]
    Git(#[from] git::Error),

    #[error(transparent)]
    Dev(#[from] dev::NotEnabled),
}

/// An immutable snapshot of the policy: the root envelope, the top-level
/// targets envelope, and any delegated policy-file envelopes by role name.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyState {
    pub root_envelope: Envelope,
    pub targets_envelope: Option<Envelope>,
    pub delegated_envelopes: BTreeMap<String, Envelope>,
}

impl PolicyState {
    /// Read the state a policy commit points at.
    pub fn load(
        repo: &Repository,
        cancel: &CancellationToken,
        commit: Hash,
    ) -> Result<Self, Error> {
        let commit = repo.read_commit(cancel, commit)?;
        let mut root_envelope = None;
        let mut targets_envelope = None;
        let mut delegated_envelopes = BTreeMap::new();

        for entry in repo.read_tree(cancel, commit.tree)? {
            let Some(role) = entry.name.strip_suffix(".json") else {
                continue;
            };
            let blob = repo.read_object(cancel, entry.id)?;
            let envelope: Envelope =
                serde_json::from_slice(&blob).map_err(metadata::Error::Json)?;
            match role {
                ROOT_ROLE => root_envelope = Some(envelope),
                TARGETS_ROLE => targets_envelope = Some(envelope),
                delegated => {
                    delegated_envelopes.insert(delegated.to_owned(), envelope);
                },
            }
        }

        Ok(Self {
            root_envelope: root_envelope
                .ok_or_else(|| Error::MetadataNotFound(ROOT_ROLE.into()))?,
            targets_envelope,
            delegated_envelopes,
        })
    }

    /// The tree encoding this state, for storage and change detection.
    pub fn write_tree(
        &self,
        repo: &Repository,
        cancel: &CancellationToken,
    ) -> Result<Hash, Error> {
        let mut entries = Vec::with_capacity(2 + self.delegated_envelopes.len());

        let root = serde_json::to_vec(&self.root_envelope).map_err(metadata::Error::Json)?;
        entries.push(TreeEntry::blob(ROOT_FILE, repo.write_blob(cancel, &root)?));

        if let Some(targets) = &self.targets_envelope {
            let targets = serde_json::to_vec(targets).map_err(metadata::Error::Json)?;
            entries.push(TreeEntry::blob(
                role_file(TARGETS_ROLE),
                repo.write_blob(cancel, &targets)?,
            ));
        }
        for (role, envelope) in &self.delegated_envelopes {
            let blob = serde_json::to_vec(envelope).map_err(metadata::Error::Json)?;
            entries.push(TreeEntry::blob(
                role_file(role),
                repo.write_blob(cancel, &blob)?,
            ));
        }

        Ok(repo.write_tree(cancel, &entries)?)
    }

    pub fn root(&self) -> Result<RootMetadata, Error> {
        Ok(RootMetadata::from_payload(self.root_envelope.payload())?)
    }

    pub fn targets(&self) -> Result<Option<TargetsMetadata>, Error> {
        self.targets_envelope
            .as_ref()
            .map(|e| TargetsMetadata::from_payload(e.payload()).map_err(Error::from))
            .transpose()
    }

    pub fn has_role(&self, role: &str) -> bool {
        match role {
            ROOT_ROLE => true,
            TARGETS_ROLE => self.targets_envelope.is_some(),
            delegated => self.delegated_envelopes.contains_key(delegated),
        }
    }

    /// The policy file for `role`, `targets` or delegated.
    pub fn targets_for(&self, role: &str) -> Result<TargetsMetadata, Error> {
        let envelope = match role {
            TARGETS_ROLE => self.targets_envelope.as_ref(),
            delegated => self.delegated_envelopes.get(delegated),
        }
        .ok_or_else(|| Error::MetadataNotFound(role.into()))?;
        Ok(TargetsMetadata::from_payload(envelope.payload())?)
    }

    /// Every principal the state knows about, across the root and all
    /// policy files.
    pub fn all_principals(&self) -> Result<BTreeMap<KeyId, Principal>, Error> {
        let mut principals = self.root()?.principals;
        if let Some(targets) = self.targets()? {
            principals.extend(targets.principals);
        }
        for role in self.delegated_envelopes.keys() {
            principals.extend(self.targets_for(role)?.principals);
        }
        Ok(principals)
    }

    /// The principal set and threshold authorized to sign the policy file
    /// `role`: the root's `targets` role for the top level, the delegating
    /// delegation for everything else.
    pub fn signing_authority(
        &self,
        role: &str,
    ) -> Result<(BTreeMap<KeyId, Principal>, usize), Error> {
        if role == TARGETS_ROLE {
            let root = self.root()?;
            let targets_role = root.expect_role(TARGETS_ROLE)?;
            let principals = targets_role
                .principal_ids
                .iter()
                .filter_map(|id| root.principals.get(id).map(|p| (id.clone(), p.clone())))
                .collect();
            return Ok((principals, targets_role.threshold));
        }

        let mut files = vec![TARGETS_ROLE.to_owned()];
        files.extend(self.delegated_envelopes.keys().cloned());
        for file in files {
            if !self.has_role(&file) {
                continue;
            }
            let targets = self.targets_for(&file)?;
            if let Some(delegation) = targets
                .delegations
                .iter()
                .find(|d| d.role.as_deref() == Some(role))
            {
                let principals = delegation
                    .principal_ids
                    .iter()
                    .filter_map(|id| targets.principals.get(id).map(|p| (id.clone(), p.clone())))
                    .collect();
                return Ok((principals, delegation.threshold));
            }
        }
        Err(Error::MetadataNotFound(role.into()))
    }

    /// Check that every envelope in the state meets its signing threshold:
    /// the root under its own root role, each policy file under its
    /// delegating authority.
    pub fn verify_signatures(&self) -> Result<(), Error> {
        let root = self.root()?;
        let root_role = root.expect_role(ROOT_ROLE)?;
        let root_principals = root.role_principals(ROOT_ROLE)?;
        self.root_envelope
            .verify_with_threshold(&root_principals, root_role.threshold)?;

        if let Some(envelope) = &self.targets_envelope {
            let (principals, threshold) = self.signing_authority(TARGETS_ROLE)?;
            let principals: Vec<&Principal> = principals.values().collect();
            envelope.verify_with_threshold(&principals, threshold)?;
        }

        for (role, envelope) in &self.delegated_envelopes {
            let (principals, threshold) = self.signing_authority(role)?;
            let principals: Vec<&Principal> = principals.values().collect();
            envelope.verify_with_threshold(&principals, threshold)?;
        }
        Ok(())
    }
}

/// The applied policy as of `entry_id`: the state named by the newest
/// reference entry for [`POLICY_REF`] at or before that point in the log.
pub fn applied_state_at(
    repo: &Repository,
    rsl: &Rsl,
    cancel: &CancellationToken,
    entry_id: Hash,
) -> Result<PolicyState, Error> {
    for item in rsl.walk_from(cancel, entry_id) {
        if let Entry::Reference(reference) = item? {
            if reference.ref_name == POLICY_REF {
                return PolicyState::load(repo, cancel, reference.target);
            }
        }
    }
    Err(Error::NoAppliedState)
}

/// Wrap `metadata` in a fresh unsigned envelope.
pub(crate) fn envelope_for<T: serde::Serialize>(metadata: &T) -> Result<Envelope, Error> {
    Ok(Envelope::from_payload(PAYLOAD_TYPE, metadata)?)
}
