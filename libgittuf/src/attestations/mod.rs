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

//! Detached approvals for reference transitions.
//!
//! Attestations live on their own control reference as envelope blobs, one
//! per attested transition `(reference, from, to)`. Verification consumes
//! two kinds: *reference authorizations*, whose envelope signatures are the
//! approvals, and *merge approvals* relayed from a forge, whose predicate
//! lists approving principals directly.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cancel::CancellationToken,
    envelope::{self, Envelope},
    git::{self, Repository, TreeEntry},
    hash::Hash,
    keys::{KeyId, Signer},
};

/// Where attestations are kept.
pub const ATTESTATIONS_REF: &str = "refs/gittuf/attestations";

/// Payload type of attestation envelopes.
pub const PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";
pub const REFERENCE_AUTHORIZATION_PREDICATE: &str =
    "https://gittuf.dev/reference-authorization/v0.1";
pub const MERGE_APPROVAL_PREDICATE: &str = "https://gittuf.dev/merge-approval/v0.1";

const REFERENCE_AUTHORIZATION_PREFIX: &str = "refauthz";
const MERGE_APPROVAL_PREFIX: &str = "mergeapproval";

#[derive(Debug, Error)]
pub enum Error {
    #[error("attestation predicate does not match the requested transition")]
    PredicateMismatch,

    #[error("attestation payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Envelope(#[from] envelope::Error),

    #[error(transparent)]
    Git(#[from] git::Error),
}

/// Minimal in-toto statement wrapper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statement<P> {
    #[serde(rename = "_type")]
    pub statement_type: String,

    #[serde(rename = "predicateType")]
    pub predicate_type: String,

    pub predicate: P,
}

/// "This transition of `target_ref` is approved by whoever signed the
/// envelope."
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAuthorization {
    #[serde(rename = "targetRef")]
    pub target_ref: String,

    #[serde(rename = "fromRevisionID")]
    pub from_id: Hash,

    /// The commit being moved to, or the tree a pre-approved merge will
    /// produce.
    #[serde(rename = "targetID")]
    pub to_id: Hash,
}

/// A forge-reported review approval for a transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeApproval {
    #[serde(rename = "targetRef")]
    pub target_ref: String,

    #[serde(rename = "fromRevisionID")]
    pub from_id: Hash,

    #[serde(rename = "targetID")]
    pub to_id: Hash,

    pub approvers: Vec<KeyId>,

    #[serde(rename = "dismissedApprovers", default)]
    pub dismissed_approvers: Vec<KeyId>,
}

impl MergeApproval {
    /// Approvers whose approval still stands.
    pub fn live_approvers(&self) -> impl Iterator<Item = &KeyId> {
        self.approvers
            .iter()
            .filter(|approver| !self.dismissed_approvers.contains(approver))
    }
}

/// Build an unsigned reference-authorization envelope; approvers then
/// [`Envelope::sign`] it.
pub fn new_reference_authorization(
    target_ref: impl Into<String>,
    from_id: Hash,
    to_id: Hash,
) -> Result<Envelope, Error> {
    let statement = Statement {
        statement_type: STATEMENT_TYPE.to_owned(),
        predicate_type: REFERENCE_AUTHORIZATION_PREDICATE.to_owned(),
        predicate: ReferenceAuthorization {
            target_ref: target_ref.into(),
            from_id,
            to_id,
        },
    };
    Ok(Envelope::from_payload(PAYLOAD_TYPE, &statement)?)
}

pub fn new_merge_approval(approval: MergeApproval) -> Result<Envelope, Error> {
    let statement = Statement {
        statement_type: STATEMENT_TYPE.to_owned(),
        predicate_type: MERGE_APPROVAL_PREDICATE.to_owned(),
        predicate: approval,
    };
    Ok(Envelope::from_payload(PAYLOAD_TYPE, &statement)?)
}

/// The tree a pre-approved merge of `feature` into `base` will produce.
/// Approving that tree authorizes the merge before it exists as a commit.
pub fn merge_preapproval_target(
    repo: &Repository,
    cancel: &CancellationToken,
    base: Hash,
    feature: Hash,
) -> Result<Hash, Error> {
    Ok(repo.merge_tree(cancel, base, feature)?)
}

/// Handle to the attestation store of one repository.
pub struct Attestations<'a> {
    repo: &'a Repository,
}

impl<'a> Attestations<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// Store (or replace) the authorization for one transition.
    pub fn set_reference_authorization(
        &self,
        cancel: &CancellationToken,
        envelope: &Envelope,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        let statement: Statement<ReferenceAuthorization> =
            parse_statement(envelope, REFERENCE_AUTHORIZATION_PREDICATE)?;
        let predicate = &statement.predicate;
        self.put(
            cancel,
            &blob_name(
                REFERENCE_AUTHORIZATION_PREFIX,
                &predicate.target_ref,
                predicate.from_id,
                predicate.to_id,
            ),
            envelope,
            signer,
        )
    }

    /// The authorization for the transition `(target_ref, from, to)`.
    pub fn reference_authorization(
        &self,
        cancel: &CancellationToken,
        target_ref: &str,
        from: Hash,
        to: Hash,
    ) -> Result<Option<Envelope>, Error> {
        let name = blob_name(REFERENCE_AUTHORIZATION_PREFIX, target_ref, from, to);
        let Some(envelope) = self.get(cancel, &name)? else {
            return Ok(None);
        };
        let statement: Statement<ReferenceAuthorization> =
            parse_statement(&envelope, REFERENCE_AUTHORIZATION_PREDICATE)?;
        let p = &statement.predicate;
        if p.target_ref != target_ref || p.from_id != from || p.to_id != to {
            return Err(Error::PredicateMismatch);
        }
        Ok(Some(envelope))
    }

    pub fn set_merge_approval(
        &self,
        cancel: &CancellationToken,
        envelope: &Envelope,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        let statement: Statement<MergeApproval> =
            parse_statement(envelope, MERGE_APPROVAL_PREDICATE)?;
        let predicate = &statement.predicate;
        self.put(
            cancel,
            &blob_name(
                MERGE_APPROVAL_PREFIX,
                &predicate.target_ref,
                predicate.from_id,
                predicate.to_id,
            ),
            envelope,
            signer,
        )
    }

    pub fn merge_approval(
        &self,
        cancel: &CancellationToken,
        target_ref: &str,
        from: Hash,
        to: Hash,
    ) -> Result<Option<MergeApproval>, Error> {
        let name = blob_name(MERGE_APPROVAL_PREFIX, target_ref, from, to);
        let Some(envelope) = self.get(cancel, &name)? else {
            return Ok(None);
        };
        let statement: Statement<MergeApproval> =
            parse_statement(&envelope, MERGE_APPROVAL_PREDICATE)?;
        let p = &statement.predicate;
        if p.target_ref != target_ref || p.from_id != from || p.to_id != to {
            return Err(Error::PredicateMismatch);
        }
        Ok(Some(statement.predicate))
    }

    fn tip(&self, cancel: &CancellationToken) -> Result<Option<Hash>, Error> {
        Ok(self.repo.try_resolve_reference(cancel, ATTESTATIONS_REF)?)
    }

    fn current_entries(&self, cancel: &CancellationToken) -> Result<Vec<TreeEntry>, Error> {
        match self.tip(cancel)? {
            None => Ok(Vec::new()),
            Some(tip) => {
                let commit = self.repo.read_commit(cancel, tip)?;
                Ok(self.repo.read_tree(cancel, commit.tree)?)
            },
        }
    }

    fn get(&self, cancel: &CancellationToken, name: &str) -> Result<Option<Envelope>, Error> {
        let entry = self
            .current_entries(cancel)?
            .into_iter()
            .find(|entry| entry.name == name);
        match entry {
            None => Ok(None),
            Some(entry) => {
                let blob = self.repo.read_object(cancel, entry.id)?;
                Ok(Some(serde_json::from_slice(&blob)?))
            },
        }
    }

    fn put(
        &self,
        cancel: &CancellationToken,
        name: &str,
        envelope: &Envelope,
        signer: &dyn Signer,
    ) -> Result<(), Error> {
        let span = tracing::debug_span!("Attestations::put", name);
        let _guard = span.enter();

        let blob = self
            .repo
            .write_blob(cancel, &serde_json::to_vec(envelope)?)?;

        loop {
            let tip = self.tip(cancel)?;
            let mut entries = self.current_entries(cancel)?;
            entries.retain(|entry| entry.name != name);
            entries.push(TreeEntry::blob(name, blob));

            let tree = self.repo.write_tree(cancel, &entries)?;
            let parents: Vec<Hash> = tip.into_iter().collect();
            let commit = self.repo.create_commit(
                cancel,
                tree,
                &parents,
                &format!("add attestation {}", name),
                Some(signer),
            )?;

            match self
                .repo
                .update_reference(cancel, ATTESTATIONS_REF, tip, commit)
            {
                Err(git::Error::RefChanged(_)) => {
                    tracing::debug!("lost the compare-and-swap, retrying");
                    continue;
                },
                outcome => return Ok(outcome?),
            }
        }
    }
}

fn blob_name(prefix: &str, target_ref: &str, from: Hash, to: Hash) -> String {
    format!("{}-{}-{}-{}", prefix, target_ref.replace('/', "-"), from, to)
}

fn parse_statement<P: DeserializeOwned>(
    envelope: &Envelope,
    predicate_type: &str,
) -> Result<Statement<P>, Error> {
    let statement: Statement<P> = envelope.parse_payload()?;
    if statement.statement_type != STATEMENT_TYPE || statement.predicate_type != predicate_type {
        return Err(Error::PredicateMismatch);
    }
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        keys::SecretKey,
        metadata::Principal,
        testutil::{signed_commit, TmpRepo},
    };

    lazy_static! {
        static ref KEY: SecretKey = SecretKey::from_seed(&[61; 32]);
        static ref APPROVER: SecretKey = SecretKey::from_seed(&[62; 32]);
    }

    fn hashes() -> (Hash, Hash) {
        (
            git2::Oid::from_bytes(&[3; 20]).unwrap().into(),
            git2::Oid::from_bytes(&[4; 20]).unwrap().into(),
        )
    }

    #[test]
    fn authorization_roundtrip() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let attestations = Attestations::new(&repo);
        let (from, to) = hashes();

        let mut envelope =
            new_reference_authorization("refs/heads/main", from, to).unwrap();
        envelope.sign(&*APPROVER).unwrap();
        attestations
            .set_reference_authorization(&cancel, &envelope, &*KEY)
            .unwrap();

        let loaded = attestations
            .reference_authorization(&cancel, "refs/heads/main", from, to)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, envelope);

        let approver = Principal::from_public_key("approver", APPROVER.public());
        assert_eq!(loaded.signers(&[&approver]).len(), 1);

        // Missing transitions come back empty.
        assert!(attestations
            .reference_authorization(&cancel, "refs/heads/main", to, from)
            .unwrap()
            .is_none());
    }

    #[test]
    fn replacing_an_authorization_keeps_one_per_transition() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let attestations = Attestations::new(&repo);
        let (from, to) = hashes();

        let mut first = new_reference_authorization("refs/heads/main", from, to).unwrap();
        first.sign(&*APPROVER).unwrap();
        attestations
            .set_reference_authorization(&cancel, &first, &*KEY)
            .unwrap();

        let mut second = new_reference_authorization("refs/heads/main", from, to).unwrap();
        second.sign(&*APPROVER).unwrap();
        second.sign(&*KEY).unwrap();
        attestations
            .set_reference_authorization(&cancel, &second, &*KEY)
            .unwrap();

        let loaded = attestations
            .reference_authorization(&cancel, "refs/heads/main", from, to)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn merge_approval_live_approvers() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let attestations = Attestations::new(&repo);
        let (from, to) = hashes();

        let approval = MergeApproval {
            target_ref: "refs/heads/main".into(),
            from_id: from,
            to_id: to,
            approvers: vec![KeyId::from("alice"), KeyId::from("bob")],
            dismissed_approvers: vec![KeyId::from("bob")],
        };
        let envelope = new_merge_approval(approval.clone()).unwrap();
        attestations
            .set_merge_approval(&cancel, &envelope, &*KEY)
            .unwrap();

        let loaded = attestations
            .merge_approval(&cancel, "refs/heads/main", from, to)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, approval);
        let live: Vec<_> = loaded.live_approvers().collect();
        assert_eq!(live, [&KeyId::from("alice")]);
    }

    #[test]
    fn wrong_predicate_type_is_rejected() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let attestations = Attestations::new(&repo);
        let (from, to) = hashes();

        let approval = new_merge_approval(MergeApproval {
            target_ref: "refs/heads/main".into(),
            from_id: from,
            to_id: to,
            approvers: vec![],
            dismissed_approvers: vec![],
        })
        .unwrap();
        assert_matches!(
            attestations.set_reference_authorization(&cancel, &approval, &*KEY),
            Err(Error::PredicateMismatch)
        );
    }

    #[test]
    fn preapproval_target_is_the_merge_tree() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();

        let file = |content: &str| repo.write_blob(&cancel, content.as_bytes()).unwrap();
        let tree = |entries: &[TreeEntry]| repo.write_tree(&cancel, entries).unwrap();

        let base_tree = tree(&[TreeEntry::blob("a.txt", file("a\n"))]);
        let base = repo
            .create_commit(&cancel, base_tree, &[], "base", Some(&*KEY))
            .unwrap();

        let ours_tree = tree(&[
            TreeEntry::blob("a.txt", file("a\n")),
            TreeEntry::blob("b.txt", file("b\n")),
        ]);
        let ours = repo
            .create_commit(&cancel, ours_tree, &[base], "ours", Some(&*KEY))
            .unwrap();

        let theirs_tree = tree(&[
            TreeEntry::blob("a.txt", file("a\n")),
            TreeEntry::blob("c.txt", file("c\n")),
        ]);
        let theirs = repo
            .create_commit(&cancel, theirs_tree, &[base], "theirs", Some(&*KEY))
            .unwrap();

        let merged = merge_preapproval_target(&repo, &cancel, ours, theirs).unwrap();
        let expected = tree(&[
            TreeEntry::blob("a.txt", file("a\n")),
            TreeEntry::blob("b.txt", file("b\n")),
            TreeEntry::blob("c.txt", file("c\n")),
        ]);
        assert_eq!(merged, expected);

        // Unrelated edit to the same path: no clean merge tree to approve.
        let conflict_tree = tree(&[TreeEntry::blob("b.txt", file("other b\n"))]);
        let conflicting = repo
            .create_commit(&cancel, conflict_tree, &[base], "conflict", Some(&*KEY))
            .unwrap();
        assert_matches!(
            merge_preapproval_target(&repo, &cancel, ours, conflicting),
            Err(Error::Git(git::Error::MergeConflict { .. }))
        );
    }

    #[test]
    fn attestation_commits_chain_on_the_attestations_ref() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let attestations = Attestations::new(&repo);
        let (from, to) = hashes();

        let first = new_reference_authorization("refs/heads/a", from, to).unwrap();
        attestations
            .set_reference_authorization(&cancel, &first, &*KEY)
            .unwrap();
        let second = new_reference_authorization("refs/heads/b", from, to).unwrap();
        attestations
            .set_reference_authorization(&cancel, &second, &*KEY)
            .unwrap();

        let tip = repo
            .resolve_reference(&cancel, ATTESTATIONS_REF)
            .unwrap();
        let commit = repo.read_commit(&cancel, tip).unwrap();
        assert_eq!(commit.parents.len(), 1);

        // Both attestations are visible from the tip.
        assert!(attestations
            .reference_authorization(&cancel, "refs/heads/a", from, to)
            .unwrap()
            .is_some());
        assert!(attestations
            .reference_authorization(&cancel, "refs/heads/b", from, to)
            .unwrap()
            .is_some());
    }

    #[test]
    fn unattested_transitions_come_back_empty() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let attestations = Attestations::new(&repo);

        let c = signed_commit(&repo, &[], "c", &*KEY);
        assert!(attestations
            .reference_authorization(&cancel, "refs/heads/main", Hash::zero(), c)
            .unwrap()
            .is_none());
    }
}
