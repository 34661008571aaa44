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

use std::path::Path;

use super::{Error, SIGNATURE_LABEL};
use crate::{
    cancel::CancellationToken,
    canonical::{armor, dearmor},
    hash::Hash,
    keys::Signer,
    metadata::Principal,
};

const COMMITTER_NAME: &str = "gittuf";
const COMMITTER_EMAIL: &str = "gittuf@localhost";

fn is_not_found(e: &git2::Error) -> bool {
    e.code() == git2::ErrorCode::NotFound
}

/// A tree member: `{name, mode, hash}`.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: i32,
    pub id: Hash,
}

impl TreeEntry {
    pub fn blob(name: impl Into<String>, id: Hash) -> Self {
        Self {
            name: name.into(),
            mode: 0o100644,
            id,
        }
    }

    pub fn tree(name: impl Into<String>, id: Hash) -> Self {
        Self {
            name: name.into(),
            mode: 0o040000,
            id,
        }
    }
}

/// A parsed commit header, as much of it as the rest of the crate needs.
#[derive(Clone, Debug)]
pub struct CommitData {
    pub id: Hash,
    pub tree: Hash,
    pub parents: Vec<Hash>,
    pub message: String,
}

pub struct Repository {
    inner: git2::Repository,
}

impl Repository {
    /// Open an existing repository, working or bare.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self {
            inner: git2::Repository::open(path.as_ref())?,
        })
    }

    pub fn init(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self {
            inner: git2::Repository::init(path.as_ref())?,
        })
    }

    pub fn init_bare(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self {
            inner: git2::Repository::init_opts(
                path.as_ref(),
                git2::RepositoryInitOptions::new()
                    .bare(true)
                    .no_reinit(true)
                    .external_template(false),
            )?,
        })
    }

    fn committer(&self) -> Result<git2::Signature<'static>, Error> {
        self.inner
            .signature()
            .or_else(|_| git2::Signature::now(COMMITTER_NAME, COMMITTER_EMAIL))
            .map_err(Error::from)
    }

    // Objects

    pub fn read_object(&self, cancel: &CancellationToken, id: Hash) -> Result<Vec<u8>, Error> {
        cancel.check()?;
        let odb = self.inner.odb()?;
        let object = odb
            .read(id.into())
            .map_err(|e| not_found(e, || format!("object {}", id)))?;
        Ok(object.data().to_vec())
    }

    pub fn write_blob(&self, cancel: &CancellationToken, data: &[u8]) -> Result<Hash, Error> {
        cancel.check()?;
        Ok(self.inner.blob(data)?.into())
    }

    pub fn write_tree(
        &self,
        cancel: &CancellationToken,
        entries: &[TreeEntry],
    ) -> Result<Hash, Error> {
        cancel.check()?;
        let mut builder = self.inner.treebuilder(None)?;
        for entry in entries {
            builder.insert(entry.name.as_str(), entry.id.into(), entry.mode)?;
        }
        Ok(builder.write()?.into())
    }

    /// The canonical empty tree.
    pub fn empty_tree(&self, cancel: &CancellationToken) -> Result<Hash, Error> {
        self.write_tree(cancel, &[])
    }

    pub fn read_tree(&self, cancel: &CancellationToken, id: Hash) -> Result<Vec<TreeEntry>, Error> {
        cancel.check()?;
        let tree = self
            .inner
            .find_tree(id.into())
            .map_err(|e| not_found(e, || format!("tree {}", id)))?;
        Ok(tree
            .iter()
            .map(|entry| TreeEntry {
                name: entry.name().unwrap_or_default().to_owned(),
                mode: entry.filemode(),
                id: entry.id().into(),
            })
            .collect())
    }

    pub fn read_commit(&self, cancel: &CancellationToken, id: Hash) -> Result<CommitData, Error> {
        cancel.check()?;
        let commit = self
            .inner
            .find_commit(id.into())
            .map_err(|e| not_found(e, || format!("commit {}", id)))?;
        Ok(CommitData {
            id,
            tree: commit.tree_id().into(),
            parents: commit.parent_ids().map(Hash::from).collect(),
            message: commit.message().unwrap_or_default().to_owned(),
        })
    }

    /// Create a commit over `tree`. No reference is moved; pair with
    /// [`Repository::update_reference`]. With a signer, the commit is
    /// signed over its full header buffer.
    pub fn create_commit(
        &self,
        cancel: &CancellationToken,
        tree: Hash,
        parents: &[Hash],
        message: &str,
        signer: Option<&dyn Signer>,
    ) -> Result<Hash, Error> {
        cancel.check()?;
        let span = tracing::debug_span!("Repository::create_commit", tree = %tree);
        let _guard = span.enter();

        let committer = self.committer()?;
        let tree = self.inner.find_tree(tree.into())?;
        let parents = parents
            .iter()
            .map(|p| self.inner.find_commit((*p).into()))
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        match signer {
            None => Ok(self
                .inner
                .commit(None, &committer, &committer, message, &tree, &parent_refs)?
                .into()),

            Some(signer) => {
                let buffer = self.inner.commit_create_buffer(
                    &committer,
                    &committer,
                    message,
                    &tree,
                    &parent_refs,
                )?;
                let content = std::str::from_utf8(&buffer)
                    .map_err(|_| git2::Error::from_str("commit buffer is not utf-8"))?;
                let signature = armor(SIGNATURE_LABEL, &signer.sign(buffer.as_ref())?);
                Ok(self.inner.commit_signed(content, &signature, None)?.into())
            },
        }
    }

    // References

    pub fn resolve_reference(&self, cancel: &CancellationToken, name: &str) -> Result<Hash, Error> {
        cancel.check()?;
        self.inner
            .refname_to_id(name)
            .map(Hash::from)
            .map_err(|e| not_found(e, || format!("reference {}", name)))
    }

    pub fn try_resolve_reference(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Option<Hash>, Error> {
        match self.resolve_reference(cancel, name) {
            Ok(id) => Ok(Some(id)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Atomically move `name` from `expected` to `new`.
    ///
    /// `expected = None` asserts the reference does not exist yet. A losing
    /// writer observes [`Error::RefChanged`], re-reads the tip, and retries
    /// at its own layer.
    pub fn update_reference(
        &self,
        cancel: &CancellationToken,
        name: &str,
        expected: Option<Hash>,
        new: Hash,
    ) -> Result<(), Error> {
        cancel.check()?;
        let span = tracing::debug_span!("Repository::update_reference", name, new = %new);
        let _guard = span.enter();

        let outcome = match expected {
            None => self
                .inner
                .reference(name, new.into(), false, "update by gittuf")
                .map(|_| ()),
            Some(old) => self
                .inner
                .reference_matching(name, new.into(), true, old.into(), "update by gittuf")
                .map(|_| ()),
        };

        outcome.map_err(|e| match e.code() {
            git2::ErrorCode::Exists | git2::ErrorCode::Modified | git2::ErrorCode::NotFound => {
                tracing::debug!(err = %e, "compare-and-swap lost");
                Error::RefChanged(name.to_owned())
            },
            _ => Error::Git(e),
        })
    }

    // Ancestry

    /// Does history reach `ancestor` when walking back from `descendant`?
    /// Equal commits count as reachable. Tags are peeled first.
    pub fn is_ancestor(
        &self,
        cancel: &CancellationToken,
        ancestor: Hash,
        descendant: Hash,
    ) -> Result<bool, Error> {
        cancel.check()?;
        let ancestor = self.peel_to_commit(ancestor)?;
        let descendant = self.peel_to_commit(descendant)?;
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self
            .inner
            .graph_descendant_of(descendant.into(), ancestor.into())?)
    }

    /// The tree a three-way merge of `ours` and `theirs` would produce.
    pub fn merge_tree(
        &self,
        cancel: &CancellationToken,
        ours: Hash,
        theirs: Hash,
    ) -> Result<Hash, Error> {
        cancel.check()?;
        let our_commit = self.inner.find_commit(self.peel_to_commit(ours)?.into())?;
        let their_commit = self.inner.find_commit(self.peel_to_commit(theirs)?.into())?;

        let mut index = self.inner.merge_commits(&our_commit, &their_commit, None)?;
        if index.has_conflicts() {
            return Err(Error::MergeConflict { ours, theirs });
        }
        Ok(index.write_tree_to(&self.inner)?.into())
    }

    /// The tree of a commit, peeling annotated tags.
    pub fn tree_of(&self, cancel: &CancellationToken, id: Hash) -> Result<Hash, Error> {
        cancel.check()?;
        let commit = self.peel_to_commit(id)?;
        Ok(self.inner.find_commit(commit.into())?.tree_id().into())
    }

    fn peel_to_commit(&self, id: Hash) -> Result<Hash, Error> {
        let object = self
            .inner
            .find_object(id.into(), None)
            .map_err(|e| not_found(e, || format!("object {}", id)))?;
        Ok(object
            .peel(git2::ObjectType::Commit)
            .map_err(|e| not_found(e, || format!("commit for {}", id)))?
            .id()
            .into())
    }

    // Signatures

    /// Verify the signature carried by commit or tag `id` against one
    /// principal. [`Error::NotSigned`] and [`Error::SignatureInvalid`] mean
    /// "no match"; anything else is environmental.
    pub fn verify_object_signature(
        &self,
        cancel: &CancellationToken,
        id: Hash,
        principal: &Principal,
    ) -> Result<(), Error> {
        cancel.check()?;
        let (data, signature) = self.signature_payload(id)?;
        let raw = dearmor(SIGNATURE_LABEL, &signature).map_err(|_| Error::SignatureInvalid(id))?;
        principal
            .verify(&data, &raw)
            .map_err(|_| Error::SignatureInvalid(id))
    }

    /// The signed bytes and armored signature of a commit or annotated tag.
    fn signature_payload(&self, id: Hash) -> Result<(Vec<u8>, String), Error> {
        let object = self
            .inner
            .find_object(id.into(), None)
            .map_err(|e| not_found(e, || format!("object {}", id)))?;

        match object.kind() {
            Some(git2::ObjectType::Commit) => {
                let (signature, data) = self
                    .inner
                    .extract_signature(&id.into(), None)
                    .map_err(|e| {
                        if is_not_found(&e) {
                            Error::NotSigned(id)
                        } else {
                            Error::Git(e)
                        }
                    })?;
                let signature = std::str::from_utf8(&signature)
                    .map_err(|_| Error::SignatureInvalid(id))?
                    .to_owned();
                Ok((data.to_vec(), signature))
            },

            Some(git2::ObjectType::Tag) => {
                // A signed tag appends its armor block to the tag payload.
                let raw = self.inner.odb()?.read(id.into())?.data().to_vec();
                let text =
                    String::from_utf8(raw).map_err(|_| Error::SignatureInvalid(id))?;
                let marker = format!("-----BEGIN {}-----", SIGNATURE_LABEL);
                match text.find(&marker) {
                    None => Err(Error::NotSigned(id)),
                    Some(at) => Ok((text[..at].as_bytes().to_vec(), text[at..].to_owned())),
                }
            },

            _ => Err(Error::NotSigned(id)),
        }
    }
}

impl From<git2::Repository> for Repository {
    fn from(inner: git2::Repository) -> Self {
        Self { inner }
    }
}

fn not_found(e: git2::Error, what: impl FnOnce() -> String) -> Error {
    if is_not_found(&e) {
        Error::NotFound(what())
    } else {
        Error::Git(e)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{keys::SecretKey, testutil::TmpRepo};

    lazy_static! {
        static ref KEY: SecretKey = SecretKey::from_seed(&[21; 32]);
    }

    fn commit(repo: &TmpRepo, parents: &[Hash], message: &str) -> Hash {
        let cancel = CancellationToken::new();
        let tree = repo.empty_tree(&cancel).unwrap();
        repo.create_commit(&cancel, tree, parents, message, Some(&*KEY))
            .unwrap()
    }

    #[test]
    fn blob_roundtrip() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();

        let id = repo.write_blob(&cancel, b"content").unwrap();
        assert_eq!(repo.read_object(&cancel, id).unwrap(), b"content");
    }

    #[test]
    fn missing_object_is_not_found() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let missing: Hash = "0123456789012345678901234567890123456789".parse().unwrap();

        assert_matches!(repo.read_object(&cancel, missing), Err(Error::NotFound(_)));
    }

    #[test]
    fn signed_commit_verifies_against_signer() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let id = commit(&repo, &[], "signed");

        let good = Principal::from_public_key("good", KEY.public());
        let bad = Principal::from_public_key("bad", SecretKey::from_seed(&[22; 32]).public());

        assert!(repo.verify_object_signature(&cancel, id, &good).is_ok());
        assert_matches!(
            repo.verify_object_signature(&cancel, id, &bad),
            Err(Error::SignatureInvalid(_))
        );
    }

    #[test]
    fn unsigned_commit_is_not_signed() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        let tree = repo.empty_tree(&cancel).unwrap();
        let id = repo
            .create_commit(&cancel, tree, &[], "unsigned", None)
            .unwrap();

        let principal = Principal::from_public_key("k", KEY.public());
        assert_matches!(
            repo.verify_object_signature(&cancel, id, &principal),
            Err(Error::NotSigned(_))
        );
    }

    #[test]
    fn compare_and_swap_detects_races() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();

        let c1 = commit(&repo, &[], "one");
        let c2 = commit(&repo, &[c1], "two");

        repo.update_reference(&cancel, "refs/heads/topic", None, c1)
            .unwrap();
        // Creation raced: someone else created the ref first.
        assert_matches!(
            repo.update_reference(&cancel, "refs/heads/topic", None, c2),
            Err(Error::RefChanged(_))
        );
        // Stale expected value.
        assert_matches!(
            repo.update_reference(&cancel, "refs/heads/topic", Some(c2), c2),
            Err(Error::RefChanged(_))
        );
        // Correct expected value wins.
        repo.update_reference(&cancel, "refs/heads/topic", Some(c1), c2)
            .unwrap();
        assert_eq!(
            repo.resolve_reference(&cancel, "refs/heads/topic").unwrap(),
            c2
        );
    }

    #[test]
    fn ancestry() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();

        let c1 = commit(&repo, &[], "one");
        let c2 = commit(&repo, &[c1], "two");
        let unrelated = commit(&repo, &[], "elsewhere");

        assert!(repo.is_ancestor(&cancel, c1, c2).unwrap());
        assert!(repo.is_ancestor(&cancel, c1, c1).unwrap());
        assert!(!repo.is_ancestor(&cancel, c2, c1).unwrap());
        assert!(!repo.is_ancestor(&cancel, unrelated, c2).unwrap());
    }

    #[test]
    fn cancellation_short_circuits() {
        let repo = TmpRepo::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_matches!(
            repo.write_blob(&cancel, b"content"),
            Err(Error::Cancelled(_))
        );
    }
}
