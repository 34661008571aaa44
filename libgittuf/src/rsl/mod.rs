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

//! The reference state log.
//!
//! A strictly linear chain of empty-tree commits on [`RSL_REF`], each
//! encoding one [entry](Entry) in its message and signed by its author.
//! Entries are immutable once written; corrections are made by appending
//! further entries and, where appropriate, skip annotations. Appends go
//! through a compare-and-swap on the log reference, so concurrent writers
//! race safely and the loser retries against the new tip.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    cancel::CancellationToken,
    git::{self, Repository},
    hash::Hash,
    keys::Signer,
};

pub mod entry;
pub mod search;

pub use entry::{AnnotationEntry, Entry, LogEntry, ReferenceEntry};
pub use search::Search;

/// The reference the log lives on.
pub const RSL_REF: &str = "refs/gittuf/reference-state-log";

/// Everything under this prefix is a control reference, reserved for the
/// log and the policy machinery.
pub const CONTROL_PREFIX: &str = "refs/gittuf/";

/// The remote-tracking mirror of [`RSL_REF`] for `remote`.
pub fn remote_tracking_ref(remote: &str) -> String {
    format!("refs/remotes/{}/gittuf/reference-state-log", remote)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("log entry {0} not found")]
    EntryNotFound(Hash),

    #[error("log entry {0}: {1}")]
    InvalidEntry(Hash, entry::ParseError),

    #[error("entry {0} has multiple parents: the log has branched")]
    LogBranchDetected(Hash),

    #[error("no log entry matches")]
    NoMatchingEntry,

    #[error("invalid search: {0}")]
    InvalidSearch(&'static str),

    #[error("annotated entry {0} does not exist in the log")]
    DanglingAnnotation(Hash),

    #[error(transparent)]
    Git(#[from] git::Error),
}

/// Handle to the log of one repository.
///
/// Carries the entry cache: entries are immutable once written, so parsed
/// values can be shared freely; the lock only orders concurrent fills.
pub struct Rsl<'a> {
    repo: &'a Repository,
    cache: RwLock<HashMap<Hash, Entry>>,
}

impl<'a> Rsl<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn repo(&self) -> &Repository {
        self.repo
    }

    fn tip_id(&self, cancel: &CancellationToken) -> Result<Option<Hash>, Error> {
        Ok(self.repo.try_resolve_reference(cancel, RSL_REF)?)
    }

    /// The entry at the tip of the log, if any.
    pub fn latest(&self, cancel: &CancellationToken) -> Result<Option<Entry>, Error> {
        self.tip_id(cancel)?
            .map(|id| self.get(cancel, id))
            .transpose()
    }

    /// The entry with content hash `id`.
    pub fn get(&self, cancel: &CancellationToken, id: Hash) -> Result<Entry, Error> {
        if let Some(entry) = self.cache.read().unwrap().get(&id) {
            return Ok(entry.clone());
        }

        let commit = self.repo.read_commit(cancel, id).map_err(|e| match e {
            git::Error::NotFound(_) => Error::EntryNotFound(id),
            e => Error::Git(e),
        })?;
        if commit.parents.len() > 1 {
            return Err(Error::LogBranchDetected(id));
        }

        let entry = Entry::parse(id, commit.parents.first().copied(), &commit.message)
            .map_err(|e| Error::InvalidEntry(id, e))?;
        self.cache.write().unwrap().insert(id, entry.clone());
        Ok(entry)
    }

    /// The entry one step back, or `None` at the start of the log.
    pub fn parent_of(
        &self,
        cancel: &CancellationToken,
        entry: &Entry,
    ) -> Result<Option<Entry>, Error> {
        entry.parent().map(|id| self.get(cancel, id)).transpose()
    }

    /// Walk the whole log from the tip backwards.
    pub fn walk(&self, cancel: &CancellationToken) -> Result<Walk<'_, 'a>, Error> {
        Ok(Walk {
            rsl: self,
            cancel: cancel.clone(),
            next: self.tip_id(cancel)?,
        })
    }

    /// Walk backwards starting at (and including) `id`.
    pub fn walk_from(&self, cancel: &CancellationToken, id: Hash) -> Walk<'_, 'a> {
        Walk {
            rsl: self,
            cancel: cancel.clone(),
            next: Some(id),
        }
    }

    /// Locate the newest entry satisfying `search`.
    pub fn find(&self, cancel: &CancellationToken, search: &Search) -> Result<Entry, Error> {
        let tip = self.latest(cancel)?.ok_or(Error::NoMatchingEntry)?;
        search.validate(&tip)?;

        // Annotations always postdate what they refer to, so accumulating
        // them on the way down keeps the skip set complete for every
        // candidate we look at.
        let mut skipped: BTreeSet<Hash> = BTreeSet::new();
        let mut reached_before_bound = search.before_id.is_none();

        for item in self.walk_from(cancel, tip.id()) {
            let entry = item?;
            if let Entry::Annotation(annotation) = &entry {
                if annotation.skip {
                    skipped.extend(annotation.entry_ids.iter().copied());
                }
            }

            if !reached_before_bound {
                if Some(entry.id()) == search.before_id {
                    reached_before_bound = true;
                }
                continue;
            }
            if let Some(before) = search.before_number {
                if entry.number().unwrap_or(0) >= before {
                    continue;
                }
            }
            if let Some(until) = search.until_number {
                if entry.number().unwrap_or(0) < until {
                    break;
                }
            }

            let mut matched = match &entry {
                Entry::Annotation(_) => !search.reference_only && search.reference.is_none(),
                Entry::Reference(reference) => {
                    search
                        .reference
                        .as_deref()
                        .map_or(true, |want| reference.ref_name == want)
                        && !(search.non_control
                            && reference.ref_name.starts_with(CONTROL_PREFIX))
                },
            };
            matched &= !(search.unskipped && skipped.contains(&entry.id()));

            if matched {
                return Ok(entry);
            }
            if Some(entry.id()) == search.until_id {
                break;
            }
        }

        Err(Error::NoMatchingEntry)
    }

    /// The newest non-skipped reference entry for `ref_name`.
    pub fn latest_reference_entry(
        &self,
        cancel: &CancellationToken,
        ref_name: &str,
    ) -> Result<ReferenceEntry, Error> {
        match self.find(cancel, &Search::new().for_reference(ref_name).unskipped())? {
            Entry::Reference(entry) => Ok(entry),
            Entry::Annotation(_) => Err(Error::NoMatchingEntry),
        }
    }

    // Writing

    /// Record "`ref_name` moved to `target`".
    ///
    /// Retries internally when another writer gets in first; every attempt
    /// re-reads the tip and renumbers.
    pub fn append_reference_entry(
        &self,
        cancel: &CancellationToken,
        ref_name: &str,
        target: Hash,
        signer: &dyn Signer,
    ) -> Result<ReferenceEntry, Error> {
        let span = tracing::debug_span!("Rsl::append_reference_entry", ref_name, target = %target);
        let _guard = span.enter();

        loop {
            let tip = self.tip_id(cancel)?;
            match self.append_reference_entry_once(cancel, tip, ref_name, target, signer) {
                Err(Error::Git(git::Error::RefChanged(_))) => {
                    tracing::debug!("lost the compare-and-swap, retrying");
                    continue;
                },
                outcome => return outcome,
            }
        }
    }

    /// Record an annotation over earlier entries. With `skip`, verification
    /// treats each referenced reference entry as revoked; a later non-skip
    /// annotation does not revive it.
    pub fn append_annotation_entry(
        &self,
        cancel: &CancellationToken,
        entry_ids: NonEmpty<Hash>,
        skip: bool,
        message: &str,
        signer: &dyn Signer,
    ) -> Result<AnnotationEntry, Error> {
        let span = tracing::debug_span!("Rsl::append_annotation_entry", skip);
        let _guard = span.enter();

        let known: BTreeSet<Hash> = self
            .walk(cancel)?
            .map(|item| item.map(|entry| entry.id()))
            .collect::<Result<_, _>>()?;
        for id in entry_ids.iter() {
            if !known.contains(id) {
                return Err(Error::DanglingAnnotation(*id));
            }
        }

        loop {
            let tip = self.tip_id(cancel)?;
            match self.append_annotation_entry_once(
                cancel,
                tip,
                entry_ids.clone(),
                skip,
                message,
                signer,
            ) {
                Err(Error::Git(git::Error::RefChanged(_))) => {
                    tracing::debug!("lost the compare-and-swap, retrying");
                    continue;
                },
                outcome => return outcome,
            }
        }
    }

    fn append_reference_entry_once(
        &self,
        cancel: &CancellationToken,
        observed_tip: Option<Hash>,
        ref_name: &str,
        target: Hash,
        signer: &dyn Signer,
    ) -> Result<ReferenceEntry, Error> {
        let mut entry = ReferenceEntry {
            id: Hash::zero(),
            ref_name: ref_name.to_owned(),
            target,
            number: self.next_number(cancel, observed_tip)?,
            parent: observed_tip,
        };
        entry.id = self.write_entry(cancel, observed_tip, &entry.to_message(), signer)?;
        self.cache
            .write()
            .unwrap()
            .insert(entry.id, Entry::Reference(entry.clone()));
        Ok(entry)
    }

    fn append_annotation_entry_once(
        &self,
        cancel: &CancellationToken,
        observed_tip: Option<Hash>,
        entry_ids: NonEmpty<Hash>,
        skip: bool,
        message: &str,
        signer: &dyn Signer,
    ) -> Result<AnnotationEntry, Error> {
        let mut entry = AnnotationEntry {
            id: Hash::zero(),
            entry_ids,
            skip,
            message: message.to_owned(),
            number: self.next_number(cancel, observed_tip)?,
            parent: observed_tip,
        };
        entry.id = self.write_entry(cancel, observed_tip, &entry.to_message(), signer)?;
        self.cache
            .write()
            .unwrap()
            .insert(entry.id, Entry::Annotation(entry.clone()));
        Ok(entry)
    }

    /// One compare-and-swap attempt: empty-tree commit over the observed
    /// tip, then move [`RSL_REF`] from that tip to the new commit.
    fn write_entry(
        &self,
        cancel: &CancellationToken,
        observed_tip: Option<Hash>,
        message: &str,
        signer: &dyn Signer,
    ) -> Result<Hash, Error> {
        let tree = self.repo.empty_tree(cancel)?;
        let parents: Vec<Hash> = observed_tip.into_iter().collect();
        let id = self
            .repo
            .create_commit(cancel, tree, &parents, message, Some(signer))?;
        self.repo
            .update_reference(cancel, RSL_REF, observed_tip, id)?;
        Ok(id)
    }

    /// Tip numbered `n` hands out `n + 1`; an unnumbered tip (or an empty
    /// log) hands out 1. Once any entry carries a number, every subsequent
    /// entry does: the boundary is permanent.
    fn next_number(
        &self,
        cancel: &CancellationToken,
        tip: Option<Hash>,
    ) -> Result<Option<u64>, Error> {
        Ok(match tip {
            None => Some(1),
            Some(id) => match self.get(cancel, id)?.number() {
                Some(n) => Some(n + 1),
                None => Some(1),
            },
        })
    }

    // Maintenance

    /// Detect entries for `ref_name` whose target is no longer reachable
    /// from the live reference tip, walking back from the newest entry
    /// until a reachable one, and revoke them with a single skip
    /// annotation. Evidence of history rewriting.
    pub fn skip_rewritten_entries(
        &self,
        cancel: &CancellationToken,
        ref_name: &str,
        signer: &dyn Signer,
    ) -> Result<Option<AnnotationEntry>, Error> {
        let span = tracing::debug_span!("Rsl::skip_rewritten_entries", ref_name);
        let _guard = span.enter();

        let live = self.repo.resolve_reference(cancel, ref_name)?;

        let mut rewritten = Vec::new();
        for item in self.walk(cancel)? {
            let entry = item?;
            if let Entry::Reference(reference) = entry {
                if reference.ref_name != ref_name {
                    continue;
                }
                if self.repo.is_ancestor(cancel, reference.target, live)? {
                    break;
                }
                rewritten.push(reference.id);
            }
        }

        match NonEmpty::from_vec(rewritten) {
            None => Ok(None),
            Some(ids) => {
                tracing::warn!(count = ids.len(), "revoking unreachable targets");
                self.append_annotation_entry(
                    cancel,
                    ids,
                    true,
                    &format!("targets no longer reachable from {}", ref_name),
                    signer,
                )
                .map(Some)
            },
        }
    }
}

/// Backward walk over the log. Stops at the first error.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Walk<'r, 'a> {
    rsl: &'r Rsl<'a>,
    cancel: CancellationToken,
    next: Option<Hash>,
}

impl Iterator for Walk<'_, '_> {
    type Item = Result<Entry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        match self.rsl.get(&self.cancel, id) {
            Ok(entry) => {
                self.next = entry.parent();
                Some(Ok(entry))
            },
            Err(e) => Some(Err(e)),
        }
    }
}
