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

//! The object adapter.
//!
//! Everything the rest of the crate knows about the underlying version
//! control system goes through [`Repository`]: object CRUD, reference
//! reads and compare-and-swap updates, ancestry queries, and signed commit
//! creation/verification. Whether objects come from a working repository
//! or a bare one is hidden here.

use thiserror::Error;

use crate::{cancel, hash::Hash};

mod repository;

pub use repository::{CommitData, Repository, TreeEntry};

/// Armor label for adapter-produced object signatures.
pub const SIGNATURE_LABEL: &str = "GITTUF SIGNATURE";

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("reference {0} changed concurrently")]
    RefChanged(String),

    #[error("object {0} carries no signature")]
    NotSigned(Hash),

    #[error("signature on {0} does not verify")]
    SignatureInvalid(Hash),

    #[error("merging {ours} and {theirs} conflicts")]
    MergeConflict { ours: Hash, theirs: Hash },

    #[error("signing failed: {0}")]
    Signing(#[from] crate::keys::Error),

    #[error(transparent)]
    Cancelled(#[from] cancel::Cancelled),

    #[error(transparent)]
    Git(#[from] git2::Error),
}

impl Error {
    /// Whether this is a definite "signature does not match" as opposed to
    /// an environmental failure worth surfacing.
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::NotSigned(_) | Self::SignatureInvalid(_))
    }
}
