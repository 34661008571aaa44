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

use std::ops::Deref;

use tempfile::TempDir;

use crate::{cancel::CancellationToken, git::Repository, hash::Hash, keys::Signer};

/// A repository in a temporary directory, dropped with the value.
pub(crate) struct TmpRepo {
    // Held for its Drop.
    _tmp: TempDir,
    repo: Repository,
}

impl TmpRepo {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let repo = Repository::init(tmp.path()).expect("init repository");
        Self { _tmp: tmp, repo }
    }
}

impl Deref for TmpRepo {
    type Target = Repository;

    fn deref(&self) -> &Self::Target {
        &self.repo
    }
}

/// An empty-tree commit chain link, signed by `signer`.
pub(crate) fn signed_commit(
    repo: &Repository,
    parents: &[Hash],
    message: &str,
    signer: &dyn Signer,
) -> Hash {
    let cancel = CancellationToken::new();
    let tree = repo.empty_tree(&cancel).expect("empty tree");
    repo.create_commit(&cancel, tree, parents, message, Some(signer))
        .expect("create commit")
}
