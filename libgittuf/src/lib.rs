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

//! An auditable, append-only ledger of reference updates for git
//! repositories, together with a signed policy framework authorizing those
//! updates.
//!
//! The library has three tightly coupled subsystems:
//!
//! * the [reference state log](rsl) (RSL), a chain of signed records living
//!   on a dedicated reference, each attesting "reference R moved to target T
//!   at position N";
//! * the [trust and policy state machine](policy), signed metadata
//!   describing a root of trust, delegated signing authorities and global
//!   rules, kept on a staging/applied pair of references;
//! * the [verification engine](verify), which walks the log, resolves the
//!   policy in force at each step, and decides whether every update was
//!   authorized by an adequate, unrevoked set of signatures.
//!
//! Everything else (transport, CLI, hook execution, forge APIs) lives
//! outside this crate and talks to it through the [object adapter](git)
//! and the types re-exported here.

#[macro_use]
extern crate lazy_static;

pub mod attestations;
pub mod cancel;
pub mod canonical;
pub mod dev;
pub mod envelope;
pub mod git;
pub mod hash;
pub mod keys;
pub mod metadata;
pub mod pattern;
pub mod policy;
pub mod rsl;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;

pub use cancel::CancellationToken;
pub use hash::Hash;
pub use keys::{KeyId, SecretKey, Signer};
