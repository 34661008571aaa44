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

//! Typed trust metadata: the root of trust, policy files (targets), the
//! principals they authorize, and the global rules they impose.
//!
//! All metadata is carried inside [envelopes](crate::envelope) with payload
//! type [`PAYLOAD_TYPE`]. Parsing is version-gated: an unknown
//! `schemaVersion` is a hard failure, never a silent downgrade. Writers bump
//! the version counter on every change and re-serialize.

use thiserror::Error;

use crate::keys::KeyId;

pub mod principal;
pub mod root;
pub mod targets;

pub use principal::Principal;
pub use root::{Role, RootMetadata};
pub use targets::{Delegation, GlobalRule, TargetsMetadata};

/// Payload type tag of every metadata envelope.
pub const PAYLOAD_TYPE: &str = "application/vnd.gittuf+json";

/// The schema version this library reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Reserved role name: the root of trust.
pub const ROOT_ROLE: &str = "root";

/// Reserved role name: the top-level policy file.
pub const TARGETS_ROLE: &str = "targets";

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown metadata schema version {0}")]
    UnknownSchemaVersion(u32),

    #[error("{context} references unknown principal {id}")]
    UnknownPrincipal { context: String, id: KeyId },

    #[error("{context}: threshold must be between 1 and the number of principals")]
    InvalidThreshold { context: String },

    #[error("principal {id} is still referenced by {context}")]
    PrincipalInUse { context: String, id: KeyId },

    #[error("role {0} is not defined")]
    MissingRole(String),

    #[error("delegation {0} is not defined")]
    MissingDelegation(String),

    #[error("global rule {0} is not defined")]
    MissingGlobalRule(String),

    #[error("duplicate name {0}")]
    DuplicateName(String),

    #[error("metadata payload: {0}")]
    Json(#[from] serde_json::Error),
}
