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

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Error, Principal, SCHEMA_VERSION};
use crate::keys::KeyId;

/// The root of trust.
///
/// Root metadata introduces every principal the repository knows about and
/// binds the reserved roles (`root`, `targets`) plus any delegated
/// policy-file roles to subsets of them, each with a signing threshold.
/// Every principal ID referenced by a role must appear in the principal set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootMetadata {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    /// Monotonically increasing; a state whose counter does not advance past
    /// the previously applied one is rejected during verification.
    pub version: NonZeroU64,

    pub expires: DateTime<Utc>,

    pub principals: BTreeMap<KeyId, Principal>,

    pub roles: BTreeMap<String, Role>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "principalIDs")]
    pub principal_ids: BTreeSet<KeyId>,

    pub threshold: usize,
}

impl RootMetadata {
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            version: NonZeroU64::MIN,
            expires,
            principals: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }

    /// Parse from payload bytes, gating on the schema version.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        let root: Self = serde_json::from_slice(payload)?;
        if root.schema_version != SCHEMA_VERSION {
            return Err(Error::UnknownSchemaVersion(root.schema_version));
        }
        root.validate()?;
        Ok(root)
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (name, role) in &self.roles {
            let context = format!("role {}", name);
            for id in &role.principal_ids {
                if !self.principals.contains_key(id) {
                    return Err(Error::UnknownPrincipal {
                        context,
                        id: id.clone(),
                    });
                }
            }
            if role.threshold == 0 || role.threshold > role.principal_ids.len() {
                return Err(Error::InvalidThreshold { context });
            }
        }
        Ok(())
    }

    /// Expired metadata is surfaced, not rejected: the log records when an
    /// update was authorized, and that moment does not move.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn expect_role(&self, name: &str) -> Result<&Role, Error> {
        self.role(name).ok_or_else(|| Error::MissingRole(name.into()))
    }

    /// The principals a role authorizes, in ID order.
    pub fn role_principals(&self, name: &str) -> Result<Vec<&Principal>, Error> {
        let role = self.expect_role(name)?;
        role.principal_ids
            .iter()
            .map(|id| {
                self.principals.get(id).ok_or_else(|| Error::UnknownPrincipal {
                    context: format!("role {}", name),
                    id: id.clone(),
                })
            })
            .collect()
    }

    pub fn add_principal(&mut self, principal: Principal) {
        self.principals.insert(principal.id(), principal);
    }

    /// Retire a principal. Fails while any role still references it.
    pub fn remove_principal(&mut self, id: &KeyId) -> Result<(), Error> {
        for (name, role) in &self.roles {
            if role.principal_ids.contains(id) {
                return Err(Error::PrincipalInUse {
                    context: format!("role {}", name),
                    id: id.clone(),
                });
            }
        }
        self.principals.remove(id);
        Ok(())
    }

    pub fn set_role(&mut self, name: impl Into<String>, role: Role) {
        self.roles.insert(name.into(), role);
    }

    pub fn add_role_principal(&mut self, role: &str, id: KeyId) -> Result<(), Error> {
        if !self.principals.contains_key(&id) {
            return Err(Error::UnknownPrincipal {
                context: format!("role {}", role),
                id,
            });
        }
        let entry = self.roles.entry(role.to_owned()).or_insert(Role {
            principal_ids: BTreeSet::new(),
            threshold: 1,
        });
        entry.principal_ids.insert(id);
        Ok(())
    }

    pub fn remove_role_principal(&mut self, role: &str, id: &KeyId) -> Result<(), Error> {
        let entry = self
            .roles
            .get_mut(role)
            .ok_or_else(|| Error::MissingRole(role.into()))?;
        entry.principal_ids.remove(id);
        if entry.principal_ids.len() < entry.threshold {
            return Err(Error::InvalidThreshold {
                context: format!("role {}", role),
            });
        }
        Ok(())
    }

    pub fn set_role_threshold(&mut self, role: &str, threshold: usize) -> Result<(), Error> {
        let entry = self
            .roles
            .get_mut(role)
            .ok_or_else(|| Error::MissingRole(role.into()))?;
        if threshold == 0 || threshold > entry.principal_ids.len() {
            return Err(Error::InvalidThreshold {
                context: format!("role {}", role),
            });
        }
        entry.threshold = threshold;
        Ok(())
    }

    pub fn bump_version(&mut self) {
        self.version = self
            .version
            .checked_add(1)
            .expect("version counter overflow");
    }
}
