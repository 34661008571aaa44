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

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::keys::{self, KeyId, PublicKey};

/// An identity holding signing authority.
///
/// Principals are immutable once created: they are introduced and retired
/// through root metadata updates, never edited in place. The stable
/// identifier is derived from the verification material, so two principals
/// with the same material are the same principal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(flatten)]
    pub material: Material,
}

/// Verification material, by scheme.
///
/// Raw and SSH-encoded Ed25519 keys are verified locally. OpenPGP keys and
/// keyless identities are carried so policy can name them, but their
/// verification needs machinery outside this crate and fails closed here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "keytype", rename_all = "kebab-case")]
pub enum Material {
    Ed25519 {
        public: PublicKey,
    },

    /// A single-line OpenSSH public key (`ssh-ed25519 AAAA... comment`).
    Ssh {
        public: String,
    },

    Pgp {
        fingerprint: String,
        public: String,
    },

    /// Federated identity: certificate issuer plus subject.
    Keyless {
        issuer: String,
        subject: String,
    },
}

impl Principal {
    pub fn from_public_key(name: impl Into<String>, public: PublicKey) -> Self {
        Self {
            name: name.into(),
            material: Material::Ed25519 { public },
        }
    }

    pub fn from_ssh_key(name: impl Into<String>, public: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            material: Material::Ssh {
                public: public.into(),
            },
        }
    }

    pub fn keyless(name: impl Into<String>, issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            material: Material::Keyless {
                issuer: issuer.into(),
                subject: subject.into(),
            },
        }
    }

    /// The stable identifier: a hash of the canonical key encoding, or the
    /// federated subject string for keyless identities.
    pub fn id(&self) -> KeyId {
        match &self.material {
            Material::Ed25519 { public } => public.key_id(),
            Material::Ssh { public } => {
                KeyId::from(hex::encode(Sha256::digest(public.trim().as_bytes())))
            },
            Material::Pgp { fingerprint, .. } => KeyId::from(fingerprint.to_lowercase()),
            Material::Keyless { issuer, subject } => {
                KeyId::from(format!("{}::{}", issuer, subject))
            },
        }
    }

    /// Verify `sig` over `data` with this principal's material.
    pub fn verify(&self, data: &[u8], sig: &[u8]) -> Result<(), keys::Error> {
        match &self.material {
            Material::Ed25519 { public } => public.verify(data, sig),
            Material::Ssh { public } => ssh_ed25519_key(public)?.verify(data, sig),
            Material::Pgp { .. } => Err(keys::Error::UnsupportedScheme("openpgp")),
            Material::Keyless { .. } => Err(keys::Error::UnsupportedScheme("keyless")),
        }
    }
}

/// Extract the raw Ed25519 key from a one-line OpenSSH public key.
///
/// The blob is `string "ssh-ed25519" || string key`, each length-prefixed
/// with a big-endian u32.
fn ssh_ed25519_key(line: &str) -> Result<PublicKey, keys::Error> {
    let mut fields = line.split_whitespace();
    let algo = fields.next().ok_or(keys::Error::InvalidKey)?;
    if algo != "ssh-ed25519" {
        return Err(keys::Error::UnsupportedScheme("ssh (non-ed25519)"));
    }

    let blob = fields.next().ok_or(keys::Error::InvalidKey)?;
    let blob = BASE64
        .decode(blob.as_bytes())
        .map_err(|_| keys::Error::InvalidKey)?;

    fn take<'a>(rest: &mut &'a [u8], n: usize) -> Result<&'a [u8], keys::Error> {
        if rest.len() < n {
            return Err(keys::Error::InvalidKey);
        }
        let (head, tail) = rest.split_at(n);
        *rest = tail;
        Ok(head)
    }

    let mut rest = &blob[..];
    let algo_len = u32::from_be_bytes(take(&mut rest, 4)?.try_into().expect("4 bytes")) as usize;
    if take(&mut rest, algo_len)? != b"ssh-ed25519" {
        return Err(keys::Error::InvalidKey);
    }

    let key_len = u32::from_be_bytes(take(&mut rest, 4)?.try_into().expect("4 bytes")) as usize;
    PublicKey::from_bytes(take(&mut rest, key_len)?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::keys::SecretKey;

    lazy_static! {
        static ref KEY: SecretKey = SecretKey::from_seed(&[7; 32]);
    }

    fn openssh_line(public: &PublicKey) -> String {
        let mut blob = Vec::new();
        blob.extend_from_slice(&(b"ssh-ed25519".len() as u32).to_be_bytes());
        blob.extend_from_slice(b"ssh-ed25519");
        blob.extend_from_slice(&(32u32).to_be_bytes());
        blob.extend_from_slice(public.as_bytes());
        format!("ssh-ed25519 {} test@host", BASE64.encode(blob))
    }

    #[test]
    fn raw_key_verifies() {
        let principal = Principal::from_public_key("alice", KEY.public());
        let sig = crate::keys::Signer::sign(&*KEY, b"payload").unwrap();

        assert!(principal.verify(b"payload", &sig).is_ok());
        assert!(principal.verify(b"other", &sig).is_err());
    }

    #[test]
    fn ssh_key_verifies() {
        let principal = Principal::from_ssh_key("alice", openssh_line(&KEY.public()));
        let sig = crate::keys::Signer::sign(&*KEY, b"payload").unwrap();

        assert!(principal.verify(b"payload", &sig).is_ok());
    }

    #[test]
    fn keyless_fails_closed() {
        let principal = Principal::keyless("ci", "https://issuer.example", "repo:acme/widget");
        assert_matches!(
            principal.verify(b"payload", b"sig"),
            Err(keys::Error::UnsupportedScheme(_))
        );
        assert_eq!(
            principal.id(),
            KeyId::from("https://issuer.example::repo:acme/widget")
        );
    }

    #[test]
    fn ids_are_material_derived() {
        let a = Principal::from_public_key("a", KEY.public());
        let b = Principal::from_public_key("completely different name", KEY.public());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn serde_tags_by_keytype() {
        let principal = Principal::from_public_key("alice", KEY.public());
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&principal).unwrap()).unwrap();
        assert_eq!(json["keytype"], "ed25519");
        assert_eq!(json["name"], "alice");

        let back: Principal = serde_json::from_value(json).unwrap();
        assert_eq!(back, principal);
    }
}
