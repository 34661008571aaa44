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

use std::fmt::{self, Debug, Display};

use ed25519_dalek::{Signer as _, Verifier as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid key material")]
    InvalidKey,

    #[error("malformed signature encoding")]
    MalformedSignature,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("scheme {0} is not supported for local verification")]
    UnsupportedScheme(&'static str),
}

/// Stable identifier of a signing identity.
///
/// For key-based principals this is the lowercase hex SHA-256 of the
/// canonical public-key encoding; keyless principals use their federated
/// `issuer::subject` string. Envelope signatures carry it as `keyid`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyId({})", self.0)
    }
}

/// Uniform signing seam.
///
/// Mutating operations take a signer by reference and drop it when done; the
/// library never persists or logs key material.
pub trait Signer {
    fn key_id(&self) -> KeyId;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error>;
}

pub struct SecretKey(ed25519_dalek::SigningKey);

impl SecretKey {
    pub fn new() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }
}

impl Default for SecretKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Signer for SecretKey {
    fn key_id(&self) -> KeyId {
        self.public().key_id()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.0
            .try_sign(data)
            .map(|sig| sig.to_bytes().to_vec())
            .map_err(|e| Error::SigningFailed(e.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: &[u8; 32] = bytes.try_into().map_err(|_| Error::InvalidKey)?;
        ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidKey)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn verify(&self, data: &[u8], sig: &[u8]) -> Result<(), Error> {
        let sig =
            ed25519_dalek::Signature::from_slice(sig).map_err(|_| Error::MalformedSignature)?;
        self.0
            .verify(data, &sig)
            .map_err(|_| Error::VerificationFailed)
    }

    /// SHA-256 over the canonical encoding, as lowercase hex.
    pub fn key_id(&self) -> KeyId {
        KeyId(hex::encode(Sha256::digest(self.canonical_encoding())))
    }

    fn canonical_encoding(&self) -> Vec<u8> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            keytype: &'a str,
            scheme: &'a str,
            public: String,
        }

        // Infallible: plain struct of strings.
        serde_json::to_vec(&Canonical {
            keytype: "ed25519",
            scheme: "ed25519",
            public: hex::encode(self.as_bytes()),
        })
        .expect("canonical key encoding")
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.as_bytes()))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
