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

use std::collections::BTreeSet;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    canonical::pre_authentication_encoding,
    keys::{self, KeyId, Signer},
    metadata::Principal,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("insufficient signatures: have {have}, want {want}")]
    InsufficientSignatures { have: usize, want: usize },

    #[error("threshold must be at least 1")]
    ZeroThreshold,

    #[error(transparent)]
    Signing(#[from] keys::Error),

    #[error("envelope payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A payload plus its detached signatures.
///
/// The wire form is the DSSE JSON object: base64 `payload`, `payloadType`,
/// and a `signatures` array of `{keyid, sig}`. Signing appends; the payload
/// bytes are never touched after construction, so a verifier reconstructs
/// the exact pre-authentication encoding that was signed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "base64_bytes")]
    payload: Vec<u8>,

    #[serde(rename = "payloadType")]
    payload_type: String,

    signatures: Vec<Signature>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: KeyId,

    #[serde(with = "base64_bytes")]
    pub sig: Vec<u8>,
}

impl Envelope {
    pub fn new(payload_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            payload,
            payload_type: payload_type.into(),
            signatures: Vec::new(),
        }
    }

    /// Serialize `payload` as JSON and wrap it, unsigned.
    pub fn from_payload<T: Serialize>(payload_type: impl Into<String>, payload: &T) -> Result<Self, Error> {
        Ok(Self::new(payload_type, serde_json::to_vec(payload)?))
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_type(&self) -> &str {
        &self.payload_type
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// The exact bytes covered by every signature on this envelope.
    pub fn pre_authentication_encoding(&self) -> Vec<u8> {
        pre_authentication_encoding(&self.payload_type, &self.payload)
    }

    /// Append a signature. Neither the payload nor the existing signatures
    /// are read or altered; a key signing twice still counts once at
    /// verification.
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<(), Error> {
        let keyid = signer.key_id();
        let sig = signer.sign(&self.pre_authentication_encoding())?;

        self.signatures.push(Signature { keyid, sig });
        Ok(())
    }

    /// The IDs of all supplied principals with a valid signature here.
    ///
    /// Duplicate signatures by one key count once. Principals whose scheme
    /// cannot be verified locally are skipped, never accepted.
    pub fn signers(&self, principals: &[&Principal]) -> BTreeSet<KeyId> {
        let pae = self.pre_authentication_encoding();

        let mut accepted = BTreeSet::new();
        for signature in &self.signatures {
            for principal in principals {
                if principal.id() == signature.keyid
                    && principal.verify(&pae, &signature.sig).is_ok()
                {
                    accepted.insert(principal.id());
                }
            }
        }
        accepted
    }

    /// Succeeds with the accepted principal IDs iff at least `threshold`
    /// distinct principals from `principals` signed this envelope.
    pub fn verify_with_threshold(
        &self,
        principals: &[&Principal],
        threshold: usize,
    ) -> Result<BTreeSet<KeyId>, Error> {
        if threshold == 0 {
            return Err(Error::ZeroThreshold);
        }

        let accepted = self.signers(principals);
        if accepted.len() >= threshold {
            Ok(accepted)
        } else {
            Err(Error::InsufficientSignatures {
                have: accepted.len(),
                want: threshold,
            })
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
