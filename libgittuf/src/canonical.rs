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

//! Deterministic byte encodings: the pre-authentication encoding signed
//! inside [envelopes](crate::envelope), and the PEM-style armored blocks
//! used in commit signatures and annotation messages.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("missing {0} armor boundary")]
    MissingBoundary(&'static str),

    #[error("invalid base64 in armored block")]
    Base64(#[from] base64::DecodeError),
}

/// Pre-authentication encoding, version 1.
///
/// `DSSEv1 SP LEN(type) SP type SP LEN(payload) SP payload`. A verifier
/// reconstructs the exact signed bytes from the envelope alone; the payload
/// is never re-serialized.
pub fn pre_authentication_encoding(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );

    let mut encoding = Vec::with_capacity(header.len() + payload.len());
    encoding.extend_from_slice(header.as_bytes());
    encoding.extend_from_slice(payload);
    encoding
}

/// Wrap `data` in a `-----BEGIN <label>----- / -----END <label>-----` block,
/// base64 body wrapped at 64 columns, trailing newline included.
pub fn armor(label: &str, data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for chunk in encoded.as_bytes().chunks(64) {
        // Chunks of valid base64 are ASCII.
        out.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

/// Inverse of [`armor`]. Ignores anything outside the boundary lines.
pub fn dearmor(label: &str, block: &str) -> Result<Vec<u8>, Error> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);

    let mut body = String::new();
    let mut inside = false;
    let mut seen_begin = false;
    let mut seen_end = false;
    for line in block.lines() {
        let line = line.trim_end();
        if line == begin {
            inside = true;
            seen_begin = true;
        } else if line == end {
            inside = false;
            seen_end = true;
        } else if inside {
            body.push_str(line.trim());
        }
    }

    if !seen_begin {
        return Err(Error::MissingBoundary("BEGIN"));
    }
    if !seen_end {
        return Err(Error::MissingBoundary("END"));
    }

    Ok(BASE64.decode(body.as_bytes())?)
}
