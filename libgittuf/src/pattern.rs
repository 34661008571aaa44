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

//! Protected-namespace terms and the patterns that match them.
//!
//! Terms carry a namespace prefix: `git:refs/heads/main` for references,
//! `file:src/lib.rs` for paths inside a tree. Patterns are shell-style
//! globs, anchored at both ends, where `/` is a hard separator: `*` matches
//! within one segment, `**` spans segments. No regular expressions.

use std::fmt::{self, Display};

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid pattern {pattern:?}")]
pub struct Error {
    pattern: String,
    #[source]
    source: globset::Error,
}

/// Namespace term for a git reference.
pub fn git_term(ref_name: &str) -> String {
    format!("git:{}", ref_name)
}

/// Namespace term for a path inside a tree.
pub fn file_term(path: &str) -> String {
    format!("file:{}", path)
}

/// A compiled namespace pattern.
///
/// Equality, ordering and serialization all go through the source text; the
/// compiled matcher is an implementation detail.
#[derive(Clone, Debug)]
pub struct Pattern {
    raw: String,
    matcher: GlobMatcher,
}

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Result<Self, Error> {
        let raw = pattern.into();
        let matcher = GlobBuilder::new(&raw)
            .literal_separator(true)
            .build()
            .map_err(|source| Error {
                pattern: raw.clone(),
                source,
            })?
            .compile_matcher();

        Ok(Self { raw, matcher })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, term: &str) -> bool {
        self.matcher.is_match(term)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Pattern {}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Pattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}
