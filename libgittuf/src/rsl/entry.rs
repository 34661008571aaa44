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

use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    canonical::{armor, dearmor},
    hash::Hash,
};

pub const REFERENCE_ENTRY_HEADER: &str = "RSL Reference Entry";
pub const ANNOTATION_ENTRY_HEADER: &str = "RSL Annotation Entry";

const MESSAGE_LABEL: &str = "MESSAGE";
const MESSAGE_BEGIN: &str = "-----BEGIN MESSAGE-----";

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unrecognized entry header {0:?}")]
    UnknownHeader(String),

    #[error("line {0:?} is not `key: value`")]
    MalformedLine(String),

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("duplicate field {0}")]
    DuplicateField(&'static str),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("malformed value for field {0}")]
    MalformedField(&'static str),

    #[error("annotation references no entries")]
    EmptyAnnotation,

    #[error("annotation references its own entry")]
    SelfReference,

    #[error("malformed armored message block")]
    MalformedMessage,
}

/// The operations shared by both entry kinds.
///
/// An entry's ID is the content hash assigned by the object store when the
/// entry commit is written; it is never chosen by the author.
pub trait LogEntry {
    fn id(&self) -> Hash;

    /// The sequence number; `None` on entries from before numbering was
    /// introduced.
    fn number(&self) -> Option<u64>;

    fn parent(&self) -> Option<Hash>;

    /// The canonical commit message encoding this entry.
    fn to_message(&self) -> String;
}

/// "Reference R moved to target T."
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceEntry {
    pub id: Hash,
    pub ref_name: String,
    pub target: Hash,
    pub number: Option<u64>,
    pub parent: Option<Hash>,
}

impl LogEntry for ReferenceEntry {
    fn id(&self) -> Hash {
        self.id
    }

    fn number(&self) -> Option<u64> {
        self.number
    }

    fn parent(&self) -> Option<Hash> {
        self.parent
    }

    fn to_message(&self) -> String {
        let mut message = format!(
            "{}\n\nref: {}\ntargetID: {}\n",
            REFERENCE_ENTRY_HEADER, self.ref_name, self.target
        );
        if let Some(number) = self.number {
            message.push_str(&format!("number: {}\n", number));
        }
        message
    }
}

/// A comment on, or revocation of, one or more earlier entries.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationEntry {
    pub id: Hash,
    pub entry_ids: NonEmpty<Hash>,
    pub skip: bool,
    pub message: String,
    pub number: Option<u64>,
    pub parent: Option<Hash>,
}

impl AnnotationEntry {
    pub fn refers_to(&self, id: Hash) -> bool {
        self.entry_ids.iter().any(|e| *e == id)
    }
}

impl LogEntry for AnnotationEntry {
    fn id(&self) -> Hash {
        self.id
    }

    fn number(&self) -> Option<u64> {
        self.number
    }

    fn parent(&self) -> Option<Hash> {
        self.parent
    }

    fn to_message(&self) -> String {
        let mut message = format!("{}\n\n", ANNOTATION_ENTRY_HEADER);
        for id in self.entry_ids.iter() {
            message.push_str(&format!("entryID: {}\n", id));
        }
        message.push_str(&format!("skip: {}\n", self.skip));
        if let Some(number) = self.number {
            message.push_str(&format!("number: {}\n", number));
        }
        if !self.message.is_empty() {
            message.push('\n');
            message.push_str(&armor(MESSAGE_LABEL, self.message.as_bytes()));
        }
        message
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Reference(ReferenceEntry),
    Annotation(AnnotationEntry),
}

impl Entry {
    /// Parse an entry from its commit message. `id` and `parent` come from
    /// the enclosing commit.
    pub fn parse(id: Hash, parent: Option<Hash>, message: &str) -> Result<Self, ParseError> {
        let mut lines = message.lines();
        let header = lines.next().unwrap_or("").trim_end().to_owned();
        let body: Vec<&str> = lines.collect();

        match header.as_str() {
            REFERENCE_ENTRY_HEADER => parse_reference(id, parent, &body).map(Self::Reference),
            ANNOTATION_ENTRY_HEADER => parse_annotation(id, parent, &body).map(Self::Annotation),
            _ => Err(ParseError::UnknownHeader(header)),
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceEntry> {
        match self {
            Self::Reference(entry) => Some(entry),
            Self::Annotation(_) => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&AnnotationEntry> {
        match self {
            Self::Reference(_) => None,
            Self::Annotation(entry) => Some(entry),
        }
    }
}

impl LogEntry for Entry {
    fn id(&self) -> Hash {
        match self {
            Self::Reference(e) => e.id(),
            Self::Annotation(e) => e.id(),
        }
    }

    fn number(&self) -> Option<u64> {
        match self {
            Self::Reference(e) => e.number(),
            Self::Annotation(e) => e.number(),
        }
    }

    fn parent(&self) -> Option<Hash> {
        match self {
            Self::Reference(e) => e.parent(),
            Self::Annotation(e) => e.parent(),
        }
    }

    fn to_message(&self) -> String {
        match self {
            Self::Reference(e) => e.to_message(),
            Self::Annotation(e) => e.to_message(),
        }
    }
}

fn parse_number(value: &str) -> Result<u64, ParseError> {
    match value.parse::<u64>() {
        Ok(0) | Err(_) => Err(ParseError::MalformedField("number")),
        Ok(n) => Ok(n),
    }
}

fn parse_reference(
    id: Hash,
    parent: Option<Hash>,
    body: &[&str],
) -> Result<ReferenceEntry, ParseError> {
    let mut ref_name: Option<String> = None;
    let mut target: Option<Hash> = None;
    let mut number: Option<u64> = None;

    for line in body {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(": ")
            .ok_or_else(|| ParseError::MalformedLine(line.to_owned()))?;
        match key {
            "ref" => {
                if ref_name.replace(value.to_owned()).is_some() {
                    return Err(ParseError::DuplicateField("ref"));
                }
            },
            "targetID" => {
                let parsed = value
                    .parse()
                    .map_err(|_| ParseError::MalformedField("targetID"))?;
                if target.replace(parsed).is_some() {
                    return Err(ParseError::DuplicateField("targetID"));
                }
            },
            "number" => {
                if number.replace(parse_number(value)?).is_some() {
                    return Err(ParseError::DuplicateField("number"));
                }
            },
            _ => return Err(ParseError::UnknownField(key.to_owned())),
        }
    }

    Ok(ReferenceEntry {
        id,
        ref_name: ref_name.ok_or(ParseError::MissingField("ref"))?,
        target: target.ok_or(ParseError::MissingField("targetID"))?,
        number,
        parent,
    })
}

fn parse_annotation(
    id: Hash,
    parent: Option<Hash>,
    body: &[&str],
) -> Result<AnnotationEntry, ParseError> {
    let mut entry_ids: Vec<Hash> = Vec::new();
    let mut skip: Option<bool> = None;
    let mut number: Option<u64> = None;
    let mut message = String::new();

    let mut at = 0;
    while at < body.len() {
        let line = body[at].trim_end();
        at += 1;
        if line.is_empty() {
            continue;
        }
        if line == MESSAGE_BEGIN {
            let block: String = body[at - 1..].join("\n");
            let raw =
                dearmor(MESSAGE_LABEL, &block).map_err(|_| ParseError::MalformedMessage)?;
            message = String::from_utf8(raw).map_err(|_| ParseError::MalformedMessage)?;
            break;
        }
        let (key, value) = line
            .split_once(": ")
            .ok_or_else(|| ParseError::MalformedLine(line.to_owned()))?;
        match key {
            "entryID" => {
                let parsed: Hash = value
                    .parse()
                    .map_err(|_| ParseError::MalformedField("entryID"))?;
                if parsed == id {
                    return Err(ParseError::SelfReference);
                }
                entry_ids.push(parsed);
            },
            "skip" => {
                let parsed = match value {
                    "true" => true,
                    "false" => false,
                    _ => return Err(ParseError::MalformedField("skip")),
                };
                if skip.replace(parsed).is_some() {
                    return Err(ParseError::DuplicateField("skip"));
                }
            },
            "number" => {
                if number.replace(parse_number(value)?).is_some() {
                    return Err(ParseError::DuplicateField("number"));
                }
            },
            _ => return Err(ParseError::UnknownField(key.to_owned())),
        }
    }

    Ok(AnnotationEntry {
        id,
        entry_ids: NonEmpty::from_vec(entry_ids).ok_or(ParseError::EmptyAnnotation)?,
        skip: skip.ok_or(ParseError::MissingField("skip"))?,
        message,
        number,
        parent,
    })
}
