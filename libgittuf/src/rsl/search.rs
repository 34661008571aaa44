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

use super::{entry::LogEntry, Entry, Error};
use crate::hash::Hash;

/// Options for locating an entry in the log.
///
/// The walk runs from the newest candidate backwards. `before_*` bounds are
/// exclusive, `until_*` bounds inclusive; the two members of each pair are
/// mutually exclusive, and numeric bounds are only valid once the log's tip
/// carries a sequence number.
#[derive(Clone, Debug, Default)]
pub struct Search {
    pub(super) reference: Option<String>,
    pub(super) before_id: Option<Hash>,
    pub(super) before_number: Option<u64>,
    pub(super) until_id: Option<Hash>,
    pub(super) until_number: Option<u64>,
    pub(super) unskipped: bool,
    pub(super) non_control: bool,
    pub(super) reference_only: bool,
}

impl Search {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only reference entries for `reference` match.
    pub fn for_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self.reference_only = true;
        self
    }

    /// Consider only entries strictly earlier than the entry `id`.
    pub fn before_id(mut self, id: Hash) -> Self {
        self.before_id = Some(id);
        self
    }

    /// Consider only entries with a sequence number strictly below `number`.
    pub fn before_number(mut self, number: u64) -> Self {
        self.before_number = Some(number);
        self
    }

    /// Stop the walk after the entry `id` (inclusive).
    pub fn until_id(mut self, id: Hash) -> Self {
        self.until_id = Some(id);
        self
    }

    /// Stop the walk below sequence number `number` (inclusive bound).
    pub fn until_number(mut self, number: u64) -> Self {
        self.until_number = Some(number);
        self
    }

    /// Entries skipped by a subsequent annotation do not match.
    pub fn unskipped(mut self) -> Self {
        self.unskipped = true;
        self
    }

    /// Entries for control references do not match.
    pub fn non_control(mut self) -> Self {
        self.non_control = true;
        self
    }

    /// Annotation entries do not match.
    pub fn reference_entries_only(mut self) -> Self {
        self.reference_only = true;
        self
    }

    pub(super) fn validate(&self, tip: &Entry) -> Result<(), Error> {
        if self.before_id.is_some() && self.before_number.is_some() {
            return Err(Error::InvalidSearch(
                "before-id and before-number are mutually exclusive",
            ));
        }
        if self.until_id.is_some() && self.until_number.is_some() {
            return Err(Error::InvalidSearch(
                "until-id and until-number are mutually exclusive",
            ));
        }

        let numeric = self.before_number.or(self.until_number);
        if numeric.is_some() {
            let tip_number = tip.number().ok_or(Error::InvalidSearch(
                "numeric conditions need a numbered log tip",
            ))?;
            if let Some(until) = self.until_number {
                if until > tip_number {
                    return Err(Error::InvalidSearch("until-number is beyond the log tip"));
                }
            }
        }
        Ok(())
    }
}
