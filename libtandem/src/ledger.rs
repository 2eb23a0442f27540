// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The participant's inventory of remaining tickets per date.

use std::collections::BTreeMap;

use crate::booking::BookingRequest;
use crate::error::InvalidStateError;

/// Remaining ticket counts keyed by date index.
///
/// The ledger is only read while voting; it changes only when a commit decision is applied.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ledger {
    remaining: BTreeMap<u32, u32>,
}

impl Ledger {
    pub fn remaining(&self, date: u32) -> Option<u32> {
        self.remaining.get(&date).copied()
    }

    pub fn set_remaining(&mut self, date: u32, tickets: u32) {
        self.remaining.insert(date, tickets);
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.remaining.iter().map(|(date, tickets)| (*date, *tickets))
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Returns true if every requested date has at least the requested number of tickets left.
    ///
    /// A date the ledger does not know has no tickets. A date listed more than once needs the
    /// tickets once per listing.
    pub fn can_reserve(&self, request: &BookingRequest) -> bool {
        self.remaining_after(request).is_some()
    }

    /// Deducts the request's tickets from every date it references.
    ///
    /// Nothing is deducted unless the whole request fits.
    pub fn reserve(&mut self, request: &BookingRequest) -> Result<(), InvalidStateError> {
        let updated = self.remaining_after(request).ok_or_else(|| {
            InvalidStateError::with_message(format!(
                "insufficient inventory to apply request {}",
                request.id()
            ))
        })?;

        for (date, left) in updated {
            if let Some(tickets) = self.remaining.get_mut(&date) {
                *tickets = left;
            }
        }

        Ok(())
    }

    /// Computes the per-date counts left once `request` is applied, or None if it does not fit.
    fn remaining_after(&self, request: &BookingRequest) -> Option<BTreeMap<u32, u32>> {
        let mut demand: BTreeMap<u32, u32> = BTreeMap::new();
        for date in request.dates() {
            let needed = demand.entry(*date).or_insert(0);
            *needed = needed.checked_add(request.tickets())?;
        }

        demand
            .into_iter()
            .map(|(date, needed)| {
                self.remaining(date)
                    .unwrap_or(0)
                    .checked_sub(needed)
                    .map(|left| (date, left))
            })
            .collect()
    }
}

impl FromIterator<(u32, u32)> for Ledger {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Ledger {
            remaining: iter.into_iter().collect(),
        }
    }
}
