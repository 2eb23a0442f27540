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

use crate::booking::{BookingRequest, TxnId};
use crate::ledger::Ledger;
use crate::process::Process;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParticipantState {
    /// No reservation pending; waiting for a request.
    Idle,
    /// A vote was sent; the reservation waits for the coordinator's decision.
    VotedPending { id: TxnId, vote: bool },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantContext<P>
where
    P: Process,
{
    pub(super) coordinator: P,
    pub(super) ledger: Ledger,
    pub(super) pending: Option<BookingRequest>,
    pub(super) state: ParticipantState,
}

impl<P> ParticipantContext<P>
where
    P: Process,
{
    pub fn new(coordinator: P, ledger: Ledger) -> Self {
        ParticipantContext {
            coordinator,
            ledger,
            pending: None,
            state: ParticipantState::Idle,
        }
    }

    pub fn coordinator(&self) -> &P {
        &self.coordinator
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The single reservation awaiting a decision, if any.
    pub fn pending(&self) -> Option<&BookingRequest> {
        self.pending.as_ref()
    }

    pub fn state(&self) -> &ParticipantState {
        &self.state
    }

    pub(super) fn set_state(&mut self, state: ParticipantState) {
        self.state = state;
    }
}
