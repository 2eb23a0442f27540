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

use crate::booking::{BookingRequest, Decision, Outcome, TxnId};
use crate::process::Process;
use crate::time::Time;

/// A participant as tracked by the coordinator for the transaction in flight.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Participant<P> {
    pub process: P,
    pub vote: Option<bool>,
    pub decision_ack: bool,
}

impl<P> Participant<P> {
    pub fn new(process: P) -> Participant<P> {
        Participant {
            process,
            vote: None,
            decision_ack: false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoordinatorState<T>
where
    T: Time,
{
    /// No transaction in flight; waiting for the next request.
    Idle,
    AwaitingVotes {
        vote_timeout_start: T,
    },
    Deciding {
        decision: Decision,
    },
    AwaitingAcks {
        decision: Decision,
        ack_timeout_start: T,
    },
    Done {
        outcome: Outcome,
    },
    /// The transaction ended without a decision being sent.
    Aborted,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoordinatorContext<P, T>
where
    P: Process,
    T: Time,
{
    pub(super) participants: Vec<Participant<P>>,
    pub(super) request: Option<BookingRequest>,
    pub(super) state: CoordinatorState<T>,
}

impl<P, T> CoordinatorContext<P, T>
where
    P: Process,
    T: Time,
{
    pub fn new(participants: Vec<P>) -> Self {
        CoordinatorContext {
            participants: participants.into_iter().map(Participant::new).collect(),
            request: None,
            state: CoordinatorState::Idle,
        }
    }

    pub fn participants(&self) -> &[Participant<P>] {
        &self.participants
    }

    pub fn request(&self) -> Option<&BookingRequest> {
        self.request.as_ref()
    }

    pub fn state(&self) -> &CoordinatorState<T> {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, CoordinatorState::Idle)
    }

    pub(super) fn txn_id(&self) -> Option<TxnId> {
        self.request.as_ref().map(BookingRequest::id)
    }

    pub(super) fn set_state(&mut self, state: CoordinatorState<T>) {
        self.state = state;
    }

    pub(super) fn participant_mut(&mut self, process: &P) -> Option<&mut Participant<P>> {
        self.participants
            .iter_mut()
            .find(|participant| participant.process == *process)
    }

    pub(super) fn votes(&self) -> impl Iterator<Item = Option<bool>> + '_ {
        self.participants.iter().map(|participant| participant.vote)
    }

    pub(super) fn reset_participants(&mut self) {
        for participant in self.participants.iter_mut() {
            participant.vote = None;
            participant.decision_ack = false;
        }
    }
}
