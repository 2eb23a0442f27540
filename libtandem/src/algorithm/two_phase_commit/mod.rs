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

//! Two-phase commit over booking requests, for a coordinator and its participants.
//!
//! The coordinator handles one request at a time. It asks every participant for a vote,
//! decides commit only on a unanimous yes, broadcasts the decision and collects
//! acknowledgments before asking for the next request. Participants vote on whether their
//! ledger can hold the booking and apply or discard it once the decision arrives.

mod coordinator_action;
mod coordinator_algorithm;
mod coordinator_context;
mod coordinator_event;
mod coordinator_message;
mod participant_action;
mod participant_algorithm;
mod participant_context;
mod participant_event;
mod participant_message;

pub use coordinator_action::{CoordinatorAction, CoordinatorActionNotification};
pub use coordinator_algorithm::{CoordinatorAlgorithm, DEFAULT_RESPONSE_TIMEOUT_SECONDS};
pub use coordinator_context::{CoordinatorContext, CoordinatorState, Participant};
pub use coordinator_event::CoordinatorEvent;
pub use coordinator_message::CoordinatorMessage;
pub use participant_action::{ParticipantAction, ParticipantActionNotification};
pub use participant_algorithm::ParticipantAlgorithm;
pub use participant_context::{ParticipantContext, ParticipantState};
pub use participant_event::ParticipantEvent;
pub use participant_message::ParticipantMessage;
