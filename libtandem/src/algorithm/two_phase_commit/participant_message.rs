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

use std::convert::TryFrom;

use crate::booking::{BookingRequest, Decision, TxnId};
use crate::error::InvalidStateError;
use crate::protocol::Message;

/// A message which is delivered to a participant.
///
/// This is the subset of [`Message`] the coordinator sends which the participant's engine
/// acts on; shutdown is handled by the substrate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParticipantMessage {
    Request(BookingRequest),
    Decision(TxnId, Decision),
}

impl From<ParticipantMessage> for Message {
    fn from(message: ParticipantMessage) -> Self {
        match message {
            ParticipantMessage::Request(request) => Message::Request(request),
            ParticipantMessage::Decision(id, decision) => Message::Decision { id, decision },
        }
    }
}

impl TryFrom<Message> for ParticipantMessage {
    type Error = InvalidStateError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message {
            Message::Request(request) => Ok(ParticipantMessage::Request(request)),
            Message::Decision { id, decision } => Ok(ParticipantMessage::Decision(id, decision)),
            Message::Vote { .. } => Err(InvalidStateError::with_message(
                "Vote message cannot be handled by a participant".into(),
            )),
            Message::Ack(_) => Err(InvalidStateError::with_message(
                "Ack message cannot be handled by a participant".into(),
            )),
            Message::Shutdown => Err(InvalidStateError::with_message(
                "Shutdown message cannot be handled by a participant engine".into(),
            )),
        }
    }
}
