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

use crate::booking::TxnId;
use crate::error::InvalidStateError;
use crate::protocol::Message;

/// A message which is delivered to the coordinator.
///
/// This is the subset of [`Message`] a participant may send.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoordinatorMessage {
    Vote(TxnId, bool),
    Ack(TxnId),
}

impl From<CoordinatorMessage> for Message {
    fn from(message: CoordinatorMessage) -> Self {
        match message {
            CoordinatorMessage::Vote(id, vote) => Message::Vote { id, vote },
            CoordinatorMessage::Ack(id) => Message::Ack(id),
        }
    }
}

impl TryFrom<Message> for CoordinatorMessage {
    type Error = InvalidStateError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message {
            Message::Vote { id, vote } => Ok(CoordinatorMessage::Vote(id, vote)),
            Message::Ack(id) => Ok(CoordinatorMessage::Ack(id)),
            Message::Request(_) => Err(InvalidStateError::with_message(
                "Request message cannot be handled by a coordinator".into(),
            )),
            Message::Decision { .. } => Err(InvalidStateError::with_message(
                "Decision message cannot be handled by a coordinator".into(),
            )),
            Message::Shutdown => Err(InvalidStateError::with_message(
                "Shutdown message cannot be handled by a coordinator".into(),
            )),
        }
    }
}
