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

//! Messages exchanged between the coordinator and the participants, and their wire encoding.

mod codec;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::booking::{BookingRequest, Decision, TxnId};

pub use codec::{decode_frame, encode_frame, FrameBuffer, MAX_FRAME_LEN, MAX_REQUEST_DATES};

/// A unit of the protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// Coordinator to participant: may the booking be reserved?
    Request(BookingRequest),
    /// Participant to coordinator: the answer to a request.
    Vote { id: TxnId, vote: bool },
    /// Coordinator to participant: the binding verdict.
    Decision { id: TxnId, decision: Decision },
    /// Participant to coordinator: the verdict has been applied.
    Ack(TxnId),
    /// Coordinator to participant: no further transactions; stop.
    Shutdown,
}

impl Message {
    /// The transaction a message belongs to, if any.
    pub fn txn_id(&self) -> Option<TxnId> {
        match self {
            Message::Request(request) => Some(request.id()),
            Message::Vote { id, .. } | Message::Decision { id, .. } | Message::Ack(id) => {
                Some(*id)
            }
            Message::Shutdown => None,
        }
    }
}

/// A message as carried on the wire, stamped with its creation time.
///
/// The timestamp is informational only.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub timestamp: u32,
    pub message: Message,
}

impl Frame {
    pub fn new(message: Message) -> Self {
        Frame {
            timestamp: unix_timestamp(),
            message,
        }
    }
}

fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}
