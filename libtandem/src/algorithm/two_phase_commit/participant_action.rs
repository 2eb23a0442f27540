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

use crate::booking::TxnId;
use crate::process::Process;
use crate::protocol::Message;

use super::ParticipantContext;

#[derive(Debug)]
pub enum ParticipantAction<P>
where
    P: Process,
{
    Notify(ParticipantActionNotification),
    SendMessage(P, Message),
    Update { context: ParticipantContext<P> },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParticipantActionNotification {
    Voted(TxnId, bool),
    /// The ledger in the preceding `Update` now includes the booking and must be persisted
    /// before the acknowledgment is sent.
    Commit(TxnId),
    Rollback(TxnId),
    /// A new request arrived before the decision on the previous one.
    PendingReplaced(TxnId),
    MessageDropped(String),
}
