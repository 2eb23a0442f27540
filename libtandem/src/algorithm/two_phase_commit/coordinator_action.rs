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

use crate::booking::{Decision, TxnId};
use crate::process::Process;
use crate::protocol::Message;
use crate::time::Time;

use super::CoordinatorContext;

#[derive(Debug)]
pub enum CoordinatorAction<P, T>
where
    P: Process,
    T: Time,
{
    Update {
        context: CoordinatorContext<P, T>,
        alarm: Option<T>,
    },
    SendMessage(P, Message),
    Notify(CoordinatorActionNotification),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CoordinatorActionNotification {
    /// The coordinator is idle and needs the next request.
    RequestForStart(),
    /// A decision was reached and is about to be broadcast.
    Decided(TxnId, Decision),
    /// The transaction ended without a decision; it has failed.
    Aborted(TxnId, String),
    /// The decision cycle ended. `acknowledged` is true only if every participant acked.
    Completed { id: TxnId, acknowledged: bool },
    MessageDropped(String),
}
