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

//! Defines the communication abstractions used by the node runtimes.
//!
//! A link[^note-1] connects this process to one or more peer processes. Messages are exchanged
//! over the link in FIFO order per peer. The sending and receiving halves are separate traits so
//! that a runtime states which half it needs.
//!
//! [^note-1]: For a full explanation of links, see Cachin, Guerraoui, and Rodrigues, **Reliable and
//! Secure Distributed Programming**, 2nd ed., 2.4.

use std::time::Instant;

use crate::error::InternalError;
use crate::process::Process;
use crate::protocol::Message;

/// The sending half of a link.
pub trait Sender<P>
where
    P: Process,
{
    /// Queue a message for a given process. Returns without waiting for transmission.
    ///
    /// # Errors
    ///
    /// An [`InternalError`] is returned if the process is unknown to the link or the link has
    /// been stopped.
    fn send(&self, to_process: &P, message: Message) -> Result<(), InternalError>;
}

/// The receiving half of a link.
pub trait Receiver<P>
where
    P: Process,
{
    /// Wait for the next message from any process, up to `deadline`.
    ///
    /// Returns `None` if the deadline passes first.
    fn recv_until(&self, deadline: Instant) -> Option<(P, Message)>;
}
