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

//! Process identities.

use std::fmt::{self, Debug, Display};

/// A process taking part in the protocol, identified uniquely among its peers.
pub trait Process: Clone + Debug + Eq + PartialEq {}

impl Process for String {}

/// The fixed topology: one coordinator and the hotel and concert participants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Peer {
    Coordinator,
    Hotel,
    Concert,
}

impl Peer {
    /// The participants, in the order requests are sent to them.
    pub const PARTICIPANTS: [Peer; 2] = [Peer::Hotel, Peer::Concert];
}

impl Process for Peer {}

impl Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Peer::Coordinator => f.write_str("coordinator"),
            Peer::Hotel => f.write_str("hotel"),
            Peer::Concert => f.write_str("concert"),
        }
    }
}
