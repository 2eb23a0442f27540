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

//! Tandem coordinates ticket bookings across two inventory participants with the two-phase
//! commit protocol.
//!
//! The protocol engines are pure state machines ([`algorithm`]) driven by node runtimes which
//! exchange framed messages ([`protocol`]) over a threaded communication substrate. A durable
//! log ([`recovery`]) lets either side resume after a simulated crash.

#[macro_use]
extern crate log;

#[cfg(feature = "algorithm")]
pub mod algorithm;
mod booking;
pub mod command;
pub mod config;
pub mod error;
mod ledger;
pub mod lifecycle;
#[cfg(feature = "links")]
pub mod links;
#[cfg(any(feature = "coordinator", feature = "participant"))]
pub mod node;
mod process;
pub mod protocol;
pub mod recovery;
#[cfg(feature = "substrate")]
pub mod substrate;
#[cfg(feature = "time")]
mod time;

pub use booking::{BookingRequest, Decision, Outcome, TxnId};
pub use ledger::Ledger;
pub use lifecycle::{Lifecycle, SystemStatus};
pub use process::{Peer, Process};
#[cfg(feature = "time")]
pub use time::{MonotonicTimeSource, Time, TimeSource};
