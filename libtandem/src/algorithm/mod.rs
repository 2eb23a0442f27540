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

//! Protocol engines expressed as pure state machines.
//!
//! An [`Algorithm`] never performs I/O. It is handed an event together with the current context
//! and answers with the actions the caller must carry out, in order: replacing the context,
//! sending messages and surfacing notifications. This keeps every protocol decision testable
//! without sockets or threads.

use crate::error::AlgorithmError;
use crate::process::Process;

pub mod two_phase_commit;

pub trait Algorithm<P>
where
    P: Process,
{
    type Event;
    type Action;
    type Context;

    fn event(
        &self,
        event: Self::Event,
        context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError>;
}
