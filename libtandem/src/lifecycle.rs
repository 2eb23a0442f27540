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

//! The process-wide lifecycle status, owned by a single handle shared between components.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::InvalidStateError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SystemStatus {
    Normal,
    Failed,
    Recovery,
    Finished,
}

impl SystemStatus {
    fn can_become(self, next: SystemStatus) -> bool {
        matches!(
            (self, next),
            (SystemStatus::Normal, SystemStatus::Failed)
                | (SystemStatus::Normal, SystemStatus::Finished)
                | (SystemStatus::Failed, SystemStatus::Recovery)
                | (SystemStatus::Failed, SystemStatus::Finished)
                | (SystemStatus::Recovery, SystemStatus::Normal)
                | (SystemStatus::Recovery, SystemStatus::Failed)
                | (SystemStatus::Recovery, SystemStatus::Finished)
        )
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SystemStatus::Normal => "NORMAL",
            SystemStatus::Failed => "FAILED",
            SystemStatus::Recovery => "RECOVERY",
            SystemStatus::Finished => "FINISHED",
        };
        f.write_str(name)
    }
}

/// A cloneable handle to the status of one process.
///
/// Every clone observes the same status. Transitions are checked:
/// `NORMAL -> FAILED -> RECOVERY -> NORMAL`, and any status except `FINISHED` may finish.
#[derive(Clone)]
pub struct Lifecycle {
    status: Arc<Mutex<SystemStatus>>,
}

impl Lifecycle {
    pub fn new(status: SystemStatus) -> Self {
        Lifecycle {
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub fn status(&self) -> SystemStatus {
        *self.status.lock()
    }

    pub fn is(&self, status: SystemStatus) -> bool {
        self.status() == status
    }

    pub fn is_finished(&self) -> bool {
        self.is(SystemStatus::Finished)
    }

    /// Moves to `next`, failing if the current status does not allow it.
    pub fn transition(&self, next: SystemStatus) -> Result<(), InvalidStateError> {
        let mut status = self.status.lock();
        if !status.can_become(next) {
            return Err(InvalidStateError::with_message(format!(
                "cannot move from {} to {}",
                *status, next
            )));
        }

        debug!("Status {} -> {}", *status, next);
        *status = next;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::new(SystemStatus::Normal)
    }
}
