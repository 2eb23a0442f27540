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

//! Node runtimes: each drives a protocol algorithm over the substrate and keeps its durable
//! state, and can simulate a crash and recover from it.

#[cfg(feature = "coordinator")]
mod coordinator;
#[cfg(feature = "participant")]
mod participant;

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::error::{InternalError, InvalidStateError};
use crate::lifecycle::{Lifecycle, SystemStatus};
use crate::substrate::POLL_INTERVAL;

#[cfg(feature = "coordinator")]
pub use coordinator::{CoordinatorNode, CoordinatorSettings};
#[cfg(feature = "participant")]
pub use participant::{ParticipantNode, ParticipantSettings};

/// A running node that an operator can crash, recover and stop.
pub trait Node {
    fn lifecycle(&self) -> &Lifecycle;

    /// Simulates a crash: drops queued messages and in-memory protocol state, and persists the
    /// log. The node stays failed until recovered.
    fn fail(&mut self) -> Result<(), InternalError>;

    /// Reloads durable state and restarts the protocol engine.
    fn recover(&mut self) -> Result<(), InternalError>;

    /// Stops the node and releases its connections.
    fn shutdown(&mut self) -> Result<(), InternalError>;
}

/// Applies operator commands to `node` until it finishes or is told to exit, then shuts it down.
pub fn run_interactive<N: Node>(
    node: &mut N,
    commands: Receiver<Command>,
) -> Result<(), InternalError> {
    let mut console_open = true;

    while !node.lifecycle().is_finished() {
        if !console_open {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let command = match commands.recv_timeout(POLL_INTERVAL) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Console closed");
                console_open = false;
                continue;
            }
        };

        let status = node.lifecycle().status();
        if !command.is_allowed(status) {
            warn!("Command '{}' is not allowed while {}", command, status);
            continue;
        }

        match command {
            Command::Fail => node.fail()?,
            Command::Recover => node.recover()?,
            Command::Exit => {
                info!("Exiting");
                break;
            }
        }
    }

    node.shutdown()
}

fn transition(lifecycle: &Lifecycle, next: SystemStatus) -> Result<(), InternalError> {
    lifecycle
        .transition(next)
        .map_err(|err: InvalidStateError| InternalError::with_message(err.to_string()))
}

// Marks the lifecycle finished unless it already is.
fn finish(lifecycle: &Lifecycle) {
    if !lifecycle.is_finished() {
        if let Err(err) = lifecycle.transition(SystemStatus::Finished) {
            warn!("{}", err);
        }
    }
}

// The engine keeps working through Recovery; it stops once failed or finished.
fn is_active(lifecycle: &Lifecycle) -> bool {
    matches!(
        lifecycle.status(),
        SystemStatus::Normal | SystemStatus::Recovery
    )
}

// Sleeps for `duration` unless the engine is stopped first. Returns whether it is still active.
fn pause(lifecycle: &Lifecycle, duration: Duration) -> bool {
    let until = Instant::now() + duration;
    loop {
        if !is_active(lifecycle) {
            return false;
        }
        let now = Instant::now();
        if now >= until {
            return true;
        }
        thread::sleep((until - now).min(POLL_INTERVAL));
    }
}

// Finishes the lifecycle if the engine thread unwinds.
struct FinishOnPanic(Lifecycle);

impl Drop for FinishOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            finish(&self.0);
        }
    }
}

// Runs an engine on its own thread. The lifecycle is finished when the engine returns an error
// or panics.
fn run_engine<T, F>(
    name: &str,
    lifecycle: &Lifecycle,
    engine: F,
) -> Result<JoinHandle<Result<T, InternalError>>, InternalError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, InternalError> + Send + 'static,
{
    let lifecycle = lifecycle.clone();
    let label = name.to_string();
    thread::Builder::new()
        .name(label.clone())
        .spawn(move || {
            let guard = FinishOnPanic(lifecycle);
            let result = engine();
            if let Err(err) = &result {
                error!("{} engine stopped: {}", label, err);
                finish(&guard.0);
            }
            result
        })
        .map_err(|err| InternalError::from_source(Box::new(err)))
}

fn join<T>(
    handle: Option<JoinHandle<Result<T, InternalError>>>,
    name: &str,
) -> Result<Option<T>, InternalError> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| InternalError::with_message(format!("{} engine panicked", name)))?
            .map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;

    struct Recorder {
        lifecycle: Lifecycle,
        calls: Vec<&'static str>,
    }

    impl Node for Recorder {
        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }

        fn fail(&mut self) -> Result<(), InternalError> {
            self.calls.push("fail");
            transition(&self.lifecycle, SystemStatus::Failed)
        }

        fn recover(&mut self) -> Result<(), InternalError> {
            self.calls.push("recover");
            transition(&self.lifecycle, SystemStatus::Recovery)?;
            transition(&self.lifecycle, SystemStatus::Normal)
        }

        fn shutdown(&mut self) -> Result<(), InternalError> {
            self.calls.push("shutdown");
            finish(&self.lifecycle);
            Ok(())
        }
    }

    /// Commands not allowed in the current status are skipped.
    #[test]
    fn commands_applied_in_order() {
        let (sender, receiver) = mpsc::channel();
        for command in [
            Command::Recover,
            Command::Fail,
            Command::Fail,
            Command::Recover,
            Command::Exit,
        ] {
            sender.send(command).unwrap();
        }

        let mut node = Recorder {
            lifecycle: Lifecycle::default(),
            calls: Vec::new(),
        };
        run_interactive(&mut node, receiver).unwrap();

        assert_eq!(node.calls, vec!["fail", "recover", "shutdown"]);
        assert!(node.lifecycle.is_finished());
    }

    #[test]
    fn returns_once_finished_elsewhere() {
        let (_sender, receiver) = mpsc::channel();
        let lifecycle = Lifecycle::default();
        let mut node = Recorder {
            lifecycle: lifecycle.clone(),
            calls: Vec::new(),
        };

        let finisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            lifecycle.transition(SystemStatus::Finished).unwrap();
        });

        run_interactive(&mut node, receiver).unwrap();
        finisher.join().unwrap();
        assert_eq!(node.calls, vec!["shutdown"]);
    }

    #[test]
    fn pause_stops_early_when_failed() {
        let lifecycle = Lifecycle::default();
        lifecycle.transition(SystemStatus::Failed).unwrap();

        let start = Instant::now();
        assert!(!pause(&lifecycle, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    /// A panicking engine must not leave the node looking healthy.
    #[test]
    fn engine_panic_finishes_lifecycle() {
        let lifecycle = Lifecycle::default();
        let handle = run_engine::<(), _>("test", &lifecycle, || panic!("engine fault")).unwrap();

        assert!(join(Some(handle), "test").is_err());
        assert!(lifecycle.is_finished());
    }

    #[test]
    fn engine_error_finishes_lifecycle() {
        let lifecycle = Lifecycle::default();
        let handle = run_engine::<(), _>("test", &lifecycle, || {
            Err(InternalError::with_message("engine fault".into()))
        })
        .unwrap();

        assert!(join(Some(handle), "test").is_err());
        assert!(lifecycle.is_finished());

        let healthy = Lifecycle::default();
        let handle = run_engine("test", &healthy, || Ok(7)).unwrap();
        assert_eq!(join(Some(handle), "test").unwrap(), Some(7));
        assert!(healthy.is(SystemStatus::Normal));
    }
}
