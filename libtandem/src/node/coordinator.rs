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

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::algorithm::two_phase_commit::{
    CoordinatorAction, CoordinatorActionNotification, CoordinatorAlgorithm, CoordinatorContext,
    CoordinatorEvent, CoordinatorMessage, DEFAULT_RESPONSE_TIMEOUT_SECONDS,
};
use crate::algorithm::Algorithm;
use crate::booking::{BookingRequest, Outcome, TxnId};
use crate::config::{read_bookings, CoordinatorConfig};
use crate::error::InternalError;
use crate::lifecycle::{Lifecycle, SystemStatus};
use crate::links::{Receiver, Sender};
use crate::process::Peer;
use crate::recovery::{AuditLog, CoordinatorLog};
use crate::substrate::{Substrate, POLL_INTERVAL};
use crate::time::MonotonicTimeSource;

use super::{finish, is_active, join, pause, run_engine, transition, Node};

const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// Kept apart from the participants' `log-<port>.txt`.
const DEFAULT_LOG_PATH: &str = "log-coordinator.txt";

#[derive(Clone, Debug)]
pub struct CoordinatorSettings {
    pub config_path: PathBuf,
    pub log_path: PathBuf,
    pub output_path: PathBuf,
    /// Deadline for a full set of votes, and again for a full set of acks.
    pub response_timeout: Duration,
    /// Pause between consecutive transactions.
    pub pacing: Duration,
}

impl CoordinatorSettings {
    pub fn new(config_path: PathBuf) -> Self {
        CoordinatorSettings {
            config_path,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            output_path: PathBuf::from("output.txt"),
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECONDS),
            pacing: Duration::from_secs(2),
        }
    }
}

/// The coordinator process: processes every booking request in file order, one at a time.
pub struct CoordinatorNode {
    settings: CoordinatorSettings,
    lifecycle: Lifecycle,
    substrate: Arc<Substrate>,
    engine: Option<JoinHandle<Result<CoordinatorLog, InternalError>>>,
}

impl CoordinatorNode {
    /// Dials both participants, starts a fresh audit output and begins with the first request.
    pub fn start(settings: CoordinatorSettings) -> Result<Self, InternalError> {
        let config = CoordinatorConfig::from_file(&settings.config_path)?;
        let bookings = read_bookings(config.booking_path())?;
        info!(
            "Loaded {} booking requests from {}",
            bookings.len(),
            config.booking_path().display()
        );

        let log = CoordinatorLog::new(settings.config_path.clone());
        log.write(&settings.log_path)?;
        let audit = AuditLog::create(&settings.output_path)?;

        let lifecycle = Lifecycle::default();
        let substrate = Arc::new(Substrate::connect(
            &config.participants(),
            lifecycle.clone(),
        )?);

        let mut node = CoordinatorNode {
            settings,
            lifecycle,
            substrate,
            engine: None,
        };
        node.spawn_engine(bookings, log, audit)?;
        Ok(node)
    }

    /// Resumes from the log left by an earlier coordinator process, dialing both participants
    /// anew. The audit output is continued.
    pub fn resume(settings: CoordinatorSettings) -> Result<Self, InternalError> {
        let lifecycle = Lifecycle::new(SystemStatus::Recovery);
        let (config, bookings, log, audit) = load(&settings)?;

        let substrate = Arc::new(Substrate::connect(
            &config.participants(),
            lifecycle.clone(),
        )?);

        let mut node = CoordinatorNode {
            settings,
            lifecycle,
            substrate,
            engine: None,
        };
        node.spawn_engine(bookings, log, audit)?;
        transition(&node.lifecycle, SystemStatus::Normal)?;
        info!("Recovered");
        Ok(node)
    }

    /// Blocks until the engine stops, either after the last request or on failure.
    pub fn wait(&mut self) -> Result<(), InternalError> {
        join(self.engine.take(), "coordinator").map(|_| ())
    }

    fn spawn_engine(
        &mut self,
        bookings: Vec<BookingRequest>,
        log: CoordinatorLog,
        audit: AuditLog,
    ) -> Result<(), InternalError> {
        let engine = Engine {
            substrate: Arc::clone(&self.substrate),
            lifecycle: self.lifecycle.clone(),
            algorithm: CoordinatorAlgorithm::new(MonotonicTimeSource::new())
                .with_response_timeout(self.settings.response_timeout),
            bookings,
            log,
            log_path: self.settings.log_path.clone(),
            audit,
            pacing: self.settings.pacing,
        };

        self.engine = Some(run_engine("coordinator", &self.lifecycle, move || {
            engine.run()
        })?);
        Ok(())
    }
}

impl Node for CoordinatorNode {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn fail(&mut self) -> Result<(), InternalError> {
        transition(&self.lifecycle, SystemStatus::Failed)?;
        // The engine may still queue a send until it notices the failure.
        let log = join(self.engine.take(), "coordinator")?;
        self.substrate.fail();

        if let Some(log) = log {
            log.write(&self.settings.log_path)?;
        }
        warn!("System failed");
        Ok(())
    }

    /// Resumes on the existing connections; the participants are assumed to have survived.
    fn recover(&mut self) -> Result<(), InternalError> {
        transition(&self.lifecycle, SystemStatus::Recovery)?;
        let (_, bookings, log, audit) = load(&self.settings)?;

        self.spawn_engine(bookings, log, audit)?;
        transition(&self.lifecycle, SystemStatus::Normal)?;
        info!("System recovered");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), InternalError> {
        finish(&self.lifecycle);
        let result = join(self.engine.take(), "coordinator");
        self.substrate.stop();
        result.map(|_| ())
    }
}

fn load(
    settings: &CoordinatorSettings,
) -> Result<(CoordinatorConfig, Vec<BookingRequest>, CoordinatorLog, AuditLog), InternalError> {
    let log = CoordinatorLog::read(&settings.log_path)?;
    let config = CoordinatorConfig::from_file(&log.config_path)?;
    let bookings = read_bookings(config.booking_path())?;

    if log.resume_index() > bookings.len() {
        return Err(InternalError::with_message(format!(
            "log position {} is beyond the {} booking requests",
            log.resume_index(),
            bookings.len()
        )));
    }
    info!(
        "Resuming after {} of {} requests ({} completed)",
        log.resume_index(),
        bookings.len(),
        log.cursor
    );

    let audit = AuditLog::append(&settings.output_path)?;
    Ok((config, bookings, log, audit))
}

struct Engine {
    substrate: Arc<Substrate>,
    lifecycle: Lifecycle,
    algorithm: CoordinatorAlgorithm<Peer, MonotonicTimeSource>,
    bookings: Vec<BookingRequest>,
    log: CoordinatorLog,
    log_path: PathBuf,
    audit: AuditLog,
    pacing: Duration,
}

impl Engine {
    /// Runs until every request is resolved or the node stops. Returns the log as it stands.
    fn run(mut self) -> Result<CoordinatorLog, InternalError> {
        let mut context = CoordinatorContext::new(Peer::PARTICIPANTS.to_vec());
        let mut alarm: Option<Instant> = None;
        // An alarm while idle asks for the first request.
        let mut events = VecDeque::from(vec![CoordinatorEvent::Alarm()]);
        let mut started = false;
        let mut exhausted = false;

        while is_active(&self.lifecycle) && !exhausted {
            let event = match events.pop_front() {
                Some(event) => event,
                None => match self.next_event(alarm) {
                    Some(event) => event,
                    None => continue,
                },
            };

            for action in self.algorithm.event(event, context.clone())? {
                match action {
                    CoordinatorAction::Update {
                        context: updated,
                        alarm: deadline,
                    } => {
                        context = updated;
                        alarm = deadline;
                    }
                    CoordinatorAction::SendMessage(peer, message) => {
                        self.substrate.send(&peer, message)?;
                    }
                    CoordinatorAction::Notify(notification) => match notification {
                        CoordinatorActionNotification::RequestForStart() => {
                            match self.bookings.get(self.log.resume_index()).cloned() {
                                Some(request) => {
                                    if started && !pause(&self.lifecycle, self.pacing) {
                                        break;
                                    }
                                    started = true;
                                    info!("Starting transaction {}", request.id());
                                    events.push_back(CoordinatorEvent::Start(request));
                                }
                                None => exhausted = true,
                            }
                        }
                        CoordinatorActionNotification::Decided(id, decision) => {
                            info!("Transaction {}: decided {}", id, decision);
                            self.resolve(id, decision.outcome())?;
                        }
                        CoordinatorActionNotification::Aborted(id, reason) => {
                            warn!("Transaction {} failed: {}", id, reason);
                            self.resolve(id, Outcome::Fail)?;
                        }
                        CoordinatorActionNotification::Completed { id, acknowledged } => {
                            if acknowledged {
                                self.log.complete();
                                self.log.write(&self.log_path)?;
                                info!("Transaction {} complete", id);
                            } else {
                                warn!(
                                    "Transaction {}: response timeout waiting for acknowledgments",
                                    id
                                );
                            }
                        }
                        CoordinatorActionNotification::MessageDropped(reason) => {
                            warn!("Dropped message: {}", reason)
                        }
                    },
                }
            }
        }

        if exhausted {
            self.finish_all()?;
        }
        Ok(self.log)
    }

    // Records the outcome and moves past the current request, before its decision is sent.
    fn resolve(&mut self, id: TxnId, outcome: Outcome) -> Result<(), InternalError> {
        self.audit.record(id, outcome)?;
        self.log.consume();
        self.log.write(&self.log_path)?;
        Ok(())
    }

    fn next_event(&self, alarm: Option<Instant>) -> Option<CoordinatorEvent<Peer>> {
        let now = Instant::now();
        let deadline = match alarm {
            Some(alarm) if alarm <= now => return Some(CoordinatorEvent::Alarm()),
            Some(alarm) => alarm.min(now + POLL_INTERVAL),
            None => now + POLL_INTERVAL,
        };

        let (peer, message) = self.substrate.recv_until(deadline)?;
        match CoordinatorMessage::try_from(message) {
            Ok(message) => Some(CoordinatorEvent::Deliver(peer, message)),
            Err(err) => {
                warn!("Unexpected message from {}: {}", peer, err);
                None
            }
        }
    }

    fn finish_all(&self) -> Result<(), InternalError> {
        info!(
            "All {} requests processed; {} completed",
            self.bookings.len(),
            self.log.cursor
        );
        for peer in Peer::PARTICIPANTS {
            self.substrate.shutdown_peer(peer)?;
        }
        if !self.substrate.flush(SHUTDOWN_FLUSH_TIMEOUT) {
            warn!("Shutdown could not be delivered to every participant");
        }
        transition(&self.lifecycle, SystemStatus::Finished)
    }
}
