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

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::algorithm::two_phase_commit::{
    ParticipantAction, ParticipantActionNotification, ParticipantAlgorithm, ParticipantContext,
    ParticipantEvent, ParticipantMessage,
};
use crate::algorithm::Algorithm;
use crate::config::ParticipantConfig;
use crate::error::InternalError;
use crate::ledger::Ledger;
use crate::lifecycle::{Lifecycle, SystemStatus};
use crate::links::{Receiver, Sender};
use crate::process::Peer;
use crate::recovery::{read_snapshot, write_snapshot, ParticipantLog};
use crate::substrate::{Substrate, POLL_INTERVAL};

use super::{finish, is_active, join, pause, run_engine, transition, Node};

#[derive(Clone, Debug)]
pub struct ParticipantSettings {
    pub config_path: PathBuf,
    /// Where the ledger snapshot is kept.
    pub storage_path: PathBuf,
    pub log_path: PathBuf,
    /// Simulated processing time for each message.
    pub processing_delay: Duration,
}

impl ParticipantSettings {
    /// Settings with the snapshot and log named after the configured listen port, so that
    /// participants sharing a directory keep separate files.
    pub fn new(config_path: PathBuf) -> Result<Self, InternalError> {
        let config = ParticipantConfig::from_file(&config_path)?;
        let port = config.port().ok_or_else(|| {
            InternalError::with_message(format!("no port in listen address {}", config.listen()))
        })?;

        Ok(ParticipantSettings {
            config_path,
            storage_path: PathBuf::from(format!("storage-{}.txt", port)),
            log_path: PathBuf::from(format!("log-{}.txt", port)),
            processing_delay: Duration::from_secs(1),
        })
    }
}

/// A participant process: votes on requests against its ledger and applies decisions.
pub struct ParticipantNode {
    settings: ParticipantSettings,
    lifecycle: Lifecycle,
    substrate: Arc<Substrate>,
    engine: Option<JoinHandle<Result<(), InternalError>>>,
}

impl ParticipantNode {
    /// Binds the configured listen address and starts from the configured inventory.
    pub fn start(settings: ParticipantSettings) -> Result<Self, InternalError> {
        let config = ParticipantConfig::from_file(&settings.config_path)?;
        let listener = bind(&config)?;
        Self::start_with(settings, config, listener)
    }

    /// Starts from the configured inventory, accepting on an already bound listener instead of
    /// the configured address.
    pub fn with_listener(
        settings: ParticipantSettings,
        listener: TcpListener,
    ) -> Result<Self, InternalError> {
        let config = ParticipantConfig::from_file(&settings.config_path)?;
        Self::start_with(settings, config, listener)
    }

    /// Resumes from the log and ledger snapshot left by an earlier participant process.
    pub fn resume(settings: ParticipantSettings) -> Result<Self, InternalError> {
        let lifecycle = Lifecycle::new(SystemStatus::Recovery);
        let (config, ledger) = load(&settings)?;
        let listener = bind(&config)?;

        let substrate = Arc::new(Substrate::listen(listener, lifecycle.clone())?);
        let mut node = ParticipantNode {
            settings,
            lifecycle,
            substrate,
            engine: None,
        };
        node.spawn_engine(ledger)?;
        transition(&node.lifecycle, SystemStatus::Normal)?;
        info!("Recovered");
        Ok(node)
    }

    fn start_with(
        settings: ParticipantSettings,
        config: ParticipantConfig,
        listener: TcpListener,
    ) -> Result<Self, InternalError> {
        ParticipantLog::new(settings.config_path.clone()).write(&settings.log_path)?;
        let ledger = config.inventory().clone();
        write_snapshot(&settings.storage_path, &ledger)?;

        let lifecycle = Lifecycle::default();
        let substrate = Arc::new(Substrate::listen(listener, lifecycle.clone())?);
        let mut node = ParticipantNode {
            settings,
            lifecycle,
            substrate,
            engine: None,
        };
        node.spawn_engine(ledger)?;
        Ok(node)
    }

    /// Blocks until the engine stops, normally when the coordinator sends shutdown.
    pub fn wait(&mut self) -> Result<(), InternalError> {
        join(self.engine.take(), "participant").map(|_| ())
    }

    fn spawn_engine(&mut self, ledger: Ledger) -> Result<(), InternalError> {
        let engine = Engine {
            substrate: Arc::clone(&self.substrate),
            lifecycle: self.lifecycle.clone(),
            algorithm: ParticipantAlgorithm::new(),
            storage_path: self.settings.storage_path.clone(),
            processing_delay: self.settings.processing_delay,
        };

        self.engine = Some(run_engine("participant", &self.lifecycle, move || {
            engine.run(ledger)
        })?);
        Ok(())
    }
}

impl Node for ParticipantNode {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Any pending reservation is lost; the coordinator times out waiting on it.
    fn fail(&mut self) -> Result<(), InternalError> {
        transition(&self.lifecycle, SystemStatus::Failed)?;
        // The engine may still queue a send until it notices the failure.
        join(self.engine.take(), "participant")?;
        self.substrate.fail();

        ParticipantLog::new(self.settings.config_path.clone()).write(&self.settings.log_path)?;
        warn!("System failed");
        Ok(())
    }

    fn recover(&mut self) -> Result<(), InternalError> {
        transition(&self.lifecycle, SystemStatus::Recovery)?;
        let (_, ledger) = load(&self.settings)?;

        self.spawn_engine(ledger)?;
        transition(&self.lifecycle, SystemStatus::Normal)?;
        info!("System recovered");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), InternalError> {
        finish(&self.lifecycle);
        let result = join(self.engine.take(), "participant");
        self.substrate.stop();
        result.map(|_| ())
    }
}

fn bind(config: &ParticipantConfig) -> Result<TcpListener, InternalError> {
    TcpListener::bind(config.listen()).map_err(|err| {
        InternalError::with_message(format!("Unable to listen on {}: {}", config.listen(), err))
    })
}

fn load(settings: &ParticipantSettings) -> Result<(ParticipantConfig, Ledger), InternalError> {
    let log = ParticipantLog::read(&settings.log_path)?;
    let config = ParticipantConfig::from_file(&log.config_path)?;
    let ledger = read_snapshot(&settings.storage_path)?;
    info!(
        "Loaded ledger of {} dates from {}",
        ledger.entries().count(),
        settings.storage_path.display()
    );
    Ok((config, ledger))
}

struct Engine {
    substrate: Arc<Substrate>,
    lifecycle: Lifecycle,
    algorithm: ParticipantAlgorithm<Peer>,
    storage_path: PathBuf,
    processing_delay: Duration,
}

impl Engine {
    fn run(self, ledger: Ledger) -> Result<(), InternalError> {
        let mut context = ParticipantContext::new(Peer::Coordinator, ledger);

        while is_active(&self.lifecycle) {
            let (peer, message) = match self.substrate.recv_until(Instant::now() + POLL_INTERVAL) {
                Some(received) => received,
                None => continue,
            };
            let message = match ParticipantMessage::try_from(message) {
                Ok(message) => message,
                Err(err) => {
                    warn!("Unexpected message from {}: {}", peer, err);
                    continue;
                }
            };

            if !pause(&self.lifecycle, self.processing_delay) {
                break;
            }

            let event = ParticipantEvent::Deliver(peer, message);
            for action in self.algorithm.event(event, context.clone())? {
                match action {
                    ParticipantAction::Update { context: updated } => context = updated,
                    ParticipantAction::SendMessage(peer, message) => {
                        self.substrate.send(&peer, message)?;
                    }
                    ParticipantAction::Notify(notification) => match notification {
                        ParticipantActionNotification::Voted(id, vote) => {
                            info!(
                                "Transaction {}: voted {}",
                                id,
                                if vote { "yes" } else { "no" }
                            );
                        }
                        // Persisted before the acknowledgment is sent.
                        ParticipantActionNotification::Commit(id) => {
                            write_snapshot(&self.storage_path, context.ledger())?;
                            info!("Transaction {}: committed", id);
                        }
                        ParticipantActionNotification::Rollback(id) => {
                            info!("Transaction {}: rolled back", id);
                        }
                        ParticipantActionNotification::PendingReplaced(id) => {
                            warn!("Transaction {} replaced before its decision arrived", id);
                        }
                        ParticipantActionNotification::MessageDropped(reason) => {
                            warn!("Dropped message: {}", reason);
                        }
                    },
                }
            }
        }

        Ok(())
    }
}
