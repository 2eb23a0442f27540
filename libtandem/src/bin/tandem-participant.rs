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

//! Tandem participant.
//!
//! Holds the ticket inventory for one venue and votes on the coordinator's booking requests.

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tandem::command::read_commands;
use tandem::error::InternalError;
use tandem::node::{run_interactive, ParticipantNode, ParticipantSettings};

#[derive(Parser, Debug)]
#[command(name = "tandem-participant")]
#[command(about = "Hold a venue's ticket inventory and vote on booking requests")]
struct Args {
    /// Configuration file: listen address, then one `date tickets` line per date
    config: PathBuf,

    /// Ledger snapshot [default: storage-<port>.txt]
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Recovery log [default: log-<port>.txt]
    #[arg(long)]
    log: Option<PathBuf>,

    /// Simulated processing time per message, in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_millis: u64,

    /// Resume from the ledger snapshot left by an earlier run
    #[arg(long)]
    recover: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    };

    if let Err(err) = run(args) {
        error!("{}", err);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), InternalError> {
    let mut settings = ParticipantSettings::new(args.config)?;
    if let Some(storage) = args.storage {
        settings.storage_path = storage;
    }
    if let Some(log) = args.log {
        settings.log_path = log;
    }
    settings.processing_delay = Duration::from_millis(args.delay_millis);

    let mut node = if args.recover {
        ParticipantNode::resume(settings)?
    } else {
        ParticipantNode::start(settings)?
    };

    info!("Commands: fail, recover, exit");
    run_interactive(&mut node, read_commands(BufReader::new(io::stdin())))
}
