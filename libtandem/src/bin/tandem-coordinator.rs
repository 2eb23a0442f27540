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

//! Tandem coordinator.
//!
//! Drives every booking request through two-phase commit with the hotel and concert
//! participants, recording each outcome in the audit output.

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tandem::command::read_commands;
use tandem::error::InternalError;
use tandem::node::{run_interactive, CoordinatorNode, CoordinatorSettings};

#[derive(Parser, Debug)]
#[command(name = "tandem-coordinator")]
#[command(about = "Coordinate ticket bookings across the hotel and concert participants")]
struct Args {
    /// Configuration file: hotel address, concert address and booking file path
    config: PathBuf,

    /// Recovery log [default: log-coordinator.txt]
    #[arg(long)]
    log: Option<PathBuf>,

    /// Audit output of transaction outcomes
    #[arg(long, default_value = "output.txt")]
    output: PathBuf,

    /// Seconds to wait for a full set of votes or acknowledgments
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Pause between transactions, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pacing_millis: u64,

    /// Resume from the log left by an earlier run instead of starting over
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
    let mut settings = CoordinatorSettings::new(args.config);
    if let Some(log) = args.log {
        settings.log_path = log;
    }
    settings.output_path = args.output;
    settings.response_timeout = Duration::from_secs(args.timeout_secs);
    settings.pacing = Duration::from_millis(args.pacing_millis);

    let mut node = if args.recover {
        CoordinatorNode::resume(settings)?
    } else {
        CoordinatorNode::start(settings)?
    };

    info!("Commands: fail, recover, exit");
    run_interactive(&mut node, read_commands(BufReader::new(io::stdin())))
}
