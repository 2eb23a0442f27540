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

//! Operator commands read from the console.

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use crate::error::InvalidStateError;
use crate::lifecycle::SystemStatus;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// Simulate a crash.
    Fail,
    /// Recover from a simulated crash.
    Recover,
    Exit,
}

impl Command {
    /// Whether the command may be issued while the node is in `status`.
    pub fn is_allowed(&self, status: SystemStatus) -> bool {
        match self {
            Command::Fail => status == SystemStatus::Normal,
            Command::Recover => status == SystemStatus::Failed,
            Command::Exit => true,
        }
    }
}

impl FromStr for Command {
    type Err = InvalidStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Command::Fail),
            "recover" => Ok(Command::Recover),
            "exit" => Ok(Command::Exit),
            other => Err(InvalidStateError::with_message(format!(
                "unknown command '{}'; expected fail, recover or exit",
                other
            ))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Fail => f.write_str("fail"),
            Command::Recover => f.write_str("recover"),
            Command::Exit => f.write_str("exit"),
        }
    }
}

/// Reads commands from `input` on a background thread.
///
/// Unknown commands are logged and skipped. The channel closes when `input` ends.
pub fn read_commands<R>(input: R) -> Receiver<Command>
where
    R: BufRead + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("commands".into())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("Unable to read command: {}", err);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => {
                        if sender.send(command).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("{}", err),
                }
            }
        });
    if let Err(err) = spawned {
        error!("Unable to start command reader: {}", err);
    }
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn parse_commands() {
        assert_eq!("fail".parse::<Command>().unwrap(), Command::Fail);
        assert_eq!(" Recover\n".parse::<Command>().unwrap(), Command::Recover);
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Exit);
        assert!("reboot".parse::<Command>().is_err());
    }

    #[test]
    fn commands_gated_by_status() {
        assert!(Command::Fail.is_allowed(SystemStatus::Normal));
        assert!(!Command::Fail.is_allowed(SystemStatus::Failed));
        assert!(Command::Recover.is_allowed(SystemStatus::Failed));
        assert!(!Command::Recover.is_allowed(SystemStatus::Normal));
        assert!(Command::Exit.is_allowed(SystemStatus::Recovery));
    }

    #[test]
    fn reader_skips_unknown_lines() {
        let commands = read_commands(Cursor::new("fail\nbogus\n\nrecover\nexit\n"));
        let received: Vec<Command> = commands.iter().collect();

        assert_eq!(
            received,
            vec![Command::Fail, Command::Recover, Command::Exit]
        );
    }
}
