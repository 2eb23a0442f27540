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

//! Durable state for crash recovery.
//!
//! The coordinator log records the configuration path, the number of transactions completed
//! with every acknowledgment (the cursor) and the number of booking entries consumed (the
//! position). Participants log only their configuration path and recover their inventory from
//! the ledger snapshot. The audit output is the append-only record of transaction outcomes.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::booking::{Outcome, TxnId};
use crate::config::{parse_inventory_line, read_lines};
use crate::error::ConfigError;
use crate::ledger::Ledger;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoordinatorLog {
    pub config_path: PathBuf,
    pub cursor: usize,
    pub position: usize,
}

impl CoordinatorLog {
    pub fn new(config_path: PathBuf) -> Self {
        CoordinatorLog {
            config_path,
            cursor: 0,
            position: 0,
        }
    }

    /// Reads a log. A log without a position line resumes from its cursor.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let lines = read_lines(path)?;
        let mut lines = lines.iter();

        let config_path = lines
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::Missing("configuration path in log".into()))?;
        let cursor = match lines.next() {
            Some(line) => parse_count(line, "cursor")?,
            None => 0,
        };
        let position = match lines.next() {
            Some(line) => parse_count(line, "position")?,
            None => cursor,
        };

        if position < cursor {
            return Err(ConfigError::malformed(
                &position.to_string(),
                &format!("position is behind cursor {}", cursor),
            ));
        }

        Ok(CoordinatorLog {
            config_path,
            cursor,
            position,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        replace_file(
            path,
            &format!(
                "{}\n{}\n{}\n",
                self.config_path.display(),
                self.cursor,
                self.position
            ),
        )
    }

    /// Number of leading booking entries to skip when resuming.
    pub fn resume_index(&self) -> usize {
        self.position
    }

    /// Records that the entry at the current position has been resolved.
    pub fn consume(&mut self) {
        self.position += 1;
    }

    /// Records that a transaction was completed with every acknowledgment.
    pub fn complete(&mut self) {
        self.cursor += 1;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantLog {
    pub config_path: PathBuf,
}

impl ParticipantLog {
    pub fn new(config_path: PathBuf) -> Self {
        ParticipantLog { config_path }
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        read_lines(path)?
            .into_iter()
            .next()
            .map(|line| ParticipantLog {
                config_path: PathBuf::from(line),
            })
            .ok_or_else(|| ConfigError::Missing("configuration path in log".into()))
    }

    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        replace_file(path, &format!("{}\n", self.config_path.display()))
    }
}

/// Reads a ledger snapshot of `date remaining` lines.
pub fn read_snapshot(path: &Path) -> Result<Ledger, ConfigError> {
    read_lines(path)?
        .iter()
        .map(|line| parse_inventory_line(line))
        .collect()
}

/// Rewrites the ledger snapshot in full.
pub fn write_snapshot(path: &Path, ledger: &Ledger) -> Result<(), ConfigError> {
    let contents: String = ledger
        .entries()
        .map(|(date, remaining)| format!("{} {}\n", date, remaining))
        .collect();
    replace_file(path, &contents)
}

/// Append-only record of transaction outcomes, one `<id> Success|Fail` line each.
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Starts a new audit output, discarding any previous contents.
    pub fn create(path: &Path) -> Result<Self, ConfigError> {
        let file = File::create(path).map_err(|err| ConfigError::io(path, err))?;
        Ok(AuditLog {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Continues an existing audit output.
    pub fn append(path: &Path) -> Result<Self, ConfigError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| ConfigError::io(path, err))?;
        Ok(AuditLog {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn record(&mut self, id: TxnId, outcome: Outcome) -> Result<(), ConfigError> {
        writeln!(self.file, "{} {}", id, outcome)
            .and_then(|_| self.file.flush())
            .map_err(|err| ConfigError::io(&self.path, err))
    }
}

fn parse_count(line: &str, name: &str) -> Result<usize, ConfigError> {
    line.parse()
        .map_err(|_| ConfigError::malformed(line, &format!("invalid {}", name)))
}

// Writes beside the target and renames over it, so a crash leaves either the old or the new file.
fn replace_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let staging = path.with_extension("tmp");
    fs::write(&staging, contents).map_err(|err| ConfigError::io(&staging, err))?;
    fs::rename(&staging, path).map_err(|err| ConfigError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_log_keeps_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        let mut log = CoordinatorLog::new(PathBuf::from("coordinator.txt"));
        log.consume();
        log.complete();
        log.consume();
        log.write(&path).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "coordinator.txt\n1\n2\n"
        );
        let read = CoordinatorLog::read(&path).unwrap();
        assert_eq!(read, log);
        assert_eq!(read.resume_index(), 2);
    }

    /// A two-line log resumes from its cursor.
    #[test]
    fn coordinator_log_without_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, "coordinator.txt\n3\n").unwrap();

        let log = CoordinatorLog::read(&path).unwrap();
        assert_eq!(log.cursor, 3);
        assert_eq!(log.resume_index(), 3);
    }

    #[test]
    fn coordinator_log_rejects_position_behind_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, "coordinator.txt\n3\n1\n").unwrap();

        assert!(CoordinatorLog::read(&path).is_err());
    }

    #[test]
    fn participant_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        ParticipantLog::new(PathBuf::from("hotel.txt"))
            .write(&path)
            .unwrap();
        assert_eq!(
            ParticipantLog::read(&path).unwrap().config_path,
            PathBuf::from("hotel.txt")
        );
    }

    #[test]
    fn snapshot_rewritten_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage-8001.txt");

        let mut ledger: Ledger = vec![(1, 5), (2, 5)].into_iter().collect();
        write_snapshot(&path, &ledger).unwrap();
        ledger.set_remaining(1, 3);
        write_snapshot(&path, &ledger).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "1 3\n2 5\n");
        assert_eq!(read_snapshot(&path).unwrap(), ledger);
    }

    #[test]
    fn audit_create_truncates_and_append_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        fs::write(&path, "stale\n").unwrap();

        let mut audit = AuditLog::create(&path).unwrap();
        audit.record(1, Outcome::Success).unwrap();
        drop(audit);

        let mut audit = AuditLog::append(&path).unwrap();
        audit.record(2, Outcome::Fail).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "1 Success\n2 Fail\n");
    }
}
