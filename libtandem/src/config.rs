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

//! Configuration files and the booking-request file.
//!
//! A coordinator configuration holds the hotel address, the concert address and the path of the
//! booking file, one per line. A participant configuration holds its own listen address followed
//! by one `date tickets` line per date of initial inventory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::booking::BookingRequest;
use crate::error::ConfigError;
use crate::ledger::Ledger;
use crate::process::Peer;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoordinatorConfig {
    hotel: String,
    concert: String,
    booking_path: PathBuf,
}

impl CoordinatorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let lines = read_lines(path)?;
        let mut lines = lines.iter().map(String::as_str);

        let hotel = parse_address(lines.next(), "hotel address")?;
        let concert = parse_address(lines.next(), "concert address")?;
        let booking_path = lines
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::Missing("booking file path".into()))?;

        Ok(CoordinatorConfig {
            hotel,
            concert,
            booking_path,
        })
    }

    /// Each participant with its address, in request order.
    pub fn participants(&self) -> Vec<(Peer, String)> {
        vec![
            (Peer::Hotel, self.hotel.clone()),
            (Peer::Concert, self.concert.clone()),
        ]
    }

    pub fn booking_path(&self) -> &Path {
        &self.booking_path
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParticipantConfig {
    listen: String,
    inventory: Ledger,
}

impl ParticipantConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let lines = read_lines(path)?;
        let mut lines = lines.iter().map(String::as_str);

        let listen = parse_address(lines.next(), "listen address")?;
        let inventory = lines
            .map(parse_inventory_line)
            .collect::<Result<Ledger, _>>()?;

        Ok(ParticipantConfig { listen, inventory })
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    /// The port of the listen address.
    pub fn port(&self) -> Option<u16> {
        self.listen
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }

    pub fn inventory(&self) -> &Ledger {
        &self.inventory
    }
}

/// Reads every booking request, in file order.
pub fn read_bookings(path: &Path) -> Result<Vec<BookingRequest>, ConfigError> {
    read_lines(path)?
        .iter()
        .map(|line| line.parse::<BookingRequest>())
        .collect()
}

/// Parses a `date tickets` line, as used by participant configurations and ledger snapshots.
pub(crate) fn parse_inventory_line(line: &str) -> Result<(u32, u32), ConfigError> {
    let mut tokens = line.split_whitespace();
    let mut field = |name: &str| -> Result<u32, ConfigError> {
        let token = tokens
            .next()
            .ok_or_else(|| ConfigError::malformed(line, &format!("missing {}", name)))?;
        token
            .parse()
            .map_err(|_| ConfigError::malformed(line, &format!("invalid {} '{}'", name, token)))
    };

    let date = field("date")?;
    let tickets = field("ticket count")?;
    if tokens.next().is_some() {
        return Err(ConfigError::malformed(line, "unexpected trailing fields"));
    }

    Ok((date, tickets))
}

// Non-blank lines, trimmed.
pub(crate) fn read_lines(path: &Path) -> Result<Vec<String>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::io(path, err))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn parse_address(line: Option<&str>, name: &str) -> Result<String, ConfigError> {
    let line = line.ok_or_else(|| ConfigError::Missing(name.into()))?;
    match line.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(line.to_string())
        }
        _ => Err(ConfigError::malformed(
            line,
            &format!("{} must be host:port", name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn coordinator_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "coordinator.txt",
            "127.0.0.1:8001\n127.0.0.1:8002\nbookings.txt\n",
        );

        let config = CoordinatorConfig::from_file(&path).unwrap();
        assert_eq!(
            config.participants(),
            vec![
                (Peer::Hotel, "127.0.0.1:8001".to_string()),
                (Peer::Concert, "127.0.0.1:8002".to_string()),
            ]
        );
        assert_eq!(config.booking_path(), Path::new("bookings.txt"));
    }

    #[test]
    fn coordinator_config_missing_booking_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "coordinator.txt", "127.0.0.1:8001\n127.0.0.1:8002\n");

        assert!(matches!(
            CoordinatorConfig::from_file(&path),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn bad_address_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "coordinator.txt", "localhost\n127.0.0.1:8002\nb.txt\n");

        assert!(matches!(
            CoordinatorConfig::from_file(&path),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn participant_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "hotel.txt", "0.0.0.0:8001\n1 5\n\n2 5\n12 40\n");

        let config = ParticipantConfig::from_file(&path).unwrap();
        assert_eq!(config.listen(), "0.0.0.0:8001");
        assert_eq!(config.port(), Some(8001));
        assert_eq!(config.inventory().remaining(1), Some(5));
        assert_eq!(config.inventory().remaining(12), Some(40));
        assert_eq!(config.inventory().remaining(3), None);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ParticipantConfig::from_file(&dir.path().join("absent.txt")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn bookings_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bookings.txt", "1 2 [1 2]\n2 1 [3]\n\n3 4 [10,11]\n");

        let bookings = read_bookings(&path).unwrap();
        assert_eq!(
            bookings,
            vec![
                BookingRequest::new(1, 2, vec![1, 2]),
                BookingRequest::new(2, 1, vec![3]),
                BookingRequest::new(3, 4, vec![10, 11]),
            ]
        );
    }

    #[test]
    fn inventory_line() {
        assert_eq!(parse_inventory_line("4 17").unwrap(), (4, 17));
        assert!(parse_inventory_line("4").is_err());
        assert!(parse_inventory_line("4 x").is_err());
        assert!(parse_inventory_line("4 1 9").is_err());
    }
}
