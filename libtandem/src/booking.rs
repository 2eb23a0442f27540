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

//! Booking requests and the verdicts reached on them.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::protocol::MAX_REQUEST_DATES;

/// Identifier of a booking transaction, assigned by the booking file.
pub type TxnId = u32;

/// A request to book `tickets` seats on each of `dates`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BookingRequest {
    id: TxnId,
    tickets: u32,
    dates: Vec<u32>,
}

impl BookingRequest {
    pub fn new(id: TxnId, tickets: u32, dates: Vec<u32>) -> Self {
        BookingRequest { id, tickets, dates }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn tickets(&self) -> u32 {
        self.tickets
    }

    pub fn dates(&self) -> &[u32] {
        &self.dates
    }
}

/// Parses a booking-file line of the form `id tickets [d1 d2 ... dn]`.
///
/// The brackets delimit the first and last date token; commas between dates are tolerated.
impl FromStr for BookingRequest {
    type Err = ConfigError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();

        let id = parse_field(tokens.next(), "id", line)?;
        let tickets = parse_field(tokens.next(), "ticket count", line)?;

        let rest = tokens.collect::<Vec<_>>().join(" ");
        let inner = rest
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| ConfigError::malformed(line, "dates must be enclosed in brackets"))?;

        let dates = inner
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|_| ConfigError::malformed(line, &format!("invalid date '{}'", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if dates.is_empty() {
            return Err(ConfigError::malformed(line, "at least one date is required"));
        }
        if dates.len() > MAX_REQUEST_DATES {
            return Err(ConfigError::malformed(
                line,
                &format!("at most {} dates fit in one request", MAX_REQUEST_DATES),
            ));
        }

        Ok(BookingRequest { id, tickets, dates })
    }
}

fn parse_field(token: Option<&str>, name: &str, line: &str) -> Result<u32, ConfigError> {
    let token = token.ok_or_else(|| ConfigError::malformed(line, &format!("missing {}", name)))?;
    token
        .parse()
        .map_err(|_| ConfigError::malformed(line, &format!("invalid {} '{}'", name, token)))
}

/// The coordinator's binding verdict on a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Rollback,
    Commit,
}

impl Decision {
    /// Commit only when every participant has voted and every vote is yes.
    pub fn from_votes<I>(votes: I) -> Decision
    where
        I: IntoIterator<Item = Option<bool>>,
    {
        let mut votes = votes.into_iter().peekable();
        if votes.peek().is_none() {
            return Decision::Rollback;
        }

        if votes.all(|vote| vote == Some(true)) {
            Decision::Commit
        } else {
            Decision::Rollback
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Decision::Commit => Outcome::Success,
            Decision::Rollback => Outcome::Fail,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Decision::Commit => f.write_str("commit"),
            Decision::Rollback => f.write_str("rollback"),
        }
    }
}

/// The audited result of a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Success,
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("Success"),
            Outcome::Fail => f.write_str("Fail"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_booking_line() {
        let request: BookingRequest = "7 2 [1 2 13]".parse().unwrap();
        assert_eq!(request.id(), 7);
        assert_eq!(request.tickets(), 2);
        assert_eq!(request.dates(), &[1, 2, 13]);

        let single: BookingRequest = "3 1 [4]".parse().unwrap();
        assert_eq!(single.dates(), &[4]);

        let commas: BookingRequest = "4 1 [1,2, 3]".parse().unwrap();
        assert_eq!(commas.dates(), &[1, 2, 3]);
    }

    #[test]
    fn parse_booking_line_rejects_malformed() {
        assert!("".parse::<BookingRequest>().is_err());
        assert!("1".parse::<BookingRequest>().is_err());
        assert!("1 2 3 4".parse::<BookingRequest>().is_err());
        assert!("1 2 []".parse::<BookingRequest>().is_err());
        assert!("1 x [1]".parse::<BookingRequest>().is_err());
        assert!("1 2 [1 b]".parse::<BookingRequest>().is_err());
    }

    #[test]
    fn parse_booking_line_limits_date_count() {
        let dates = |count: usize| {
            (1..=count)
                .map(|date| date.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let widest = format!("1 1 [{}]", dates(MAX_REQUEST_DATES));
        let request: BookingRequest = widest.parse().unwrap();
        assert_eq!(request.dates().len(), MAX_REQUEST_DATES);

        let too_wide = format!("1 1 [{}]", dates(MAX_REQUEST_DATES + 1));
        assert!(too_wide.parse::<BookingRequest>().is_err());
    }

    /// Only a complete set of yes votes commits.
    #[test]
    fn unanimity() {
        assert_eq!(
            Decision::from_votes(vec![Some(true), Some(true)]),
            Decision::Commit
        );
        assert_eq!(
            Decision::from_votes(vec![Some(true), Some(false)]),
            Decision::Rollback
        );
        assert_eq!(
            Decision::from_votes(vec![Some(true), None]),
            Decision::Rollback
        );
        assert_eq!(
            Decision::from_votes(Vec::<Option<bool>>::new()),
            Decision::Rollback
        );
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Decision::Commit.outcome().to_string(), "Success");
        assert_eq!(Decision::Rollback.outcome().to_string(), "Fail");
    }
}
