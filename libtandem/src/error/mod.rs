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

//! Errors raised by the protocol engines, the wire codec and the file parsers.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::io;
use std::path::{Path, PathBuf};

pub use errling::{InternalError, InvalidStateError};

/// An error which can occur while a protocol engine is processing events.
#[derive(Debug)]
pub enum AlgorithmError {
    /// The event can not be handled in the current state, which indicates a bug in the caller.
    InvalidState(InvalidStateError),

    /// The engine could not process the event due to an unexpected internal error.
    Internal(InternalError),
}

impl Error for AlgorithmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AlgorithmError::InvalidState(e) => Some(e),
            AlgorithmError::Internal(e) => Some(e),
        }
    }
}

impl Display for AlgorithmError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            AlgorithmError::InvalidState(e) => write!(f, "{}", e),
            AlgorithmError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<InvalidStateError> for AlgorithmError {
    fn from(err: InvalidStateError) -> Self {
        AlgorithmError::InvalidState(err)
    }
}

impl From<InternalError> for AlgorithmError {
    fn from(err: InternalError) -> Self {
        AlgorithmError::Internal(err)
    }
}

impl From<AlgorithmError> for InternalError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::Internal(err) => err,
            AlgorithmError::InvalidState(err) => InternalError::with_message(err.to_string()),
        }
    }
}

/// A frame which violates the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The tag does not name any message variant.
    UnknownTag(u32),

    /// The payload length does not fit the variant named by the tag.
    BadLength { tag: u32, len: usize },

    /// A request declared a different number of dates than it carried.
    DateCountMismatch { declared: u32, actual: usize },

    /// A vote or decision field held something other than 0 or 1.
    InvalidFlag { tag: u32, value: u32 },

    /// The frame length exceeds the maximum frame size.
    FrameTooLarge(usize),
}

impl Error for DecodeError {}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            DecodeError::UnknownTag(tag) => write!(f, "unknown message tag {}", tag),
            DecodeError::BadLength { tag, len } => {
                write!(f, "payload of {} bytes is invalid for tag {}", len, tag)
            }
            DecodeError::DateCountMismatch { declared, actual } => write!(
                f,
                "request declares {} dates but carries {}",
                declared, actual
            ),
            DecodeError::InvalidFlag { tag, value } => {
                write!(f, "invalid flag value {} for tag {}", value, tag)
            }
            DecodeError::FrameTooLarge(len) => write!(f, "frame of {} bytes is too large", len),
        }
    }
}

/// An error reading a configuration, booking, log or snapshot file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read or written.
    Io { path: PathBuf, source: io::Error },

    /// A line could not be parsed.
    Malformed { line: String, reason: String },

    /// A required line is absent.
    Missing(String),
}

impl ConfigError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(line: &str, reason: &str) -> Self {
        ConfigError::Malformed {
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Malformed { .. } | ConfigError::Missing(_) => None,
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "could not access {}: {}", path.display(), source)
            }
            ConfigError::Malformed { line, reason } => {
                write!(f, "malformed line '{}': {}", line, reason)
            }
            ConfigError::Missing(what) => write!(f, "missing {}", what),
        }
    }
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        InternalError::with_message(err.to_string())
    }
}
