//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{error, warn};

use crate::types::{Link, NodePortTuple, SwitchId};

// Topology errors.
#[derive(Debug)]
pub enum Error {
    IoError(IoError),
    MissingInput(&'static str),
    InvalidFeed(serde_json::Error),
    LinkPortMismatch(NodePortTuple, Link),
    UnknownSwitch(SwitchId, Link),
    TunnelManagerUnavailable(SwitchId, SwitchId),
}

// Topology I/O errors.
#[derive(Debug)]
pub enum IoError {
    FeedRead(String, std::io::Error),
    ProbeSend(SwitchId, SwitchId, std::io::Error),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::MissingInput(input) => {
                error!(%input, "{}", self);
            }
            Error::InvalidFeed(error) => {
                error!(%error, "{}", self);
            }
            Error::LinkPortMismatch(npt, link) => {
                warn!(port = %npt, %link, "{}", self);
            }
            Error::UnknownSwitch(switch, link) => {
                warn!(%switch, %link, "{}", self);
            }
            Error::TunnelManagerUnavailable(src, dst) => {
                warn!(%src, %dst, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::MissingInput(..) => {
                write!(f, "missing required topology input")
            }
            Error::InvalidFeed(..) => {
                write!(f, "failed to parse link-state feed")
            }
            Error::LinkPortMismatch(..) => {
                write!(f, "link stored under a port that is not an endpoint")
            }
            Error::UnknownSwitch(..) => {
                write!(f, "link references an unknown switch")
            }
            Error::TunnelManagerUnavailable(..) => {
                write!(f, "tunnel verification without a tunnel manager")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::InvalidFeed(error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::InvalidFeed(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub fn log(&self) {
        match self {
            IoError::FeedRead(path, error) => {
                error!(%path, error = %with_source(error), "{}", self);
            }
            IoError::ProbeSend(src, dst, error) => {
                error!(%src, %dst, error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::FeedRead(..) => {
                write!(f, "failed to read link-state feed")
            }
            IoError::ProbeSend(..) => {
                write!(f, "failed to send tunnel liveness probe")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::FeedRead(_, error) | IoError::ProbeSend(_, _, error) => {
                Some(error)
            }
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
