// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Crate-wide error type.
//!
//! Link, transport-function, and application-decode problems are recovered
//! locally (counted, or turned into an IIN bit / status byte) and never
//! reach this type — see [`crate::link::FrameError`], [`crate::transport::TransportError`],
//! and [`crate::app::codec::DecodeError`]. `Error` is reserved for the
//! creation-time and lifecycle failures the public API surfaces directly:
//! bad configuration, duplicate or exhausted session slots, shutdown, and
//! request timeouts.

use std::fmt;
use std::io;

/// Result alias used throughout the public API.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the public DNP3 API.
#[derive(Debug)]
pub enum Error {
    /// Link address already registered on this channel.
    DuplicateAddress(u16),
    /// Channel already hosts the maximum number of sessions (32).
    TooManySessions,
    /// A configuration value was out of its valid range.
    InvalidConfig(String),
    /// The session (or channel) was shut down and can no longer accept work.
    Shutdown,
    /// An outbound operation did not complete before its deadline.
    Timeout,
    /// The underlying byte transport failed.
    TransportError(io::Error),
    /// The request was cancelled (e.g. session shutting down mid-call).
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateAddress(addr) => {
                write!(f, "link address {addr:#06X} already registered on this channel")
            }
            Self::TooManySessions => write!(f, "channel already hosts the maximum of 32 sessions"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Shutdown => write!(f, "session is shut down"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TransportError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::TransportError(e)
    }
}
