// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outstation role: point database, event buffers, command handling, and
//! the per-session protocol state machine that answers a master's requests
//! and spontaneously reports events.

pub mod commands;
pub mod database;
pub mod events;
pub mod session;

pub use commands::{CommandHandler, CommandResult, PendingSelect, RejectingHandler};
pub use database::{Database, PointUpdate, Updates};
pub use events::{EventBuffers, PointType, StoredEvent};
pub use session::{OutstationSession, SessionMsg, UserRequest};

use std::time::Duration;

use crossbeam_channel::{bounded, Sender};

use crate::config::OutstationConfig;
use crate::error::Error;

/// The mailbox depth for an outstation session's worker thread.
const MAILBOX_CAPACITY: usize = 256;

/// How long a user-facing call waits for the worker's reply before giving up.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A caller's handle to a running outstation session.
///
/// Cloning is cheap (an `Arc`-free `Sender` clone); every clone reaches the
/// same worker thread, so operations from multiple callers still serialize
/// through the one mailbox.
#[derive(Clone)]
pub struct OutstationHandle {
    mailbox: Sender<SessionMsg>,
}

impl OutstationHandle {
    pub(crate) fn new(mailbox: Sender<SessionMsg>) -> Self {
        Self { mailbox }
    }

    /// Apply a batch of point updates, blocking until the worker has
    /// processed them (and, if warranted, sent an unsolicited response).
    pub fn apply(&self, updates: Updates) -> Result<(), Error> {
        self.request(UserRequest::Apply(updates))
    }

    /// Enable or disable spontaneous unsolicited reporting.
    pub fn set_unsolicited_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.request(UserRequest::SetUnsolicitedEnabled(enabled))
    }

    /// Stop the session's worker thread. Further calls on this handle (or
    /// its clones) return [`Error::Shutdown`].
    pub fn shutdown(&self) {
        let _ = self.mailbox.send(SessionMsg::Shutdown);
    }

    fn request(&self, req: UserRequest) -> Result<(), Error> {
        let (reply_tx, reply_rx) = bounded::<()>(1);
        self.mailbox.send(SessionMsg::UserRequest(req, reply_tx)).map_err(|_| Error::Shutdown)?;
        reply_rx.recv_timeout(REQUEST_TIMEOUT).map_err(|_| Error::Timeout)
    }
}

/// Spawn a new outstation session and return the handle plus its inbound
/// sender, which the owning [`crate::channel::Channel`] registers with its
/// router under `config.local_address`.
pub(crate) fn spawn(config: OutstationConfig, handler: Box<dyn CommandHandler>, outbound: Sender<Vec<u8>>) -> (OutstationHandle, Sender<SessionMsg>) {
    let (tx, rx) = bounded(MAILBOX_CAPACITY);
    let session = OutstationSession::new(config, handler, outbound);
    session.spawn(rx);
    (OutstationHandle::new(tx.clone()), tx)
}
