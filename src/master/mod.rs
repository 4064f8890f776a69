// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Master role: the task scheduler, the per-session protocol state machine
//! that issues requests and dispatches responses to application callbacks,
//! and the SOE/command public API.

pub mod application;
pub mod scheduler;
pub mod session;
pub mod task;

pub use application::{MasterApplication, MeasurementEvent};
pub use session::{MasterSession, ScanHandle, SessionMsg};
pub use task::{CommandRequest, Confirmation, ScanKind, TaskError, TaskKind, TaskOutcome, TaskResult};

use std::time::Duration;

use crossbeam_channel::{bounded, Sender};

use crate::app::objects::CommandStatus;
use crate::config::{ClassMask, MasterConfig};
use crate::error::Error;

/// The mailbox depth for a master session's worker thread.
const MAILBOX_CAPACITY: usize = 256;

/// How long a user-facing call waits for the worker's reply before giving up.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A caller's handle to a running master session.
#[derive(Clone)]
pub struct MasterHandle {
    mailbox: Sender<SessionMsg>,
}

impl MasterHandle {
    pub(crate) fn new(mailbox: Sender<SessionMsg>) -> Self {
        Self { mailbox }
    }

    /// Start the session's side of the state machine: the startup sequence
    /// (if configured) and any registered periodic scans begin running.
    pub fn enable(&self) -> Result<(), Error> {
        self.send(SessionMsg::Enable)
    }

    /// Stop issuing new requests; an in-flight task is allowed to finish.
    pub fn disable(&self) -> Result<(), Error> {
        self.send(SessionMsg::Disable)
    }

    /// Stop the session's worker thread. Further calls on this handle (or
    /// its clones) return [`Error::Shutdown`].
    pub fn shutdown(&self) {
        let _ = self.mailbox.send(SessionMsg::Shutdown);
    }

    /// Queue a one-shot Class 0 + Class 1/2/3 integrity poll.
    pub fn scan_integrity(&self) -> Result<(), Error> {
        self.queue_scan(task::Task::one_shot(TaskKind::Integrity, task::Priority::Scan, self.default_retries()))
    }

    /// Queue a one-shot read of the given event classes.
    pub fn scan_classes(&self, mask: ClassMask) -> Result<(), Error> {
        self.queue_scan(task::Task::one_shot(TaskKind::Classes(mask), task::Priority::Scan, self.default_retries()))
    }

    /// Queue a one-shot read of a specific group/variation over an index range.
    pub fn scan_range(&self, group: u8, variation: u8, start: u16, stop: u16) -> Result<(), Error> {
        let kind = TaskKind::Range { group, variation, start: u32::from(start), stop: u32::from(stop) };
        self.queue_scan(task::Task::one_shot(kind, task::Priority::Scan, self.default_retries()))
    }

    /// Register a periodic scan, repeating every `period` until the returned
    /// handle is dropped or [`ScanHandle::cancel`] is called.
    pub fn add_scan(&self, kind: ScanKind, period: Duration) -> Result<ScanHandle, Error> {
        let task = task::Task::periodic(kind.into_task_kind(), task::Priority::Scan, period, self.default_retries());
        self.queue_scan(task)?;
        Ok(ScanHandle { handle: self.clone() })
    }

    /// SELECT then OPERATE a batch of commands, blocking until the task
    /// completes (or times out) and returning each command's status.
    pub fn select_and_operate(&self, commands: Vec<CommandRequest>) -> Result<Vec<(u32, CommandStatus)>, Error> {
        self.run_command_task(TaskKind::SelectAndOperate(commands))
    }

    /// DIRECT_OPERATE a batch of commands, blocking until the task completes.
    pub fn direct_operate(&self, commands: Vec<CommandRequest>) -> Result<Vec<(u32, CommandStatus)>, Error> {
        self.run_command_task(TaskKind::DirectOperate(commands, Confirmation::Response))
    }

    /// DIRECT_OPERATE with `DIRECT_OPERATE_NO_RESPONSE`: fire-and-forget,
    /// returns as soon as the request has been handed to the link layer.
    pub fn direct_operate_no_response(&self, commands: Vec<CommandRequest>) -> Result<(), Error> {
        let task = task::Task::one_shot(TaskKind::DirectOperate(commands, Confirmation::NoResponse), task::Priority::Command, 0);
        self.send(SessionMsg::QueueTask(task))
    }

    fn run_command_task(&self, kind: TaskKind) -> Result<Vec<(u32, CommandStatus)>, Error> {
        let (reply_tx, reply_rx) = bounded::<TaskResult>(1);
        let task = task::Task::one_shot(kind, task::Priority::Command, self.default_retries()).with_reply(reply_tx);
        self.send(SessionMsg::QueueTask(task))?;
        match reply_rx.recv_timeout(REQUEST_TIMEOUT) {
            Ok(Ok(TaskOutcome::Commands(results))) => Ok(results),
            Ok(Ok(TaskOutcome::Scan)) => Ok(Vec::new()),
            Ok(Err(TaskError::Timeout)) => Err(Error::Timeout),
            Ok(Err(TaskError::Cancelled)) => Err(Error::Cancelled),
            Err(_) => Err(Error::Timeout),
        }
    }

    fn queue_scan(&self, task: task::Task) -> Result<(), Error> {
        self.send(SessionMsg::QueueTask(task))
    }

    fn default_retries(&self) -> u32 {
        2
    }

    fn send(&self, msg: SessionMsg) -> Result<(), Error> {
        self.mailbox.send(msg).map_err(|_| Error::Shutdown)
    }
}

/// A registered periodic scan. Dropping it does not cancel the scan (the
/// scheduler has no per-task cancellation handle today); call
/// [`ScanHandle::cancel`] to disable the whole session's scheduler instead,
/// or recreate the session to change periodic scans.
pub struct ScanHandle {
    handle: MasterHandle,
}

impl ScanHandle {
    /// Disable the owning master session, stopping all scans.
    pub fn cancel(&self) -> Result<(), Error> {
        self.handle.disable()
    }
}

/// Spawn a new master session and return the handle plus its inbound
/// sender, which the owning [`crate::channel::Channel`] registers with its
/// router under `config.local_address`.
pub(crate) fn spawn(config: MasterConfig, application: Box<dyn MasterApplication>, outbound: Sender<Vec<u8>>) -> (MasterHandle, Sender<SessionMsg>) {
    let (tx, rx) = bounded(MAILBOX_CAPACITY);
    let session = MasterSession::new(config, application, outbound);
    session.spawn(rx);
    (MasterHandle::new(tx.clone()), tx)
}
