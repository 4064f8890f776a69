// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Task definitions and the priority/time ordering the scheduler sorts them by.

use std::time::Duration;

use crossbeam_channel::Sender;

use crate::app::objects::{AnalogOutputCommand, CommandStatus, Crob};
use crate::config::ClassMask;

/// What a scheduled task asks the outstation to do.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Read Class 0 (static data) for every in-scope group.
    Integrity,
    /// Read event data for the given class mask.
    Classes(ClassMask),
    /// Read a specific group/variation over an index range.
    Range { group: u8, variation: u8, start: u16, stop: u16 },
    /// SELECT then OPERATE a batch of commands.
    SelectAndOperate(Vec<CommandRequest>),
    /// DIRECT_OPERATE a batch of commands (no prior SELECT).
    DirectOperate(Vec<CommandRequest>, Confirmation),
    /// WRITE g80v1 bit 7 to clear the outstation's device-restart IIN bit.
    ClearRestartIin,
    /// WRITE g60v1-class enable/disable of unsolicited reporting.
    SetUnsolicited { enabled: ClassMask },
}

/// A scan a caller can register once and have the scheduler repeat, without
/// tying the caller to the internal [`TaskKind`] shape.
#[derive(Debug, Clone, Copy)]
pub enum ScanKind {
    Integrity,
    Classes(ClassMask),
    Range { group: u8, variation: u8, start: u16, stop: u16 },
}

impl ScanKind {
    #[must_use]
    pub fn into_task_kind(self) -> TaskKind {
        match self {
            Self::Integrity => TaskKind::Integrity,
            Self::Classes(mask) => TaskKind::Classes(mask),
            Self::Range { group, variation, start, stop } => TaskKind::Range { group, variation, start, stop },
        }
    }
}

/// Whether a `DirectOperate` task expects a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Response,
    NoResponse,
}

/// One command in a SELECT/OPERATE or DIRECT_OPERATE task.
#[derive(Debug, Clone, Copy)]
pub enum CommandRequest {
    Crob(Crob),
    AnalogOutput(AnalogOutputCommand),
}

/// Where a task sits in the priority ordering; larger values run first
/// when two tasks are otherwise due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Periodic/one-shot scans: the lowest priority, runs only when nothing
    /// more urgent is due.
    Scan,
    /// User-requested commands: always outrank scans.
    Command,
    /// The startup sequence (disable-unsol, restart-clear, enable-unsol,
    /// integrity scan): outranks everything until it completes.
    Startup,
}

/// What a finished task hands back to a caller that asked for it directly
/// (`select_and_operate`/`direct_operate`); scans and internal tasks carry
/// no reply channel and report only through [`super::MasterApplication::on_task_complete`].
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Scan,
    Commands(Vec<(u32, CommandStatus)>),
}

pub type TaskResult = Result<TaskOutcome, TaskError>;

/// One entry in the scheduler: what to do, when, how often, and how many
/// retries remain.
#[derive(Debug, Clone)]
pub struct Task {
    pub kind: TaskKind,
    pub priority: Priority,
    pub period: Option<Duration>,
    pub retries_left: u32,
    pub reply: Option<Sender<TaskResult>>,
}

impl Task {
    #[must_use]
    pub fn one_shot(kind: TaskKind, priority: Priority, retries: u32) -> Self {
        Self { kind, priority, period: None, retries_left: retries, reply: None }
    }

    #[must_use]
    pub fn periodic(kind: TaskKind, priority: Priority, period: Duration, retries: u32) -> Self {
        Self { kind, priority, period: Some(period), retries_left: retries, reply: None }
    }

    #[must_use]
    pub fn with_reply(mut self, reply: Sender<TaskResult>) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// How a completed task is reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// No response (or no matching confirm) within the configured deadline,
    /// even after retries.
    Timeout,
    /// The session was shut down before the task could run.
    Cancelled,
}
