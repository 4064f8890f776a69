// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command handler contract: how an outstation session turns a decoded
//! CROB or analog-output command object into a device action and a status
//! byte, with the SELECT/OPERATE two-pass protocol kept in the session.
//!
//! The handler runs on the outstation session worker thread (see §5 of the
//! specification): it must be non-blocking, returning `AlreadyExecuting`
//! promptly rather than stalling the worker loop on slow I/O.

use crate::app::objects::{AnalogOutputCommand, CommandStatus, Crob};

use super::database::{PointUpdate, Updates};

/// Outcome of a SELECT or OPERATE pass over one command object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
}

impl CommandResult {
    #[must_use]
    pub fn success() -> Self {
        Self { status: CommandStatus::Success }
    }

    #[must_use]
    pub fn rejected(status: CommandStatus) -> Self {
        Self { status }
    }
}

/// User-supplied command logic. A default no-op implementation exists only
/// for tests; real outstations must supply a handler that drives actual
/// device state.
pub trait CommandHandler: Send {
    /// Validate (but do not execute) a CROB SELECT.
    fn select_crob(&mut self, index: u32, command: &Crob) -> CommandResult;

    /// Execute a previously-selected (or direct-operate) CROB. May call
    /// `updates.update(...)` to reflect the command's effect; those updates
    /// are applied atomically with the operate response.
    fn operate_crob(&mut self, index: u32, command: &Crob, updates: &mut Updates) -> CommandResult;

    /// Validate (but do not execute) an analog-output SELECT.
    fn select_analog_output(&mut self, index: u32, command: &AnalogOutputCommand) -> CommandResult;

    /// Execute a previously-selected (or direct-operate) analog output.
    fn operate_analog_output(
        &mut self,
        index: u32,
        command: &AnalogOutputCommand,
        updates: &mut Updates,
    ) -> CommandResult;
}

/// Rejects every command with `NotSupported`; useful for outstations that
/// expose only measurements.
#[derive(Debug, Default)]
pub struct RejectingHandler;

impl CommandHandler for RejectingHandler {
    fn select_crob(&mut self, _index: u32, _command: &Crob) -> CommandResult {
        CommandResult::rejected(CommandStatus::NotSupported)
    }

    fn operate_crob(&mut self, _index: u32, _command: &Crob, _updates: &mut Updates) -> CommandResult {
        CommandResult::rejected(CommandStatus::NotSupported)
    }

    fn select_analog_output(&mut self, _index: u32, _command: &AnalogOutputCommand) -> CommandResult {
        CommandResult::rejected(CommandStatus::NotSupported)
    }

    fn operate_analog_output(
        &mut self,
        _index: u32,
        _command: &AnalogOutputCommand,
        _updates: &mut Updates,
    ) -> CommandResult {
        CommandResult::rejected(CommandStatus::NotSupported)
    }
}

/// What the session recorded after a successful SELECT, consumed by a
/// matching OPERATE that arrives within `SelectTimeout`.
#[derive(Debug, Clone)]
pub struct PendingSelect {
    pub sequence: u8,
    pub indices: Vec<u32>,
    pub selected_at: std::time::Instant,
}

impl PendingSelect {
    #[must_use]
    pub fn new(sequence: u8, indices: Vec<u32>) -> Self {
        Self { sequence, indices, selected_at: std::time::Instant::now() }
    }

    #[must_use]
    pub fn is_expired(&self, timeout: std::time::Duration) -> bool {
        self.selected_at.elapsed() > timeout
    }

    /// Whether `sequence` is the operate sequence immediately following the
    /// select, and `indices` names the exact same command set in order.
    #[must_use]
    pub fn matches(&self, sequence: u8, indices: &[u32]) -> bool {
        self.sequence.wrapping_add(1) & 0x0F == sequence && self.indices == indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejecting_handler_rejects_everything() {
        let mut handler = RejectingHandler;
        let crob = Crob {
            index: 0,
            trip_close: crate::app::objects::TripClose::Close,
            clear: false,
            queue: false,
            op_type: crate::app::objects::OpType::LatchOn,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: CommandStatus::Success,
        };
        assert_eq!(handler.select_crob(0, &crob).status, CommandStatus::NotSupported);
        let mut updates = Updates::new();
        assert_eq!(handler.operate_crob(0, &crob, &mut updates).status, CommandStatus::NotSupported);
    }

    #[test]
    fn pending_select_matches_next_sequence_and_same_indices() {
        let pending = PendingSelect::new(4, vec![5]);
        assert!(pending.matches(5, &[5]));
        assert!(!pending.matches(6, &[5]));
        assert!(!pending.matches(5, &[6]));
    }

    #[test]
    fn pending_select_expires_after_timeout() {
        let pending = PendingSelect::new(0, vec![0]);
        assert!(!pending.is_expired(std::time::Duration::from_secs(10)));
        assert!(pending.is_expired(std::time::Duration::from_nanos(0)));
    }
}
