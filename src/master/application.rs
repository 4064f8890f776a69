// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The master's callback surface: one capability object receiving a small
//! sum-type event per measurement, rather than the multi-method
//! inheritance interfaces other DNP3 stacks use.

use crate::app::objects::{AnalogPoint, BinaryValue, CounterValue, DoubleBitValue};
use crate::master::task::{TaskError, TaskKind};

/// One piece of data observed in a response or unsolicited report, in the
/// order it appeared on the wire.
#[derive(Debug, Clone, Copy)]
pub enum MeasurementEvent {
    /// A multi-fragment response/unsolicited report has started.
    BeginFragment,
    Binary { index: u32, value: BinaryValue },
    DoubleBit { index: u32, value: DoubleBitValue },
    Counter { index: u32, value: CounterValue },
    Analog { index: u32, value: AnalogPoint },
    /// The response/report has been fully delivered (FIN=1 fragment processed).
    EndFragment,
}

/// Application-facing callbacks for a master session.
///
/// Implementations run on the master's single worker thread; they must not
/// block, since doing so delays every other task and inbound frame for
/// this session.
pub trait MasterApplication: Send {
    /// Called for every measurement as it is decoded, in wire order,
    /// bracketed by `BeginFragment`/`EndFragment`.
    fn on_event(&mut self, event: MeasurementEvent);

    /// Called once per task (scan, command, or internal startup step) when
    /// it finishes, successfully or not. The default implementation does
    /// nothing.
    fn on_task_complete(&mut self, _kind: &TaskKind, _outcome: Result<(), TaskError>) {}
}
