// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The master session state machine: builds request APDUs from the task
//! queue, tracks the single in-flight exchange, parses responses into SOE
//! callbacks, and runs the SELECT/OPERATE and startup-sequence protocols.
//!
//! Like [`crate::outstation::session::OutstationSession`], each session owns
//! a worker thread fed by a bounded mailbox; the scheduler, reassembler, and
//! in-flight task state are touched only from that thread.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::app::objects::{AnalogValue, CommandStatus};
use crate::app::{Apdu, AppControl, FunctionCode, HeaderRange, HeaderedObjects, Iin, Iin1, ObjectHeader, ObjectValue};
use crate::config::{ClassMask, MasterConfig};
use crate::link::{Control, LinkFrame, LinkFunction};
use crate::transport::{Reassembler, Segmenter};

use super::application::{MasterApplication, MeasurementEvent};
use super::scheduler::Scheduler;
use super::task::{CommandRequest, Confirmation, Priority, Task, TaskError, TaskKind, TaskOutcome, TaskResult};

/// One item in a session's mailbox.
pub enum SessionMsg {
    /// A transport segment (one [`crate::link::LinkFrame`] payload) addressed
    /// to this session.
    InboundSegment(Vec<u8>),
    /// Add a task to the scheduler (scan, command, or internal step).
    QueueTask(Task),
    /// Start the session's state machine and queue the startup sequence.
    Enable,
    /// Stop starting new tasks; an in-flight exchange is allowed to finish.
    Disable,
    Shutdown,
}

/// Where a request sits once sent, until its matching response (or a
/// timeout) resolves it.
enum Phase {
    /// A READ scan; responses are dispatched to [`MasterApplication::on_event`].
    Scan,
    /// Awaiting the SELECT echo for these commands; a clean echo sends OPERATE next.
    Select(Vec<CommandRequest>),
    /// Awaiting the OPERATE echo.
    Operate,
    /// A WRITE, ENABLE_UNSOLICITED, or DISABLE_UNSOLICITED with no payload to dispatch.
    Write,
}

struct ActiveTask {
    task: Task,
    phase: Phase,
    seq: u8,
    request_bytes: Vec<u8>,
    deadline: Instant,
    retries_left: u32,
    retry_pending: bool,
}

/// The master's protocol state machine, task queue, and link-facing codec state.
pub struct MasterSession {
    config: MasterConfig,
    application: Box<dyn MasterApplication>,
    scheduler: Scheduler,
    segmenter: Segmenter,
    reassembler: Reassembler,
    outbound: Sender<Vec<u8>>,
    enabled: bool,
    request_seq: u8,
    active: Option<ActiveTask>,
}

impl MasterSession {
    #[must_use]
    pub fn new(config: MasterConfig, application: Box<dyn MasterApplication>, outbound: Sender<Vec<u8>>) -> Self {
        let max_rx = config.max_rx_frag_size;
        Self {
            config,
            application,
            scheduler: Scheduler::new(),
            segmenter: Segmenter::new(),
            reassembler: Reassembler::new(max_rx),
            outbound,
            enabled: false,
            request_seq: 0,
            active: None,
        }
    }

    /// Spawn the session's worker thread, returning its handle.
    pub fn spawn(mut self, mailbox: Receiver<SessionMsg>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name(format!("dnp3-master-{:04X}", self.config.local_address))
            .spawn(move || self.run(&mailbox))
            .expect("failed to spawn master session thread")
    }

    fn run(&mut self, mailbox: &Receiver<SessionMsg>) {
        crate::info!("master {:#06X}: session started", self.config.local_address);
        loop {
            let timeout = self
                .next_wake()
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));

            match mailbox.recv_timeout(timeout) {
                Ok(SessionMsg::InboundSegment(bytes)) => self.on_inbound_segment(&bytes),
                Ok(SessionMsg::QueueTask(task)) => {
                    self.scheduler.push(task, Instant::now());
                    self.maybe_start_next();
                }
                Ok(SessionMsg::Enable) => {
                    self.enabled = true;
                    self.queue_startup_sequence();
                    if let Some(period) = self.config.integrity_period {
                        self.scheduler.push(Task::periodic(TaskKind::Integrity, Priority::Scan, period, self.config.max_task_retries), Instant::now() + period);
                    }
                    self.maybe_start_next();
                }
                Ok(SessionMsg::Disable) => {
                    self.enabled = false;
                    self.cancel_queued();
                }
                Ok(SessionMsg::Shutdown) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    self.cancel_active();
                    self.cancel_queued();
                    return;
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => self.on_timer(),
            }
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        if let Some(active) = &self.active {
            Some(active.deadline)
        } else if self.enabled {
            self.scheduler.next_deadline()
        } else {
            None
        }
    }

    fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            if let Some(reply) = &active.task.reply {
                let _ = reply.send(Err(TaskError::Cancelled));
            }
            self.application.on_task_complete(&active.task.kind, Err(TaskError::Cancelled));
        }
    }

    fn cancel_queued(&mut self) {
        for task in self.scheduler.drain_all() {
            if let Some(reply) = &task.reply {
                let _ = reply.send(Err(TaskError::Cancelled));
            }
            self.application.on_task_complete(&task.kind, Err(TaskError::Cancelled));
        }
    }

    /// Queue the startup sequence (disable-unsol, restart-clear, enable-unsol,
    /// integrity-scan) at [`Priority::Startup`], outranking every other task
    /// until it drains. Run once on `enable()` and again whenever a response
    /// reports a fresh device restart (§4.6/§4.7).
    fn queue_startup_sequence(&mut self) {
        let now = Instant::now();
        let retries = self.config.max_task_retries;
        if self.config.disable_unsol_on_startup {
            self.scheduler.push(Task::one_shot(TaskKind::SetUnsolicited { enabled: ClassMask::none() }, Priority::Startup, retries), now);
        }
        self.scheduler.push(Task::one_shot(TaskKind::ClearRestartIin, Priority::Startup, retries), now);
        if !self.config.unsol_class_mask.is_empty() {
            self.scheduler.push(Task::one_shot(TaskKind::SetUnsolicited { enabled: self.config.unsol_class_mask }, Priority::Startup, retries), now);
        }
        if self.config.startup_integrity_scan {
            self.scheduler.push(Task::one_shot(TaskKind::Integrity, Priority::Startup, retries), now);
        }
    }

    fn maybe_start_next(&mut self) {
        if !self.enabled || self.active.is_some() {
            return;
        }
        if let Some(task) = self.scheduler.pop_ready(Instant::now()) {
            self.start_task(task);
        }
    }

    fn start_task(&mut self, task: Task) {
        let (phase, function, objects) = match &task.kind {
            TaskKind::Integrity => (Phase::Scan, FunctionCode::Read, integrity_headers()),
            TaskKind::Classes(mask) => (Phase::Scan, FunctionCode::Read, class_headers(*mask)),
            TaskKind::Range { group, variation, start, stop } => {
                (Phase::Scan, FunctionCode::Read, vec![HeaderedObjects { header: ObjectHeader::for_range(*group, *variation, *start, *stop), objects: Vec::new() }])
            }
            TaskKind::SelectAndOperate(commands) => (Phase::Select(commands.clone()), FunctionCode::Select, command_headers(commands)),
            TaskKind::DirectOperate(commands, confirmation) => {
                let function = match confirmation {
                    Confirmation::Response => FunctionCode::DirectOperate,
                    Confirmation::NoResponse => FunctionCode::DirectOperateNoResponse,
                };
                (Phase::Write, function, command_headers(commands))
            }
            TaskKind::ClearRestartIin => {
                let header = ObjectHeader::for_range(80, 1, 7, 7);
                (Phase::Write, FunctionCode::Write, vec![HeaderedObjects { header, objects: vec![ObjectValue::Iin(vec![false])] }])
            }
            TaskKind::SetUnsolicited { enabled } => {
                if enabled.is_empty() {
                    (Phase::Write, FunctionCode::DisableUnsolicited, class_headers(ClassMask::all()))
                } else {
                    (Phase::Write, FunctionCode::EnableUnsolicited, class_headers(*enabled))
                }
            }
        };
        self.send_phase(task, phase, function, objects);
    }

    fn send_phase(&mut self, task: Task, phase: Phase, function: FunctionCode, objects: Vec<HeaderedObjects>) {
        let seq = self.next_seq();
        let apdu = Apdu::request(AppControl::single(seq), function, objects);
        let Ok(bytes) = apdu.encode() else {
            crate::warn!("master {:#06X}: failed to encode request, dropping task", self.config.local_address);
            self.finish_task(task, Err(TaskError::Cancelled));
            return;
        };
        self.send_apdu_bytes(&bytes);

        if function == FunctionCode::DirectOperateNoResponse {
            // Fire-and-forget: the task completes as soon as the request is
            // on the wire, with no per-command status to report.
            if let Some(reply) = &task.reply {
                let _ = reply.send(Ok(TaskOutcome::Commands(Vec::new())));
            }
            self.application.on_task_complete(&task.kind, Ok(()));
            self.reschedule_if_periodic(&task);
            self.active = None;
            self.maybe_start_next();
            return;
        }

        self.active = Some(ActiveTask {
            retries_left: task.retries_left,
            task,
            phase,
            seq,
            request_bytes: bytes,
            deadline: Instant::now() + self.config.response_timeout,
            retry_pending: false,
        });
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.request_seq;
        self.request_seq = (self.request_seq + 1) & 0x0F;
        seq
    }

    fn on_timer(&mut self) {
        let now = Instant::now();
        let Some(active) = &mut self.active else {
            self.maybe_start_next();
            return;
        };
        if now < active.deadline {
            return;
        }
        if active.retry_pending {
            active.retry_pending = false;
            let bytes = active.request_bytes.clone();
            crate::debug!("master {:#06X}: retrying request seq {}", self.config.local_address, active.seq);
            self.send_apdu_bytes(&bytes);
            self.active.as_mut().expect("active task present").deadline = now + self.config.response_timeout;
        } else if active.retries_left > 0 {
            active.retries_left -= 1;
            active.retry_pending = true;
            active.deadline = now + self.config.task_retry_period;
        } else {
            let active = self.active.take().expect("active task present");
            crate::warn!("master {:#06X}: task timed out after retries", self.config.local_address);
            self.finish_task(active.task, Err(TaskError::Timeout));
        }
    }

    fn finish_task(&mut self, task: Task, outcome: TaskResult) {
        if let Some(reply) = &task.reply {
            let _ = reply.send(outcome.clone());
        }
        let unit_outcome = outcome.map(|_| ());
        self.application.on_task_complete(&task.kind, unit_outcome);
        self.reschedule_if_periodic(&task);
        self.active = None;
        self.maybe_start_next();
    }

    fn reschedule_if_periodic(&mut self, task: &Task) {
        if let Some(period) = task.period {
            let next = Task::periodic(task.kind.clone(), task.priority, period, self.config.max_task_retries);
            self.scheduler.push(next, Instant::now() + period);
        }
    }

    fn on_inbound_segment(&mut self, bytes: &[u8]) {
        let segment = match crate::transport::Segment::decode(bytes) {
            Ok(s) => s,
            Err(_) => return,
        };
        if let Ok(Some(apdu_bytes)) = self.reassembler.on_segment(self.config.remote_address, &segment) {
            self.process_apdu(&apdu_bytes);
        }
    }

    fn process_apdu(&mut self, bytes: &[u8]) {
        let Ok(apdu) = Apdu::decode(bytes) else { return };
        if !apdu.function.is_response() {
            return;
        }
        let iin = apdu.iin.unwrap_or_default();

        if apdu.control.uns {
            self.handle_unsolicited(&apdu);
        } else {
            self.handle_solicited(&apdu);
        }
        self.handle_restart_iin(iin);
    }

    fn handle_unsolicited(&mut self, apdu: &Apdu) {
        self.dispatch_fragment(apdu);
        if apdu.control.con {
            self.send_confirm(apdu.control.seq, true);
        }
    }

    fn handle_solicited(&mut self, apdu: &Apdu) {
        let Some(active) = &self.active else { return };
        if apdu.control.seq != active.seq {
            // Stale or mismatched response (e.g. a duplicate after our own
            // retry already landed); exactly one task is ever in flight, so
            // anything else is discarded per the no-interleaving invariant.
            return;
        }

        match &active.phase {
            Phase::Scan => {
                self.dispatch_fragment(apdu);
                if apdu.control.fin {
                    if apdu.control.con {
                        self.send_confirm(apdu.control.seq, false);
                    }
                    let active = self.active.take().expect("active task present");
                    self.finish_task(active.task, Ok(TaskOutcome::Scan));
                } else {
                    self.active.as_mut().expect("active task present").deadline = Instant::now() + self.config.response_timeout;
                }
            }
            Phase::Select(commands) => {
                let statuses = command_statuses(apdu);
                let all_ok = !statuses.is_empty() && statuses.iter().all(|(_, s)| *s == CommandStatus::Success);
                let commands = commands.clone();
                let active = self.active.take().expect("active task present");
                if all_ok {
                    self.send_phase(active.task, Phase::Operate, FunctionCode::Operate, command_headers(&commands));
                } else {
                    self.finish_task(active.task, Ok(TaskOutcome::Commands(statuses)));
                }
            }
            Phase::Operate => {
                let statuses = command_statuses(apdu);
                let active = self.active.take().expect("active task present");
                self.finish_task(active.task, Ok(TaskOutcome::Commands(statuses)));
            }
            Phase::Write => {
                let active = self.active.take().expect("active task present");
                self.finish_task(active.task, Ok(TaskOutcome::Scan));
            }
        }
    }

    fn handle_restart_iin(&mut self, iin: Iin) {
        if iin.iin1.get(Iin1::DEVICE_RESTART) && !self.config.ignore_restart_iin && !self.scheduler.has_pending(Priority::Startup) {
            crate::info!("master {:#06X}: outstation reports device restart, re-running startup sequence", self.config.local_address);
            self.queue_startup_sequence();
            self.maybe_start_next();
        }
    }

    /// Invoke `BeginFragment`/typed/`EndFragment` for one response fragment's objects.
    fn dispatch_fragment(&mut self, apdu: &Apdu) {
        if apdu.control.fir {
            self.application.on_event(MeasurementEvent::BeginFragment);
        }
        for entry in &apdu.objects {
            for (position, value) in entry.objects.iter().enumerate() {
                if let Some(event) = to_measurement_event(&entry.header, value, position) {
                    self.application.on_event(event);
                }
            }
        }
        if apdu.control.fin {
            self.application.on_event(MeasurementEvent::EndFragment);
        }
    }

    fn send_confirm(&mut self, seq: u8, uns: bool) {
        let control = AppControl::new(true, true, false, uns, seq);
        let apdu = Apdu::request(control, FunctionCode::Confirm, Vec::new());
        if let Ok(bytes) = apdu.encode() {
            self.send_apdu_bytes(&bytes);
        }
    }

    fn send_apdu_bytes(&mut self, apdu: &[u8]) {
        let Ok(segments) = self.segmenter.segment(apdu) else { return };
        for segment in segments {
            let control = Control::primary(true, false, false, LinkFunction::UnconfirmedUserData);
            let frame = LinkFrame::new(control, self.config.remote_address, self.config.local_address, segment.encode());
            if let Ok(bytes) = frame.encode() {
                let _ = self.outbound.send(bytes);
            }
        }
    }
}

/// Class 0 (static) plus class 1/2/3 event headers, in that order, for an
/// integrity poll.
fn integrity_headers() -> Vec<HeaderedObjects> {
    let mut headers = vec![HeaderedObjects { header: ObjectHeader::all_objects(60, 1), objects: vec![ObjectValue::ClassData] }];
    headers.extend(class_headers(ClassMask::all()));
    headers
}

fn class_headers(mask: ClassMask) -> Vec<HeaderedObjects> {
    let mut headers = Vec::new();
    if mask.class1 {
        headers.push(HeaderedObjects { header: ObjectHeader::all_objects(60, 2), objects: vec![ObjectValue::ClassData] });
    }
    if mask.class2 {
        headers.push(HeaderedObjects { header: ObjectHeader::all_objects(60, 3), objects: vec![ObjectValue::ClassData] });
    }
    if mask.class3 {
        headers.push(HeaderedObjects { header: ObjectHeader::all_objects(60, 4), objects: vec![ObjectValue::ClassData] });
    }
    headers
}

fn command_headers(commands: &[CommandRequest]) -> Vec<HeaderedObjects> {
    commands
        .iter()
        .map(|command| match command {
            CommandRequest::Crob(crob) => HeaderedObjects {
                header: ObjectHeader::for_indexed(12, 1, 1, crob.index),
                objects: vec![ObjectValue::Crob(*crob)],
            },
            CommandRequest::AnalogOutput(cmd) => HeaderedObjects {
                header: ObjectHeader::for_indexed(41, analog_command_variation(cmd.value), 1, cmd.index),
                objects: vec![ObjectValue::AnalogOutputCommand(*cmd)],
            },
        })
        .collect()
}

fn analog_command_variation(value: AnalogValue) -> u8 {
    match value {
        AnalogValue::I32(_) => 1,
        AnalogValue::I16(_) => 2,
        AnalogValue::F32(_) => 3,
        AnalogValue::F64(_) => 4,
    }
}

fn command_statuses(apdu: &Apdu) -> Vec<(u32, CommandStatus)> {
    apdu.objects
        .iter()
        .flat_map(|entry| entry.objects.iter())
        .filter_map(|value| match value {
            ObjectValue::Crob(c) => Some((c.index, c.status)),
            ObjectValue::AnalogOutputCommand(c) => Some((c.index, c.status)),
            _ => None,
        })
        .collect()
}

/// An object instance's point index: events and commands already carry their
/// own; static values take their position from the header's start-stop range
/// (or their raw position, for an all-objects/count header).
fn object_index(header: &ObjectHeader, value: &ObjectValue, position: usize) -> u32 {
    if let Some(index) = explicit_index(value) {
        return index;
    }
    match header.range {
        HeaderRange::StartStop { start, .. } => start + position as u32,
        _ => position as u32,
    }
}

fn explicit_index(value: &ObjectValue) -> Option<u32> {
    match value {
        ObjectValue::BinaryEvent(e) | ObjectValue::BinaryOutputEvent(e) => Some(e.index),
        ObjectValue::DoubleBitEvent(e) => Some(e.index),
        ObjectValue::CommandEvent(e) => Some(e.index),
        ObjectValue::CounterEvent(e) | ObjectValue::FrozenCounterEvent(e) => Some(e.index),
        ObjectValue::AnalogEvent(e) | ObjectValue::AnalogOutputEvent(e) => Some(e.index),
        ObjectValue::Crob(c) => Some(c.index),
        ObjectValue::AnalogOutputCommand(c) => Some(c.index),
        _ => None,
    }
}

fn to_measurement_event(header: &ObjectHeader, value: &ObjectValue, position: usize) -> Option<MeasurementEvent> {
    let index = object_index(header, value, position);
    Some(match value {
        ObjectValue::Binary(v) | ObjectValue::BinaryOutputStatus(v) => MeasurementEvent::Binary { index, value: *v },
        ObjectValue::BinaryEvent(e) | ObjectValue::BinaryOutputEvent(e) => MeasurementEvent::Binary { index, value: e.value },
        ObjectValue::DoubleBit(v) => MeasurementEvent::DoubleBit { index, value: *v },
        ObjectValue::DoubleBitEvent(e) => MeasurementEvent::DoubleBit { index, value: e.value },
        ObjectValue::Counter(v) | ObjectValue::FrozenCounter(v) => MeasurementEvent::Counter { index, value: *v },
        ObjectValue::CounterEvent(e) | ObjectValue::FrozenCounterEvent(e) => MeasurementEvent::Counter { index, value: e.value },
        ObjectValue::Analog(v) | ObjectValue::AnalogOutputStatus(v) => MeasurementEvent::Analog { index, value: *v },
        ObjectValue::AnalogEvent(e) | ObjectValue::AnalogOutputEvent(e) => MeasurementEvent::Analog { index, value: e.value },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::objects::{AnalogPoint, AnalogValue, BinaryValue, Crob, Flags, OpType, TripClose};
    use crate::config::MasterConfig;
    use crate::transport::Segment;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingApplication {
        events: Arc<Mutex<Vec<MeasurementEvent>>>,
    }

    impl MasterApplication for RecordingApplication {
        fn on_event(&mut self, event: MeasurementEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn test_session() -> (MasterSession, crossbeam_channel::Receiver<Vec<u8>>, Arc<Mutex<Vec<MeasurementEvent>>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let events = Arc::new(Mutex::new(Vec::new()));
        let app = RecordingApplication { events: events.clone() };
        let config = MasterConfig { local_address: 1, remote_address: 1024, ..MasterConfig::default() };
        let session = MasterSession::new(config, Box::new(app), tx);
        (session, rx, events)
    }

    fn sent_apdu(rx: &crossbeam_channel::Receiver<Vec<u8>>) -> Apdu {
        let frame_bytes = rx.try_recv().expect("frame sent");
        let (frame, _) = LinkFrame::decode(&frame_bytes).expect("decode link frame");
        let segment = Segment::decode(&frame.payload).expect("decode segment");
        Apdu::decode(&segment.payload).expect("decode apdu")
    }

    fn deliver_response(session: &mut MasterSession, apdu: &Apdu) {
        let bytes = apdu.encode().expect("encode");
        let mut segmenter = Segmenter::new();
        for segment in segmenter.segment(&bytes).expect("segment") {
            session.on_inbound_segment(&segment.encode());
        }
    }

    #[test]
    fn integrity_scan_sends_class0_and_event_classes() {
        let (mut session, rx, _events) = test_session();
        session.enabled = true;
        session.scheduler.push(Task::one_shot(TaskKind::Integrity, Priority::Scan, 0), Instant::now());
        session.maybe_start_next();

        let request = sent_apdu(&rx);
        assert_eq!(request.function, FunctionCode::Read);
        assert_eq!(request.objects.len(), 4);
        assert_eq!(request.objects[0].header.group, 60);
        assert_eq!(request.objects[0].header.variation, 1);
    }

    #[test]
    fn integrity_response_dispatches_binary_events_in_order() {
        let (mut session, rx, events) = test_session();
        session.enabled = true;
        session.scheduler.push(Task::one_shot(TaskKind::Integrity, Priority::Scan, 0), Instant::now());
        session.maybe_start_next();
        let request = sent_apdu(&rx);

        let header = ObjectHeader::for_range(1, 2, 0, 2);
        let objects = vec![
            ObjectValue::Binary(BinaryValue { value: true, flags: Flags::online() }),
            ObjectValue::Binary(BinaryValue { value: false, flags: Flags::online() }),
            ObjectValue::Binary(BinaryValue { value: true, flags: Flags::online() }),
        ];
        let response = Apdu::response(
            AppControl::new(true, true, false, false, request.control.seq),
            FunctionCode::Response,
            Iin::default(),
            vec![HeaderedObjects { header, objects }],
        );
        deliver_response(&mut session, &response);

        let events = events.lock().unwrap();
        assert!(matches!(events[0], MeasurementEvent::BeginFragment));
        assert!(matches!(events[1], MeasurementEvent::Binary { index: 0, value: BinaryValue { value: true, .. } }));
        assert!(matches!(events[2], MeasurementEvent::Binary { index: 1, value: BinaryValue { value: false, .. } }));
        assert!(matches!(events[3], MeasurementEvent::Binary { index: 2, value: BinaryValue { value: true, .. } }));
        assert!(matches!(events[4], MeasurementEvent::EndFragment));
        assert!(session.active.is_none());
    }

    #[test]
    fn select_then_operate_round_trip() {
        let (mut session, rx, _events) = test_session();
        session.enabled = true;
        let crob = Crob {
            index: 5,
            trip_close: TripClose::Close,
            clear: false,
            queue: false,
            op_type: OpType::LatchOn,
            count: 1,
            on_time_ms: 1000,
            off_time_ms: 0,
            status: CommandStatus::Success,
        };
        session.scheduler.push(
            Task::one_shot(TaskKind::SelectAndOperate(vec![CommandRequest::Crob(crob)]), Priority::Command, 0),
            Instant::now(),
        );
        session.maybe_start_next();

        let select_request = sent_apdu(&rx);
        assert_eq!(select_request.function, FunctionCode::Select);

        let echo = HeaderedObjects { header: select_request.objects[0].header, objects: vec![ObjectValue::Crob(crob)] };
        let select_response = Apdu::response(
            AppControl::new(true, true, false, false, select_request.control.seq),
            FunctionCode::Response,
            Iin::default(),
            vec![echo],
        );
        deliver_response(&mut session, &select_response);

        let operate_request = sent_apdu(&rx);
        assert_eq!(operate_request.function, FunctionCode::Operate);
        assert_eq!(operate_request.control.seq, select_request.control.seq.wrapping_add(1) & 0x0F);

        let echo = HeaderedObjects { header: operate_request.objects[0].header, objects: vec![ObjectValue::Crob(crob)] };
        let operate_response = Apdu::response(
            AppControl::new(true, true, false, false, operate_request.control.seq),
            FunctionCode::Response,
            Iin::default(),
            vec![echo],
        );
        deliver_response(&mut session, &operate_response);

        assert!(session.active.is_none());
    }

    #[test]
    fn unsolicited_response_dispatches_and_confirms() {
        let (mut session, rx, events) = test_session();
        session.enabled = true;

        let header = ObjectHeader::for_range(30, 5, 1, 1);
        let analog = ObjectValue::Analog(AnalogPoint { value: AnalogValue::F64(21.5), flags: Flags::online() });
        let response = Apdu::response(
            AppControl::new(true, true, true, true, 0),
            FunctionCode::UnsolicitedResponse,
            Iin::default(),
            vec![HeaderedObjects { header, objects: vec![analog] }],
        );
        deliver_response(&mut session, &response);

        assert!(events.lock().unwrap().iter().any(|e| matches!(e, MeasurementEvent::Analog { index: 1, .. })));
        let confirm = sent_apdu(&rx);
        assert_eq!(confirm.function, FunctionCode::Confirm);
        assert_eq!(confirm.control.seq, 0);
        assert!(confirm.control.uns);
    }

    #[test]
    fn device_restart_iin_requeues_startup_sequence() {
        let (mut session, rx, _events) = test_session();
        session.enabled = true;
        session.scheduler.push(Task::one_shot(TaskKind::Integrity, Priority::Scan, 0), Instant::now());
        session.maybe_start_next();
        let request = sent_apdu(&rx);

        let response = Apdu::response(
            AppControl::new(true, true, false, false, request.control.seq),
            FunctionCode::Response,
            Iin { iin1: Iin1(Iin1::DEVICE_RESTART), iin2: crate::app::Iin2::default() },
            Vec::new(),
        );
        deliver_response(&mut session, &response);

        assert!(session.scheduler.has_pending(Priority::Startup));
    }

    #[test]
    fn timeout_retries_then_fails_after_retries_exhausted() {
        let (mut session, rx, _events) = test_session();
        session.enabled = true;
        session.scheduler.push(Task::one_shot(TaskKind::Integrity, Priority::Scan, 1), Instant::now());
        session.maybe_start_next();
        let _ = sent_apdu(&rx);

        session.active.as_mut().unwrap().deadline = Instant::now() - Duration::from_millis(1);
        session.on_timer();
        assert!(session.active.as_ref().unwrap().retry_pending);

        session.active.as_mut().unwrap().deadline = Instant::now() - Duration::from_millis(1);
        session.on_timer();
        assert!(rx.try_recv().is_ok(), "request retransmitted");
        assert!(!session.active.as_ref().unwrap().retry_pending);

        session.active.as_mut().unwrap().deadline = Instant::now() - Duration::from_millis(1);
        session.on_timer();
        assert!(session.active.is_none(), "task failed after retries exhausted");
    }
}
