// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The outstation session state machine: decodes inbound application
//! fragments, drives the database/event-buffer/command-handler trio, and
//! hands outbound link frames to the channel's single writer thread.
//!
//! Each session owns a worker thread (see [`OutstationSession::spawn`]) fed
//! by a bounded mailbox of [`SessionMsg`]; nothing here is called directly
//! from another thread once spawned, so the database, event buffers, and
//! pending-select state never need a lock of their own.

use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};

use crate::app::objects::{EventClass, Timestamp};
use crate::app::{Apdu, AppControl, FunctionCode, HeaderedObjects, Iin, Iin1, Iin2, ObjectHeader, ObjectValue};
use crate::config::{ClassMask, OutstationConfig};
use crate::link::{Control, LinkFrame, LinkFunction};
use crate::transport::{Reassembler, Segmenter};

use super::commands::{CommandHandler, CommandResult, PendingSelect};
use super::database::{Database, PointUpdate, Updates};
use super::events::EventBuffers;

/// Where the session sits in the SELECT/OPERATE and confirm protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    WaitingConfirm { seq: u8 },
    WaitingUnsolConfirm { seq: u8 },
}

/// A caller-facing request delivered to the session worker, decoupled from
/// the inbound-frame path so database writes and link traffic serialize
/// through the same loop without either blocking the other's caller.
pub enum UserRequest {
    /// Apply a batch of point updates, as produced by the device-facing code
    /// driving this outstation.
    Apply(Updates),
    /// Toggle whether this outstation will spontaneously report unsolicited
    /// responses (independent of a master's ENABLE/DISABLE_UNSOLICITED).
    SetUnsolicitedEnabled(bool),
}

/// One item in a session's mailbox.
pub enum SessionMsg {
    /// A transport segment (one [`crate::link::LinkFrame`] payload) addressed
    /// to this session.
    InboundSegment(Vec<u8>),
    /// A user request, with a oneshot reply so the caller can block until it
    /// has been applied.
    UserRequest(UserRequest, Sender<()>),
    Shutdown,
}

fn now_timestamp() -> Timestamp {
    let ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp(ms as u64)
}

/// The outstation's protocol state machine and owned data model.
pub struct OutstationSession {
    config: OutstationConfig,
    database: Database,
    events: EventBuffers,
    handler: Box<dyn CommandHandler>,
    segmenter: Segmenter,
    reassembler: Reassembler,
    outbound: Sender<Vec<u8>>,
    state: SessionState,
    pending_select: Option<PendingSelect>,
    restart_iin: bool,
    unsol_enabled: bool,
    unsol_seq: u8,
    last_unsol_apdu: Option<Vec<u8>>,
    next_deadline: Option<Instant>,
}

impl OutstationSession {
    #[must_use]
    pub fn new(config: OutstationConfig, handler: Box<dyn CommandHandler>, outbound: Sender<Vec<u8>>) -> Self {
        let event_buffers = EventBuffers::new(config.event_buffers);
        let max_rx = config.max_rx_frag_size;
        Self {
            unsol_enabled: config.allow_unsolicited,
            config,
            database: Database::new(),
            events: event_buffers,
            handler,
            segmenter: Segmenter::new(),
            reassembler: Reassembler::new(max_rx),
            outbound,
            state: SessionState::Idle,
            pending_select: None,
            restart_iin: true,
            unsol_seq: 0,
            last_unsol_apdu: None,
            next_deadline: None,
        }
    }

    /// Direct access to the point database, for test setup and for
    /// application code that configures points before the session starts.
    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }

    /// Spawn the session's worker thread, returning its handle and mailbox sender.
    pub fn spawn(mut self, mailbox: Receiver<SessionMsg>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name(format!("dnp3-outstation-{:04X}", self.config.local_address))
            .spawn(move || self.run(&mailbox))
            .expect("failed to spawn outstation session thread")
    }

    fn run(&mut self, mailbox: &Receiver<SessionMsg>) {
        crate::info!("outstation {:#06X}: session started", self.config.local_address);
        loop {
            let timeout = self
                .next_deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));

            match mailbox.recv_timeout(timeout) {
                Ok(SessionMsg::InboundSegment(bytes)) => self.on_inbound_segment(&bytes),
                Ok(SessionMsg::UserRequest(req, reply)) => {
                    self.on_user_request(req);
                    let _ = reply.send(());
                }
                Ok(SessionMsg::Shutdown) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => self.on_timeout(),
            }
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

    fn on_user_request(&mut self, req: UserRequest) {
        match req {
            UserRequest::Apply(updates) => {
                let now = now_timestamp();
                self.database.apply(updates, &mut self.events, now);
                self.maybe_send_unsolicited();
            }
            UserRequest::SetUnsolicitedEnabled(enabled) => self.unsol_enabled = enabled,
        }
    }

    fn on_timeout(&mut self) {
        let now = Instant::now();
        match self.state {
            SessionState::WaitingConfirm { seq } => {
                crate::warn!("outstation {:#06X}: solicited confirm timed out for seq {}", self.config.local_address, seq);
                self.events.release_pending(seq);
                self.state = SessionState::Idle;
                self.next_deadline = None;
            }
            SessionState::WaitingUnsolConfirm { seq } => {
                crate::debug!("outstation {:#06X}: unsolicited confirm timed out for seq {}, retrying", self.config.local_address, seq);
                if let Some(apdu) = self.last_unsol_apdu.clone() {
                    self.send_apdu_bytes(&apdu);
                }
                self.next_deadline = Some(now + self.config.unsol_retry_delay);
                let _ = seq;
            }
            SessionState::Idle => {
                self.next_deadline = None;
                if let Some(pending) = &self.pending_select {
                    if pending.is_expired(self.config.select_timeout) {
                        self.pending_select = None;
                    }
                }
                self.maybe_send_unsolicited();
            }
        }
    }

    /// After any database change, spontaneously report if unsolicited
    /// reporting is enabled, nothing is already pending confirmation, and
    /// the configured unsolicited class mask has matching events buffered.
    fn maybe_send_unsolicited(&mut self) {
        if !self.unsol_enabled || self.state != SessionState::Idle {
            return;
        }
        if !self.events.any_matching(self.config.unsol_class_mask) {
            return;
        }

        let seq = self.unsol_seq;
        self.unsol_seq = (self.unsol_seq + 1) & 0x0F;

        let objects = self.select_event_objects(self.config.unsol_class_mask, seq);
        let iin = self.current_iin();
        let control = AppControl::new(true, true, false, true, seq);
        let apdu = Apdu::response(control, FunctionCode::UnsolicitedResponse, iin, objects);
        let Ok(bytes) = apdu.encode() else { return };

        crate::debug!("outstation {:#06X}: sending unsolicited response seq {}", self.config.local_address, seq);
        self.last_unsol_apdu = Some(bytes.clone());
        self.send_apdu_bytes(&bytes);
        self.state = SessionState::WaitingUnsolConfirm { seq };
        self.next_deadline = Some(Instant::now() + self.config.unsol_confirm_timeout);
    }

    fn process_apdu(&mut self, bytes: &[u8]) {
        let Ok(apdu) = Apdu::decode(bytes) else { return };
        let now = now_timestamp();

        match apdu.function {
            FunctionCode::Confirm => self.handle_confirm(&apdu),
            FunctionCode::Read => self.handle_read(&apdu),
            FunctionCode::Write => self.handle_write(&apdu),
            FunctionCode::Select => self.handle_select(&apdu),
            FunctionCode::Operate => self.handle_operate(&apdu, now),
            FunctionCode::DirectOperate => self.handle_direct_operate(&apdu, now, true),
            FunctionCode::DirectOperateNoResponse => self.handle_direct_operate(&apdu, now, false),
            FunctionCode::EnableUnsolicited => self.handle_enable_unsolicited(&apdu, true),
            FunctionCode::DisableUnsolicited => self.handle_enable_unsolicited(&apdu, false),
            FunctionCode::FreezeClear => self.handle_freeze_clear(&apdu, now),
            FunctionCode::ColdRestart | FunctionCode::WarmRestart => self.handle_restart(&apdu),
            FunctionCode::Response | FunctionCode::UnsolicitedResponse => {}
        }
    }

    fn handle_confirm(&mut self, apdu: &Apdu) {
        match self.state {
            SessionState::WaitingConfirm { seq } if apdu.control.seq == seq && !apdu.control.uns => {
                self.events.confirm(seq);
                self.state = SessionState::Idle;
                self.next_deadline = None;
            }
            SessionState::WaitingUnsolConfirm { seq } if apdu.control.seq == seq && apdu.control.uns => {
                self.events.confirm(seq);
                self.last_unsol_apdu = None;
                self.state = SessionState::Idle;
                self.next_deadline = None;
                self.maybe_send_unsolicited();
            }
            _ => {}
        }
    }

    fn handle_read(&mut self, apdu: &Apdu) {
        let mut objects = Vec::new();
        let mut event_mask = ClassMask::none();
        let mut want_class0 = false;

        for entry in &apdu.objects {
            match (entry.header.group, entry.header.variation) {
                (60, 1) => want_class0 = true,
                (60, 2) => event_mask.class1 = true,
                (60, 3) => event_mask.class2 = true,
                (60, 4) => event_mask.class3 = true,
                (group, _) => objects.extend(self.static_objects_for(group, entry.header.range)),
            }
        }

        if want_class0 {
            objects.extend(self.all_static_objects());
        }
        if !event_mask.is_empty() {
            objects.extend(self.select_event_objects(event_mask, self.request_seq(apdu)));
        }

        self.respond(apdu, objects);
    }

    /// Static (class 0 style) read for one group.
    ///
    /// This core's database keeps one configured static variation per point
    /// type rather than per index, so a read always returns every configured
    /// point of the requested group; a request's own start-stop range is not
    /// sub-filtered. Documented as a simplification in the design notes.
    fn static_objects_for(&self, group: u8, _range: crate::app::HeaderRange) -> Vec<HeaderedObjects> {
        macro_rules! snapshot_header {
            ($snapshot:expr, $group:expr) => {
                if let Some((start, stop, variation, values)) = $snapshot {
                    return vec![HeaderedObjects {
                        header: ObjectHeader::for_range($group, variation.variation(), start, stop),
                        objects: values,
                    }];
                }
            };
        }

        match group {
            1 => snapshot_header!(self.database.binary_snapshot(), 1),
            3 => snapshot_header!(self.database.double_bit_snapshot(), 3),
            10 => snapshot_header!(self.database.binary_output_snapshot(), 10),
            20 => snapshot_header!(self.database.counter_snapshot(), 20),
            21 => snapshot_header!(self.database.frozen_counter_snapshot(), 21),
            30 => snapshot_header!(self.database.analog_snapshot(), 30),
            40 => snapshot_header!(self.database.analog_output_snapshot(), 40),
            _ => {}
        }
        Vec::new()
    }

    fn all_static_objects(&self) -> Vec<HeaderedObjects> {
        let mut objects = Vec::new();
        for group in [1u8, 3, 10, 20, 21, 30, 40] {
            objects.extend(self.static_objects_for(group, crate::app::HeaderRange::AllObjects));
        }
        objects
    }

    fn select_event_objects(&mut self, mask: ClassMask, seq: u8) -> Vec<HeaderedObjects> {
        let selected = self.events.select_for_response(mask, seq, 1000);
        selected
            .into_iter()
            .filter_map(|(point_type, events)| {
                let (group, variation) = events.first().map(|e| (e.group, e.variation))?;
                let max_index = events.iter().map(|e| object_index_of(&e.value)).max().unwrap_or(0);
                let count = events.len() as u32;
                let header = ObjectHeader::for_indexed(group, variation, count, max_index);
                let objects = events.into_iter().map(|e| e.value).collect();
                let _ = point_type;
                Some(HeaderedObjects { header, objects })
            })
            .collect()
    }

    fn handle_write(&mut self, apdu: &Apdu) {
        for entry in &apdu.objects {
            if entry.header.group != 80 || entry.header.variation != 1 {
                continue;
            }
            let start = match entry.header.range {
                crate::app::HeaderRange::StartStop { start, .. } => start,
                _ => 0,
            };
            if let Some(ObjectValue::Iin(bits)) = entry.objects.first() {
                for (i, &bit) in bits.iter().enumerate() {
                    if start + i as u32 == 7 && !bit {
                        self.restart_iin = false;
                    }
                }
            }
        }
        self.respond(apdu, Vec::new());
    }

    fn handle_select(&mut self, apdu: &Apdu) {
        if command_count(apdu) > self.config.max_controls_per_request {
            self.pending_select = None;
            let objects = self.reject_commands(apdu, crate::app::objects::CommandStatus::TooManyOps);
            self.respond(apdu, objects);
            return;
        }

        let seq = self.request_seq(apdu);
        let mut indices = Vec::new();
        let mut objects = Vec::new();
        let mut all_success = true;

        for entry in &apdu.objects {
            for value in &entry.objects {
                let (index, result, echoed) = match value {
                    ObjectValue::Crob(c) => {
                        let r = self.handler.select_crob(c.index, c);
                        let mut echo = *c;
                        echo.status = r.status;
                        (c.index, r, ObjectValue::Crob(echo))
                    }
                    ObjectValue::AnalogOutputCommand(c) => {
                        let r = self.handler.select_analog_output(c.index, c);
                        let mut echo = *c;
                        echo.status = r.status;
                        (c.index, r, ObjectValue::AnalogOutputCommand(echo))
                    }
                    _ => continue,
                };
                indices.push(index);
                if result.status != crate::app::objects::CommandStatus::Success {
                    all_success = false;
                }
                objects.push(HeaderedObjects {
                    header: ObjectHeader::for_indexed(entry.header.group, entry.header.variation, 1, index),
                    objects: vec![echoed],
                });
            }
        }

        if all_success && !indices.is_empty() {
            self.pending_select = Some(PendingSelect::new(seq, indices));
        } else {
            self.pending_select = None;
        }

        self.respond(apdu, objects);
    }

    fn handle_operate(&mut self, apdu: &Apdu, now: Timestamp) {
        if command_count(apdu) > self.config.max_controls_per_request {
            self.pending_select = None;
            let objects = self.reject_commands(apdu, crate::app::objects::CommandStatus::TooManyOps);
            self.respond(apdu, objects);
            return;
        }

        let seq = self.request_seq(apdu);
        let indices: Vec<u32> = apdu
            .objects
            .iter()
            .flat_map(|e| e.objects.iter())
            .filter_map(command_index)
            .collect();

        let select_ok = self
            .pending_select
            .as_ref()
            .is_some_and(|p| !p.is_expired(self.config.select_timeout) && p.matches(seq, &indices));

        let objects = if select_ok {
            self.pending_select = None;
            self.execute_commands(apdu, now)
        } else {
            crate::warn!("outstation {:#06X}: rejecting OPERATE with no matching SELECT", self.config.local_address);
            self.reject_commands(apdu, crate::app::objects::CommandStatus::NoSelect)
        };

        self.respond(apdu, objects);
    }

    fn handle_direct_operate(&mut self, apdu: &Apdu, now: Timestamp, want_response: bool) {
        let objects = if command_count(apdu) > self.config.max_controls_per_request {
            self.reject_commands(apdu, crate::app::objects::CommandStatus::TooManyOps)
        } else {
            self.execute_commands(apdu, now)
        };
        if want_response {
            self.respond(apdu, objects);
        }
    }

    fn execute_commands(&mut self, apdu: &Apdu, now: Timestamp) -> Vec<HeaderedObjects> {
        let mut updates = Updates::new();
        let mut objects = Vec::new();

        for entry in &apdu.objects {
            for value in &entry.objects {
                let echoed = match value {
                    ObjectValue::Crob(c) => {
                        let r = self.handler.operate_crob(c.index, c, &mut updates);
                        let mut echo = *c;
                        echo.status = r.status;
                        ObjectValue::Crob(echo)
                    }
                    ObjectValue::AnalogOutputCommand(c) => {
                        let r = self.handler.operate_analog_output(c.index, c, &mut updates);
                        let mut echo = *c;
                        echo.status = r.status;
                        ObjectValue::AnalogOutputCommand(echo)
                    }
                    _ => continue,
                };
                let index = command_index(&echoed).unwrap_or(0);
                objects.push(HeaderedObjects {
                    header: ObjectHeader::for_indexed(entry.header.group, entry.header.variation, 1, index),
                    objects: vec![echoed],
                });
            }
        }

        self.database.apply(updates, &mut self.events, now);
        self.maybe_send_unsolicited();
        objects
    }

    fn reject_commands(&self, apdu: &Apdu, status: crate::app::objects::CommandStatus) -> Vec<HeaderedObjects> {
        apdu.objects
            .iter()
            .map(|entry| {
                let rejected: Vec<ObjectValue> = entry
                    .objects
                    .iter()
                    .map(|value| match value {
                        ObjectValue::Crob(c) => {
                            let mut echo = *c;
                            echo.status = status;
                            ObjectValue::Crob(echo)
                        }
                        ObjectValue::AnalogOutputCommand(c) => {
                            let mut echo = *c;
                            echo.status = status;
                            ObjectValue::AnalogOutputCommand(echo)
                        }
                        other => other.clone(),
                    })
                    .collect();
                HeaderedObjects { header: entry.header, objects: rejected }
            })
            .collect()
    }

    fn handle_enable_unsolicited(&mut self, apdu: &Apdu, enabled: bool) {
        self.unsol_enabled = enabled;
        self.respond(apdu, Vec::new());
    }

    fn handle_freeze_clear(&mut self, apdu: &Apdu, now: Timestamp) {
        let mut updates = Updates::new();
        let (db_start, db_stop) = self.database.counter_range();
        for entry in &apdu.objects {
            if entry.header.group != 20 {
                continue;
            }
            let (start, stop) = clamp_range(entry.header.range, db_start, db_stop);
            for index in start..=stop {
                if let Some(ObjectValue::Counter(c)) = self.database.counter_static(index) {
                    updates.update(PointUpdate::FrozenCounter {
                        index,
                        value: c.value,
                        flags: c.flags,
                        mode: crate::config::EventMode::Force,
                    });
                    updates.update(PointUpdate::Counter {
                        index,
                        value: 0,
                        flags: c.flags,
                        mode: crate::config::EventMode::Force,
                    });
                }
            }
        }
        self.database.apply(updates, &mut self.events, now);
        self.respond(apdu, Vec::new());
    }

    fn handle_restart(&mut self, apdu: &Apdu) {
        // Restart timing objects (g52v2) are outside this core's encode
        // support; acknowledge with an empty object set.
        self.respond(apdu, Vec::new());
    }

    fn request_seq(&self, apdu: &Apdu) -> u8 {
        apdu.control.seq
    }

    fn current_iin(&self) -> Iin {
        let mut iin1 = Iin1::default();
        iin1.set(Iin1::DEVICE_RESTART, self.restart_iin);
        iin1.set(Iin1::LOCAL_CONTROL, self.config.local_control);
        iin1.set(Iin1::DEVICE_TROUBLE, self.config.device_trouble);
        iin1.set(Iin1::CLASS_1_EVENTS, self.events.any_matching(ClassMask { class1: true, class2: false, class3: false }));
        iin1.set(Iin1::CLASS_2_EVENTS, self.events.any_matching(ClassMask { class1: false, class2: true, class3: false }));
        iin1.set(Iin1::CLASS_3_EVENTS, self.events.any_matching(ClassMask { class1: false, class2: false, class3: true }));

        let mut iin2 = Iin2::default();
        iin2.set(Iin2::EVENT_BUFFER_OVERFLOW, self.events.event_buffer_overflow());

        Iin { iin1, iin2 }
    }

    fn respond(&mut self, request: &Apdu, objects: Vec<HeaderedObjects>) {
        let seq = self.request_seq(request);
        let has_events = objects.iter().any(|o| is_event_header(&o.header));
        let control = AppControl::new(true, true, has_events, false, seq);
        let iin = self.current_iin();
        let apdu = Apdu::response(control, FunctionCode::Response, iin, objects);
        let Ok(bytes) = apdu.encode() else { return };

        self.send_apdu_bytes(&bytes);
        if has_events {
            self.state = SessionState::WaitingConfirm { seq };
            self.next_deadline = Some(Instant::now() + self.config.unsol_confirm_timeout);
        }
    }

    fn send_apdu_bytes(&mut self, apdu: &[u8]) {
        let Ok(segments) = self.segmenter.segment(apdu) else { return };
        for segment in segments {
            let control = Control::primary(false, false, false, LinkFunction::UnconfirmedUserData);
            let frame = LinkFrame::new(control, self.config.remote_address, self.config.local_address, segment.encode());
            if let Ok(bytes) = frame.encode() {
                let _ = self.outbound.send(bytes);
            }
        }
    }
}

fn clamp_range(range: crate::app::HeaderRange, db_start: u32, db_stop: u32) -> (u32, u32) {
    match range {
        crate::app::HeaderRange::StartStop { start, stop } => (start.max(db_start), stop.min(db_stop)),
        _ => (db_start, db_stop),
    }
}

fn command_index(value: &ObjectValue) -> Option<u32> {
    match value {
        ObjectValue::Crob(c) => Some(c.index),
        ObjectValue::AnalogOutputCommand(c) => Some(c.index),
        _ => None,
    }
}

/// Number of individual command objects (CROB/analog output) across all
/// headers in a SELECT/OPERATE/DIRECT_OPERATE request.
fn command_count(apdu: &Apdu) -> usize {
    apdu.objects.iter().flat_map(|entry| entry.objects.iter()).filter(|v| command_index(v).is_some()).count()
}

fn object_index_of(value: &ObjectValue) -> u32 {
    match value {
        ObjectValue::BinaryEvent(e) | ObjectValue::BinaryOutputEvent(e) => e.index,
        ObjectValue::DoubleBitEvent(e) => e.index,
        ObjectValue::CounterEvent(e) | ObjectValue::FrozenCounterEvent(e) => e.index,
        ObjectValue::AnalogEvent(e) | ObjectValue::AnalogOutputEvent(e) => e.index,
        _ => 0,
    }
}

fn is_event_header(header: &ObjectHeader) -> bool {
    matches!(header.group, 2 | 4 | 11 | 13 | 22 | 23 | 32 | 42)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::objects::{Flags, OpType, TripClose};
    use crate::config::{BinaryPointConfig, PointClass};
    use crate::outstation::commands::RejectingHandler;

    fn test_session() -> (OutstationSession, crossbeam_channel::Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = OutstationConfig { local_address: 1024, remote_address: 1, ..OutstationConfig::default() };
        let mut session = OutstationSession::new(config, Box::new(RejectingHandler), tx);
        session.database_mut().add_binary(0, BinaryPointConfig { class: PointClass::Class1, ..BinaryPointConfig::default() });
        (session, rx)
    }

    fn send_request(session: &mut OutstationSession, apdu: &Apdu) {
        let bytes = apdu.encode().expect("encode");
        let mut segmenter = Segmenter::new();
        for segment in segmenter.segment(&bytes).expect("segment") {
            session.on_inbound_segment(&segment.encode());
        }
    }

    #[test]
    fn read_class0_returns_static_binary() {
        let (mut session, rx) = test_session();
        let request = Apdu::request(
            AppControl::single(1),
            FunctionCode::Read,
            vec![HeaderedObjects { header: ObjectHeader::all_objects(60, 1), objects: vec![ObjectValue::ClassData] }],
        );
        send_request(&mut session, &request);

        let frame_bytes = rx.try_recv().expect("response frame sent");
        let (frame, _) = LinkFrame::decode(&frame_bytes).expect("decode link frame");
        let segment = crate::transport::Segment::decode(&frame.payload).expect("decode segment");
        let response = Apdu::decode(&segment.payload).expect("decode apdu");
        assert_eq!(response.function, FunctionCode::Response);
        assert!(!response.objects.is_empty());
    }

    #[test]
    fn write_clears_restart_iin() {
        let (mut session, rx) = test_session();
        assert!(session.restart_iin);

        let header = ObjectHeader::for_range(80, 1, 7, 7);
        let request = Apdu::request(
            AppControl::single(1),
            FunctionCode::Write,
            vec![HeaderedObjects { header, objects: vec![ObjectValue::Iin(vec![false])] }],
        );
        send_request(&mut session, &request);

        assert!(!session.restart_iin);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn select_without_matching_operate_is_rejected() {
        let (mut session, rx) = test_session();
        let crob = crate::app::objects::Crob {
            index: 0,
            trip_close: TripClose::Close,
            clear: false,
            queue: false,
            op_type: OpType::LatchOn,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: crate::app::objects::CommandStatus::Success,
        };
        let header = ObjectHeader::for_indexed(12, 1, 1, 0);
        let request = Apdu::request(
            AppControl::single(1),
            FunctionCode::Operate,
            vec![HeaderedObjects { header, objects: vec![ObjectValue::Crob(crob)] }],
        );
        send_request(&mut session, &request);

        let frame_bytes = rx.try_recv().expect("response sent");
        let (frame, _) = LinkFrame::decode(&frame_bytes).expect("decode");
        let segment = crate::transport::Segment::decode(&frame.payload).expect("decode segment");
        let response = Apdu::decode(&segment.payload).expect("decode apdu");
        match &response.objects[0].objects[0] {
            ObjectValue::Crob(c) => assert_eq!(c.status, crate::app::objects::CommandStatus::NoSelect),
            _ => panic!("expected crob echo"),
        }
    }

    #[test]
    fn direct_operate_over_max_controls_is_rejected_without_calling_handler() {
        let (mut session, rx) = test_session();
        session.config.max_controls_per_request = 1;

        let crob = |index: u32| crate::app::objects::Crob {
            index,
            trip_close: TripClose::Close,
            clear: false,
            queue: false,
            op_type: OpType::LatchOn,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: crate::app::objects::CommandStatus::Success,
        };
        let headers = vec![
            HeaderedObjects { header: ObjectHeader::for_indexed(12, 1, 1, 0), objects: vec![ObjectValue::Crob(crob(0))] },
            HeaderedObjects { header: ObjectHeader::for_indexed(12, 1, 1, 1), objects: vec![ObjectValue::Crob(crob(1))] },
        ];
        let request = Apdu::request(AppControl::single(1), FunctionCode::DirectOperate, headers);
        send_request(&mut session, &request);

        let frame_bytes = rx.try_recv().expect("response sent");
        let (frame, _) = LinkFrame::decode(&frame_bytes).expect("decode");
        let segment = crate::transport::Segment::decode(&frame.payload).expect("decode segment");
        let response = Apdu::decode(&segment.payload).expect("decode apdu");
        for entry in &response.objects {
            match &entry.objects[0] {
                ObjectValue::Crob(c) => assert_eq!(c.status, crate::app::objects::CommandStatus::TooManyOps),
                _ => panic!("expected crob echo"),
            }
        }
    }

    #[test]
    fn confirm_clears_waiting_state() {
        let (mut session, _rx) = test_session();
        session.state = SessionState::WaitingConfirm { seq: 3 };
        session.next_deadline = Some(Instant::now() + Duration::from_secs(5));

        let apdu = Apdu::request(AppControl::new(true, true, false, false, 3), FunctionCode::Confirm, Vec::new());
        session.handle_confirm(&apdu);

        assert_eq!(session.state, SessionState::Idle);
        assert!(session.next_deadline.is_none());
    }

    #[test]
    fn unsolicited_response_sent_after_apply_when_enabled() {
        let (mut session, rx) = test_session();
        let mut updates = Updates::new();
        updates.update(PointUpdate::Binary { index: 0, value: true, flags: Flags::online(), mode: crate::config::EventMode::Detect });
        session.on_user_request(UserRequest::Apply(updates));

        assert!(matches!(session.state, SessionState::WaitingUnsolConfirm { .. }));
        assert!(rx.try_recv().is_ok());
    }
}
