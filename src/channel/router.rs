// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link-address routing: delivers an inbound frame's payload to whichever
//! session (master or outstation) was registered at the frame's
//! destination address.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::MAX_SESSIONS_PER_CHANNEL;
use crate::error::Error;
use crate::link::LinkFrame;

/// A session's inbound side, reduced to the one thing the router needs: a
/// way to hand it a transport-segment payload. Outstation and master
/// sessions have different mailbox enums, so each gets a thin adapter
/// implementing this trait rather than the router knowing either type.
pub trait InboundSink: Send + Sync {
    /// Deliver one transport segment's raw bytes to the session.
    fn deliver(&self, payload: Vec<u8>);
}

/// Outcome of routing a single received frame, for metrics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    /// Delivered to a registered session.
    Delivered,
    /// No session is registered at the frame's destination address.
    Orphaned,
    /// The frame's link function carries no transport payload (link-layer
    /// resets, status requests, acks) and was intentionally not routed.
    Ignored,
}

/// A concurrent map from local link address to the session registered
/// there. Shared between a channel's reader thread (lookups on every
/// frame) and the handles callers use to add/remove sessions.
#[derive(Default)]
pub struct Router {
    sessions: DashMap<u16, Arc<dyn InboundSink>>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's inbound sink at `local_address`.
    ///
    /// Fails if the address is already taken or the channel is already at
    /// its session cap.
    pub fn register(&self, local_address: u16, sink: Arc<dyn InboundSink>) -> Result<(), Error> {
        if self.sessions.len() >= MAX_SESSIONS_PER_CHANNEL {
            return Err(Error::TooManySessions);
        }
        match self.sessions.entry(local_address) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::DuplicateAddress(local_address)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(sink);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, local_address: u16) {
        self.sessions.remove(&local_address);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Route one decoded frame: only user-data link functions carry a
    /// transport payload worth delivering, everything else (link resets,
    /// status, acks) this core's sessions never initiate or need, so it is
    /// dropped here rather than queued for a session that wouldn't know
    /// what to do with it.
    pub fn dispatch(&self, frame: &LinkFrame) -> RouteStatus {
        use crate::link::LinkFunction;
        match frame.control.function {
            LinkFunction::ConfirmedUserData | LinkFunction::UnconfirmedUserData => {
                match self.sessions.get(&frame.dest) {
                    Some(sink) => {
                        sink.deliver(frame.payload.clone());
                        RouteStatus::Delivered
                    }
                    None => RouteStatus::Orphaned,
                }
            }
            _ => RouteStatus::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Control;
    use std::sync::Mutex;

    struct RecordingSink(Mutex<Vec<Vec<u8>>>);

    impl InboundSink for RecordingSink {
        fn deliver(&self, payload: Vec<u8>) {
            self.0.lock().unwrap().push(payload);
        }
    }

    fn data_frame(dest: u16, payload: Vec<u8>) -> LinkFrame {
        let control = Control::primary(true, false, false, crate::link::LinkFunction::UnconfirmedUserData);
        LinkFrame::new(control, dest, 1, payload)
    }

    #[test]
    fn duplicate_address_rejected() {
        let router = Router::new();
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        router.register(1024, sink.clone()).unwrap();
        assert!(matches!(router.register(1024, sink), Err(Error::DuplicateAddress(1024))));
    }

    #[test]
    fn dispatch_delivers_to_registered_address() {
        let router = Router::new();
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        router.register(1024, sink.clone()).unwrap();

        let status = router.dispatch(&data_frame(1024, vec![1, 2, 3]));
        assert_eq!(status, RouteStatus::Delivered);
        assert_eq!(sink.0.lock().unwrap().as_slice(), &[vec![1, 2, 3]]);
    }

    #[test]
    fn dispatch_orphans_unknown_address() {
        let router = Router::new();
        let status = router.dispatch(&data_frame(9999, vec![1]));
        assert_eq!(status, RouteStatus::Orphaned);
    }

    #[test]
    fn session_cap_enforced() {
        let router = Router::new();
        for addr in 0..MAX_SESSIONS_PER_CHANNEL as u16 {
            let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
            router.register(addr, sink).unwrap();
        }
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        assert!(matches!(router.register(MAX_SESSIONS_PER_CHANNEL as u16, sink), Err(Error::TooManySessions)));
    }
}
