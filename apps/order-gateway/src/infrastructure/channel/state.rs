//! Shared Channel State
//!
//! Connection phase and counters published by the control-channel client
//! and read by the event relay (for its drop-when-inactive policy) and
//! the admin HTTP facade.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::domain::Session;

/// Control-channel connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelPhase {
    /// No transport.
    Disconnected = 0,
    /// Transport being established.
    Connecting = 1,
    /// Transport up, session registration not yet sent.
    Handshaking = 2,
    /// Registered and serving traffic.
    Active = 3,
}

impl ChannelPhase {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Handshaking,
            3 => Self::Active,
            _ => Self::Disconnected,
        }
    }

    /// Phase name for health reporting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Active => "active",
        }
    }
}

/// Shared snapshot of the control channel, safe for concurrent readers.
#[derive(Debug, Default)]
pub struct ChannelState {
    phase: AtomicU8,
    frames_received: AtomicU64,
    reconnect_attempts: AtomicU32,
    session: RwLock<Option<Session>>,
}

impl ChannelState {
    /// Create state in the `Disconnected` phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the current phase.
    pub fn set_phase(&self, phase: ChannelPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ChannelPhase {
        ChannelPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Whether the channel is registered and serving traffic.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase() == ChannelPhase::Active
    }

    /// Count one received frame.
    pub fn increment_frames(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Total frames received across all epochs.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Count one reconnection attempt.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Total reconnection attempts since startup.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Publish the session announced in the current epoch.
    pub fn set_session(&self, session: Session) {
        *self.session.write() = Some(session);
    }

    /// Most recently announced session.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }
}
