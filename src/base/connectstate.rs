use std::sync::atomic::{AtomicU8, Ordering};

/// The current state of a connect job.
///
/// The state is the only value shared between the resolution task and the
/// main loop, so every transition happens on the main loop except
/// `Resolving -> Connecting` and `Resolving -> Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectState {
    /// Created, resolution not started yet.
    #[default]
    Init = 0,

    /// Resolving the host on the background task.
    Resolving = 1,

    /// Resolution or every connect attempt failed.
    Failure = 2,

    /// Connect attempts are in flight.
    Connecting = 3,

    /// One socket connected.
    Connected = 4,
}

impl ConnectState {
    /// Connected or Failure; no transition leaves these.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectState::Connected | ConnectState::Failure)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectState::Resolving,
            2 => ConnectState::Failure,
            3 => ConnectState::Connecting,
            4 => ConnectState::Connected,
            _ => ConnectState::Init,
        }
    }
}

/// Lock-free cell holding a [`ConnectState`].
///
/// Stores use `Release` and loads use `Acquire`, so anything written before a
/// store is visible to the thread that observes the new state.
#[derive(Debug, Default)]
pub struct AtomicConnectState(AtomicU8);

impl AtomicConnectState {
    pub fn new(state: ConnectState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> ConnectState {
        ConnectState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: ConnectState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `current` to `new`; returns false if another state was set first.
    pub fn transition(&self, current: ConnectState, new: ConnectState) -> bool {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
