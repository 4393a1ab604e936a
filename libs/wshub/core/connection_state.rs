//! Lock-free state cells for sessions and the client connector
//!
//! Both state machines are stored as a `u8` inside an `AtomicU8` so that
//! any task can observe the current state without locking.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

/// A state enum that can live in an [`AtomicState`]
pub trait StateRepr: Copy + Debug + PartialEq + Send + Sync + 'static {
    fn to_u8(self) -> u8;
    fn from_u8(value: u8) -> Self;
}

/// Client connector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Interrupt received; close frame being sent
    Interrupted,
    /// Terminal; no further reconnect attempts
    Stopped,
}

impl StateRepr for ConnectionState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Interrupted,
            _ => ConnectionState::Stopped,
        }
    }
}

/// Hub-side session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    /// Registered, both loops active
    Open,
    /// Close initiated by read error, write error, or queue closure
    Closing,
    /// Registry entry removed, transport released
    Closed,
}

impl SessionState {
    /// The state that must precede `self`, if any
    fn predecessor(self) -> Option<SessionState> {
        match self {
            SessionState::Connecting => None,
            SessionState::Open => Some(SessionState::Connecting),
            SessionState::Closing => Some(SessionState::Open),
            SessionState::Closed => Some(SessionState::Closing),
        }
    }
}

impl StateRepr for SessionState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Atomic cell holding a state enum
pub struct AtomicState<S: StateRepr> {
    value: AtomicU8,
    _state: PhantomData<S>,
}

impl<S: StateRepr> AtomicState<S> {
    pub fn new(state: S) -> Self {
        Self {
            value: AtomicU8::new(state.to_u8()),
            _state: PhantomData,
        }
    }

    #[inline]
    pub fn get(&self) -> S {
        S::from_u8(self.value.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: S) {
        self.value.store(state.to_u8(), Ordering::Release);
    }

    /// Move from `current` to `new` only if the cell still holds `current`
    ///
    /// Returns the observed state on failure.
    pub fn compare_exchange(&self, current: S, new: S) -> std::result::Result<S, S> {
        self.value
            .compare_exchange(
                current.to_u8(),
                new.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(S::from_u8)
            .map_err(S::from_u8)
    }
}

impl<S: StateRepr> Debug for AtomicState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicState").field(&self.get()).finish()
    }
}

pub type AtomicConnectionState = AtomicState<ConnectionState>;
pub type AtomicSessionState = AtomicState<SessionState>;

impl AtomicState<ConnectionState> {
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.get() == ConnectionState::Disconnected
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.get() == ConnectionState::Stopped
    }
}

impl AtomicState<SessionState> {
    /// Advance one step along CONNECTING → OPEN → CLOSING → CLOSED
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// session was not in the required predecessor state (including when it
    /// is already in `next`).
    pub fn advance(&self, next: SessionState) -> bool {
        match next.predecessor() {
            Some(previous) => self.compare_exchange(previous, next).is_ok(),
            None => false,
        }
    }
}
