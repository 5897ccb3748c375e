use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// opened, not capturing.
    #[default]
    Idle = 0,
    Running,
    /// the transport failed, close and reopen the device.
    Faulted,
    Closed,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Faulted,
            _ => Self::Closed,
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Faulted => write!(f, "Faulted"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Session state shared between the caller and the capture thread.
#[derive(Debug, Default, Clone)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new(state: State) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    #[inline]
    pub fn get(&self) -> State {
        self.0.load(Ordering::Acquire).into()
    }

    #[inline]
    pub fn set(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `to` only when the state is still `from`, returns whether it moved.
    #[inline]
    pub fn transition(&self, from: State, to: State) -> bool {
        self.0.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Fault the session unless it is closed already.
    pub fn fault(&self) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            match State::from(v) {
                State::Closed => None,
                _ => Some(State::Faulted as u8),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{SharedState, State};

    #[test]
    fn test_transition() {
        let state = SharedState::new(State::Idle);
        let shared = state.clone();
        assert!(!shared.transition(State::Running, State::Faulted));
        assert_eq!(state.get(), State::Idle);

        state.set(State::Running);
        assert!(shared.transition(State::Running, State::Faulted));
        assert_eq!(state.get(), State::Faulted);

        state.set(State::Closed);
        shared.fault();
        assert_eq!(state.get(), State::Closed);
        assert_eq!(state.get().to_string(), "Closed");
    }
}
