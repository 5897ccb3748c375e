use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use derive_getters::Getters;
use can_core::Listener;
use crate::CanMessage;

/// The listener trait object a session delivers frames to.
pub type FrameListener = Box<dyn Listener<u8, CanMessage>>;

/// Adapts a closure to a [`Listener`], it is called for every received frame.
pub struct CallbackListener<F>(F);

impl<F> CallbackListener<F>
where
    F: Fn(&CanMessage) + Send + 'static,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> Listener<u8, CanMessage> for CallbackListener<F>
where
    F: Fn(&CanMessage) + Send + 'static,
{
    #[inline]
    fn on_frame_received(&self, _channel: u8, frame: &CanMessage) {
        (self.0)(frame)
    }
}

/// Hands received frames over to a [`FrameQueue`].
pub struct QueueListener(Sender<CanMessage>);

impl Listener<u8, CanMessage> for QueueListener {
    fn on_frame_received(&self, channel: u8, frame: &CanMessage) {
        if self.0.send(frame.clone()).is_err() {
            log::trace!("CANTACT - queue of channel: {} is dropped", channel);
        }
    }
}

/// The receiving side of a [`QueueListener`].
pub struct FrameQueue(Receiver<CanMessage>);

impl Debug for FrameQueue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue").finish()
    }
}

impl FrameQueue {
    /// Create a connected listener and queue pair.
    pub fn new() -> (QueueListener, Self) {
        let (tx, rx) = channel();
        (QueueListener(tx), Self(rx))
    }

    /// Wait at most `timeout` for the next frame.
    pub fn recv(&self, timeout: Duration) -> Option<CanMessage> {
        match self.0.recv_timeout(timeout) {
            Ok(v) => Some(v),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    #[inline]
    pub fn try_recv(&self) -> Option<CanMessage> {
        self.0.try_recv().ok()
    }

    /// All frames queued so far.
    pub fn drain(&self) -> Vec<CanMessage> {
        self.0.try_iter().collect()
    }
}

/// Frame counters of a session, updated from both the caller and the capture thread.
#[derive(Debug, Default)]
pub struct Statistics {
    rx_frames: AtomicU64,
    tx_frames: AtomicU64,
    malformed_packets: AtomicU64,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Getters)]
pub struct StatsSnapshot {
    #[getter(copy)]
    rx_frames: u64,
    #[getter(copy)]
    tx_frames: u64,
    #[getter(copy)]
    malformed_packets: u64,
}

impl Statistics {
    #[inline]
    pub(crate) fn add_rx(&self) {
        self.rx_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_tx(&self) {
        self.tx_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_malformed(&self) {
        self.malformed_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
        }
    }
}
