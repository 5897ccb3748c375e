use std::sync::Arc;
use std::time::Duration;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use crate::error::CanError;
use crate::frame::{Frame, Id};

/// Nominal bitrate a channel starts with when nothing else is configured.
pub const DEFAULT_BITRATE: u32 = 500_000;

/// A byte-packet link to an adapter.
///
/// Reads and writes take `&self`: one thread may block in [`Transport::read_packet`]
/// while another writes, the link is full-duplex.
pub trait Transport: Send + Sync {
    /// Acquire the link. Fails with `DeviceNotFound` or `TransportError`.
    fn open(&self) -> Result<(), CanError>;
    /// Release the link, any blocked reader returns.
    fn close(&self);
    /// Read one packet, `Ok(None)` when nothing arrived within `timeout`.
    fn read_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>, CanError>;
    /// Write one packet, returns once the link accepted it.
    fn write_packet(&self, packet: &[u8]) -> Result<(), CanError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    #[inline]
    fn open(&self) -> Result<(), CanError> {
        (**self).open()
    }
    #[inline]
    fn close(&self) {
        (**self).close()
    }
    #[inline]
    fn read_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>, CanError> {
        (**self).read_packet(timeout)
    }
    #[inline]
    fn write_packet(&self, packet: &[u8]) -> Result<(), CanError> {
        (**self).write_packet(packet)
    }
}

pub trait Listener<C, F: Frame>: Send {
    /// Callback when frame transmitting.
    fn on_frame_transmitting(&self, _channel: C, _frame: &F) {}
    /// Callback when frame transmit success.
    fn on_frame_transmitted(&self, _channel: C, _id: Id) {}
    /// Callback when a frame received, runs on the capture thread.
    fn on_frame_received(&self, channel: C, frame: &F);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Getters)]
pub struct ChannelConfig {
    #[getter(copy)]
    bitrate: u32,
    #[getter(copy)]
    #[serde(default)]
    enabled: bool,
    /// listen only, no transmission nor acknowledgement.
    #[getter(copy)]
    #[serde(default)]
    monitor: bool,
    #[getter(copy)]
    #[serde(default)]
    loopback: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BITRATE)
    }
}

impl ChannelConfig {
    pub fn new(bitrate: u32) -> Self {
        Self {
            bitrate,
            enabled: false,
            monitor: false,
            loopback: false,
        }
    }

    pub fn set_bitrate(&mut self, bitrate: u32) -> &mut Self {
        self.bitrate = bitrate;
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = enabled;
        self
    }

    pub fn set_monitor(&mut self, monitor: bool) -> &mut Self {
        self.monitor = monitor;
        self
    }

    pub fn set_loopback(&mut self, loopback: bool) -> &mut Self {
        self.loopback = loopback;
        self
    }
}
