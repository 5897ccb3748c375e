mod identifier;
pub use identifier::*;

use std::fmt::{Display, Formatter, Write};
use crate::utils::can_dlc;

/// Frame format on the bus.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    #[default]
    Can,
    CanFd,
}

/// A classic CAN or CAN-FD frame.
///
/// Setters return `&mut Self` so they chain.
pub trait Frame: Send + Sync + Sized {
    type Channel: Display;

    /// A data frame, `None` when the payload fits no frame type.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self>;
    /// A remote frame requesting `len` bytes.
    fn new_remote(id: impl Into<Id>, len: usize) -> Option<Self>;

    fn id(&self) -> Id;
    fn is_extended(&self) -> bool;
    fn is_remote(&self) -> bool;
    fn is_error_frame(&self) -> bool;
    fn set_error_frame(&mut self, value: bool) -> &mut Self;

    fn can_type(&self) -> Type;
    fn set_can_type(&mut self, kind: Type) -> &mut Self;
    fn is_bitrate_switch(&self) -> bool;
    fn set_bitrate_switch(&mut self, value: bool) -> &mut Self;
    /// Error state indicator of an FD frame.
    fn is_esi(&self) -> bool;
    fn set_esi(&mut self, value: bool) -> &mut Self;

    /// The frame is an echo of a local transmission rather than traffic from the bus.
    fn is_loopback(&self) -> bool;
    fn set_loopback(&mut self, value: bool) -> &mut Self;

    fn channel(&self) -> Self::Channel;
    fn set_channel(&mut self, value: Self::Channel) -> &mut Self;

    /// Milliseconds since the unix epoch.
    fn timestamp(&self) -> u64;
    /// `None` stamps the frame with the current system time.
    fn set_timestamp(&mut self, value: Option<u64>) -> &mut Self;

    /// The payload, empty for remote frames.
    fn data(&self) -> &[u8];
    /// Payload length, for remote frames the requested length.
    fn length(&self) -> usize;

    /// The data length code, `None` when the length has no code in this frame type.
    fn dlc(&self) -> Option<u8> {
        can_dlc(self.length(), self.can_type())
    }
}

/// Renders a frame as one line of a Vector `asc` log.
pub struct AscLine<'a, F>(pub &'a F);

impl<F: Frame> Display for AscLine<'_, F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let frame = self.0;
        let seconds = frame.timestamp() as f64 / 1000.;
        let direction = if frame.is_loopback() { "Tx" } else { "Rx" };
        let mut bytes = String::new();
        for b in frame.data() {
            let _ = write!(bytes, "{:02x} ", b);
        }

        if frame.can_type() == Type::Can {
            let suffix = if frame.is_extended() { "x" } else { "" };
            let kind = if frame.is_remote() { "r" } else { "d" };
            return write!(f, "{:.3} {} {: >8x}{: <4} {} {} {: >2} {}",
                          seconds, frame.channel(), frame.id().into_bits(), suffix,
                          direction, kind, frame.length(), bytes);
        }

        let brs = frame.is_bitrate_switch() as u32;
        let esi = frame.is_esi() as u32;
        // EDL, BRS and ESI bits of the asc flags column
        let flags = (1 << 12) | (brs << 13) | (esi << 14);
        write!(f, "{:.3} CANFD {} {} {: >8x} {} {} {: >2} {: >2} {}{: >8x}",
               seconds, frame.channel(), direction, frame.id().into_bits(), brs, esi,
               frame.dlc().unwrap_or_default(), frame.length(), bytes, flags)
    }
}
