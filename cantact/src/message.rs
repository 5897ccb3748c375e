use std::fmt::{Display, Formatter};
use can_core::{AscLine, CanError, Frame, Id, IdentifierFlags, Type, EFF_MASK, MAX_FRAME_SIZE, SFF_MASK, utils};
use crate::protocol::FrameFlags;

/// A frame as exchanged with the adapter.
///
/// The identifier and the per frame flags are kept in their wire form, so the codec
/// only has to OR them together. The timestamp is not part of equality.
#[derive(Debug, Clone)]
pub struct CanMessage {
    pub(crate) raw_id: u32,
    pub(crate) id_flags: IdentifierFlags,
    pub(crate) frame_flags: FrameFlags,
    pub(crate) channel: u8,
    pub(crate) loopback: bool,
    pub(crate) length: usize,
    pub(crate) data: Vec<u8>,
    pub(crate) timestamp: u64,
}

impl CanMessage {
    fn build(raw_id: u32, extended: bool) -> Self {
        let mut id_flags = IdentifierFlags::empty();
        id_flags.set(IdentifierFlags::EXTENDED, extended);
        Self {
            raw_id,
            id_flags,
            frame_flags: FrameFlags::empty(),
            channel: 0,
            loopback: false,
            length: 0,
            data: Vec::new(),
            timestamp: 0,
        }
    }

    /// Build a data frame keeping the identifier bits exactly as given.
    ///
    /// Unlike [`Frame::new`] nothing is inferred from the id value, so a standard frame
    /// with an id wider than 11 bits can be built and is rejected later by [`Self::validate`].
    /// Payloads longer than 8 bytes make an FD frame, padded to the next FD length.
    pub fn from_raw(id: u32, extended: bool, data: &[u8]) -> Option<Self> {
        let kind = utils::can_type(data.len()).ok()?;
        let length = utils::padded_length(data.len(), kind)?;

        let mut msg = Self::build(id, extended);
        msg.frame_flags.set(FrameFlags::FD, kind == Type::CanFd);
        msg.data = data.to_vec();
        utils::data_resize(&mut msg.data, length);
        msg.length = length;
        Some(msg)
    }

    /// The raw identifier value without format flags.
    #[inline]
    pub fn raw_id(&self) -> u32 {
        self.raw_id
    }

    /// Check the frame invariants, the first violation is reported.
    pub fn validate(&self) -> Result<(), CanError> {
        let limit = if self.is_extended() { EFF_MASK } else { SFF_MASK };
        if self.raw_id > limit {
            let bits = if self.is_extended() { 29 } else { 11 };
            return Err(CanError::invalid_frame(format!("id: {:#X} exceeds {} bits", self.raw_id, bits)));
        }

        let fd = self.frame_flags.contains(FrameFlags::FD);
        if self.is_remote() {
            return match (fd, self.length) {
                (true, _) => Err(CanError::invalid_frame("remote frames are not allowed in CAN-FD")),
                (false, len) if len > MAX_FRAME_SIZE =>
                    Err(CanError::invalid_frame(format!("remote length: {} is out of range", len))),
                _ => Ok(()),
            };
        }

        if self.data.len() != self.length {
            return Err(CanError::invalid_frame(format!("length: {} mismatches data size: {}", self.length, self.data.len())));
        }
        if self.dlc().is_none() {
            return Err(CanError::invalid_frame(format!("length: {} has no dlc for {:?}", self.length, self.can_type())));
        }
        if !fd && self.frame_flags.intersects(FrameFlags::BRS | FrameFlags::ESI) {
            return Err(CanError::invalid_frame("bitrate switch and error state indicator require CAN-FD"));
        }

        Ok(())
    }
}

impl Frame for CanMessage {
    type Channel = u8;

    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let id: Id = id.into();
        Self::from_raw(id.into_bits(), id.is_extended(), data)
    }

    fn new_remote(id: impl Into<Id>, len: usize) -> Option<Self> {
        let id: Id = id.into();
        (len <= MAX_FRAME_SIZE).then(|| {
            let mut msg = Self::build(id.into_bits(), id.is_extended());
            msg.id_flags.insert(IdentifierFlags::REMOTE);
            msg.length = len;
            msg
        })
    }

    #[inline]
    fn id(&self) -> Id {
        Id::from_bits(self.raw_id, self.is_extended())
    }

    #[inline]
    fn is_extended(&self) -> bool {
        self.id_flags.contains(IdentifierFlags::EXTENDED)
    }

    #[inline]
    fn is_remote(&self) -> bool {
        self.id_flags.contains(IdentifierFlags::REMOTE)
    }

    #[inline]
    fn is_error_frame(&self) -> bool {
        self.id_flags.contains(IdentifierFlags::ERROR)
    }

    fn set_error_frame(&mut self, value: bool) -> &mut Self {
        self.id_flags.set(IdentifierFlags::ERROR, value);
        self
    }

    #[inline]
    fn can_type(&self) -> Type {
        if self.frame_flags.contains(FrameFlags::FD) { Type::CanFd } else { Type::Can }
    }

    /// Switching to classic CAN truncates the payload, switching to FD pads it.
    fn set_can_type(&mut self, kind: Type) -> &mut Self {
        let length = match kind {
            Type::Can => self.length.min(MAX_FRAME_SIZE),
            Type::CanFd if self.is_remote() => self.length,
            Type::CanFd => utils::padded_length(self.length, kind).unwrap_or(self.length),
        };
        if length < self.length {
            log::warn!("CANTACT - frame {:#X} truncated to: {} bytes", self.raw_id, length);
        }
        if !self.is_remote() {
            utils::data_resize(&mut self.data, length);
        }
        self.length = length;
        self.frame_flags.set(FrameFlags::FD, kind == Type::CanFd);
        self
    }

    #[inline]
    fn is_bitrate_switch(&self) -> bool {
        self.frame_flags.contains(FrameFlags::BRS)
    }

    fn set_bitrate_switch(&mut self, value: bool) -> &mut Self {
        self.frame_flags.set(FrameFlags::BRS, value);
        self
    }

    #[inline]
    fn is_esi(&self) -> bool {
        self.frame_flags.contains(FrameFlags::ESI)
    }

    fn set_esi(&mut self, value: bool) -> &mut Self {
        self.frame_flags.set(FrameFlags::ESI, value);
        self
    }

    #[inline]
    fn is_loopback(&self) -> bool {
        self.loopback
    }

    fn set_loopback(&mut self, value: bool) -> &mut Self {
        self.loopback = value;
        self
    }

    #[inline]
    fn channel(&self) -> u8 {
        self.channel
    }

    fn set_channel(&mut self, value: u8) -> &mut Self {
        self.channel = value;
        self
    }

    #[inline]
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, value: Option<u64>) -> &mut Self {
        self.timestamp = value.unwrap_or_else(utils::system_timestamp);
        self
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn length(&self) -> usize {
        self.length
    }
}

impl PartialEq for CanMessage {
    fn eq(&self, other: &Self) -> bool {
        self.raw_id == other.raw_id
            && self.id_flags == other.id_flags
            && self.frame_flags == other.frame_flags
            && self.channel == other.channel
            && self.loopback == other.loopback
            && self.length == other.length
            && self.data == other.data
    }
}

impl Display for CanMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        AscLine(self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use can_core::{Frame, Id, Type, DEFAULT_PADDING};
    use super::CanMessage;

    #[test]
    fn test_new() {
        let msg = CanMessage::new(0x7DF_u32, &[0x02, 0x10, 0x01]).unwrap();
        assert_eq!(msg.id(), Id::Standard(0x7DF));
        assert_eq!(msg.length(), 3);
        assert_eq!(msg.dlc(), Some(3));
        assert_eq!(msg.can_type(), Type::Can);
        assert!(msg.validate().is_ok());

        let msg = CanMessage::new(0x18DA_F110_u32, &[0u8; 10]).unwrap();
        assert!(msg.is_extended());
        assert_eq!(msg.can_type(), Type::CanFd);
        assert_eq!(msg.length(), 12);
        assert_eq!(msg.dlc(), Some(9));
        assert_eq!(&msg.data()[10..], &[DEFAULT_PADDING, DEFAULT_PADDING]);

        assert!(CanMessage::new(0x123_u32, &[0u8; 65]).is_none());
    }

    #[test]
    fn test_remote() {
        let msg = CanMessage::new_remote(0x123_u32, 4).unwrap();
        assert!(msg.is_remote());
        assert!(msg.data().is_empty());
        assert_eq!(msg.dlc(), Some(4));
        assert!(msg.validate().is_ok());
        assert!(CanMessage::new_remote(0x123_u32, 9).is_none());

        let mut msg = msg;
        msg.set_can_type(Type::CanFd);
        assert!(msg.data().is_empty());
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_set_can_type() {
        let mut msg = CanMessage::new(0x123_u32, &[0x01; 10]).unwrap();
        msg.set_can_type(Type::Can);
        assert_eq!(msg.length(), 8);
        assert_eq!(msg.data(), &[0x01; 8]);
        assert!(msg.validate().is_ok());

        msg.set_bitrate_switch(true);
        assert!(msg.validate().is_err());
        msg.set_can_type(Type::CanFd);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_validate_id() {
        let msg = CanMessage::from_raw(0x800, false, &[0x01]).unwrap();
        assert!(msg.validate().is_err());
        let msg = CanMessage::from_raw(0x800, true, &[0x01]).unwrap();
        assert!(msg.validate().is_ok());
        let msg = CanMessage::from_raw(0x2000_0000, true, &[]).unwrap();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_eq_ignores_timestamp() {
        let a = CanMessage::new(0x123_u32, &[0x01, 0x02]).unwrap();
        let mut b = a.clone();
        b.set_timestamp(Some(1_000));
        assert_eq!(a, b);
        b.set_loopback(true);
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let mut msg = CanMessage::new(0x123_u32, &[0xCA, 0xFE]).unwrap();
        msg.set_channel(1);
        let line = msg.to_string();
        assert!(line.contains("123"));
        assert!(line.contains("Rx"));
        assert!(line.contains("ca fe"));
    }
}
