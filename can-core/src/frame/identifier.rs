use std::fmt::{Display, Formatter};
use bitflags::bitflags;
use crate::constants::{EFF_MASK, SFF_MASK};

bitflags! {
    /// Identifier flags OR'd into the 32-bit wire identifier.
    ///
    /// The values match the SocketCAN and gs_usb layouts, so a raw identifier can be built
    /// by OR'ing the flags onto the 11/29-bit value.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct IdentifierFlags: u32 {
        const EXTENDED = 0x8000_0000;
        /// Remote transmission request.
        const REMOTE = 0x4000_0000;
        const ERROR = 0x2000_0000;
    }
}

/// An 11-bit standard or 29-bit extended arbitration id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Id {
    Standard(u16),
    Extended(u32),
}

impl Id {
    /// Build an id from its numeric value.
    ///
    /// Without `extended` the format follows the value: anything wider than 11 bits,
    /// or carrying [`IdentifierFlags::EXTENDED`], is an extended id.
    pub fn from_bits(raw: u32, extended: bool) -> Self {
        let extended = extended
            || raw & IdentifierFlags::EXTENDED.bits() != 0
            || raw & EFF_MASK > SFF_MASK;
        match extended {
            true => Self::Extended(raw & EFF_MASK),
            false => Self::Standard((raw & SFF_MASK) as u16),
        }
    }

    /// The numeric value, without format flags.
    #[inline]
    pub fn into_bits(self) -> u32 {
        match self {
            Self::Standard(v) => v.into(),
            Self::Extended(v) => v,
        }
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended(_))
    }
}

impl From<u32> for Id {
    fn from(raw: u32) -> Self {
        Self::from_bits(raw, false)
    }
}

impl From<u16> for Id {
    fn from(raw: u16) -> Self {
        Self::from_bits(raw.into(), false)
    }
}

impl From<Id> for u32 {
    fn from(id: Id) -> Self {
        id.into_bits()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard(v) => write!(f, "{:03X}", v),
            Self::Extended(v) => write!(f, "{:08X}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Id, IdentifierFlags};

    #[test]
    fn test_from_bits() {
        assert_eq!(Id::from(0x123_u32), Id::Standard(0x123));
        assert_eq!(Id::from(0x800_u32), Id::Extended(0x800));
        assert_eq!(Id::from(0x123 | IdentifierFlags::EXTENDED.bits()), Id::Extended(0x123));
        assert_eq!(Id::from_bits(0x7DF, true), Id::Extended(0x7DF));
        assert_eq!(Id::from(0x7E8_u16).into_bits(), 0x7E8);
    }

    #[test]
    fn test_display() {
        assert_eq!(Id::Standard(0x7DF).to_string(), "7DF");
        assert_eq!(Id::Extended(0x18DA_F110).to_string(), "18DAF110");
    }
}
