use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{DEFAULT_PADDING, MAX_FD_FRAME_SIZE, MAX_FRAME_SIZE};
use crate::error::CanError;
use crate::frame::Type;

/// Payload sizes addressed by the FD data length codes 9..=15.
const FD_LENGTHS: [usize; 7] = [12, 16, 20, 24, 32, 48, 64];

/// resize data with default padding.
#[inline]
pub fn data_resize(data: &mut Vec<u8>, size: usize) {
    data.resize(size, DEFAULT_PADDING);
}

#[inline]
pub fn can_type(len: usize) -> Result<Type, CanError> {
    match len {
        ..=MAX_FRAME_SIZE => Ok(Type::Can),
        ..=MAX_FD_FRAME_SIZE => Ok(Type::CanFd),
        _ => Err(CanError::invalid_frame(format!("length: {} of frame is out of range", len))),
    }
}

/// Smallest payload size able to carry `length` bytes in the given frame type.
#[inline]
pub fn padded_length(length: usize, r#type: Type) -> Option<usize> {
    match (r#type, length) {
        (_, ..=MAX_FRAME_SIZE) => Some(length),
        (Type::CanFd, ..=MAX_FD_FRAME_SIZE) => FD_LENGTHS.iter()
            .copied()
            .find(|&v| v >= length),
        _ => None,
    }
}

/// get CAN dlc code for an exact payload length.
#[inline]
pub fn can_dlc(length: usize, r#type: Type) -> Option<u8> {
    match (r#type, length) {
        (_, ..=MAX_FRAME_SIZE) => Some(length as u8),
        (Type::CanFd, _) => FD_LENGTHS.iter()
            .position(|&v| v == length)
            .map(|idx| (MAX_FRAME_SIZE + 1 + idx) as u8),
        _ => None,
    }
}

/// Payload length addressed by a dlc code.
#[inline]
pub fn dlc_length(dlc: u8, r#type: Type) -> Option<usize> {
    let dlc = dlc as usize;
    match (r#type, dlc) {
        (_, ..=MAX_FRAME_SIZE) => Some(dlc),
        (Type::CanFd, 9..=15) => Some(FD_LENGTHS[dlc - MAX_FRAME_SIZE - 1]),
        _ => None,
    }
}

#[inline]
pub fn system_timestamp() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(v) => v.as_millis() as u64,
        Err(e) => {
            log::warn!("CANTACT - SystemTimeError: {0} when conversion failed!", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlc() {
        assert_eq!(can_dlc(8, Type::Can), Some(8));
        assert_eq!(can_dlc(9, Type::Can), None);
        assert_eq!(can_dlc(12, Type::CanFd), Some(9));
        assert_eq!(can_dlc(64, Type::CanFd), Some(15));
        assert_eq!(can_dlc(13, Type::CanFd), None);

        assert_eq!(dlc_length(15, Type::CanFd), Some(64));
        assert_eq!(dlc_length(9, Type::Can), None);
        assert_eq!(dlc_length(3, Type::Can), Some(3));
    }

    #[test]
    fn test_padded_length() {
        assert_eq!(padded_length(5, Type::Can), Some(5));
        assert_eq!(padded_length(10, Type::Can), None);
        assert_eq!(padded_length(10, Type::CanFd), Some(12));
        assert_eq!(padded_length(33, Type::CanFd), Some(48));
        assert_eq!(padded_length(65, Type::CanFd), None);

        let mut data = vec![0x01; 10];
        data_resize(&mut data, 12);
        assert_eq!(&data[10..], &[DEFAULT_PADDING, DEFAULT_PADDING]);
    }

    #[test]
    fn test_can_type() {
        assert_eq!(can_type(8).ok(), Some(Type::Can));
        assert_eq!(can_type(20).ok(), Some(Type::CanFd));
        assert!(can_type(65).is_err());
    }
}
