#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanError {
    #[error("CANTACT - channel: {0} is out of range")]
    InvalidChannel(usize),
    #[error("CANTACT - bitrate: {0} is not supported")]
    InvalidBitrate(u32),
    #[error("CANTACT - invalid frame, reason: {0}")]
    InvalidFrame(String),
    #[error("CANTACT - channel: {0} is not enabled")]
    ChannelDisabled(usize),
    #[error("CANTACT - no channels enabled")]
    NoChannelsEnabled,
    #[error("CANTACT - device is busy, stop it first")]
    DeviceBusy,
    #[error("CANTACT - device not found")]
    DeviceNotFound,
    #[error("CANTACT - device is not opened")]
    DeviceNotOpened,
    #[error("CANTACT - transport error: {0}")]
    TransportError(String),
    #[error("CANTACT - malformed packet: {0}")]
    MalformedPacket(String),
    #[error("CANTACT - device faulted, close and reopen it")]
    Faulted,
    #[error("CANTACT - handle: {0} is not valid")]
    InvalidHandle(usize),
}

impl CanError {
    #[inline(always)]
    pub fn transport<T: ToString>(msg: T) -> Self {
        Self::TransportError(msg.to_string())
    }
    #[inline(always)]
    pub fn malformed<T: ToString>(msg: T) -> Self {
        Self::MalformedPacket(msg.to_string())
    }
    #[inline(always)]
    pub fn invalid_frame<T: ToString>(msg: T) -> Self {
        Self::InvalidFrame(msg.to_string())
    }

    /// Integer code of this error kind, for boundaries that can only carry an `i32`.
    ///
    /// Every kind maps to exactly one negative value, success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidChannel(_) => -1,
            Self::InvalidBitrate(_) => -2,
            Self::InvalidFrame(_) => -3,
            Self::ChannelDisabled(_) => -4,
            Self::NoChannelsEnabled => -5,
            Self::DeviceBusy => -6,
            Self::DeviceNotFound => -7,
            Self::TransportError(_) => -8,
            Self::MalformedPacket(_) => -9,
            Self::Faulted => -10,
            Self::DeviceNotOpened => -11,
            Self::InvalidHandle(_) => -12,
        }
    }

    /// Errors that leave the device unusable until it is reopened.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportError(_) | Self::Faulted)
    }
}

#[cfg(test)]
mod tests {
    use super::CanError;

    #[test]
    fn test_codes_are_unique() {
        let errors = [
            CanError::InvalidChannel(2),
            CanError::InvalidBitrate(0),
            CanError::invalid_frame("id"),
            CanError::ChannelDisabled(1),
            CanError::NoChannelsEnabled,
            CanError::DeviceBusy,
            CanError::DeviceNotFound,
            CanError::transport("pipe"),
            CanError::malformed("short"),
            CanError::Faulted,
            CanError::DeviceNotOpened,
            CanError::InvalidHandle(7),
        ];
        let mut codes = errors.iter().map(|e| e.code()).collect::<Vec<_>>();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_fatal() {
        assert!(CanError::transport("gone").is_fatal());
        assert!(CanError::Faulted.is_fatal());
        assert!(!CanError::malformed("short").is_fatal());
    }
}
