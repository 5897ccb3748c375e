//! Structure declarations of the gs_usb derived adapter protocol.
use bitflags::bitflags;
use can_core::CanError;

/// echo id of frames received from the bus.
pub const RX_ECHO_ID: u32 = 0xFFFF_FFFF;
/// echo id of frames sent by the host, the device returns it once the frame is on the bus.
pub const TX_ECHO_ID: u32 = 0;
/// value of the host format request, tells the device to use little endian.
pub const HOST_FORMAT: u32 = 0x0000_BEEF;

bitflags! {
    /// Capabilities reported in [`BitTimingConsts::feature`].
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct DeviceFeatures: u32 {
        const LISTEN_ONLY = 1;
        const LOOP_BACK = 1 << 1;
        const TRIPLE_SAMPLE = 1 << 2;
        const ONE_SHOT = 1 << 3;
        const HW_TIMESTAMP = 1 << 4;
        const IDENTIFY = 1 << 5;
        const USER_ID = 1 << 6;
        const PAD_PKTS_TO_MAX_PKT_SIZE = 1 << 7;
        const FD = 1 << 8;
    }
}

bitflags! {
    /// Channel mode flags sent with [`Request::Mode`].
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct ModeFlags: u32 {
        const LISTEN_ONLY = 1;
        const LOOP_BACK = 1 << 1;
        const TRIPLE_SAMPLE = 1 << 2;
        const ONE_SHOT = 1 << 3;
        const HW_TIMESTAMP = 1 << 4;
        const PAD_PKTS_TO_MAX_PKT_SIZE = 1 << 7;
        const FD = 1 << 8;
    }
}

bitflags! {
    /// Per frame flags of a host frame.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        const OVERFLOW = 1;
        const FD = 1 << 1;
        const BRS = 1 << 2;
        const ESI = 1 << 3;
    }
}

/// Control requests, the discriminant is the request code on the wire.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Request {
    HostFormat = 0,
    BitTiming,
    Mode,
    Berr,
    BitTimingConsts,
    DeviceConfig,
    Timestamp,
    Identify,
    DataBitTiming,
}

impl TryFrom<u8> for Request {
    type Error = CanError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Request::HostFormat),
            1 => Ok(Request::BitTiming),
            2 => Ok(Request::Mode),
            3 => Ok(Request::Berr),
            4 => Ok(Request::BitTimingConsts),
            5 => Ok(Request::DeviceConfig),
            6 => Ok(Request::Timestamp),
            7 => Ok(Request::Identify),
            8 => Ok(Request::DataBitTiming),
            v => Err(CanError::malformed(format!("unknown request: {}", v))),
        }
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CanMode {
    /// reset a channel, turns it off.
    Reset = 0,
    /// starts a channel.
    Start,
}

#[inline]
fn u32_from_le_bytes(bs: &[u8], offset: usize) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bs[offset..offset + 4]);
    u32::from_le_bytes(arr)
}

#[inline]
fn require(bs: &[u8], size: usize, name: &str) -> Result<(), CanError> {
    if bs.len() < size {
        return Err(CanError::malformed(format!("{} needs {} bytes, got {}", name, size, bs.len())));
    }
    Ok(())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mode {
    pub mode: CanMode,
    pub flags: ModeFlags,
}

impl Mode {
    pub const SIZE: usize = 8;

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::SIZE);
        data.extend_from_slice(&(self.mode as u32).to_le_bytes());
        data.extend_from_slice(&self.flags.bits().to_le_bytes());
        data
    }

    pub fn from_le_bytes(bs: &[u8]) -> Result<Self, CanError> {
        require(bs, Self::SIZE, "mode")?;
        let mode = match u32_from_le_bytes(bs, 0) {
            0 => CanMode::Reset,
            1 => CanMode::Start,
            v => return Err(CanError::malformed(format!("unknown mode: {}", v))),
        };
        Ok(Self { mode, flags: ModeFlags::from_bits_truncate(u32_from_le_bytes(bs, 4)) })
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BitTiming {
    pub prop_seg: u32,
    pub phase_seg1: u32,
    pub phase_seg2: u32,
    pub sjw: u32,
    pub brp: u32,
}

impl BitTiming {
    pub const SIZE: usize = 20;

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::SIZE);
        data.extend_from_slice(&self.prop_seg.to_le_bytes());
        data.extend_from_slice(&self.phase_seg1.to_le_bytes());
        data.extend_from_slice(&self.phase_seg2.to_le_bytes());
        data.extend_from_slice(&self.sjw.to_le_bytes());
        data.extend_from_slice(&self.brp.to_le_bytes());
        data
    }

    pub fn from_le_bytes(bs: &[u8]) -> Result<Self, CanError> {
        require(bs, Self::SIZE, "bit timing")?;
        Ok(Self {
            prop_seg: u32_from_le_bytes(bs, 0),
            phase_seg1: u32_from_le_bytes(bs, 4),
            phase_seg2: u32_from_le_bytes(bs, 8),
            sjw: u32_from_le_bytes(bs, 12),
            brp: u32_from_le_bytes(bs, 16),
        })
    }

    /// time quanta of one bit.
    #[inline]
    pub fn quanta(&self) -> u32 {
        1u32.saturating_add(self.prop_seg)
            .saturating_add(self.phase_seg1)
            .saturating_add(self.phase_seg2)
    }

    /// The bitrate this timing gives at `fclk_can`, `None` for a zero prescaler.
    pub fn bitrate(&self, fclk_can: u32) -> Option<u32> {
        let divisor = self.brp as u64 * self.quanta() as u64;
        (divisor > 0).then(|| (fclk_can as u64 / divisor) as u32)
    }

    /// Check every segment against the controller limits.
    pub fn check(&self, consts: &BitTimingConsts) -> Result<(), CanError> {
        let tseg1 = self.prop_seg.saturating_add(self.phase_seg1);
        let valid = (consts.tseg1_min..=consts.tseg1_max).contains(&tseg1)
            && (consts.tseg2_min..=consts.tseg2_max).contains(&self.phase_seg2)
            && (1..=consts.sjw_max.min(self.phase_seg2)).contains(&self.sjw)
            && (consts.brp_min..=consts.brp_max).contains(&self.brp)
            && (self.brp - consts.brp_min) % consts.brp_inc.max(1) == 0;

        match valid {
            true => Ok(()),
            false => Err(CanError::InvalidBitrate(self.bitrate(consts.fclk_can).unwrap_or_default())),
        }
    }
}

/// Clock and timing limits of the CAN controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BitTimingConsts {
    pub feature: DeviceFeatures,
    pub fclk_can: u32,
    pub tseg1_min: u32,
    pub tseg1_max: u32,
    pub tseg2_min: u32,
    pub tseg2_max: u32,
    pub sjw_max: u32,
    pub brp_min: u32,
    pub brp_max: u32,
    pub brp_inc: u32,
}

impl Default for BitTimingConsts {
    /// The limits of the 48 MHz bxCAN controller the CANtact ships with.
    fn default() -> Self {
        Self {
            feature: DeviceFeatures::LISTEN_ONLY | DeviceFeatures::LOOP_BACK | DeviceFeatures::IDENTIFY,
            fclk_can: 48_000_000,
            tseg1_min: 1,
            tseg1_max: 16,
            tseg2_min: 1,
            tseg2_max: 8,
            sjw_max: 4,
            brp_min: 1,
            brp_max: 1024,
            brp_inc: 1,
        }
    }
}

impl BitTimingConsts {
    pub const SIZE: usize = 40;
    /// widest segments and prescaler a gs_usb controller can expose.
    pub const TSEG1_LIMIT: u32 = 256;
    pub const TSEG2_LIMIT: u32 = 128;
    pub const SJW_LIMIT: u32 = 128;
    pub const BRP_LIMIT: u32 = 1 << 16;

    /// Reject limits no controller can have, the bit timing search relies on them.
    pub fn validate(&self) -> Result<(), CanError> {
        fn range(name: &str, min: u32, max: u32, limit: u32) -> Result<(), CanError> {
            if min == 0 || min > max || max > limit {
                return Err(CanError::malformed(format!("{}: {}..={} is out of 1..={}", name, min, max, limit)));
            }
            Ok(())
        }

        if self.fclk_can == 0 {
            return Err(CanError::malformed("controller clock: 0"));
        }
        range("tseg1", self.tseg1_min, self.tseg1_max, Self::TSEG1_LIMIT)?;
        range("tseg2", self.tseg2_min, self.tseg2_max, Self::TSEG2_LIMIT)?;
        range("sjw", 1, self.sjw_max, Self::SJW_LIMIT)?;
        range("brp", self.brp_min, self.brp_max, Self::BRP_LIMIT)?;
        if self.brp_inc == 0 || self.brp_inc > self.brp_max {
            return Err(CanError::malformed(format!("brp increment: {} is out of 1..={}", self.brp_inc, self.brp_max)));
        }

        Ok(())
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        [
            self.feature.bits(),
            self.fclk_can,
            self.tseg1_min,
            self.tseg1_max,
            self.tseg2_min,
            self.tseg2_max,
            self.sjw_max,
            self.brp_min,
            self.brp_max,
            self.brp_inc,
        ]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }

    pub fn from_le_bytes(bs: &[u8]) -> Result<Self, CanError> {
        require(bs, Self::SIZE, "bit timing constants")?;
        Ok(Self {
            feature: DeviceFeatures::from_bits_truncate(u32_from_le_bytes(bs, 0)),
            fclk_can: u32_from_le_bytes(bs, 4),
            tseg1_min: u32_from_le_bytes(bs, 8),
            tseg1_max: u32_from_le_bytes(bs, 12),
            tseg2_min: u32_from_le_bytes(bs, 16),
            tseg2_max: u32_from_le_bytes(bs, 20),
            sjw_max: u32_from_le_bytes(bs, 24),
            brp_min: u32_from_le_bytes(bs, 28),
            brp_max: u32_from_le_bytes(bs, 32),
            brp_inc: u32_from_le_bytes(bs, 36),
        })
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// number of channels minus one.
    pub icount: u8,
    pub sw_version: u32,
    pub hw_version: u32,
}

impl DeviceConfig {
    pub const SIZE: usize = 12;

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8, 0, 0, self.icount];
        data.extend_from_slice(&self.sw_version.to_le_bytes());
        data.extend_from_slice(&self.hw_version.to_le_bytes());
        data
    }

    pub fn from_le_bytes(bs: &[u8]) -> Result<Self, CanError> {
        require(bs, Self::SIZE, "device config")?;
        Ok(Self {
            icount: bs[3],
            sw_version: u32_from_le_bytes(bs, 4),
            hw_version: u32_from_le_bytes(bs, 8),
        })
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.icount as usize + 1
    }
}
