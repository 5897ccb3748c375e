//! Packet codec of the adapter link.
//!
//! Every packet starts with a kind byte, `0x00` for host frames and `0x01`
//! for control requests. All integers are little endian.
mod gsusb;
pub use gsusb::*;

use can_core::{utils, CanError, ChannelConfig, Frame, IdentifierFlags, Type, MAX_FD_FRAME_SIZE, MAX_FRAME_SIZE, SFF_MASK, EFF_MASK};
use crate::CanMessage;

pub const KIND_FRAME: u8 = 0x00;
pub const KIND_CONTROL: u8 = 0x01;

/// kind, echo_id, can_id, dlc, channel, flags, reserved
pub const FRAME_HEADER_SIZE: usize = 13;
pub const FRAME_PACKET_SIZE: usize = FRAME_HEADER_SIZE + MAX_FRAME_SIZE;
pub const FD_FRAME_PACKET_SIZE: usize = FRAME_HEADER_SIZE + MAX_FD_FRAME_SIZE;
/// kind, request, value, length
pub const CONTROL_HEADER_SIZE: usize = 6;

/// A decoded packet of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Frame(CanMessage),
    Control(ControlPacket),
}

impl Packet {
    /// Classify a raw packet by its kind byte and decode it.
    pub fn classify(packet: &[u8]) -> Result<Self, CanError> {
        match packet.first() {
            Some(&KIND_FRAME) => decode_frame(packet).map(Self::Frame),
            Some(&KIND_CONTROL) => decode_control(packet).map(Self::Control),
            Some(v) => Err(CanError::malformed(format!("unknown packet kind: {:#04X}", v))),
            None => Err(CanError::malformed("empty packet")),
        }
    }
}

/// A control request or its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    pub request: Request,
    /// the channel for per channel requests, 0 otherwise.
    pub value: u16,
    pub payload: Vec<u8>,
}

impl ControlPacket {
    pub fn new(request: Request, value: u16, payload: Vec<u8>) -> Self {
        Self { request, value, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(CONTROL_HEADER_SIZE + self.payload.len());
        data.push(KIND_CONTROL);
        data.push(self.request as u8);
        data.extend_from_slice(&self.value.to_le_bytes());
        data.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.payload);
        data
    }
}

/// Encode a frame into a host frame packet.
///
/// The payload area is 8 bytes for classic frames and 64 for FD frames, zero padded.
/// The echo id tells bus traffic from echoes, transports stamp [`TX_ECHO_ID`] on frames
/// they send to the device.
pub fn encode_frame(frame: &CanMessage) -> Vec<u8> {
    let size = match frame.can_type() {
        Type::Can => FRAME_PACKET_SIZE,
        Type::CanFd => FD_FRAME_PACKET_SIZE,
    };
    let echo_id = if frame.loopback { TX_ECHO_ID } else { RX_ECHO_ID };
    let can_id = frame.raw_id | frame.id_flags.bits();

    let mut data = Vec::with_capacity(size);
    data.push(KIND_FRAME);
    data.extend_from_slice(&echo_id.to_le_bytes());
    data.extend_from_slice(&can_id.to_le_bytes());
    data.extend_from_slice(&[frame.dlc().unwrap_or_default(), frame.channel, frame.frame_flags.bits(), 0]);
    if !frame.is_remote() {
        data.extend_from_slice(&frame.data);
    }
    data.resize(size, 0);

    data
}

/// Decode a host frame packet, the timestamp is left at 0.
pub fn decode_frame(packet: &[u8]) -> Result<CanMessage, CanError> {
    match packet.first() {
        Some(&KIND_FRAME) => {},
        Some(v) => return Err(CanError::malformed(format!("kind: {:#04X} is not a frame", v))),
        None => return Err(CanError::malformed("empty packet")),
    }
    if packet.len() < FRAME_HEADER_SIZE {
        return Err(CanError::malformed(format!("frame packet too short: {}", packet.len())));
    }

    let word = |at: usize| u32::from_le_bytes([packet[at], packet[at + 1], packet[at + 2], packet[at + 3]]);
    let echo_id = word(1);
    let can_id = word(5);
    let (dlc, channel) = (packet[9], packet[10]);
    // the overflow bit reports device state and does not belong to the frame
    let frame_flags = FrameFlags::from_bits_truncate(packet[11]) - FrameFlags::OVERFLOW;

    let fd = frame_flags.contains(FrameFlags::FD);
    let (kind, expected) = if fd { (Type::CanFd, FD_FRAME_PACKET_SIZE) } else { (Type::Can, FRAME_PACKET_SIZE) };
    if packet.len() != expected {
        return Err(CanError::malformed(format!("{:?} packet length: {} expected: {}", kind, packet.len(), expected)));
    }

    let id_flags = IdentifierFlags::from_bits_truncate(can_id);
    let raw_id = can_id & EFF_MASK;
    if !id_flags.contains(IdentifierFlags::EXTENDED) && raw_id > SFF_MASK {
        return Err(CanError::malformed(format!("standard id: {:#X} exceeds 11 bits", raw_id)));
    }
    let remote = id_flags.contains(IdentifierFlags::REMOTE);
    if remote && fd {
        return Err(CanError::malformed("remote FD frame"));
    }

    let length = utils::dlc_length(dlc, kind)
        .ok_or_else(|| CanError::malformed(format!("dlc: {} is out of range for {:?}", dlc, kind)))?;
    let data = match remote {
        true => Vec::new(),
        false => packet[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + length].to_vec(),
    };

    Ok(CanMessage {
        raw_id,
        id_flags,
        frame_flags,
        channel,
        loopback: echo_id != RX_ECHO_ID,
        length,
        data,
        timestamp: 0,
    })
}

pub fn decode_control(packet: &[u8]) -> Result<ControlPacket, CanError> {
    match packet.first() {
        Some(&KIND_CONTROL) => {},
        Some(v) => return Err(CanError::malformed(format!("kind: {:#04X} is not a control packet", v))),
        None => return Err(CanError::malformed("empty packet")),
    }
    if packet.len() < CONTROL_HEADER_SIZE {
        return Err(CanError::malformed(format!("control packet too short: {}", packet.len())));
    }

    let request = Request::try_from(packet[1])?;
    let value = u16::from_le_bytes([packet[2], packet[3]]);
    let length = u16::from_le_bytes([packet[4], packet[5]]) as usize;
    let payload = &packet[CONTROL_HEADER_SIZE..];
    if payload.len() != length {
        return Err(CanError::malformed(format!("control payload length: {} declared: {}", payload.len(), length)));
    }

    Ok(ControlPacket::new(request, value, payload.to_vec()))
}

/// Bit timing request of a channel for its configured bitrate.
pub fn encode_config(channel: u8, config: &ChannelConfig, consts: &BitTimingConsts) -> Result<Vec<u8>, CanError> {
    let timing = BitTiming::calculate(consts, config.bitrate())?;
    Ok(encode_bit_timing(channel, &timing))
}

pub fn encode_bit_timing(channel: u8, timing: &BitTiming) -> Vec<u8> {
    log::trace!("CANTACT - channel: {} bit timing: {:?}", channel, timing);
    ControlPacket::new(Request::BitTiming, channel as u16, timing.to_le_bytes()).encode()
}

pub fn encode_start(channel: u8, config: &ChannelConfig) -> Vec<u8> {
    let mut flags = ModeFlags::empty();
    flags.set(ModeFlags::LISTEN_ONLY, config.monitor());
    flags.set(ModeFlags::LOOP_BACK, config.loopback());
    let mode = Mode { mode: CanMode::Start, flags };
    ControlPacket::new(Request::Mode, channel as u16, mode.to_le_bytes()).encode()
}

pub fn encode_stop(channel: u8) -> Vec<u8> {
    let mode = Mode { mode: CanMode::Reset, flags: ModeFlags::empty() };
    ControlPacket::new(Request::Mode, channel as u16, mode.to_le_bytes()).encode()
}

#[inline]
pub fn encode_host_format() -> Vec<u8> {
    ControlPacket::new(Request::HostFormat, 1, HOST_FORMAT.to_le_bytes().to_vec()).encode()
}

#[inline]
pub fn encode_identify(on: bool) -> Vec<u8> {
    ControlPacket::new(Request::Identify, 0, (on as u32).to_le_bytes().to_vec()).encode()
}

/// A device to host request, sent with an empty payload.
#[inline]
pub fn encode_request(request: Request, channel: u8) -> Vec<u8> {
    ControlPacket::new(request, channel as u16, Vec::new()).encode()
}

#[cfg(test)]
mod tests {
    use can_core::{ChannelConfig, Frame, Type};
    use rand::Rng;
    use crate::CanMessage;
    use super::*;

    #[test]
    fn test_encode_classic() -> anyhow::Result<()> {
        let msg = CanMessage::new(0x123_u32, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]).unwrap();
        let packet = encode_frame(&msg);
        assert_eq!(packet, hex::decode("00ffffffff23010000080000000102030405060708")?);
        assert_eq!(decode_frame(&packet)?, msg);

        let mut msg = CanMessage::new(0x18DA_F110_u32, &[0x02, 0x10]).unwrap();
        msg.set_channel(1);
        let packet = encode_frame(&msg);
        assert_eq!(packet, hex::decode("00ffffffff10f1da98020100000210000000000000")?);
        assert_eq!(decode_frame(&packet)?, msg);

        Ok(())
    }

    #[test]
    fn test_round_trip() -> anyhow::Result<()> {
        let mut rng = rand::rng();
        for _ in 0..32 {
            let len = rng.random_range(0..=MAX_FRAME_SIZE);
            let mut data = vec![0u8; len];
            rng.fill(&mut data[..]);
            let id = rng.random_range(0..=EFF_MASK);
            let mut msg = CanMessage::new(id, &data).unwrap();
            msg.set_channel(rng.random_range(0..2));
            assert_eq!(decode_frame(&encode_frame(&msg))?, msg);
        }

        let mut msg = CanMessage::new_remote(0x7FF_u32, 3).unwrap();
        msg.set_loopback(true);
        let packet = encode_frame(&msg);
        assert_eq!(&packet[1..5], &TX_ECHO_ID.to_le_bytes());
        assert_eq!(decode_frame(&packet)?, msg);

        let mut msg = CanMessage::new(0x100_u32, &[0x04; 8]).unwrap();
        msg.set_error_frame(true);
        assert_eq!(decode_frame(&encode_frame(&msg))?, msg);

        let mut msg = CanMessage::new(0x1ABC_u32, &[0x55; 20]).unwrap();
        msg.set_bitrate_switch(true).set_esi(true);
        let packet = encode_frame(&msg);
        assert_eq!(packet.len(), FD_FRAME_PACKET_SIZE);
        assert_eq!(packet[9], 11);
        let decoded = decode_frame(&packet)?;
        assert_eq!(decoded.can_type(), Type::CanFd);
        assert_eq!(decoded.length(), 20);
        assert_eq!(decoded, msg);

        Ok(())
    }

    #[test]
    fn test_decode_malformed() -> anyhow::Result<()> {
        let msg = CanMessage::new(0x123_u32, &[0x01]).unwrap();
        let packet = encode_frame(&msg);

        assert!(matches!(decode_frame(&packet[..20]), Err(CanError::MalformedPacket(_))));
        assert!(matches!(decode_frame(&[]), Err(CanError::MalformedPacket(_))));

        let mut bad = packet.clone();
        bad[0] = KIND_CONTROL;
        assert!(matches!(decode_frame(&bad), Err(CanError::MalformedPacket(_))));

        let mut bad = packet.clone();
        bad[9] = 9;
        assert!(matches!(decode_frame(&bad), Err(CanError::MalformedPacket(_))));

        let mut bad = packet.clone();
        bad[11] = FrameFlags::FD.bits();
        assert!(matches!(decode_frame(&bad), Err(CanError::MalformedPacket(_))));

        let mut bad = packet.clone();
        bad[5..9].copy_from_slice(&0x800_u32.to_le_bytes());
        assert!(matches!(decode_frame(&bad), Err(CanError::MalformedPacket(_))));

        let fd = encode_frame(&CanMessage::new(0x123_u32, &[0x00; 64]).unwrap());
        let mut bad = fd.clone();
        bad[9] = 16;
        assert!(matches!(decode_frame(&bad), Err(CanError::MalformedPacket(_))));

        Ok(())
    }

    #[test]
    fn test_control() -> anyhow::Result<()> {
        assert_eq!(encode_host_format(), hex::decode("010001000400efbe0000")?);
        assert_eq!(encode_request(Request::DeviceConfig, 0), hex::decode("010500000000")?);
        assert_eq!(encode_identify(true), hex::decode("01070000040001000000")?);

        let mut config = ChannelConfig::default();
        config.set_monitor(true).set_loopback(true);
        let packet = encode_start(1, &config);
        assert_eq!(packet, hex::decode("0102010008000100000003000000")?);
        let control = decode_control(&packet)?;
        assert_eq!(control.request, Request::Mode);
        assert_eq!(control.value, 1);
        let mode = Mode::from_le_bytes(&control.payload)?;
        assert_eq!(mode.mode, CanMode::Start);
        assert_eq!(mode.flags, ModeFlags::LISTEN_ONLY | ModeFlags::LOOP_BACK);

        let mode = Mode::from_le_bytes(&decode_control(&encode_stop(0))?.payload)?;
        assert_eq!(mode.mode, CanMode::Reset);

        let packet = encode_config(0, &ChannelConfig::new(500_000), &BitTimingConsts::default())?;
        let control = decode_control(&packet)?;
        assert_eq!(control.request, Request::BitTiming);
        let timing = BitTiming::from_le_bytes(&control.payload)?;
        assert_eq!(48_000_000 / (timing.brp * timing.quanta()), 500_000);

        assert!(encode_config(0, &ChannelConfig::new(0), &BitTimingConsts::default()).is_err());

        let mut bad = packet.clone();
        bad.pop();
        assert!(matches!(decode_control(&bad), Err(CanError::MalformedPacket(_))));
        assert!(matches!(decode_control(&hex::decode("016300000000")?), Err(CanError::MalformedPacket(_))));

        Ok(())
    }

    #[test]
    fn test_classify() -> anyhow::Result<()> {
        let consts = BitTimingConsts::default();
        let reply = ControlPacket::new(Request::BitTimingConsts, 0, consts.to_le_bytes()).encode();
        match Packet::classify(&reply)? {
            Packet::Control(control) => {
                assert_eq!(control.request, Request::BitTimingConsts);
                assert_eq!(BitTimingConsts::from_le_bytes(&control.payload)?, consts);
            },
            packet => panic!("unexpected packet: {:?}", packet),
        }

        let config = DeviceConfig { icount: 1, sw_version: 2, hw_version: 1 };
        let reply = ControlPacket::new(Request::DeviceConfig, 0, config.to_le_bytes()).encode();
        match Packet::classify(&reply)? {
            Packet::Control(control) => {
                let decoded = DeviceConfig::from_le_bytes(&control.payload)?;
                assert_eq!(decoded, config);
                assert_eq!(decoded.channel_count(), 2);
            },
            packet => panic!("unexpected packet: {:?}", packet),
        }

        let msg = CanMessage::new(0x321_u32, &[0xAB]).unwrap();
        assert_eq!(Packet::classify(&encode_frame(&msg))?, Packet::Frame(msg));
        assert!(Packet::classify(&[0x02]).is_err());
        assert!(Packet::classify(&[]).is_err());

        Ok(())
    }
}
