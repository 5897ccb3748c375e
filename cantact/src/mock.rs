//! An in-process device answering like a CANtact, for tests and demos.
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use can_core::{CanError, Transport};
use crate::{
    CanMessage,
    echo::EchoTracker,
    protocol::{self, BitTimingConsts, ControlPacket, DeviceConfig, Packet, Request},
};

#[derive(Debug, Default)]
struct MockState {
    present: bool,
    opened: bool,
    replies: bool,
    config: DeviceConfig,
    consts: BitTimingConsts,
    inbox: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    read_error: Option<CanError>,
    write_error: Option<CanError>,
}

/// A [`Transport`] emulating a gs_usb like device.
///
/// It answers the device config and bit timing constants requests and echoes every
/// written frame the way the firmware does. Written packets are recorded as the host
/// encoded them.
#[derive(Debug)]
pub struct MockDevice {
    inner: Mutex<MockState>,
    ready: Condvar,
    echoes: EchoTracker,
}

impl MockDevice {
    pub fn new(channels: usize) -> Self {
        Self::with_consts(channels, Default::default())
    }

    pub fn with_consts(channels: usize, consts: BitTimingConsts) -> Self {
        let config = DeviceConfig {
            icount: channels.saturating_sub(1).min(u8::MAX as usize) as u8,
            sw_version: 2,
            hw_version: 1,
        };
        Self {
            inner: Mutex::new(MockState {
                present: true,
                replies: true,
                config,
                consts,
                ..Default::default()
            }),
            ready: Condvar::new(),
            echoes: Default::default(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, CanError> {
        self.inner.lock()
            .map_err(|e| CanError::transport(format!("mock state poisoned: {}", e)))
    }

    fn with_state<R: Default>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        match self.inner.lock() {
            Ok(mut state) => {
                let result = f(&mut state);
                self.ready.notify_all();
                result
            },
            Err(e) => {
                log::warn!("CANTACT - mock state poisoned: {}", e);
                R::default()
            }
        }
    }

    /// Unplug or plug the device, opening an unplugged device fails with `DeviceNotFound`.
    pub fn set_present(&self, present: bool) {
        self.with_state(|s| s.present = present)
    }

    /// A silent device never answers requests.
    pub fn set_replies(&self, replies: bool) {
        self.with_state(|s| s.replies = replies)
    }

    pub fn is_open(&self) -> bool {
        self.with_state(|s| s.opened)
    }

    /// Queue a raw packet for the reader.
    pub fn inject(&self, packet: Vec<u8>) {
        self.with_state(|s| s.inbox.push_back(packet))
    }

    /// Queue a frame as if it was received from the bus.
    pub fn inject_frame(&self, frame: &CanMessage) {
        self.inject(protocol::encode_frame(frame))
    }

    /// The next read fails with `error`.
    pub fn fail_next_read(&self, error: CanError) {
        self.with_state(|s| s.read_error = Some(error))
    }

    /// The next write fails with `error`.
    pub fn fail_next_write(&self, error: CanError) {
        self.with_state(|s| s.write_error = Some(error))
    }

    /// Every packet written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.with_state(|s| s.written.clone())
    }

    /// Frames among the written packets.
    pub fn frames_written(&self) -> Vec<CanMessage> {
        self.written()
            .iter()
            .filter_map(|p| protocol::decode_frame(p).ok())
            .collect()
    }

    /// Control requests among the written packets.
    pub fn controls_written(&self) -> Vec<ControlPacket> {
        self.written()
            .iter()
            .filter_map(|p| protocol::decode_control(p).ok())
            .collect()
    }

    pub fn clear_written(&self) {
        self.with_state(|s| s.written.clear())
    }

    fn handle_control(state: &mut MockState, control: ControlPacket) {
        match control.request {
            Request::DeviceConfig if state.replies => {
                let reply = ControlPacket::new(Request::DeviceConfig, 0, state.config.to_le_bytes());
                state.inbox.push_back(reply.encode());
            },
            Request::BitTimingConsts if state.replies => {
                let reply = ControlPacket::new(Request::BitTimingConsts, 0, state.consts.to_le_bytes());
                state.inbox.push_back(reply.encode());
            },
            _ => {},
        }
    }
}

impl Transport for MockDevice {
    fn open(&self) -> Result<(), CanError> {
        let mut state = self.lock()?;
        if !state.present {
            return Err(CanError::DeviceNotFound);
        }
        state.opened = true;
        state.inbox.clear();
        self.echoes.reset();
        Ok(())
    }

    fn close(&self) {
        self.with_state(|s| s.opened = false);
        self.echoes.reset();
    }

    fn read_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>, CanError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            if let Some(e) = state.read_error.take() {
                return Err(e);
            }
            if !state.opened {
                return Err(CanError::transport("mock device is closed"));
            }
            if let Some(packet) = state.inbox.pop_front() {
                match self.echoes.incoming(packet) {
                    Some(packet) => return Ok(Some(packet)),
                    None => continue,
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self.ready
                .wait_timeout_while(state, deadline - now, |s| s.opened && s.inbox.is_empty() && s.read_error.is_none())
                .map_err(|e| CanError::transport(format!("mock state poisoned: {}", e)))?
                .0;
        }
    }

    fn write_packet(&self, packet: &[u8]) -> Result<(), CanError> {
        let mut state = self.lock()?;
        if let Some(e) = state.write_error.take() {
            return Err(e);
        }
        if !state.opened {
            return Err(CanError::transport("mock device is closed"));
        }
        state.written.push(packet.to_vec());

        let wire = self.echoes.outgoing(packet);
        match Packet::classify(&wire) {
            Ok(Packet::Control(control)) => Self::handle_control(&mut state, control),
            Ok(Packet::Frame(_)) => state.inbox.push_back(wire),
            Err(e) => log::warn!("{} written to mock device", e),
        }
        self.ready.notify_all();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use can_core::{CanError, ChannelConfig, Frame, Transport};
    use crate::CanMessage;
    use crate::protocol::{self, DeviceConfig, Packet, Request, RX_ECHO_ID, TX_ECHO_ID};
    use super::MockDevice;

    #[test]
    fn test_replies() -> anyhow::Result<()> {
        let device = MockDevice::new(2);
        assert!(device.write_packet(&[0x00]).is_err());
        device.open()?;
        device.write_packet(&protocol::encode_request(Request::DeviceConfig, 0))?;
        match device.read_packet(Duration::from_millis(10))?.map(|p| Packet::classify(&p)) {
            Some(Ok(Packet::Control(control))) => {
                assert_eq!(DeviceConfig::from_le_bytes(&control.payload)?.channel_count(), 2);
            },
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(device.read_packet(Duration::from_millis(1))?, None);

        Ok(())
    }

    #[test]
    fn test_echoes() -> anyhow::Result<()> {
        let device = MockDevice::new(2);
        device.open()?;
        let mut config = ChannelConfig::default();
        config.set_loopback(true);
        device.write_packet(&protocol::encode_start(1, &config))?;

        let mut msg = CanMessage::new(0x123_u32, &[0x01]).unwrap();
        device.write_packet(&protocol::encode_frame(&msg))?;
        assert_eq!(device.read_packet(Duration::from_millis(5))?, None);

        msg.set_channel(1);
        device.write_packet(&protocol::encode_frame(&msg))?;
        let echo = device.read_packet(Duration::from_millis(5))?
            .ok_or_else(|| anyhow::anyhow!("no echo on the loopback channel"))?;
        assert_eq!(&echo[1..5], &TX_ECHO_ID.to_le_bytes());
        let mut expected = msg.clone();
        expected.set_loopback(true);
        assert_eq!(protocol::decode_frame(&echo)?, expected);
        // recorded as the host encoded it
        assert_eq!(&device.written()[2][1..5], &RX_ECHO_ID.to_le_bytes());

        Ok(())
    }

    #[test]
    fn test_faults() -> anyhow::Result<()> {
        let device = MockDevice::new(1);
        device.set_present(false);
        assert_eq!(device.open(), Err(CanError::DeviceNotFound));
        device.set_present(true);
        device.open()?;

        device.fail_next_read(CanError::transport("unplugged"));
        assert!(device.read_packet(Duration::from_millis(1)).is_err());
        assert_eq!(device.read_packet(Duration::from_millis(1))?, None);

        let msg = CanMessage::new(0x123_u32, &[0x01]).unwrap();
        device.fail_next_write(CanError::transport("stall"));
        assert!(device.write_packet(&protocol::encode_frame(&msg)).is_err());
        device.write_packet(&protocol::encode_frame(&msg))?;
        assert_eq!(device.frames_written(), vec![msg]);

        device.close();
        assert!(!device.is_open());
        assert!(device.read_packet(Duration::from_millis(1)).is_err());

        Ok(())
    }
}
