//! Echo id handling of the transports.
//!
//! The device returns every frame it put on the bus, carrying the echo id the
//! frame was sent with. Only channels started with hardware loopback hand those
//! echoes on, everywhere else they are transmit confirmations and dropped.
use std::collections::HashSet;
use std::ops::Range;
use std::sync::Mutex;
use crate::protocol::{self, CanMode, Mode, ModeFlags, Request, FRAME_HEADER_SIZE, KIND_CONTROL, KIND_FRAME, RX_ECHO_ID, TX_ECHO_ID};

const ECHO_ID: Range<usize> = 1..5;
const CHANNEL: usize = 10;

#[derive(Debug, Default)]
pub(crate) struct EchoTracker {
    /// channels started with hardware loopback.
    loopback: Mutex<HashSet<u8>>,
}

impl EchoTracker {
    fn with_channels<R: Default>(&self, f: impl FnOnce(&mut HashSet<u8>) -> R) -> R {
        match self.loopback.lock() {
            Ok(mut channels) => f(&mut channels),
            Err(e) => {
                log::warn!("CANTACT - loopback channels poisoned: {}", e);
                R::default()
            },
        }
    }

    /// The packet as sent to the device.
    ///
    /// Frames are stamped with [`TX_ECHO_ID`], mode requests update the loopback channels.
    pub(crate) fn outgoing(&self, packet: &[u8]) -> Vec<u8> {
        let mut packet = packet.to_vec();
        match packet.first().copied() {
            Some(KIND_FRAME) if packet.len() >= FRAME_HEADER_SIZE => {
                packet[ECHO_ID].copy_from_slice(&TX_ECHO_ID.to_le_bytes());
            },
            Some(KIND_CONTROL) => match protocol::decode_control(&packet) {
                Ok(control) if control.request == Request::Mode => {
                    let channel = control.value as u8;
                    let loopback = Mode::from_le_bytes(&control.payload)
                        .map(|m| m.mode == CanMode::Start && m.flags.contains(ModeFlags::LOOP_BACK))
                        .unwrap_or_default();
                    self.with_channels(|c| match loopback {
                        true => c.insert(channel),
                        false => c.remove(&channel),
                    });
                },
                _ => {},
            },
            _ => {},
        }

        packet
    }

    /// The packet as handed to the session, `None` for a transmit confirmation.
    pub(crate) fn incoming(&self, packet: Vec<u8>) -> Option<Vec<u8>> {
        if packet.first() != Some(&KIND_FRAME) || packet.len() < FRAME_HEADER_SIZE {
            return Some(packet);
        }

        let echo_id = u32::from_le_bytes([packet[1], packet[2], packet[3], packet[4]]);
        let channel = packet[CHANNEL];
        if echo_id == RX_ECHO_ID || self.with_channels(|c| c.contains(&channel)) {
            Some(packet)
        }
        else {
            log::trace!("CANTACT - channel: {} transmit confirmed", channel);
            None
        }
    }

    pub(crate) fn reset(&self) {
        self.with_channels(|c| c.clear())
    }
}

#[cfg(test)]
mod tests {
    use can_core::{ChannelConfig, Frame};
    use crate::CanMessage;
    use crate::protocol::{self, RX_ECHO_ID, TX_ECHO_ID};
    use super::EchoTracker;

    #[test]
    fn test_outgoing_stamps_frames() -> anyhow::Result<()> {
        let tracker = EchoTracker::default();
        let msg = CanMessage::new(0x123_u32, &[0x01, 0x02]).unwrap();
        let packet = protocol::encode_frame(&msg);
        assert_eq!(&packet[1..5], &RX_ECHO_ID.to_le_bytes());

        let wire = tracker.outgoing(&packet);
        assert_eq!(&wire[1..5], &TX_ECHO_ID.to_le_bytes());
        assert_eq!(&wire[5..], &packet[5..]);

        let control = protocol::encode_stop(0);
        assert_eq!(tracker.outgoing(&control), control);

        Ok(())
    }

    #[test]
    fn test_confirmations() -> anyhow::Result<()> {
        let tracker = EchoTracker::default();
        let mut config = ChannelConfig::default();
        config.set_loopback(true);
        tracker.outgoing(&protocol::encode_start(1, &config));
        tracker.outgoing(&protocol::encode_start(0, &ChannelConfig::default()));

        let mut msg = CanMessage::new(0x7DF_u32, &[0x02, 0x10, 0x01]).unwrap();
        let received = protocol::encode_frame(&msg);
        assert_eq!(tracker.incoming(received.clone()), Some(received));

        // channel 0 is not looped back, its echo only confirms the transmission
        let echo = tracker.outgoing(&protocol::encode_frame(&msg));
        assert_eq!(tracker.incoming(echo), None);

        msg.set_channel(1);
        let echo = tracker.outgoing(&protocol::encode_frame(&msg));
        let decoded = protocol::decode_frame(&tracker.incoming(echo.clone()).unwrap_or_default())?;
        assert!(decoded.is_loopback());
        assert_eq!(decoded.channel(), 1);

        tracker.outgoing(&protocol::encode_stop(1));
        assert_eq!(tracker.incoming(echo.clone()), None);

        tracker.outgoing(&protocol::encode_start(1, &config));
        tracker.reset();
        assert_eq!(tracker.incoming(echo), None);

        let control = protocol::encode_host_format();
        assert_eq!(tracker.incoming(control.clone()), Some(control));

        Ok(())
    }
}
