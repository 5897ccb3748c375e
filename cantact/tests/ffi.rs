#![cfg(feature = "mock")]

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use can_core::{CanError, Frame};
use cantact::{CanMessage, DeviceOptions, MockDevice};
use cantact::ffi::*;
use cantact::protocol::{BitTiming, Request};

static RECEIVED: AtomicUsize = AtomicUsize::new(0);
static LAST_ID: AtomicU32 = AtomicU32::new(0);

extern "C" fn on_frame(frame: *const CantactFrame) {
    if let Some(frame) = unsafe { frame.as_ref() } {
        LAST_ID.store(frame.id, Ordering::SeqCst);
        RECEIVED.fetch_add(1, Ordering::SeqCst);
    }
}

fn options() -> DeviceOptions {
    let mut options = DeviceOptions::default();
    options.set_read_timeout_ms(5)
        .set_response_timeout_ms(100);
    options
}

#[test]
fn test_c_interface() -> anyhow::Result<()> {
    let device = Arc::new(MockDevice::new(2));
    let iface = CInterface::new(device.clone(), options()).into_raw();

    unsafe {
        assert_eq!(cantact_get_channel_count(iface), CanError::DeviceNotOpened.code());
        assert_eq!(cantact_set_rx_callback(iface, Some(on_frame)), 0);
        assert_eq!(cantact_open(iface), 0);
        assert!(device.is_open());
        assert_eq!(cantact_get_channel_count(iface), 2);

        assert_eq!(cantact_set_bitrate(iface, 0, 250_000), 0);
        assert_eq!(cantact_set_bitrate(iface, 5, 250_000), CanError::InvalidChannel(5).code());
        assert_eq!(cantact_set_bitrate(iface, 0, 0), CanError::InvalidBitrate(0).code());
        assert_eq!(cantact_set_bit_timing(iface, 1, 6, 13, 2, 1), 0);
        assert_eq!(cantact_set_bit_timing(iface, 1, 6, 30, 2, 1), CanError::InvalidBitrate(0).code());
        assert_eq!(cantact_set_monitor(iface, 1, 0), 0);
        assert_eq!(cantact_set_hw_loopback(iface, 1, 0), 0);
        assert_eq!(cantact_set_enabled(iface, 0, 1), 0);

        let mut frame = CantactFrame { id: 0x123, dlc: 2, ..Default::default() };
        frame.data[..2].copy_from_slice(&[0xCA, 0xFE]);
        assert_eq!(cantact_transmit(iface, frame), CanError::ChannelDisabled(0).code());

        device.clear_written();
        assert_eq!(cantact_start(iface), 0);
        let timing = device.controls_written()
            .into_iter()
            .find(|c| c.request == Request::BitTiming)
            .map(|c| BitTiming::from_le_bytes(&c.payload))
            .transpose()?;
        assert_eq!(timing.map(|t| 48_000_000 / (t.brp * t.quanta())), Some(250_000));

        assert_eq!(cantact_transmit(iface, frame), 0);
        assert_eq!(device.frames_written(), vec![CanMessage::new(0x123_u32, &[0xCA, 0xFE]).unwrap()]);
        assert_eq!(cantact_transmit(iface, CantactFrame { dlc: 9, ..frame }), CanError::InvalidFrame(String::new()).code());
        assert_eq!(cantact_transmit(iface, CantactFrame { loopback: 1, ..frame }), CanError::InvalidFrame(String::new()).code());
        assert_eq!(cantact_transmit(iface, CantactFrame { channel: 1, ..frame }), CanError::ChannelDisabled(1).code());
        assert_eq!(cantact_set_bitrate(iface, 0, 500_000), CanError::DeviceBusy.code());

        device.inject_frame(&CanMessage::new(0x7E8_u32, &[0x03, 0x41, 0x0C]).unwrap());
        // FD frames do not fit the C frame
        device.inject_frame(&CanMessage::new(0x7E9_u32, &[0x00; 12]).unwrap());
        device.inject_frame(&CanMessage::new(0x7EA_u32, &[0x01]).unwrap());
        let deadline = Instant::now() + Duration::from_secs(2);
        while RECEIVED.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(RECEIVED.load(Ordering::SeqCst), 2);
        assert_eq!(LAST_ID.load(Ordering::SeqCst), 0x7EA);

        assert_eq!(cantact_stop(iface), 0);
        assert_eq!(cantact_close(iface), 0);
        assert!(!device.is_open());
        assert_eq!(cantact_start(iface), CanError::DeviceNotOpened.code());
        assert_eq!(cantact_deinit(iface), 0);
    }

    Ok(())
}

#[test]
fn test_null_interface() {
    let code = CanError::InvalidHandle(0).code();
    unsafe {
        assert_eq!(cantact_open(ptr::null_mut()), code);
        assert_eq!(cantact_start(ptr::null_mut()), code);
        assert_eq!(cantact_transmit(ptr::null_mut(), CantactFrame::default()), code);
        assert_eq!(cantact_get_channel_count(ptr::null_mut()), code);
        assert_eq!(cantact_deinit(ptr::null_mut()), code);
    }
}

#[cfg(not(feature = "usb"))]
#[test]
fn test_init_without_usb() {
    assert!(cantact_init().is_null());
}
