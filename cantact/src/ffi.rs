//! C interface of the driver, matching `cantact.h`.
//!
//! Each [`CInterface`] owns one device. Functions return `0` on success or the
//! negative [`CanError::code`], a null interface pointer gives the code of
//! [`CanError::InvalidHandle`].
use std::sync::Arc;
use can_core::{CanError, Frame, IdentifierFlags, Transport, Type, MAX_FRAME_SIZE};
use crate::{CanMessage, DeviceOptions, Handle, Registry, protocol::BitTiming};

/// A classic frame as seen from C.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CantactFrame {
    pub channel: u8,
    pub id: u32,
    pub dlc: u8,
    pub data: [u8; MAX_FRAME_SIZE],
    pub ext: u8,
    pub fd: u8,
    pub loopback: u8,
    pub rtr: u8,
}

impl CantactFrame {
    /// `None` for frames carrying more than 8 bytes.
    pub fn from_message(msg: &CanMessage) -> Option<Self> {
        if msg.length() > MAX_FRAME_SIZE {
            return None;
        }

        let mut data = [0u8; MAX_FRAME_SIZE];
        data[..msg.data().len()].copy_from_slice(msg.data());
        Some(Self {
            channel: msg.channel(),
            id: msg.raw_id(),
            dlc: msg.length() as u8,
            data,
            ext: msg.is_extended() as u8,
            fd: (msg.can_type() == Type::CanFd) as u8,
            loopback: msg.is_loopback() as u8,
            rtr: msg.is_remote() as u8,
        })
    }
}

impl TryFrom<&CantactFrame> for CanMessage {
    type Error = CanError;

    fn try_from(frame: &CantactFrame) -> Result<Self, Self::Error> {
        let length = frame.dlc as usize;
        if length > MAX_FRAME_SIZE {
            return Err(CanError::invalid_frame(format!("dlc: {} is out of range", frame.dlc)));
        }

        let mut msg = CanMessage::from_raw(frame.id, frame.ext != 0, &frame.data[..length])
            .ok_or_else(|| CanError::invalid_frame(format!("length: {}", length)))?;
        if frame.rtr != 0 {
            msg.id_flags.insert(IdentifierFlags::REMOTE);
            msg.data.clear();
        }
        if frame.fd != 0 {
            msg.set_can_type(Type::CanFd);
        }
        msg.set_channel(frame.channel)
            .set_loopback(frame.loopback != 0);

        Ok(msg)
    }
}

pub type RxCallback = Option<extern "C" fn(*const CantactFrame)>;

pub struct CInterface {
    registry: Registry<Arc<dyn Transport>>,
    handle: Handle,
}

impl CInterface {
    pub fn new(transport: Arc<dyn Transport>, options: DeviceOptions) -> Self {
        let mut registry = Registry::new(options);
        let handle = registry.init(transport);
        Self { registry, handle }
    }

    /// Hand the interface over to C, release it with [`cantact_deinit`].
    #[inline]
    pub fn into_raw(self) -> *mut CInterface {
        Box::into_raw(Box::new(self))
    }
}

fn status(result: Result<(), CanError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            log::debug!("CANTACT - {}", e);
            e.code()
        },
    }
}

/// # Safety
/// `ptr` is null or a live pointer from [`CInterface::into_raw`].
unsafe fn with_interface(ptr: *mut CInterface, f: impl FnOnce(&mut CInterface) -> Result<(), CanError>) -> i32 {
    match ptr.as_mut() {
        Some(iface) => status(f(iface)),
        None => CanError::InvalidHandle(0).code(),
    }
}

/// A CANtact over USB configured from the environment, null without USB support.
#[no_mangle]
pub extern "C" fn cantact_init() -> *mut CInterface {
    #[cfg(feature = "usb")]
    {
        let options = DeviceOptions::load();
        let transport = Arc::new(crate::UsbTransport::from_options(&options));
        CInterface::new(transport, options).into_raw()
    }
    #[cfg(not(feature = "usb"))]
    {
        log::warn!("CANTACT - built without usb support");
        std::ptr::null_mut()
    }
}

/// Close the device and free the interface.
///
/// # Safety
/// `ptr` is null or a live interface pointer, it is dangling afterwards.
#[no_mangle]
pub unsafe extern "C" fn cantact_deinit(ptr: *mut CInterface) -> i32 {
    if ptr.is_null() {
        return CanError::InvalidHandle(0).code();
    }
    let mut iface = Box::from_raw(ptr);
    let handle = iface.handle;
    status(iface.registry.deinit(handle))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_open(ptr: *mut CInterface) -> i32 {
    with_interface(ptr, |i| i.registry.open(i.handle))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_close(ptr: *mut CInterface) -> i32 {
    with_interface(ptr, |i| i.registry.close(i.handle))
}

/// The callback runs on the capture thread, frames wider than 8 bytes are not passed.
///
/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_set_rx_callback(ptr: *mut CInterface, callback: RxCallback) -> i32 {
    with_interface(ptr, |i| match callback {
        Some(callback) => i.registry.set_rx_callback(i.handle, move |msg: &CanMessage| {
            match CantactFrame::from_message(msg) {
                Some(frame) => callback(&frame),
                None => log::trace!("CANTACT - {} bytes frame not passed to C", msg.length()),
            }
        }),
        None => i.registry.set_rx_callback(i.handle, |_: &CanMessage| {}),
    })
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_start(ptr: *mut CInterface) -> i32 {
    with_interface(ptr, |i| i.registry.start(i.handle))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_stop(ptr: *mut CInterface) -> i32 {
    with_interface(ptr, |i| i.registry.stop(i.handle))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_transmit(ptr: *mut CInterface, frame: CantactFrame) -> i32 {
    with_interface(ptr, |i| {
        let msg = CanMessage::try_from(&frame)?;
        i.registry.transmit(i.handle, &msg)
    })
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_set_bitrate(ptr: *mut CInterface, channel: u8, bitrate: u32) -> i32 {
    with_interface(ptr, |i| i.registry.set_bitrate(i.handle, channel.into(), bitrate))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_set_bit_timing(
    ptr: *mut CInterface,
    channel: u8,
    brp: u32,
    phase_seg1: u32,
    phase_seg2: u32,
    sjw: u32,
) -> i32 {
    let timing = BitTiming { prop_seg: 0, phase_seg1, phase_seg2, sjw, brp };
    with_interface(ptr, |i| i.registry.set_bit_timing(i.handle, channel.into(), timing))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_set_enabled(ptr: *mut CInterface, channel: u8, enabled: u8) -> i32 {
    with_interface(ptr, |i| i.registry.set_enabled(i.handle, channel.into(), enabled != 0))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_set_monitor(ptr: *mut CInterface, channel: u8, monitor: u8) -> i32 {
    with_interface(ptr, |i| i.registry.set_monitor(i.handle, channel.into(), monitor != 0))
}

/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_set_hw_loopback(ptr: *mut CInterface, channel: u8, loopback: u8) -> i32 {
    with_interface(ptr, |i| i.registry.set_hw_loopback(i.handle, channel.into(), loopback != 0))
}

/// Channel count, or the negative error code.
///
/// # Safety
/// `ptr` is null or a live interface pointer.
#[no_mangle]
pub unsafe extern "C" fn cantact_get_channel_count(ptr: *mut CInterface) -> i32 {
    match ptr.as_ref() {
        Some(iface) => iface.registry.get_channel_count(iface.handle),
        None => CanError::InvalidHandle(0).code(),
    }
}

#[cfg(test)]
mod tests {
    use can_core::{CanError, Frame, Type};
    use crate::CanMessage;
    use super::CantactFrame;

    #[test]
    fn test_frame_conversion() -> anyhow::Result<()> {
        let mut frame = CantactFrame { channel: 1, id: 0x18DA_F110, dlc: 3, ext: 1, ..Default::default() };
        frame.data[..3].copy_from_slice(&[0x02, 0x10, 0x03]);

        let msg = CanMessage::try_from(&frame)?;
        let mut expected = CanMessage::new(0x18DA_F110_u32, &[0x02, 0x10, 0x03]).unwrap();
        expected.set_channel(1);
        assert_eq!(msg, expected);
        assert_eq!(CantactFrame::from_message(&msg), Some(frame));

        let remote = CantactFrame { id: 0x7DF, dlc: 4, rtr: 1, ..Default::default() };
        let msg = CanMessage::try_from(&remote)?;
        assert!(msg.is_remote());
        assert!(msg.data().is_empty());
        assert_eq!(msg.length(), 4);
        assert_eq!(CantactFrame::from_message(&msg), Some(remote));

        let fd = CantactFrame { id: 0x123, dlc: 8, fd: 1, ..Default::default() };
        assert_eq!(CanMessage::try_from(&fd)?.can_type(), Type::CanFd);

        let wide = CantactFrame { dlc: 9, ..Default::default() };
        assert!(matches!(CanMessage::try_from(&wide), Err(CanError::InvalidFrame(_))));
        assert_eq!(CantactFrame::from_message(&CanMessage::new(0x123_u32, &[0x00; 12]).unwrap()), None);

        Ok(())
    }
}
