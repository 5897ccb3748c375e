//! libusb link to a real CANtact.
//!
//! Frame packets travel over the bulk endpoints without their kind byte, control
//! packets become vendor requests on the default endpoint. Transmit confirmations
//! of channels without hardware loopback never reach the session.
use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use rusb::{DeviceHandle, Direction, GlobalContext, Recipient, RequestType};
use can_core::{CanError, Transport};
use crate::{
    echo::EchoTracker,
    constants::{BULK_IN_BUF_SIZE, BULK_IN_EP, BULK_OUT_EP, CTRL_BUF_SIZE, USB_INTERFACE, USB_TIMEOUT_MS},
    options::{DeviceOptions, UsbIds},
    protocol::{self, ControlPacket, Request, KIND_CONTROL, KIND_FRAME},
};

fn usb_error(e: rusb::Error) -> CanError {
    match e {
        rusb::Error::NoDevice | rusb::Error::NotFound => CanError::DeviceNotFound,
        _ => CanError::transport(e),
    }
}

pub struct UsbTransport {
    ids: UsbIds,
    handle: RwLock<Option<DeviceHandle<GlobalContext>>>,
    /// replies of device to host requests, handed out before bulk data.
    replies: Mutex<VecDeque<Vec<u8>>>,
    echoes: EchoTracker,
}

impl UsbTransport {
    pub fn new(ids: UsbIds) -> Self {
        Self {
            ids,
            handle: RwLock::new(None),
            replies: Mutex::new(VecDeque::new()),
            echoes: Default::default(),
        }
    }

    #[inline]
    pub fn from_options(options: &DeviceOptions) -> Self {
        Self::new(options.usb())
    }

    #[inline]
    fn timeout() -> Duration {
        Duration::from_millis(USB_TIMEOUT_MS)
    }

    fn control(&self, handle: &DeviceHandle<GlobalContext>, control: ControlPacket) -> Result<(), CanError> {
        let index = USB_INTERFACE as u16;
        let device_to_host = control.payload.is_empty()
            && matches!(control.request, Request::DeviceConfig | Request::BitTimingConsts | Request::Timestamp);

        if device_to_host {
            let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface);
            let mut buf = [0u8; CTRL_BUF_SIZE];
            let size = handle.read_control(request_type, control.request as u8, control.value, index, &mut buf, Self::timeout())
                .map_err(usb_error)?;
            let reply = ControlPacket::new(control.request, control.value, buf[..size].to_vec());
            self.replies.lock()
                .map_err(|e| CanError::transport(format!("reply queue poisoned: {}", e)))?
                .push_back(reply.encode());
        }
        else {
            let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Interface);
            handle.write_control(request_type, control.request as u8, control.value, index, &control.payload, Self::timeout())
                .map_err(usb_error)?;
        }

        Ok(())
    }
}

impl Transport for UsbTransport {
    fn open(&self) -> Result<(), CanError> {
        let mut handle = rusb::open_device_with_vid_pid(self.ids.vid(), self.ids.pid())
            .ok_or(CanError::DeviceNotFound)?;
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            log::debug!("CANTACT - auto detach kernel driver: {}", e);
        }
        handle.claim_interface(USB_INTERFACE)
            .map_err(usb_error)?;

        *self.handle.write()
            .map_err(|e| CanError::transport(format!("handle poisoned: {}", e)))? = Some(handle);
        self.echoes.reset();
        log::info!("CANTACT - usb device {:04x}:{:04x} opened", self.ids.vid(), self.ids.pid());

        Ok(())
    }

    fn close(&self) {
        match self.handle.write() {
            Ok(mut guard) => if let Some(mut handle) = guard.take() {
                if let Err(e) = handle.release_interface(USB_INTERFACE) {
                    log::warn!("CANTACT - error: {} when releasing interface", e);
                }
            },
            Err(e) => log::warn!("CANTACT - handle poisoned: {} when closing", e),
        }
        if let Ok(mut replies) = self.replies.lock() {
            replies.clear();
        }
        self.echoes.reset();
    }

    fn read_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>, CanError> {
        if let Some(reply) = self.replies.lock()
            .map_err(|e| CanError::transport(format!("reply queue poisoned: {}", e)))?
            .pop_front() {
            return Ok(Some(reply));
        }

        let guard = self.handle.read()
            .map_err(|e| CanError::transport(format!("handle poisoned: {}", e)))?;
        let handle = guard.as_ref()
            .ok_or(CanError::transport("usb device is closed"))?;

        let mut buf = [0u8; BULK_IN_BUF_SIZE];
        match handle.read_bulk(BULK_IN_EP, &mut buf, timeout) {
            Ok(size) => {
                let mut packet = Vec::with_capacity(size + 1);
                packet.push(KIND_FRAME);
                packet.extend_from_slice(&buf[..size]);
                Ok(self.echoes.incoming(packet))
            },
            Err(rusb::Error::Timeout) => Ok(None),
            Err(e) => Err(usb_error(e)),
        }
    }

    fn write_packet(&self, packet: &[u8]) -> Result<(), CanError> {
        let guard = self.handle.read()
            .map_err(|e| CanError::transport(format!("handle poisoned: {}", e)))?;
        let handle = guard.as_ref()
            .ok_or(CanError::transport("usb device is closed"))?;

        let packet = self.echoes.outgoing(packet);
        match packet.first() {
            Some(&KIND_FRAME) => {
                handle.write_bulk(BULK_OUT_EP, &packet[1..], Self::timeout())
                    .map_err(usb_error)?;
                Ok(())
            },
            Some(&KIND_CONTROL) => self.control(handle, protocol::decode_control(&packet)?),
            _ => Err(CanError::malformed("unknown packet kind")),
        }
    }
}
