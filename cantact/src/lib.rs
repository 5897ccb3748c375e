//! **`cantact`**, driver core of the CANtact USB-CAN adapter.
//!
//! ```no_run
//! use std::sync::Arc;
//! use can_core::{CanError, Frame, Transport};
//! use cantact::{CanMessage, DeviceOptions, Interface};
//!
//! fn run<T: Transport + 'static>(transport: Arc<T>) -> Result<(), CanError> {
//!     let mut device = Interface::open(transport, &DeviceOptions::load())?;
//!     device.set_rx_callback(|frame| println!("{}", frame));
//!     device.set_enabled(0, true)?;
//!     device.start()?;
//!     if let Some(frame) = CanMessage::new(0x123_u32, &[0x01, 0x02]) {
//!         device.transmit(&frame)?;
//!     }
//!     device.stop()
//! }
//! ```

mod constants;
#[cfg(any(feature = "mock", feature = "usb"))]
mod echo;
mod message;
pub use message::CanMessage;
mod interface;
pub use interface::*;
mod listener;
pub use listener::*;
mod options;
pub use options::*;
mod pipeline;
mod registry;
pub use registry::*;
mod state;
pub use state::*;
mod timing;

pub mod ffi;
pub mod protocol;

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::MockDevice;
#[cfg(feature = "usb")]
mod usb;
#[cfg(feature = "usb")]
pub use usb::UsbTransport;
