#![allow(unused)]

/// CANtact USB vendor / product id.
pub(crate) const USB_VID: u16 = 0x1d50;
pub(crate) const USB_PID: u16 = 0x606f;

pub(crate) const USB_INTERFACE: u8 = 0;
pub(crate) const BULK_IN_EP: u8 = 0x81;
pub(crate) const BULK_OUT_EP: u8 = 0x02;
/// buffer size for bulk in transfers, enough for an FD host frame.
pub(crate) const BULK_IN_BUF_SIZE: usize = 80;
/// buffer size for control in transfers.
pub(crate) const CTRL_BUF_SIZE: usize = 64;
pub(crate) const USB_TIMEOUT_MS: u64 = 1000;

pub(crate) const OPTIONS_ENV: &str = "cantact.env";
pub(crate) const OPTIONS_VAR: &str = "CANTACT_OPTIONS";

pub(crate) const DEFAULT_READ_TIMEOUT_MS: u64 = 50;
pub(crate) const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// sample point the bit timing search aims for, in per mille.
pub(crate) const SAMPLE_POINT_PERMILLE: u32 = 875;
/// bitrate error accepted when no exact prescaler exists, in ppm.
pub(crate) const BITRATE_TOLERANCE_PPM: u64 = 5000;

/// Name the registry uses for the callback set through `set_rx_callback`.
pub(crate) const RX_CALLBACK: &str = "rx_callback";
