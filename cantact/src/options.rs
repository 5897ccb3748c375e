use std::fs::read_to_string;
use std::time::Duration;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use can_core::{ChannelConfig, DEFAULT_BITRATE, MAX_NOMINAL_BITRATE};
use crate::constants::{DEFAULT_READ_TIMEOUT_MS, DEFAULT_RESPONSE_TIMEOUT_MS, OPTIONS_ENV, OPTIONS_VAR, USB_PID, USB_VID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Getters)]
pub struct UsbIds {
    #[getter(copy)]
    vid: u16,
    #[getter(copy)]
    pid: u16,
}

impl Default for UsbIds {
    fn default() -> Self {
        Self { vid: USB_VID, pid: USB_PID }
    }
}

/// Options of a device session.
///
/// ```yaml
/// default_bitrate: 250000
/// read_timeout_ms: 20
/// channels:
///   - bitrate: 500000
///     enabled: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Getters)]
#[serde(default)]
pub struct DeviceOptions {
    /// bitrate of every channel at open.
    #[getter(copy)]
    default_bitrate: u32,
    #[getter(copy)]
    max_bitrate: u32,
    /// how long the capture thread blocks in one read.
    #[getter(copy)]
    read_timeout_ms: u64,
    /// how long open waits for each device reply.
    #[getter(copy)]
    response_timeout_ms: u64,
    #[getter(copy)]
    usb: UsbIds,
    /// presets applied to the channels at open, in channel order.
    channels: Vec<ChannelConfig>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            default_bitrate: DEFAULT_BITRATE,
            max_bitrate: MAX_NOMINAL_BITRATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            usb: Default::default(),
            channels: Default::default(),
        }
    }
}

impl DeviceOptions {
    #[inline]
    pub fn from_yaml(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }

    /// Load the options file named by `CANTACT_OPTIONS`, which may be set in `cantact.env`.
    ///
    /// Defaults are used when the variable is unset or the file can't be read.
    pub fn load() -> Self {
        if let Err(e) = dotenvy::from_filename(OPTIONS_ENV) {
            log::trace!("CANTACT - {} not loaded: {}", OPTIONS_ENV, e);
        }
        let path = match std::env::var(OPTIONS_VAR) {
            Ok(v) => v,
            Err(_) => return Self::default(),
        };

        match read_to_string(&path) {
            Ok(data) => match Self::from_yaml(&data) {
                Ok(v) => {
                    log::info!("CANTACT - options loaded from: {}", path);
                    v
                },
                Err(e) => {
                    log::warn!("CANTACT - error parsing `{}`: {}, use defaults", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("CANTACT - unable to read `{}`: {}, use defaults", path, e);
                Self::default()
            }
        }
    }

    #[inline]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[inline]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn set_default_bitrate(&mut self, bitrate: u32) -> &mut Self {
        self.default_bitrate = bitrate;
        self
    }

    pub fn set_max_bitrate(&mut self, bitrate: u32) -> &mut Self {
        self.max_bitrate = bitrate;
        self
    }

    pub fn set_read_timeout_ms(&mut self, timeout: u64) -> &mut Self {
        self.read_timeout_ms = timeout;
        self
    }

    pub fn set_response_timeout_ms(&mut self, timeout: u64) -> &mut Self {
        self.response_timeout_ms = timeout;
        self
    }

    pub fn set_usb(&mut self, usb: UsbIds) -> &mut Self {
        self.usb = usb;
        self
    }

    pub fn set_channels(&mut self, channels: Vec<ChannelConfig>) -> &mut Self {
        self.channels = channels;
        self
    }
}
