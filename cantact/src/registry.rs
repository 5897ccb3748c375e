use std::fmt::{Display, Formatter};
use std::sync::Arc;
use can_core::{CanError, Transport};
use crate::{CanMessage, Interface, listener::FrameListener, options::DeviceOptions, protocol::BitTiming};

/// Index of a device in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

impl Handle {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for Handle {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type RxCallback = Arc<dyn Fn(&CanMessage) + Send + Sync>;

struct Entry<T: Transport + 'static> {
    transport: Arc<T>,
    session: Option<Interface<T>>,
    callback: Option<RxCallback>,
}

impl<T: Transport + 'static> Entry<T> {
    fn install_callback(&self) {
        if let (Some(session), Some(callback)) = (&self.session, &self.callback) {
            let callback = Arc::clone(callback);
            session.set_rx_callback(move |frame| callback(frame));
        }
    }
}

/// Handle based access to devices.
///
/// Handles are never reused, a handle passed to [`Registry::deinit`] stays invalid.
pub struct Registry<T: Transport + 'static> {
    options: DeviceOptions,
    entries: Vec<Option<Entry<T>>>,
}

impl<T: Transport + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new(DeviceOptions::default())
    }
}

impl<T: Transport + 'static> Registry<T> {
    pub fn new(options: DeviceOptions) -> Self {
        Self { options, entries: Default::default() }
    }

    /// Take ownership of a transport, the device is not opened yet.
    pub fn init(&mut self, transport: T) -> Handle {
        let handle = Handle(self.entries.len());
        self.entries.push(Some(Entry {
            transport: Arc::new(transport),
            session: None,
            callback: None,
        }));
        log::debug!("CANTACT - init handle: {}", handle);

        handle
    }

    /// Release a handle, closing its device when open.
    pub fn deinit(&mut self, handle: Handle) -> Result<(), CanError> {
        let mut entry = self.entries.get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(CanError::InvalidHandle(handle.0))?;
        if let Some(mut session) = entry.session.take() {
            session.close();
        }
        log::debug!("CANTACT - deinit handle: {}", handle);

        Ok(())
    }

    pub fn open(&mut self, handle: Handle) -> Result<(), CanError> {
        let options = &self.options;
        let entry = self.entries.get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(CanError::InvalidHandle(handle.0))?;
        if entry.session.is_some() {
            return Err(CanError::DeviceBusy);
        }

        entry.session = Some(Interface::open(Arc::clone(&entry.transport), options)?);
        entry.install_callback();

        Ok(())
    }

    /// Close the device of a handle, closing a closed device does nothing.
    pub fn close(&mut self, handle: Handle) -> Result<(), CanError> {
        if let Some(mut session) = self.entry_mut(handle)?.session.take() {
            session.close();
        }
        Ok(())
    }

    /// Set the receive callback, it runs on the capture thread.
    ///
    /// A callback set before `open` is installed when the device opens.
    pub fn set_rx_callback<F>(&mut self, handle: Handle, callback: F) -> Result<(), CanError>
    where
        F: Fn(&CanMessage) + Send + Sync + 'static,
    {
        let entry = self.entry_mut(handle)?;
        entry.callback = Some(Arc::new(callback));
        entry.install_callback();
        Ok(())
    }

    pub fn register_listener(&mut self, handle: Handle, name: String, listener: FrameListener) -> Result<bool, CanError> {
        Ok(self.session(handle)?.register_listener(name, listener))
    }

    pub fn unregister_listener(&mut self, handle: Handle, name: &str) -> Result<bool, CanError> {
        Ok(self.session(handle)?.unregister_listener(name))
    }

    #[inline]
    pub fn start(&mut self, handle: Handle) -> Result<(), CanError> {
        self.session_mut(handle)?.start()
    }

    #[inline]
    pub fn stop(&mut self, handle: Handle) -> Result<(), CanError> {
        self.session_mut(handle)?.stop()
    }

    #[inline]
    pub fn transmit(&self, handle: Handle, frame: &CanMessage) -> Result<(), CanError> {
        self.session(handle)?.transmit(frame)
    }

    #[inline]
    pub fn set_bitrate(&mut self, handle: Handle, channel: usize, bitrate: u32) -> Result<(), CanError> {
        self.session_mut(handle)?.set_bitrate(channel, bitrate)
    }

    #[inline]
    pub fn set_bit_timing(&mut self, handle: Handle, channel: usize, timing: BitTiming) -> Result<(), CanError> {
        self.session_mut(handle)?.set_bit_timing(channel, timing)
    }

    #[inline]
    pub fn set_enabled(&mut self, handle: Handle, channel: usize, enabled: bool) -> Result<(), CanError> {
        self.session_mut(handle)?.set_enabled(channel, enabled)
    }

    #[inline]
    pub fn set_monitor(&mut self, handle: Handle, channel: usize, monitor: bool) -> Result<(), CanError> {
        self.session_mut(handle)?.set_monitor(channel, monitor)
    }

    #[inline]
    pub fn set_hw_loopback(&mut self, handle: Handle, channel: usize, loopback: bool) -> Result<(), CanError> {
        self.session_mut(handle)?.set_hw_loopback(channel, loopback)
    }

    #[inline]
    pub fn channel_count(&self, handle: Handle) -> Result<usize, CanError> {
        Ok(self.session(handle)?.channel_count())
    }

    /// Channel count, or the negative code of the error.
    pub fn get_channel_count(&self, handle: Handle) -> i32 {
        match self.channel_count(handle) {
            Ok(v) => v as i32,
            Err(e) => e.code(),
        }
    }

    /// The session of an opened handle.
    pub fn session(&self, handle: Handle) -> Result<&Interface<T>, CanError> {
        self.entries.get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(CanError::InvalidHandle(handle.0))?
            .session.as_ref()
            .ok_or(CanError::DeviceNotOpened)
    }

    pub fn session_mut(&mut self, handle: Handle) -> Result<&mut Interface<T>, CanError> {
        self.entry_mut(handle)?
            .session.as_mut()
            .ok_or(CanError::DeviceNotOpened)
    }

    fn entry_mut(&mut self, handle: Handle) -> Result<&mut Entry<T>, CanError> {
        self.entries.get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(CanError::InvalidHandle(handle.0))
    }
}
