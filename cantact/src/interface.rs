use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use derive_getters::Getters;
use can_core::{CanError, ChannelConfig, Frame, Transport, Type};
use crate::{
    CanMessage,
    constants::RX_CALLBACK,
    listener::{CallbackListener, FrameListener, Statistics, StatsSnapshot},
    options::DeviceOptions,
    pipeline::{Listeners, Pipeline},
    protocol::{self, BitTiming, BitTimingConsts, DeviceConfig, DeviceFeatures, Packet, Request},
    state::{SharedState, State},
};

/// What the device reported about itself at open.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Getters)]
pub struct DeviceInfo {
    #[getter(copy)]
    channel_count: usize,
    #[getter(copy)]
    sw_version: u32,
    #[getter(copy)]
    hw_version: u32,
    #[getter(copy)]
    features: DeviceFeatures,
    /// CAN controller clock in Hz.
    #[getter(copy)]
    fclk_can: u32,
}

impl DeviceInfo {
    fn new(config: &DeviceConfig, consts: &BitTimingConsts) -> Self {
        Self {
            channel_count: config.channel_count(),
            sw_version: config.sw_version,
            hw_version: config.hw_version,
            features: consts.feature,
            fclk_can: consts.fclk_can,
        }
    }
}

/// An opened CANtact device.
///
/// `start` brings the enabled channels on bus and spawns the capture thread which
/// delivers frames to the registered listeners. Bitrate, timing and mode changes are
/// only accepted while stopped, enabling a channel while running takes effect at the
/// next start.
pub struct Interface<T: Transport + 'static> {
    transport: Arc<T>,
    options: DeviceOptions,
    channels: Vec<ChannelConfig>,
    /// explicit bit timings, replacing the calculated one.
    timings: Vec<Option<BitTiming>>,
    /// channels brought on bus by the last start.
    active: Vec<bool>,
    consts: BitTimingConsts,
    info: DeviceInfo,
    listeners: Listeners,
    stats: Arc<Statistics>,
    state: SharedState,
    pipeline: Option<Pipeline>,
}

impl<T: Transport + 'static> Interface<T> {
    /// Open the transport and query the device.
    pub fn open(transport: Arc<T>, options: &DeviceOptions) -> Result<Self, CanError> {
        transport.open()?;

        let (config, consts) = match Self::handshake(transport.as_ref(), options.response_timeout()) {
            Ok(v) => v,
            Err(e) => {
                transport.close();
                return Err(e);
            }
        };

        let info = DeviceInfo::new(&config, &consts);
        let channels = vec![ChannelConfig::new(options.default_bitrate()); info.channel_count];

        let mut device = Self {
            transport,
            options: options.clone(),
            timings: vec![None; channels.len()],
            active: vec![false; channels.len()],
            channels,
            consts,
            info,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            stats: Default::default(),
            state: SharedState::new(State::Idle),
            pipeline: None,
        };
        if !options.channels().is_empty() {
            device.configure(options.channels())?;
        }

        log::info!("CANTACT - device opened, channels: {}, sw: {}, hw: {}",
            info.channel_count, info.sw_version, info.hw_version);

        Ok(device)
    }

    fn handshake(transport: &T, timeout: Duration) -> Result<(DeviceConfig, BitTimingConsts), CanError> {
        transport.write_packet(&protocol::encode_host_format())?;
        let config = DeviceConfig::from_le_bytes(&Self::request(transport, Request::DeviceConfig, timeout)?)?;
        let consts = BitTimingConsts::from_le_bytes(&Self::request(transport, Request::BitTimingConsts, timeout)?)?;
        log::debug!("CANTACT - device config: {:?}, bit timing constants: {:?}", config, consts);
        consts.validate()?;

        Ok((config, consts))
    }

    /// Send a device to host request and wait for its reply payload.
    fn request(transport: &T, request: Request, timeout: Duration) -> Result<Vec<u8>, CanError> {
        transport.write_packet(&protocol::encode_request(request, 0))?;

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(CanError::transport(format!("no reply to {:?} within {:?}", request, timeout)));
            }

            if let Some(packet) = transport.read_packet(deadline - now)? {
                match Packet::classify(&packet) {
                    Ok(Packet::Control(control)) if control.request == request => return Ok(control.payload),
                    Ok(other) => log::trace!("CANTACT - skip {:?} while waiting for {:?}", other, request),
                    Err(e) => log::warn!("{} while waiting for {:?}", e, request),
                }
            }
        }
    }

    /// Stop capturing if running and release the transport.
    pub fn close(&mut self) {
        match self.state.get() {
            State::Closed => return,
            State::Running => if let Err(e) = self.stop() {
                log::warn!("{} when stopping before close", e);
            },
            _ => {},
        }

        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
        self.active.fill(false);
        self.transport.close();
        self.state.set(State::Closed);
        log::info!("CANTACT - device closed");
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state.get()
    }

    /// Channel count reported by the device, kept after close.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    #[inline]
    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    #[inline]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn channel_config(&self, channel: usize) -> Result<ChannelConfig, CanError> {
        if self.state.get() == State::Closed {
            return Err(CanError::DeviceNotOpened);
        }
        self.channels.get(channel)
            .copied()
            .ok_or(CanError::InvalidChannel(channel))
    }

    /// The bit timing is calculated at start, replacing an explicit one.
    pub fn set_bitrate(&mut self, channel: usize, bitrate: u32) -> Result<(), CanError> {
        self.check_config(channel)?;
        self.check_bitrate(bitrate)?;
        self.channels[channel].set_bitrate(bitrate);
        self.timings[channel] = None;
        log::debug!("CANTACT - channel: {} bitrate: {}", channel, bitrate);
        Ok(())
    }

    /// Use `timing` as is instead of calculating one from the bitrate.
    ///
    /// The channel bitrate becomes the one the timing gives.
    pub fn set_bit_timing(&mut self, channel: usize, timing: BitTiming) -> Result<(), CanError> {
        self.check_config(channel)?;
        timing.check(&self.consts)?;
        let bitrate = timing.bitrate(self.consts.fclk_can).unwrap_or_default();
        if bitrate == 0 || bitrate > self.options.max_bitrate() {
            return Err(CanError::InvalidBitrate(bitrate));
        }

        self.channels[channel].set_bitrate(bitrate);
        self.timings[channel] = Some(timing);
        log::debug!("CANTACT - channel: {} bit timing: {:?} bitrate: {}", channel, timing, bitrate);
        Ok(())
    }

    #[inline]
    pub fn bit_timing(&self, channel: usize) -> Option<BitTiming> {
        self.timings.get(channel).copied().flatten()
    }

    /// Accepted while running, the device only follows at the next start.
    pub fn set_enabled(&mut self, channel: usize, enabled: bool) -> Result<(), CanError> {
        self.check_channel(channel)?;
        self.channels[channel].set_enabled(enabled);
        if self.state.get() == State::Running && enabled != self.active[channel] {
            log::debug!("CANTACT - channel: {} enabled: {} applies at next start", channel, enabled);
        }
        Ok(())
    }

    /// listen only mode, the channel neither transmits nor acknowledges.
    pub fn set_monitor(&mut self, channel: usize, monitor: bool) -> Result<(), CanError> {
        self.check_config(channel)?;
        self.channels[channel].set_monitor(monitor);
        Ok(())
    }

    pub fn set_hw_loopback(&mut self, channel: usize, loopback: bool) -> Result<(), CanError> {
        self.check_config(channel)?;
        self.channels[channel].set_loopback(loopback);
        Ok(())
    }

    /// Apply configs to the channels in order, extra configs are ignored.
    ///
    /// Nothing changes unless every applied config is valid.
    pub fn configure(&mut self, configs: &[ChannelConfig]) -> Result<(), CanError> {
        self.check_state()?;
        if self.state.get() == State::Running {
            return Err(CanError::DeviceBusy);
        }

        let count = configs.len().min(self.channels.len());
        configs[..count].iter()
            .try_for_each(|c| self.check_bitrate(c.bitrate()))?;
        self.channels[..count].copy_from_slice(&configs[..count]);
        self.timings[..count].fill(None);

        Ok(())
    }

    /// Blink the device LED.
    pub fn set_identify(&mut self, on: bool) -> Result<(), CanError> {
        self.check_state()?;
        self.write(&protocol::encode_identify(on))
    }

    pub fn start(&mut self) -> Result<(), CanError> {
        self.check_state()?;
        if self.state.get() == State::Running {
            return Err(CanError::DeviceBusy);
        }
        if !self.channels.iter().any(|c| c.enabled()) {
            return Err(CanError::NoChannelsEnabled);
        }

        let mut packets = Vec::with_capacity(self.channels.len() * 2);
        for (idx, config) in self.channels.iter().enumerate() {
            let channel = idx as u8;
            if config.enabled() {
                packets.push(match &self.timings[idx] {
                    Some(timing) => protocol::encode_bit_timing(channel, timing),
                    None => protocol::encode_config(channel, config, &self.consts)?,
                });
                packets.push(protocol::encode_start(channel, config));
            }
            else {
                packets.push(protocol::encode_stop(channel));
            }
        }
        for packet in &packets {
            self.write(packet)?;
        }

        for (active, config) in self.active.iter_mut().zip(&self.channels) {
            *active = config.enabled();
        }
        self.state.set(State::Running);
        match Pipeline::spawn(
            Arc::clone(&self.transport),
            Arc::clone(&self.listeners),
            Arc::clone(&self.stats),
            self.state.clone(),
            self.channels.len(),
            self.options.read_timeout(),
        ) {
            Ok(v) => self.pipeline = Some(v),
            Err(e) => {
                self.state.fault();
                return Err(e);
            }
        }

        log::info!("CANTACT - device started");
        Ok(())
    }

    /// Stop capturing, no listener is called once this returns.
    pub fn stop(&mut self) -> Result<(), CanError> {
        match self.state.get() {
            State::Closed => return Err(CanError::DeviceNotOpened),
            State::Idle => return Ok(()),
            State::Running | State::Faulted => {},
        }

        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
        self.check_state()?;

        let active = std::mem::replace(&mut self.active, vec![false; self.channels.len()]);
        for (idx, _) in active.iter().enumerate().filter(|(_, a)| **a) {
            self.write(&protocol::encode_stop(idx as u8))?;
        }
        self.state.transition(State::Running, State::Idle);

        log::info!("CANTACT - device stopped");
        Ok(())
    }

    /// Write a frame, returns once the transport accepted it.
    ///
    /// Only channels on bus take frames, that is enabled channels of a running device.
    pub fn transmit(&self, frame: &CanMessage) -> Result<(), CanError> {
        self.check_state()?;

        let channel = frame.channel() as usize;
        let config = self.channel_config(channel)?;
        let on_bus = self.state.get() == State::Running && self.active[channel];
        if !config.enabled() || !on_bus {
            return Err(CanError::ChannelDisabled(channel));
        }
        frame.validate()?;
        if frame.is_loopback() {
            return Err(CanError::invalid_frame("loopback frames can't be transmitted"));
        }
        if config.monitor() {
            return Err(CanError::invalid_frame(format!("channel: {} is in monitor mode", channel)));
        }
        if frame.can_type() == Type::CanFd && !self.info.features.contains(DeviceFeatures::FD) {
            return Err(CanError::invalid_frame("CAN-FD is not supported by the device"));
        }

        self.notify(|l| l.on_frame_transmitting(frame.channel(), frame));
        log::trace!("CANTACT - transmitting: {}", frame);
        self.write(&protocol::encode_frame(frame))?;
        self.stats.add_tx();
        self.notify(|l| l.on_frame_transmitted(frame.channel(), frame.id()));

        Ok(())
    }

    #[inline]
    pub fn register_listener(&self, name: String, listener: FrameListener) -> bool {
        log::trace!("CANTACT - register listener {}", name);
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.insert(name, listener);
                true
            },
            Err(e) => {
                log::warn!("CANTACT - listener error {} when registering listener {}", e, name);
                false
            },
        }
    }

    pub fn unregister_listener(&self, name: &str) -> bool {
        log::trace!("CANTACT - unregister listener {}", name);
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.remove(name);
                true
            },
            Err(e) => {
                log::warn!("CANTACT - listener error {} when unregistering listener {}", e, name);
                false
            },
        }
    }

    pub fn unregister_all_listeners(&self) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.clear();
                true
            },
            Err(e) => {
                log::warn!("CANTACT - listener error {} when unregistering all listeners", e);
                false
            },
        }
    }

    pub fn listener_names(&self) -> Vec<String> {
        match self.listeners.lock() {
            Ok(v) => v.keys().cloned().collect(),
            Err(e) => {
                log::warn!("CANTACT - listener error {} when get all listener names", e);
                vec![]
            },
        }
    }

    /// Install the receive callback, replacing the previous one.
    pub fn set_rx_callback<F>(&self, callback: F) -> bool
    where
        F: Fn(&CanMessage) + Send + 'static,
    {
        self.register_listener(RX_CALLBACK.into(), Box::new(CallbackListener::new(callback)))
    }

    fn notify(&self, callback: impl Fn(&FrameListener)) {
        match self.listeners.lock() {
            Ok(listeners) => listeners.values().for_each(callback),
            Err(e) => log::warn!("CANTACT - listener error {} when notify transmit listeners", e),
        }
    }

    /// Write a packet, a failing transport faults the session.
    fn write(&self, packet: &[u8]) -> Result<(), CanError> {
        self.transport.write_packet(packet)
            .map_err(|e| {
                log::warn!("{} when writing, device faulted", e);
                self.state.fault();
                match e {
                    CanError::TransportError(_) => e,
                    _ => CanError::transport(e),
                }
            })
    }

    fn check_state(&self) -> Result<(), CanError> {
        match self.state.get() {
            State::Closed => Err(CanError::DeviceNotOpened),
            State::Faulted => Err(CanError::Faulted),
            State::Idle | State::Running => Ok(()),
        }
    }

    fn check_channel(&self, channel: usize) -> Result<(), CanError> {
        if self.state.get() == State::Closed {
            return Err(CanError::DeviceNotOpened);
        }
        if channel >= self.channels.len() {
            return Err(CanError::InvalidChannel(channel));
        }
        self.check_state()
    }

    /// Per channel settings need an open, stopped device.
    fn check_config(&self, channel: usize) -> Result<(), CanError> {
        self.check_channel(channel)?;
        if self.state.get() == State::Running {
            return Err(CanError::DeviceBusy);
        }

        Ok(())
    }

    fn check_bitrate(&self, bitrate: u32) -> Result<(), CanError> {
        if bitrate == 0 || bitrate > self.options.max_bitrate() {
            return Err(CanError::InvalidBitrate(bitrate));
        }
        BitTiming::calculate(&self.consts, bitrate)?;
        Ok(())
    }
}

impl<T: Transport + 'static> Drop for Interface<T> {
    fn drop(&mut self) {
        self.close();
    }
}
