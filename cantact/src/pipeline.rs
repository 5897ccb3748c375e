use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use can_core::{CanError, Frame, Transport};
use crate::{CanMessage, listener::{FrameListener, Statistics}, protocol::Packet, state::{SharedState, State}};

pub(crate) type Listeners = Arc<Mutex<HashMap<String, FrameListener>>>;

/// What the capture thread hands received frames to.
struct Context {
    listeners: Listeners,
    stats: Arc<Statistics>,
    /// frames on higher channels are malformed.
    channel_count: usize,
}

/// The capture thread of a running session.
///
/// Dropping it signals the thread and joins it.
pub(crate) struct Pipeline {
    stop_tx: Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl Pipeline {
    pub(crate) fn spawn<T: Transport + 'static>(
        transport: Arc<T>,
        listeners: Listeners,
        stats: Arc<Statistics>,
        state: SharedState,
        channel_count: usize,
        read_timeout: Duration,
    ) -> Result<Self, CanError> {
        let (stop_tx, stop_rx) = channel();
        let task = thread::Builder::new()
            .name("cantact-rx".into())
            .spawn(move || {
                let context = Context { listeners, stats, channel_count };
                Self::receive_loop(transport.as_ref(), &context, &state, read_timeout, stop_rx)
            })
            .map_err(CanError::transport)?;

        Ok(Self { stop_tx, task: Some(task) })
    }

    /// Signal the thread and wait until it exits.
    pub(crate) fn stop(&mut self) {
        if self.stop_tx.send(()).is_err() {
            log::trace!("CANTACT - capture thread exited already");
        }

        if let Some(task) = self.task.take() {
            if task.join().is_err() {
                log::warn!("CANTACT - capture thread panicked");
            }
        }
    }

    fn receive_loop<T: Transport>(
        transport: &T,
        context: &Context,
        state: &SharedState,
        read_timeout: Duration,
        stopper: Receiver<()>,
    ) {
        log::debug!("CANTACT - capture thread started");
        loop {
            match stopper.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    log::debug!("CANTACT - capture thread stopped");
                    break;
                },
                Err(TryRecvError::Empty) => {},
            }

            match transport.read_packet(read_timeout) {
                Ok(Some(packet)) => Self::dispatch(&packet, context),
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("{} when reading, device faulted", e);
                    state.transition(State::Running, State::Faulted);
                    break;
                }
            }
        }
    }

    fn dispatch(packet: &[u8], context: &Context) {
        let Context { listeners, stats, channel_count } = context;
        match Packet::classify(packet) {
            Ok(Packet::Frame(frame)) if frame.channel() as usize >= *channel_count => {
                log::warn!("CANTACT - frame on channel: {} of {}, dropped: {}",
                    frame.channel(), channel_count, hex::encode(packet));
                stats.add_malformed();
            },
            Ok(Packet::Frame(mut frame)) => {
                frame.set_timestamp(None);
                log::trace!("CANTACT - received: {}", frame);
                stats.add_rx();
                Self::notify(listeners, &frame);
            },
            Ok(Packet::Control(control)) => {
                log::debug!("CANTACT - ignore control packet: {:?} during capture", control.request);
            },
            Err(e) => {
                log::warn!("{}, dropped: {}", e, hex::encode(packet));
                stats.add_malformed();
            }
        }
    }

    fn notify(listeners: &Listeners, frame: &CanMessage) {
        match listeners.lock() {
            Ok(listeners) => {
                listeners.values()
                    .for_each(|l| l.on_frame_received(frame.channel(), frame));
            },
            Err(e) => {
                log::warn!("CANTACT - listener error {} when notify received listeners", e);
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
