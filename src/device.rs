use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, Receiver};
use parking_lot::Mutex;

use crate::{Error, Result};
use crate::binding::{Binding, Handle, SingleReading};
use crate::config::{DeviceConfiguration, UpdateInterval};
use crate::history::{HistoryStore, HISTORY_LENGTH};
use crate::readings::{AcquisitionStatus, Readings};
use crate::sampler::{Handoff, Sampler};
use crate::sys::{Driver, CHANNEL_COUNT};

/// How long teardown waits for the sampler and the unit, in total, before giving up on them.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Configured,
    Running,
    Stopped,
    Closed,
}

#[derive(Debug)]
struct Acquisition {
    stop_send: Sender<()>,
    exit_recv: Receiver<()>,
    handoff: Arc<Handoff>,
    thread: JoinHandle<Result<()>>,
}

/// How the acquisition loop ended, as far as the unit is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SamplerExit {
    /// Exited on request and stopped the unit on its way out.
    StoppedUnit,
    /// Faulted, panicked or was never started; the unit may still be streaming.
    LeftUnit,
    /// Did not exit in time; it stops and closes the unit itself once it does.
    Abandoned,
}

/// One session with one unit: open, configure, run, stop, close, in that order.
#[derive(Debug)]
pub struct Device<D: Driver> {
    binding: Arc<Mutex<Binding<D>>>,
    state: SessionState,
    handle: Option<Handle>,
    channels: Vec<usize>,
    history: Option<Arc<HistoryStore>>,
    readings: Option<Arc<Readings>>,
    update_interval: Arc<UpdateInterval>,
    sampling_interval: Option<Duration>,
    acquisition: Option<Acquisition>,
    stop_timeout: Duration,
}

impl Device<crate::sys::imp::Tc08DriverImpl> {
    pub fn new() -> Device<crate::sys::imp::Tc08DriverImpl> {
        Device::with_driver(crate::sys::imp::Tc08DriverImpl::new())
    }
}

impl Default for Device<crate::sys::imp::Tc08DriverImpl> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Driver> Device<D> {
    pub fn with_driver(driver: D) -> Device<D> {
        Device {
            binding: Arc::new(Mutex::new(Binding::new(driver))),
            state: SessionState::Unopened,
            handle: None,
            channels: Vec::new(),
            history: None,
            readings: None,
            update_interval: Arc::new(UpdateInterval::default()),
            sampling_interval: None,
            acquisition: None,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    /// The host poll interval; may be changed at any time, including while running.
    pub fn update_interval(&self) -> Arc<UpdateInterval> {
        self.update_interval.clone()
    }

    /// The unit's own sampling interval, known once running.
    pub fn sampling_interval(&self) -> Option<Duration> {
        self.sampling_interval
    }

    /// Available once configured.
    pub fn readings(&self) -> Option<Arc<Readings>> {
        self.readings.clone()
    }

    /// Available once configured.
    pub fn history(&self) -> Option<Arc<HistoryStore>> {
        self.history.clone()
    }

    pub fn set_stop_timeout(&mut self, timeout: Duration) {
        self.stop_timeout = timeout;
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> Result<Handle> {
        match (self.state, self.handle) {
            (state, Some(handle)) if state == expected => Ok(handle),
            (state, _) => Err(Error::InvalidState { operation, state }),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Unopened {
            return Err(Error::InvalidState { operation: "open", state: self.state })
        }
        let handle = self.binding.lock().open_unit()?;
        log::info!("opened unit with handle {}", handle.0);
        self.handle = Some(handle);
        self.state = SessionState::Open;
        Ok(())
    }

    /// Sets mains filtering, then registers every active channel in index order.
    ///
    /// The unit stores each channel's setting independently, so a failure part way through
    /// leaves the earlier channels registered. The session stays `Open` in that case and may be
    /// configured again.
    pub fn configure(&mut self, config: &DeviceConfiguration) -> Result<()> {
        let handle = self.expect_state("configure", SessionState::Open)?;
        let channels = config.active_channels().map(|(index, _)| index).collect::<Vec<_>>();
        if channels.is_empty() {
            return Err(Error::InvalidConfiguration("no active channels".to_owned()))
        }
        {
            let mut binding = self.binding.lock();
            binding.set_mains(handle, config.mains)?;
            for (index, channel) in config.active_channels() {
                log::debug!("configuring channel {} ({:?}) as type {:?}",
                    index, channel.name, channel.thermocouple);
                binding.set_channel(handle, index, channel.thermocouple)?;
            }
        }
        let mut active = [false; CHANNEL_COUNT];
        for &index in &channels {
            active[index] = true;
        }
        self.history = Some(Arc::new(HistoryStore::new(active, HISTORY_LENGTH)));
        self.readings = Some(Arc::new(Readings::new(config.channel_names())));
        self.channels = channels;
        self.state = SessionState::Configured;
        log::debug!("configured channels {:?} with {:?} mains filtering",
            self.channels, config.mains);
        Ok(())
    }

    /// Reads every channel once. Only while configured and not yet running, since the
    /// acquisition loop owns the unit once it runs.
    pub fn read_single(&mut self) -> Result<SingleReading> {
        let handle = self.expect_state("read a single sample from", SessionState::Configured)?;
        self.binding.lock().get_single(handle)
    }

    /// Starts streaming at the unit's fastest rate and launches the acquisition loop.
    pub fn start(&mut self) -> Result<()> {
        let handle = self.expect_state("start", SessionState::Configured)?;
        let (Some(history), Some(readings)) = (self.history.clone(), self.readings.clone()) else {
            return Err(Error::InvalidState { operation: "start", state: self.state })
        };
        let sampling_interval = {
            let mut binding = self.binding.lock();
            let minimum = binding.minimum_interval(handle)?;
            binding.run(handle, minimum)?
        };
        log::info!("unit streaming every {:?}", sampling_interval);

        readings.set_status(AcquisitionStatus::Sleeping);
        let (stop_send, stop_recv) = crossbeam_channel::bounded(1);
        let (exit_send, exit_recv) = crossbeam_channel::bounded(1);
        let handoff = Arc::new(Handoff::default());
        let sampler = Sampler::new(
            self.binding.clone(),
            handle,
            self.channels.clone(),
            sampling_interval,
            self.update_interval.clone(),
            history,
            readings,
            stop_recv,
            handoff.clone(),
        );
        let thread = sampler.run(exit_send);
        self.acquisition = Some(Acquisition { stop_send, exit_recv, handoff, thread });
        self.sampling_interval = Some(sampling_interval);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Opens, configures and starts the unit. On failure the session is torn down and the
    /// error returned; the session cannot be used again. Only valid on an unopened session.
    pub fn connect(&mut self, config: &DeviceConfiguration) -> Result<Arc<Readings>> {
        if self.state != SessionState::Unopened {
            return Err(Error::InvalidState { operation: "connect", state: self.state })
        }
        if let Err(error) = self.bring_up(config) {
            log::error!("failed to connect: {}", error);
            self.disconnect();
            return Err(error)
        }
        self.readings.clone().ok_or(Error::InvalidState { operation: "connect", state: self.state })
    }

    fn bring_up(&mut self, config: &DeviceConfiguration) -> Result<()> {
        self.open()?;
        self.configure(config)?;
        self.start()
    }

    /// Stops the acquisition loop and the unit. Does nothing unless running.
    pub fn stop(&mut self) {
        if self.state != SessionState::Running {
            log::debug!("stop() while {:?}: nothing to do", self.state);
            return
        }
        self.halt(Instant::now() + self.stop_timeout);
        self.state = SessionState::Stopped;
        log::info!("stopped acquisition");
    }

    fn halt(&mut self, deadline: Instant) {
        match self.stop_acquisition(deadline) {
            SamplerExit::StoppedUnit => (),
            SamplerExit::LeftUnit => self.stop_unit(deadline, log::Level::Warn),
            SamplerExit::Abandoned => {
                // the sampler closes the unit once its stuck call returns
                self.handle = None;
            }
        }
    }

    /// Signals the acquisition loop and waits for it until `deadline`.
    fn stop_acquisition(&mut self, deadline: Instant) -> SamplerExit {
        let Some(acquisition) = self.acquisition.take() else { return SamplerExit::LeftUnit };
        let _ = acquisition.stop_send.try_send(());
        if let Err(RecvTimeoutError::Timeout) = acquisition.exit_recv.recv_deadline(deadline) {
            if acquisition.handoff.abandon() {
                log::warn!("sampler did not stop within {:?}; leaving the unit to it",
                    self.stop_timeout);
                return SamplerExit::Abandoned
            }
        }
        match acquisition.thread.join() {
            Ok(Ok(())) => SamplerExit::StoppedUnit,
            Ok(Err(error)) => {
                log::warn!("sampler had already ended: {}", error);
                SamplerExit::LeftUnit
            }
            Err(_) => {
                log::error!("sampler panicked");
                SamplerExit::LeftUnit
            }
        }
    }

    fn stop_unit(&mut self, deadline: Instant, failure_level: log::Level) {
        let Some(handle) = self.handle else { return };
        match self.binding.try_lock_until(deadline) {
            Some(mut binding) => {
                if let Err(error) = binding.stop(handle) {
                    log::log!(failure_level, "failed to stop unit: {}", error);
                }
            }
            None => log::warn!("unit still busy after {:?}; not stopping it", self.stop_timeout),
        }
    }

    /// Stops the unit, then releases it. Never fails; problems are logged.
    ///
    /// The stop is sent whenever a handle is held and the unit was not already stopped, since a
    /// failed `start` may have left it streaming.
    pub fn close(&mut self) {
        let deadline = Instant::now() + self.stop_timeout;
        match self.state {
            SessionState::Running => {
                self.halt(deadline);
                log::info!("stopped acquisition");
            }
            SessionState::Open | SessionState::Configured =>
                self.stop_unit(deadline, log::Level::Debug),
            _ => (),
        }
        if let Some(handle) = self.handle.take() {
            match self.binding.try_lock_until(deadline) {
                Some(mut binding) => match binding.close_unit(handle) {
                    Ok(()) => log::info!("closed unit with handle {}", handle.0),
                    Err(error) => log::warn!("failed to close unit: {}", error),
                },
                None => log::warn!("unit still busy after {:?}; leaving handle {} open",
                    self.stop_timeout, handle.0),
            }
        }
        self.state = SessionState::Closed;
    }

    /// Best-effort teardown, also performed on drop.
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Closed {
            self.close();
        }
    }
}

impl<D: Driver> Drop for Device<D> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
