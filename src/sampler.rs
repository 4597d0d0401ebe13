use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::binding::{Binding, Handle, TransferBuffer};
use crate::config::UpdateInterval;
use crate::history::HistoryStore;
use crate::readings::{AcquisitionStatus, Reading, Readings};
use crate::sys::Driver;
use crate::{Error, Result};

/// Settles, exactly once, whether the sampler or its owner finishes tearing down the unit.
///
/// The owner waits a bounded time for the sampler. If it gives up first, the sampler closes the
/// unit itself whenever its stuck call returns.
#[derive(Debug, Default)]
pub struct Handoff(AtomicU8);

impl Handoff {
    const RUNNING: u8 = 0;
    const EXITED: u8 = 1;
    const ABANDONED: u8 = 2;

    /// Called by the sampler on its way out. Returns false if the owner has given up on it.
    fn exit(&self) -> bool {
        self.0.compare_exchange(Self::RUNNING, Self::EXITED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Called by the owner when the sampler did not exit in time. Returns false if it exited
    /// in the meantime, in which case the owner still owns the unit.
    pub fn abandon(&self) -> bool {
        self.0.compare_exchange(Self::RUNNING, Self::ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Background loop that drains the unit's sample queue into the history store and publishes
/// the newest reading of every channel.
///
/// The sampler owns all access to the unit while it runs: the foreground only touches the
/// binding again after the sampler has exited or has been abandoned.
pub struct Sampler<D: Driver> {
    binding: Arc<Mutex<Binding<D>>>,
    handle: Handle,
    channels: Vec<usize>,
    device_interval: Duration,
    update_interval: Arc<UpdateInterval>,
    history: Arc<HistoryStore>,
    readings: Arc<Readings>,
    stop_recv: Receiver<()>,
    handoff: Arc<Handoff>,
    buffer: TransferBuffer,
}

impl<D: Driver> Sampler<D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        binding: Arc<Mutex<Binding<D>>>,
        handle: Handle,
        channels: Vec<usize>,
        device_interval: Duration,
        update_interval: Arc<UpdateInterval>,
        history: Arc<HistoryStore>,
        readings: Arc<Readings>,
        stop_recv: Receiver<()>,
        handoff: Arc<Handoff>,
    ) -> Sampler<D> {
        Sampler {
            binding, handle, channels, device_interval, update_interval, history, readings,
            stop_recv, handoff,
            buffer: TransferBuffer::default(),
        }
    }

    /// Runs the loop on its own thread. `exit_send` receives a message (or is disconnected, if
    /// the thread panics) once the loop has finished, which lets the caller wait for it with a
    /// bound.
    pub fn run(mut self, exit_send: Sender<()>) -> JoinHandle<Result<()>> {
        std::thread::spawn(move || {
            let result = self.sample();
            if !self.handoff.exit() {
                self.close_abandoned(&result);
            }
            let _ = exit_send.send(());
            result
        })
    }

    fn close_abandoned(&self, result: &Result<()>) {
        log::info!("sampler: closing unit left behind by teardown");
        let mut binding = self.binding.lock();
        if result.is_err() {
            if let Err(error) = binding.stop(self.handle) {
                log::warn!("sampler: failed to stop unit: {}", error);
            }
        }
        if let Err(error) = binding.close_unit(self.handle) {
            log::warn!("sampler: failed to close unit: {}", error);
        }
    }

    fn sample(&mut self) -> Result<()> {
        log::debug!("sampler: draining channels {:?} every {:?} or slower",
            self.channels, self.device_interval);
        loop {
            self.readings.set_status(AcquisitionStatus::Sleeping);
            // the unit cannot produce samples faster than it was told to
            let interval = self.update_interval.get().max(self.device_interval);
            match self.stop_recv.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => (),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            self.readings.set_status(AcquisitionStatus::Polling);
            if let Err(error) = self.poll_channels() {
                log::error!("sampler: {}; readings will no longer update", error);
                self.readings.set_status(AcquisitionStatus::Faulted(error.clone()));
                return Err(error)
            }
            self.readings.complete_cycle();
        }
        log::debug!("sampler: stop requested");
        if let Err(error) = self.binding.lock().stop(self.handle) {
            log::warn!("sampler: failed to stop unit: {}", error);
        }
        self.readings.set_status(AcquisitionStatus::Stopped);
        Ok(())
    }

    fn poll_channels(&mut self) -> Result<()> {
        let mut binding = self.binding.lock();
        for &channel in &self.channels {
            let batch = match binding.get_temp(self.handle, channel, &mut self.buffer) {
                Ok(batch) => batch,
                Err(Error::Device(kind)) => return Err(Error::AcquisitionFault { channel, kind }),
                Err(error) => return Err(error),
            };
            log::debug!("sampler: drained {} samples from channel {}", batch.len(), channel);
            if batch.is_empty() {
                continue
            }
            if batch.overflow {
                log::warn!("sampler: channel {} overflowed; samples were lost", channel);
            }
            if let Some(newest) = self.history.absorb(channel, &batch) {
                self.readings.publish(channel, Reading {
                    timestamp_ms: newest.timestamp_ms,
                    temperature: newest.temperature,
                    overflow: batch.overflow,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::binding::DeviceErrorKind;
    use crate::config::DeviceConfiguration;
    use crate::history::Sample;
    use crate::sys::mock::{Call, MockDriver};
    use crate::sys::{self, CHANNEL_COUNT};

    fn sampler(mock: &MockDriver, channels: Vec<usize>) -> (Sampler<MockDriver>, Sender<()>) {
        let mut binding = Binding::new(mock.clone());
        let handle = binding.open_unit().unwrap();
        for &channel in &channels {
            binding.set_channel(handle, channel, Default::default()).unwrap();
        }
        let interval = binding.run(handle, Duration::from_millis(100)).unwrap();
        let mut active = [false; CHANNEL_COUNT];
        for &channel in &channels {
            active[channel] = true;
        }
        let (stop_send, stop_recv) = crossbeam_channel::bounded(1);
        let sampler = Sampler::new(
            Arc::new(Mutex::new(binding)),
            handle,
            channels,
            interval,
            Arc::new(UpdateInterval::new(Duration::from_millis(1))),
            Arc::new(HistoryStore::new(active, 16)),
            Arc::new(Readings::new(DeviceConfiguration::default().channel_names())),
            stop_recv,
            Arc::new(Handoff::default()),
        );
        (sampler, stop_send)
    }

    #[test]
    fn test_poll_publishes_newest() {
        let mock = MockDriver::new();
        let (mut sampler, _stop_send) = sampler(&mock, vec![0, 2, 5]);
        mock.push_samples(2, &[(100, 21.5), (200, 21.6), (300, 21.7)]);
        sampler.poll_channels().unwrap();

        assert_eq!(sampler.history.snapshot(2).unwrap(), [
            Sample { timestamp_ms: 300, temperature: 21.7 },
            Sample { timestamp_ms: 200, temperature: 21.6 },
            Sample { timestamp_ms: 100, temperature: 21.5 },
        ]);
        assert_eq!(sampler.readings.latest(2),
            Some(Reading { timestamp_ms: 300, temperature: 21.7, overflow: false }));
        assert_eq!(sampler.readings.latest(0), None);
        let polled = mock.calls().into_iter()
            .filter_map(|call| match call { Call::GetTemp { channel } => Some(channel), _ => None })
            .collect::<Vec<_>>();
        assert_eq!(polled, [0, 2, 5]);
    }

    #[test]
    fn test_poll_fault() {
        let mock = MockDriver::new();
        let (mut sampler, _stop_send) = sampler(&mock, vec![2, 5, 7]);
        mock.push_samples(2, &[(100, 20.0)]);
        mock.push_fault(5, sys::ERROR_NOT_RESPONDING);
        mock.push_samples(7, &[(100, 30.0)]);
        assert_eq!(sampler.poll_channels(), Err(Error::AcquisitionFault {
            channel: 5,
            kind: DeviceErrorKind::NotResponding,
        }));
        assert!(sampler.readings.latest(2).is_some());
        assert_eq!(sampler.readings.latest(7), None);
    }

    #[test]
    fn test_overflow_flag() {
        let mock = MockDriver::new();
        let (mut sampler, _stop_send) = sampler(&mock, vec![1]);
        mock.push_overflowed_samples(1, &[(100, 20.0)]);
        sampler.poll_channels().unwrap();
        assert_eq!(sampler.readings.latest(1).map(|r| r.overflow), Some(true));
        mock.push_samples(1, &[(200, 20.0)]);
        sampler.poll_channels().unwrap();
        assert_eq!(sampler.readings.latest(1).map(|r| r.overflow), Some(false));
    }

    #[test]
    fn test_stop_signal() {
        let mock = MockDriver::new();
        let (sampler, stop_send) = sampler(&mock, vec![1]);
        let readings = sampler.readings.clone();
        let (exit_send, exit_recv) = crossbeam_channel::bounded(1);
        let thread = sampler.run(exit_send);
        stop_send.send(()).unwrap();
        exit_recv.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(thread.join().unwrap(), Ok(()));
        assert_eq!(readings.status(), AcquisitionStatus::Stopped);
        assert_eq!(mock.count(Call::Stop), 1);
        assert!(!mock.is_running());
        assert_eq!(mock.count(Call::CloseUnit), 0);
    }

    #[test]
    fn test_abandoned_sampler_closes_unit() {
        let mock = MockDriver::new();
        let (sampler, stop_send) = sampler(&mock, vec![1]);
        let handoff = sampler.handoff.clone();
        let (exit_send, exit_recv) = crossbeam_channel::bounded(1);
        assert!(handoff.abandon());
        let thread = sampler.run(exit_send);
        drop(stop_send);
        exit_recv.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(thread.join().unwrap(), Ok(()));
        assert_eq!(mock.count(Call::Stop), 1);
        assert_eq!(mock.count(Call::CloseUnit), 1);
        assert!(!mock.is_open());
    }

    #[test]
    fn test_handoff_settles_once() {
        let handoff = Handoff::default();
        assert!(handoff.exit());
        assert!(!handoff.abandon());
        let handoff = Handoff::default();
        assert!(handoff.abandon());
        assert!(!handoff.exit());
    }
}
