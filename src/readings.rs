//! Latest value per channel, published by the acquisition loop for any number of readers.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::history::Sample;
use crate::sys::CHANNEL_COUNT;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp_ms: i32,
    /// Degrees Celsius.
    pub temperature: f32,
    /// The unit dropped samples before this one was drained.
    pub overflow: bool,
}

impl Reading {
    pub fn sample(&self) -> Sample {
        Sample { timestamp_ms: self.timestamp_ms, temperature: self.temperature }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum AcquisitionStatus {
    /// The loop has not been started.
    #[default]
    Idle,
    Sleeping,
    Polling,
    /// The loop exited on request.
    Stopped,
    /// The loop exited on a device error; readings no longer update.
    Faulted(Error),
}

impl AcquisitionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Sleeping | Self::Polling)
    }
}

#[derive(Debug)]
pub struct Readings {
    names: [Option<String>; CHANNEL_COUNT],
    latest: [RwLock<Option<Reading>>; CHANNEL_COUNT],
    status: RwLock<AcquisitionStatus>,
    cycles: AtomicU64,
}

impl Readings {
    pub fn new(names: [Option<String>; CHANNEL_COUNT]) -> Readings {
        Readings {
            names,
            latest: Default::default(),
            status: RwLock::new(AcquisitionStatus::Idle),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn name(&self, channel: usize) -> Option<&str> {
        self.names.get(channel)?.as_deref()
    }

    pub fn channel(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.as_deref() == Some(name))
    }

    /// `None` until the first sample of `channel` arrives.
    pub fn latest(&self, channel: usize) -> Option<Reading> {
        *self.latest.get(channel)?.read()
    }

    pub fn get(&self, name: &str) -> Option<Reading> {
        self.latest(self.channel(name)?)
    }

    /// Active channels as `(index, name, latest reading)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str, Option<Reading>)> + '_ {
        self.names.iter().enumerate().filter_map(|(index, name)| {
            name.as_deref().map(|name| (index, name, self.latest(index)))
        })
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.status.read().clone()
    }

    pub fn fault(&self) -> Option<Error> {
        match &*self.status.read() {
            AcquisitionStatus::Faulted(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Number of completed poll cycles. A reading that stays the same while this advances is
    /// merely unchanged; one that stays the same while it does not is stale.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    pub(crate) fn publish(&self, channel: usize, reading: Reading) {
        if let Some(slot) = self.latest.get(channel) {
            *slot.write() = Some(reading);
        }
    }

    pub(crate) fn set_status(&self, status: AcquisitionStatus) {
        *self.status.write() = status;
    }

    pub(crate) fn complete_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::binding::DeviceErrorKind;
    use crate::config::DeviceConfiguration;

    fn readings() -> Readings {
        Readings::new(DeviceConfiguration::from_names(&["CJ", "_", "oven"]).unwrap().channel_names())
    }

    #[test]
    fn test_publish() {
        let readings = readings();
        assert_eq!(readings.get("oven"), None);
        let reading = Reading { timestamp_ms: 300, temperature: 21.7, overflow: false };
        readings.publish(2, reading);
        assert_eq!(readings.latest(2), Some(reading));
        assert_eq!(readings.get("oven"), Some(reading));
        assert_eq!(readings.get("nope"), None);
        assert_eq!(readings.name(1), None);
        let listed = readings.iter().map(|(index, name, _)| (index, name)).collect::<Vec<_>>();
        assert_eq!(listed, [(0, "CJ"), (2, "oven")]);
    }

    #[test]
    fn test_status() {
        let readings = readings();
        assert_eq!(readings.status(), AcquisitionStatus::Idle);
        assert_eq!(readings.fault(), None);
        readings.set_status(AcquisitionStatus::Sleeping);
        assert!(readings.status().is_active());
        let fault = Error::AcquisitionFault { channel: 5, kind: DeviceErrorKind::NotResponding };
        readings.set_status(AcquisitionStatus::Faulted(fault.clone()));
        assert_eq!(readings.fault(), Some(fault));
        assert!(!readings.status().is_active());
    }

    #[test]
    fn test_concurrent_readers_see_whole_readings() {
        let readings = std::sync::Arc::new(readings());
        let writer = {
            let readings = readings.clone();
            std::thread::spawn(move || {
                for n in 0..10_000 {
                    readings.publish(0, Reading { timestamp_ms: n, temperature: n as f32, overflow: false });
                }
            })
        };
        for _ in 0..10_000 {
            if let Some(reading) = readings.latest(0) {
                assert_eq!(reading.temperature, reading.timestamp_ms as f32);
            }
        }
        writer.join().unwrap();
        assert_eq!(readings.latest(0).map(|r| r.timestamp_ms), Some(9_999));
    }
}
