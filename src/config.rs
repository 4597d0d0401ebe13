//! High-level configuration of the unit and of the acquisition loop.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::sys::CHANNEL_COUNT;
use crate::{Error, Result};

/// Label that marks a channel as unused.
pub const DISABLED_CHANNEL_NAME: &str = "_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MainsFrequency {
    Hz50,
    #[default]
    Hz60,
}

impl MainsFrequency {
    pub(crate) fn sixty_hertz_flag(self) -> i16 {
        match self {
            Self::Hz50 => 0,
            Self::Hz60 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThermocoupleType {
    B,
    E,
    J,
    #[default]
    K,
    N,
    R,
    S,
    T,
}

impl ThermocoupleType {
    pub const ALL: [ThermocoupleType; 8] = [
        Self::B, Self::E, Self::J, Self::K, Self::N, Self::R, Self::S, Self::T
    ];

    pub(crate) fn driver_code(self) -> u8 {
        match self {
            Self::B => b'B',
            Self::E => b'E',
            Self::J => b'J',
            Self::K => b'K',
            Self::N => b'N',
            Self::R => b'R',
            Self::S => b'S',
            Self::T => b'T',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfiguration {
    pub name: String,
    /// Ignored by the unit for the cold junction (channel 0).
    pub thermocouple: ThermocoupleType,
}

impl ChannelConfiguration {
    pub fn new(name: impl Into<String>) -> ChannelConfiguration {
        ChannelConfiguration { name: name.into(), thermocouple: ThermocoupleType::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfiguration {
    pub mains: MainsFrequency,
    /// Indexed by channel; `None` leaves the channel unused.
    pub channels: [Option<ChannelConfiguration>; CHANNEL_COUNT],
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        DeviceConfiguration {
            mains: MainsFrequency::default(),
            channels: std::array::from_fn(|index| Some(ChannelConfiguration::new(
                if index == 0 { "CJ".to_owned() } else { format!("TC{}", index) }
            ))),
        }
    }
}

impl DeviceConfiguration {
    /// Builds a configuration from labels positioned by channel index.
    ///
    /// Channels past the end of `names`, and those labelled [`DISABLED_CHANNEL_NAME`] or left
    /// empty, are unused. Active labels must be unique since readings are looked up by name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<DeviceConfiguration> {
        if names.len() > CHANNEL_COUNT {
            return Err(Error::InvalidConfiguration(
                format!("{} channel names given, the unit has {}", names.len(), CHANNEL_COUNT)))
        }
        let mut channels: [Option<ChannelConfiguration>; CHANNEL_COUNT] = Default::default();
        for (index, name) in names.iter().enumerate() {
            let name = name.as_ref().trim();
            if name.is_empty() || name == DISABLED_CHANNEL_NAME {
                continue
            }
            if channels.iter().flatten().any(|channel| channel.name == name) {
                return Err(Error::InvalidConfiguration(
                    format!("channel name {:?} is used twice", name)))
            }
            channels[index] = Some(ChannelConfiguration::new(name));
        }
        Ok(DeviceConfiguration { mains: MainsFrequency::default(), channels })
    }

    pub fn with_mains(self, mains: MainsFrequency) -> Self {
        DeviceConfiguration { mains, ..self }
    }

    /// Active channels in ascending index order.
    pub fn active_channels(&self) -> impl Iterator<Item = (usize, &ChannelConfiguration)> {
        self.channels.iter().enumerate()
            .filter_map(|(index, channel)| channel.as_ref().map(|channel| (index, channel)))
    }

    pub fn channel_names(&self) -> [Option<String>; CHANNEL_COUNT] {
        std::array::from_fn(|index| self.channels[index].as_ref().map(|c| c.name.clone()))
    }
}

/// Parses a comma-separated label list, e.g. `CJ,TC1,_,_,TC4`.
impl FromStr for DeviceConfiguration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_names(&s.split(',').collect::<Vec<_>>())
    }
}

/// How often the acquisition loop wakes up to drain the unit. Shared between the host, which may
/// change it at any time, and the loop, which reads it at the top of every cycle.
#[derive(Debug)]
pub struct UpdateInterval {
    micros: AtomicU64,
}

impl UpdateInterval {
    pub const DEFAULT: Duration = Duration::from_secs(1);
    pub const MINIMUM: Duration = Duration::from_millis(1);

    pub fn new(interval: Duration) -> UpdateInterval {
        let update_interval = UpdateInterval { micros: AtomicU64::new(0) };
        update_interval.set(interval);
        update_interval
    }

    pub fn get(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Relaxed))
    }

    pub fn set(&self, interval: Duration) {
        let interval = interval_or_minimum(interval);
        self.micros.store(interval.as_micros().min(u64::MAX as u128) as u64, Ordering::Relaxed);
        log::debug!("update interval set to {:?}", interval);
    }

    pub fn secs(&self) -> f64 {
        self.get().as_secs_f64()
    }

    /// Negative, zero and NaN values clamp to [`Self::MINIMUM`]; values too large for a
    /// [`Duration`] saturate.
    pub fn set_secs(&self, secs: f64) {
        let interval = match Duration::try_from_secs_f64(secs) {
            Ok(interval) => interval,
            Err(_) if secs > 0.0 => Duration::MAX,
            Err(_) => Self::MINIMUM,
        };
        self.set(interval)
    }
}

impl Default for UpdateInterval {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

fn interval_or_minimum(interval: Duration) -> Duration {
    interval.max(UpdateInterval::MINIMUM)
}
