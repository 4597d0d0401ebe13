//! Typed results over the raw [`Driver`] contract.
//!
//! A call that returns its failure sentinel is followed by a last-error query, and the code it
//! returns is classified into a [`DeviceErrorKind`]. Nothing here retries.

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;

use crate::config::{MainsFrequency, ThermocoupleType};
use crate::sys::{self, Driver, CHANNEL_COUNT};
use crate::{Error, Result};

/// Samples transferred by one poll of one channel at most.
pub const TRANSFER_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    OsNotSupported,
    NoChannelsSet,
    InvalidParameter,
    VariantNotSupported,
    IncorrectMode,
    EnumerationIncomplete,
    NotResponding,
    FirmwareFailure,
    ConfigurationFailure,
    NotFound,
    ThreadFailure,
    PipeInfoFailure,
    NotCalibrated,
    DriverTooOld,
    Communication,
    InvalidHandle,
    /// A code outside the documented set, including "OK" reported after a failed call.
    Unknown(i16),
}

impl DeviceErrorKind {
    pub fn from_code(code: i16) -> DeviceErrorKind {
        match code {
            sys::ERROR_OS_NOT_SUPPORTED => Self::OsNotSupported,
            sys::ERROR_NO_CHANNELS_SET => Self::NoChannelsSet,
            sys::ERROR_INVALID_PARAMETER => Self::InvalidParameter,
            sys::ERROR_VARIANT_NOT_SUPPORTED => Self::VariantNotSupported,
            sys::ERROR_INCORRECT_MODE => Self::IncorrectMode,
            sys::ERROR_ENUMERATION_INCOMPLETE => Self::EnumerationIncomplete,
            sys::ERROR_NOT_RESPONDING => Self::NotResponding,
            sys::ERROR_FW_FAIL => Self::FirmwareFailure,
            sys::ERROR_CONFIG_FAIL => Self::ConfigurationFailure,
            sys::ERROR_NOT_FOUND => Self::NotFound,
            sys::ERROR_THREAD_FAIL => Self::ThreadFailure,
            sys::ERROR_PIPE_INFO_FAIL => Self::PipeInfoFailure,
            sys::ERROR_NOT_CALIBRATED => Self::NotCalibrated,
            sys::ERROR_PICOPP_TOO_OLD => Self::DriverTooOld,
            sys::ERROR_COMMUNICATION => Self::Communication,
            sys::ERROR_INVALID_HANDLE => Self::InvalidHandle,
            code => Self::Unknown(code),
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::OsNotSupported => sys::ERROR_OS_NOT_SUPPORTED,
            Self::NoChannelsSet => sys::ERROR_NO_CHANNELS_SET,
            Self::InvalidParameter => sys::ERROR_INVALID_PARAMETER,
            Self::VariantNotSupported => sys::ERROR_VARIANT_NOT_SUPPORTED,
            Self::IncorrectMode => sys::ERROR_INCORRECT_MODE,
            Self::EnumerationIncomplete => sys::ERROR_ENUMERATION_INCOMPLETE,
            Self::NotResponding => sys::ERROR_NOT_RESPONDING,
            Self::FirmwareFailure => sys::ERROR_FW_FAIL,
            Self::ConfigurationFailure => sys::ERROR_CONFIG_FAIL,
            Self::NotFound => sys::ERROR_NOT_FOUND,
            Self::ThreadFailure => sys::ERROR_THREAD_FAIL,
            Self::PipeInfoFailure => sys::ERROR_PIPE_INFO_FAIL,
            Self::NotCalibrated => sys::ERROR_NOT_CALIBRATED,
            Self::DriverTooOld => sys::ERROR_PICOPP_TOO_OLD,
            Self::Communication => sys::ERROR_COMMUNICATION,
            Self::InvalidHandle => sys::ERROR_INVALID_HANDLE,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let description = match self {
            Self::OsNotSupported => "operating system not supported",
            Self::NoChannelsSet => "no channels set",
            Self::InvalidParameter => "invalid parameter",
            Self::VariantNotSupported => "hardware variant not supported",
            Self::IncorrectMode => "incorrect mode",
            Self::EnumerationIncomplete => "enumeration incomplete",
            Self::NotResponding => "unit not responding",
            Self::FirmwareFailure => "firmware failure",
            Self::ConfigurationFailure => "configuration failure",
            Self::NotFound => "unit not found",
            Self::ThreadFailure => "driver thread failure",
            Self::PipeInfoFailure => "pipe information failure",
            Self::NotCalibrated => "unit not calibrated",
            Self::DriverTooOld => "driver too old",
            Self::Communication => "communication failure",
            Self::InvalidHandle => "invalid handle",
            Self::Unknown(_) => "unknown error",
        };
        write!(f, "{} (code {})", description, self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(pub i16);

bitflags! {
    /// Channels whose reading exceeded the thermocouple's range in a single-shot read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OverflowFlags: u16 {
        const CJ  = 1<<0;
        const TC1 = 1<<1;
        const TC2 = 1<<2;
        const TC3 = 1<<3;
        const TC4 = 1<<4;
        const TC5 = 1<<5;
        const TC6 = 1<<6;
        const TC7 = 1<<7;
        const TC8 = 1<<8;
    }
}

impl OverflowFlags {
    pub fn channel(index: usize) -> Self {
        Self::from_bits_truncate(1 << index)
    }
}

/// Caller-owned buffers a poll drains into, allocated once per session.
#[derive(Debug, Clone)]
pub struct TransferBuffer {
    temperatures: Vec<f32>,
    timestamps: Vec<i32>,
}

impl TransferBuffer {
    pub fn new(capacity: usize) -> TransferBuffer {
        TransferBuffer { temperatures: vec![0.0; capacity], timestamps: vec![0; capacity] }
    }

    pub fn capacity(&self) -> usize {
        self.temperatures.len()
    }
}

impl Default for TransferBuffer {
    fn default() -> Self {
        Self::new(TRANSFER_CAPACITY)
    }
}

/// Samples returned by one poll, oldest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Batch<'a> {
    pub timestamps: &'a [i32],
    pub temperatures: &'a [f32],
    /// Set when the unit dropped samples because they were not drained fast enough.
    pub overflow: bool,
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleReading {
    pub temperatures: [f32; CHANNEL_COUNT],
    pub overflow: OverflowFlags,
}

#[derive(Debug)]
pub struct Binding<D: Driver> {
    driver: D,
}

impl<D: Driver> Binding<D> {
    pub fn new(driver: D) -> Binding<D> {
        Binding { driver }
    }

    fn last_error(&mut self, handle: i16) -> DeviceErrorKind {
        let code = self.driver.get_last_error(handle);
        log::trace!("get_last_error({}) = {}", handle, code);
        DeviceErrorKind::from_code(code)
    }

    fn check(&mut self, handle: Handle, result: i64) -> Result<i64> {
        if result == 0 {
            Err(Error::Device(self.last_error(handle.0)))
        } else {
            Ok(result)
        }
    }

    pub fn open_unit(&mut self) -> Result<Handle> {
        let result = self.driver.open_unit();
        log::trace!("open_unit() = {}", result);
        match result {
            0 => Err(Error::DeviceUnavailable),
            handle if handle < 0 => Err(Error::Device(self.last_error(0))),
            handle => Ok(Handle(handle)),
        }
    }

    pub fn set_mains(&mut self, handle: Handle, mains: MainsFrequency) -> Result<()> {
        let result = self.driver.set_mains(handle.0, mains.sixty_hertz_flag());
        log::trace!("set_mains({}, {:?}) = {}", handle.0, mains, result);
        self.check(handle, result.into())?;
        Ok(())
    }

    pub fn set_channel(&mut self, handle: Handle, channel: usize, tc_type: ThermocoupleType)
            -> Result<()> {
        let index = channel_index(channel)?;
        let result = self.driver.set_channel(handle.0, index, tc_type.driver_code());
        log::trace!("set_channel({}, {}, {:?}) = {}", handle.0, channel, tc_type, result);
        self.check(handle, result.into())?;
        Ok(())
    }

    pub fn minimum_interval(&mut self, handle: Handle) -> Result<Duration> {
        let result = self.driver.get_minimum_interval_ms(handle.0);
        log::trace!("get_minimum_interval_ms({}) = {}", handle.0, result);
        if result <= 0 {
            return Err(Error::Device(self.last_error(handle.0)));
        }
        Ok(Duration::from_millis(result as u64))
    }

    /// Starts streaming; returns the sampling interval the unit settled on.
    pub fn run(&mut self, handle: Handle, interval: Duration) -> Result<Duration> {
        let interval_ms = i32::try_from(interval.as_millis()).unwrap_or(i32::MAX);
        let result = self.driver.run(handle.0, interval_ms);
        log::trace!("run({}, {}) = {}", handle.0, interval_ms, result);
        if result <= 0 {
            return Err(Error::Device(self.last_error(handle.0)));
        }
        Ok(Duration::from_millis(result as u64))
    }

    /// Drains up to the buffer's capacity of queued samples for `channel`.
    pub fn get_temp<'a>(&mut self, handle: Handle, channel: usize, buffer: &'a mut TransferBuffer)
            -> Result<Batch<'a>> {
        let index = channel_index(channel)?;
        let mut overflow = 0i16;
        let result = self.driver.get_temp(
            handle.0,
            &mut buffer.temperatures[..],
            &mut buffer.timestamps[..],
            &mut overflow,
            index,
            sys::UNITS_CELSIUS,
            0, // leave gaps as they are
        );
        log::trace!("get_temp({}, {}) = {} (overflow = {})", handle.0, channel, result, overflow);
        if result < 0 {
            return Err(Error::Device(self.last_error(handle.0)));
        }
        let count = (result as usize).min(buffer.capacity());
        Ok(Batch {
            timestamps: &buffer.timestamps[..count],
            temperatures: &buffer.temperatures[..count],
            overflow: overflow != 0,
        })
    }

    pub fn get_single(&mut self, handle: Handle) -> Result<SingleReading> {
        let mut temperatures = [0.0; CHANNEL_COUNT];
        let mut overflow = 0i16;
        let result = self.driver.get_single(
            handle.0, &mut temperatures, &mut overflow, sys::UNITS_CELSIUS);
        log::trace!("get_single({}) = {} (overflow = {:#06x})", handle.0, result, overflow);
        self.check(handle, result.into())?;
        Ok(SingleReading {
            temperatures,
            overflow: OverflowFlags::from_bits_truncate(overflow as u16),
        })
    }

    pub fn stop(&mut self, handle: Handle) -> Result<()> {
        let result = self.driver.stop(handle.0);
        log::trace!("stop({}) = {}", handle.0, result);
        self.check(handle, result.into())?;
        Ok(())
    }

    pub fn close_unit(&mut self, handle: Handle) -> Result<()> {
        let result = self.driver.close_unit(handle.0);
        log::trace!("close_unit({}) = {}", handle.0, result);
        self.check(handle, result.into())?;
        Ok(())
    }
}

fn channel_index(channel: usize) -> Result<i16> {
    if channel < CHANNEL_COUNT {
        Ok(channel as i16)
    } else {
        Err(Error::InvalidChannel(channel))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sys::mock::{Call, MockDriver};

    fn opened(mock: &MockDriver) -> (Binding<MockDriver>, Handle) {
        let mut binding = Binding::new(mock.clone());
        let handle = binding.open_unit().unwrap();
        (binding, handle)
    }

    #[test]
    fn test_error_codes() {
        for code in -1..=15 {
            let kind = DeviceErrorKind::from_code(code);
            assert_eq!(kind.code(), code);
            if code == 0 {
                assert_eq!(kind, DeviceErrorKind::Unknown(0));
            } else {
                assert!(!matches!(kind, DeviceErrorKind::Unknown(_)), "{} unclassified", code);
            }
        }
        assert_eq!(DeviceErrorKind::from_code(7), DeviceErrorKind::NotResponding);
        assert_eq!(DeviceErrorKind::from_code(-1), DeviceErrorKind::InvalidHandle);
        assert_eq!(DeviceErrorKind::from_code(42), DeviceErrorKind::Unknown(42));
        assert_eq!(DeviceErrorKind::Communication.to_string(), "communication failure (code 15)");
    }

    #[test]
    fn test_open_unit() {
        let mock = MockDriver::new().with_handle(7);
        let (_, handle) = opened(&mock);
        assert_eq!(handle, Handle(7));

        let mock = MockDriver::new();
        mock.set_open_result(0, sys::ERROR_OK);
        assert_eq!(Binding::new(mock).open_unit(), Err(Error::DeviceUnavailable));

        let mock = MockDriver::new();
        mock.set_open_result(-1, sys::ERROR_FW_FAIL);
        assert_eq!(Binding::new(mock.clone()).open_unit(),
            Err(Error::Device(DeviceErrorKind::FirmwareFailure)));
        assert_eq!(mock.count(Call::GetLastError), 1);
    }

    #[test]
    fn test_sentinel_queries_last_error() {
        let mock = MockDriver::new();
        mock.fail_set_mains(sys::ERROR_NOT_RESPONDING);
        let (mut binding, handle) = opened(&mock);
        assert_eq!(binding.set_mains(handle, MainsFrequency::Hz60),
            Err(Error::Device(DeviceErrorKind::NotResponding)));
        assert_eq!(mock.calls(), [
            Call::OpenUnit,
            Call::SetMains { sixty_hertz: 1 },
            Call::GetLastError,
        ]);
    }

    #[test]
    fn test_set_channel() {
        let mock = MockDriver::new();
        let (mut binding, handle) = opened(&mock);
        binding.set_channel(handle, 3, ThermocoupleType::J).unwrap();
        assert_eq!(mock.channel_type(3), Some(b'J'));
        assert_eq!(binding.set_channel(handle, 9, ThermocoupleType::K),
            Err(Error::InvalidChannel(9)));
        assert_eq!(binding.set_channel(Handle(99), 1, ThermocoupleType::K),
            Err(Error::Device(DeviceErrorKind::InvalidHandle)));
    }

    #[test]
    fn test_get_temp() {
        let mock = MockDriver::new();
        let (mut binding, handle) = opened(&mock);
        binding.set_channel(handle, 1, ThermocoupleType::K).unwrap();
        let interval = binding.minimum_interval(handle).unwrap();
        assert_eq!(binding.run(handle, interval).unwrap(), Duration::from_millis(100));

        let mut buffer = TransferBuffer::new(2);
        let batch = binding.get_temp(handle, 1, &mut buffer).unwrap();
        assert!(batch.is_empty());

        mock.push_overflowed_samples(1, &[(100, 20.0), (200, 20.5), (300, 21.0)]);
        let batch = binding.get_temp(handle, 1, &mut buffer).unwrap();
        assert_eq!(batch.timestamps, [100, 200]);
        assert_eq!(batch.temperatures, [20.0, 20.5]);
        assert!(batch.overflow);
        let batch = binding.get_temp(handle, 1, &mut buffer).unwrap();
        assert_eq!(batch.timestamps, [300]);

        mock.push_fault(1, sys::ERROR_COMMUNICATION);
        assert_eq!(binding.get_temp(handle, 1, &mut buffer).map(|batch| batch.len()),
            Err(Error::Device(DeviceErrorKind::Communication)));
    }

    #[test]
    fn test_get_single() {
        let mock = MockDriver::new();
        let mut temps = [20.0; CHANNEL_COUNT];
        temps[4] = 1999.0;
        mock.set_single(temps, 1 << 4);
        let (mut binding, handle) = opened(&mock);
        let reading = binding.get_single(handle).unwrap();
        assert_eq!(reading.temperatures[4], 1999.0);
        assert_eq!(reading.overflow, OverflowFlags::TC4);
        assert_eq!(OverflowFlags::channel(4), OverflowFlags::TC4);
    }

    #[test]
    fn test_minimum_interval_without_channels() {
        let mock = MockDriver::new();
        let (mut binding, handle) = opened(&mock);
        assert_eq!(binding.minimum_interval(handle),
            Err(Error::Device(DeviceErrorKind::NoChannelsSet)));
    }
}
