//! Driver library for the USB TC-08 thermocouple data logger.
//!
//! A [`Device`] session opens the unit, registers its channels and starts it streaming; from
//! then on a background sampler drains the unit's queue once per update interval into a
//! per-channel [`HistoryStore`] and publishes the newest value of every channel in
//! [`Readings`], which the host may read from any thread at any time.
//!
//! ```no_run
//! let mut device = tc08::Device::new();
//! let readings = device.connect(&"CJ,TC1,TC2".parse()?)?;
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! println!("TC1 = {:?}", readings.get("TC1"));
//! device.disconnect();
//! # Ok::<(), tc08::Error>(())
//! ```

pub mod sys;
mod binding;
mod config;
mod history;
mod readings;
mod sampler;
pub mod device;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("no TC-08 unit found")]
    DeviceUnavailable,
    #[error("TC-08 driver error: {0}")]
    Device(DeviceErrorKind),
    #[error("acquisition stopped on channel {channel}: {kind}")]
    AcquisitionFault { channel: usize, kind: DeviceErrorKind },
    #[error("cannot {operation} a session that is {state:?}")]
    InvalidState { operation: &'static str, state: SessionState },
    #[error("no channel {0}")]
    InvalidChannel(usize),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use binding::{
    DeviceErrorKind,
    Handle,
    OverflowFlags,
    SingleReading,
    Batch,
    TransferBuffer,
    Binding,
    TRANSFER_CAPACITY,
};

pub use config::{
    MainsFrequency,
    ThermocoupleType,
    ChannelConfiguration,
    DeviceConfiguration,
    UpdateInterval,
    DISABLED_CHANNEL_NAME,
};

pub use history::{
    roll,
    Sample,
    ChannelHistory,
    HistoryStore,
    HISTORY_LENGTH,
};

pub use readings::{
    AcquisitionStatus,
    Reading,
    Readings,
};

pub use device::{SessionState, STOP_TIMEOUT};

pub use sys::CHANNEL_COUNT;

pub type Device =
    device::Device<crate::sys::imp::Tc08DriverImpl>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::DeviceUnavailable.to_string(), "no TC-08 unit found");
        assert_eq!(Error::Device(DeviceErrorKind::NotCalibrated).to_string(),
            "TC-08 driver error: unit not calibrated (code 13)");
        assert_eq!(
            Error::AcquisitionFault { channel: 5, kind: DeviceErrorKind::InvalidHandle }.to_string(),
            "acquisition stopped on channel 5: invalid handle (code -1)");
        assert_eq!(
            Error::InvalidState { operation: "start", state: SessionState::Open }.to_string(),
            "cannot start a session that is Open");
    }
}
