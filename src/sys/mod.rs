//! Raw call contract of the vendor `usbtc08` driver.
//!
//! Every method maps 1:1 to a driver entry point and keeps its integer
//! conventions; turning those into typed results is the job of
//! [`crate::binding`].

/// Number of channels on a unit: the cold junction plus eight inputs.
pub const CHANNEL_COUNT: usize = 9;

pub const UNITS_CELSIUS: i16 = 0;

pub const ERROR_OK: i16 = 0;
pub const ERROR_OS_NOT_SUPPORTED: i16 = 1;
pub const ERROR_NO_CHANNELS_SET: i16 = 2;
pub const ERROR_INVALID_PARAMETER: i16 = 3;
pub const ERROR_VARIANT_NOT_SUPPORTED: i16 = 4;
pub const ERROR_INCORRECT_MODE: i16 = 5;
pub const ERROR_ENUMERATION_INCOMPLETE: i16 = 6;
pub const ERROR_NOT_RESPONDING: i16 = 7;
pub const ERROR_FW_FAIL: i16 = 8;
pub const ERROR_CONFIG_FAIL: i16 = 9;
pub const ERROR_NOT_FOUND: i16 = 10;
pub const ERROR_THREAD_FAIL: i16 = 11;
pub const ERROR_PIPE_INFO_FAIL: i16 = 12;
pub const ERROR_NOT_CALIBRATED: i16 = 13;
pub const ERROR_PICOPP_TOO_OLD: i16 = 14;
pub const ERROR_COMMUNICATION: i16 = 15;
pub const ERROR_INVALID_HANDLE: i16 = -1;

pub trait Driver: Send + 'static {
    /// Returns a positive handle, 0 if no more units are found, or a negative value on error.
    fn open_unit(&mut self) -> i16;
    /// `sixty_hertz` is 1 for 60 Hz filtering, 0 for 50 Hz. Returns 0 on failure.
    fn set_mains(&mut self, handle: i16, sixty_hertz: i16) -> i16;
    /// `tc_type` is the ASCII thermocouple letter. Returns 0 on failure.
    fn set_channel(&mut self, handle: i16, channel: i16, tc_type: u8) -> i16;
    /// Returns 0 on failure.
    fn get_minimum_interval_ms(&mut self, handle: i16) -> i32;
    /// Returns the interval actually used, or 0 on failure.
    fn run(&mut self, handle: i16, interval_ms: i32) -> i32;
    /// Drains up to `min(temps.len(), times.len())` queued samples of `channel`, oldest first.
    /// Returns the number transferred, 0 if none are queued, or -1 on error.
    #[allow(clippy::too_many_arguments)]
    fn get_temp(
        &mut self,
        handle: i16,
        temps: &mut [f32],
        times: &mut [i32],
        overflow: &mut i16,
        channel: i16,
        units: i16,
        fill_missing: i16,
    ) -> i32;
    /// Returns 0 on failure.
    fn get_single(
        &mut self,
        handle: i16,
        temps: &mut [f32; CHANNEL_COUNT],
        overflow_flags: &mut i16,
        units: i16,
    ) -> i16;
    /// Returns 0 on failure.
    fn stop(&mut self, handle: i16) -> i16;
    /// Returns 0 on failure.
    fn close_unit(&mut self, handle: i16) -> i16;
    /// Handle 0 queries the error of the last failed `open_unit`.
    fn get_last_error(&mut self, handle: i16) -> i16;
}

#[cfg(feature = "hardware")]
#[path = "usbtc08.rs"]
pub mod imp;

#[cfg(not(feature = "hardware"))]
#[path = "stub.rs"]
pub mod imp;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
