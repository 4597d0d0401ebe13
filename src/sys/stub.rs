//! Stand-in used when the crate is built without the `hardware` feature: a host with no unit
//! plugged in.

use super::CHANNEL_COUNT;

#[derive(Debug, Default)]
pub struct Tc08DriverImpl;

impl Tc08DriverImpl {
    pub fn new() -> Tc08DriverImpl {
        log::debug!("built without `hardware`; no units will be found");
        Tc08DriverImpl
    }
}

impl super::Driver for Tc08DriverImpl {
    fn open_unit(&mut self) -> i16 {
        0
    }

    fn set_mains(&mut self, _handle: i16, _sixty_hertz: i16) -> i16 {
        0
    }

    fn set_channel(&mut self, _handle: i16, _channel: i16, _tc_type: u8) -> i16 {
        0
    }

    fn get_minimum_interval_ms(&mut self, _handle: i16) -> i32 {
        0
    }

    fn run(&mut self, _handle: i16, _interval_ms: i32) -> i32 {
        0
    }

    fn get_temp(
        &mut self,
        _handle: i16,
        _temps: &mut [f32],
        _times: &mut [i32],
        _overflow: &mut i16,
        _channel: i16,
        _units: i16,
        _fill_missing: i16,
    ) -> i32 {
        -1
    }

    fn get_single(
        &mut self,
        _handle: i16,
        _temps: &mut [f32; CHANNEL_COUNT],
        _overflow_flags: &mut i16,
        _units: i16,
    ) -> i16 {
        0
    }

    fn stop(&mut self, _handle: i16) -> i16 {
        0
    }

    fn close_unit(&mut self, _handle: i16) -> i16 {
        0
    }

    fn get_last_error(&mut self, handle: i16) -> i16 {
        if handle == 0 { super::ERROR_NOT_FOUND } else { super::ERROR_INVALID_HANDLE }
    }
}
