use libc::{c_char, c_float, c_short};

use super::CHANNEL_COUNT;

#[link(name = "usbtc08")]
extern "C" {
    fn usb_tc08_open_unit() -> c_short;
    fn usb_tc08_close_unit(handle: c_short) -> c_short;
    fn usb_tc08_stop(handle: c_short) -> c_short;
    fn usb_tc08_set_mains(handle: c_short, sixty_hertz: c_short) -> c_short;
    fn usb_tc08_set_channel(handle: c_short, channel: c_short, tc_type: c_char) -> c_short;
    fn usb_tc08_get_minimum_interval_ms(handle: c_short) -> i32;
    fn usb_tc08_run(handle: c_short, interval_ms: i32) -> i32;
    fn usb_tc08_get_temp(
        handle: c_short,
        temp_buffer: *mut c_float,
        times_ms_buffer: *mut i32,
        buffer_length: i32,
        overflow: *mut c_short,
        channel: c_short,
        units: c_short,
        fill_missing: c_short,
    ) -> i32;
    fn usb_tc08_get_single(
        handle: c_short,
        temp: *mut c_float,
        overflow_flags: *mut c_short,
        units: c_short,
    ) -> c_short;
    fn usb_tc08_get_last_error(handle: c_short) -> c_short;
}

/// The vendor library. The library keeps its own per-handle state, so this type carries none.
#[derive(Debug, Default)]
pub struct Tc08DriverImpl;

impl Tc08DriverImpl {
    pub fn new() -> Tc08DriverImpl {
        Tc08DriverImpl
    }
}

// SAFETY (all calls below): the library accepts any handle value and reports unknown ones via
// `usb_tc08_get_last_error`; every pointer passed is derived from a live Rust borrow whose length
// is at least the length announced to the call.
impl super::Driver for Tc08DriverImpl {
    fn open_unit(&mut self) -> i16 {
        unsafe { usb_tc08_open_unit() }
    }

    fn set_mains(&mut self, handle: i16, sixty_hertz: i16) -> i16 {
        unsafe { usb_tc08_set_mains(handle, sixty_hertz) }
    }

    fn set_channel(&mut self, handle: i16, channel: i16, tc_type: u8) -> i16 {
        unsafe { usb_tc08_set_channel(handle, channel, tc_type as c_char) }
    }

    fn get_minimum_interval_ms(&mut self, handle: i16) -> i32 {
        unsafe { usb_tc08_get_minimum_interval_ms(handle) }
    }

    fn run(&mut self, handle: i16, interval_ms: i32) -> i32 {
        unsafe { usb_tc08_run(handle, interval_ms) }
    }

    fn get_temp(
        &mut self,
        handle: i16,
        temps: &mut [f32],
        times: &mut [i32],
        overflow: &mut i16,
        channel: i16,
        units: i16,
        fill_missing: i16,
    ) -> i32 {
        let length = temps.len().min(times.len()).min(i32::MAX as usize) as i32;
        unsafe {
            usb_tc08_get_temp(
                handle,
                temps.as_mut_ptr(),
                times.as_mut_ptr(),
                length,
                overflow as *mut c_short,
                channel,
                units,
                fill_missing,
            )
        }
    }

    fn get_single(
        &mut self,
        handle: i16,
        temps: &mut [f32; CHANNEL_COUNT],
        overflow_flags: &mut i16,
        units: i16,
    ) -> i16 {
        unsafe {
            usb_tc08_get_single(handle, temps.as_mut_ptr(), overflow_flags as *mut c_short, units)
        }
    }

    fn stop(&mut self, handle: i16) -> i16 {
        unsafe { usb_tc08_stop(handle) }
    }

    fn close_unit(&mut self, handle: i16) -> i16 {
        unsafe { usb_tc08_close_unit(handle) }
    }

    fn get_last_error(&mut self, handle: i16) -> i16 {
        unsafe { usb_tc08_get_last_error(handle) }
    }
}
