//! A simulated unit for tests and for running the tools without hardware.
//!
//! Clones of a [`MockDriver`] share one simulated unit, so a test can hand one clone to a
//! [`Device`](crate::device::Device) and keep another to script responses and inspect the calls
//! the device made.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    OpenUnit,
    SetMains { sixty_hertz: i16 },
    SetChannel { channel: i16, tc_type: u8 },
    GetMinimumInterval,
    Run { interval_ms: i32 },
    GetTemp { channel: i16 },
    GetSingle,
    Stop,
    CloseUnit,
    GetLastError,
}

#[derive(Debug, Clone)]
enum Poll {
    Samples { samples: VecDeque<(i32, f32)>, overflow: bool },
    Fault(i16),
}

#[derive(Debug)]
struct MockState {
    open_result: i16,
    open_error: i16,
    handle: Option<i16>,
    running: bool,
    minimum_interval_ms: i32,
    channels: [Option<u8>; CHANNEL_COUNT],
    mains_failure: Option<i16>,
    channel_failures: [Option<i16>; CHANNEL_COUNT],
    polls: [VecDeque<Poll>; CHANNEL_COUNT],
    single: [f32; CHANNEL_COUNT],
    single_overflow: i16,
    poll_delay: Duration,
    last_error: i16,
    calls: Vec<Call>,
}

impl MockState {
    fn check(&mut self, handle: i16) -> bool {
        if self.handle == Some(handle) {
            true
        } else {
            self.last_error = ERROR_INVALID_HANDLE;
            false
        }
    }

    fn fail(&mut self, code: i16) {
        self.last_error = code;
    }
}

#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// A unit that opens with handle 1 and samples every 100 ms.
    pub fn new() -> MockDriver {
        MockDriver {
            state: Arc::new(Mutex::new(MockState {
                open_result: 1,
                open_error: ERROR_OK,
                handle: None,
                running: false,
                minimum_interval_ms: 100,
                channels: [None; CHANNEL_COUNT],
                mains_failure: None,
                channel_failures: [None; CHANNEL_COUNT],
                polls: Default::default(),
                single: [0.0; CHANNEL_COUNT],
                single_overflow: 0,
                poll_delay: Duration::ZERO,
                last_error: ERROR_OK,
                calls: Vec::new(),
            })),
        }
    }

    pub fn with_handle(self, handle: i16) -> MockDriver {
        self.state.lock().open_result = handle;
        self
    }

    /// Makes `open_unit` return `result`; `error` is what the last-error query reports after.
    pub fn set_open_result(&self, result: i16, error: i16) {
        let mut state = self.state.lock();
        state.open_result = result;
        state.open_error = error;
    }

    pub fn set_minimum_interval_ms(&self, interval_ms: i32) {
        self.state.lock().minimum_interval_ms = interval_ms;
    }

    pub fn fail_set_mains(&self, code: i16) {
        self.state.lock().mains_failure = Some(code);
    }

    pub fn fail_set_channel(&self, channel: usize, code: i16) {
        self.state.lock().channel_failures[channel] = Some(code);
    }

    /// Queues one batch for `channel`, oldest sample first, returned by a later `get_temp`.
    pub fn push_samples(&self, channel: usize, samples: &[(i32, f32)]) {
        self.push_batch(channel, samples, false)
    }

    /// Same as [`push_samples`](Self::push_samples), with the overflow flag raised.
    pub fn push_overflowed_samples(&self, channel: usize, samples: &[(i32, f32)]) {
        self.push_batch(channel, samples, true)
    }

    fn push_batch(&self, channel: usize, samples: &[(i32, f32)], overflow: bool) {
        self.state.lock().polls[channel].push_back(Poll::Samples {
            samples: samples.iter().copied().collect(),
            overflow,
        });
    }

    /// Makes a later `get_temp` on `channel` fail with `code`.
    pub fn push_fault(&self, channel: usize, code: i16) {
        self.state.lock().polls[channel].push_back(Poll::Fault(code));
    }

    pub fn set_single(&self, temps: [f32; CHANNEL_COUNT], overflow_flags: i16) {
        let mut state = self.state.lock();
        state.single = temps;
        state.single_overflow = overflow_flags;
    }

    /// Makes every `get_temp` block for `delay`, like a unit that stopped answering.
    pub fn set_poll_delay(&self, delay: Duration) {
        self.state.lock().poll_delay = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.state.lock().calls.iter().filter(|&&c| c == call).count()
    }

    pub fn channel_type(&self, channel: usize) -> Option<u8> {
        self.state.lock().channels[channel]
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().handle.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

impl Driver for MockDriver {
    fn open_unit(&mut self) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(Call::OpenUnit);
        if state.handle.is_some() {
            return 0;
        }
        if state.open_result > 0 {
            state.handle = Some(state.open_result);
        } else {
            let code = state.open_error;
            state.fail(code);
        }
        state.open_result
    }

    fn set_mains(&mut self, handle: i16, sixty_hertz: i16) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(Call::SetMains { sixty_hertz });
        if !state.check(handle) {
            return 0;
        }
        if let Some(code) = state.mains_failure {
            state.fail(code);
            return 0;
        }
        1
    }

    fn set_channel(&mut self, handle: i16, channel: i16, tc_type: u8) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(Call::SetChannel { channel, tc_type });
        if !state.check(handle) {
            return 0;
        }
        let Some(index) = usize::try_from(channel).ok().filter(|&i| i < CHANNEL_COUNT) else {
            state.fail(ERROR_INVALID_PARAMETER);
            return 0;
        };
        if let Some(code) = state.channel_failures[index] {
            state.fail(code);
            return 0;
        }
        state.channels[index] = Some(tc_type);
        1
    }

    fn get_minimum_interval_ms(&mut self, handle: i16) -> i32 {
        let mut state = self.state.lock();
        state.calls.push(Call::GetMinimumInterval);
        if !state.check(handle) {
            return 0;
        }
        if state.channels.iter().all(Option::is_none) {
            state.fail(ERROR_NO_CHANNELS_SET);
            return 0;
        }
        state.minimum_interval_ms
    }

    fn run(&mut self, handle: i16, interval_ms: i32) -> i32 {
        let mut state = self.state.lock();
        state.calls.push(Call::Run { interval_ms });
        if !state.check(handle) {
            return 0;
        }
        if interval_ms < state.minimum_interval_ms {
            state.fail(ERROR_INVALID_PARAMETER);
            return 0;
        }
        state.running = true;
        interval_ms
    }

    fn get_temp(
        &mut self,
        handle: i16,
        temps: &mut [f32],
        times: &mut [i32],
        overflow: &mut i16,
        channel: i16,
        _units: i16,
        _fill_missing: i16,
    ) -> i32 {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(Call::GetTemp { channel });
            state.poll_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if !state.check(handle) {
            return -1;
        }
        if !state.running {
            state.fail(ERROR_INCORRECT_MODE);
            return -1;
        }
        let Some(index) = usize::try_from(channel).ok().filter(|&i| i < CHANNEL_COUNT) else {
            state.fail(ERROR_INVALID_PARAMETER);
            return -1;
        };
        let capacity = temps.len().min(times.len());
        match state.polls[index].front_mut() {
            None => {
                *overflow = 0;
                0
            }
            Some(Poll::Fault(code)) => {
                let code = *code;
                state.polls[index].pop_front();
                state.fail(code);
                -1
            }
            Some(Poll::Samples { samples, overflow: flagged }) => {
                let count = samples.len().min(capacity);
                for (slot, (time, temp)) in samples.drain(..count).enumerate() {
                    times[slot] = time;
                    temps[slot] = temp;
                }
                *overflow = *flagged as i16;
                if samples.is_empty() {
                    state.polls[index].pop_front();
                }
                count as i32
            }
        }
    }

    fn get_single(
        &mut self,
        handle: i16,
        temps: &mut [f32; CHANNEL_COUNT],
        overflow_flags: &mut i16,
        _units: i16,
    ) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(Call::GetSingle);
        if !state.check(handle) {
            return 0;
        }
        if state.running {
            state.fail(ERROR_INCORRECT_MODE);
            return 0;
        }
        *temps = state.single;
        *overflow_flags = state.single_overflow;
        1
    }

    fn stop(&mut self, handle: i16) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(Call::Stop);
        if !state.check(handle) {
            return 0;
        }
        state.running = false;
        1
    }

    fn close_unit(&mut self, handle: i16) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(Call::CloseUnit);
        if !state.check(handle) {
            return 0;
        }
        state.handle = None;
        state.running = false;
        1
    }

    fn get_last_error(&mut self, _handle: i16) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(Call::GetLastError);
        state.last_error
    }
}
