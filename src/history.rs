//! Fixed-capacity per-channel history, newest sample at index 0.

use parking_lot::RwLock;

use crate::binding::Batch;
use crate::sys::CHANNEL_COUNT;

/// Samples kept per channel.
pub const HISTORY_LENGTH: usize = 5 * 1024;

/// Prepends `batch` (oldest first, in arrival order) to `buffer` (newest first), in place.
///
/// The last `batch.len()` entries of `buffer` are pushed off the end. If `batch` is longer than
/// `buffer`, only its newest `buffer.len()` entries are kept.
///
/// ```text
/// buffer = [5, 4, 3, 2, 1], batch = [60, 70]  =>  buffer = [70, 60, 5, 4, 3]
/// ```
pub fn roll<T: Copy>(buffer: &mut [T], batch: &[T]) {
    let len = buffer.len();
    let batch = &batch[batch.len().saturating_sub(len)..];
    let count = batch.len();
    if count == 0 {
        return
    }
    buffer.copy_within(..len - count, count);
    for (slot, &value) in buffer[..count].iter_mut().zip(batch.iter().rev()) {
        *slot = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Milliseconds since the unit started streaming.
    pub timestamp_ms: i32,
    /// Degrees Celsius.
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct ChannelHistory {
    timestamps: Vec<i32>,
    temperatures: Vec<f32>,
    filled: usize,
}

impl ChannelHistory {
    pub fn new(length: usize) -> ChannelHistory {
        ChannelHistory { timestamps: vec![0; length], temperatures: vec![0.0; length], filled: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.timestamps.len()
    }

    /// Number of valid samples, at most [`capacity`](Self::capacity).
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn absorb(&mut self, timestamps: &[i32], temperatures: &[f32]) {
        debug_assert_eq!(timestamps.len(), temperatures.len());
        roll(&mut self.timestamps, timestamps);
        roll(&mut self.temperatures, temperatures);
        self.filled = (self.filled + timestamps.len()).min(self.capacity());
    }

    pub fn newest(&self) -> Option<Sample> {
        self.get(0)
    }

    /// `index` 0 is the newest sample.
    pub fn get(&self, index: usize) -> Option<Sample> {
        (index < self.filled).then(|| Sample {
            timestamp_ms: self.timestamps[index],
            temperature: self.temperatures[index],
        })
    }

    pub fn timestamps(&self) -> &[i32] {
        &self.timestamps[..self.filled]
    }

    pub fn temperatures(&self) -> &[f32] {
        &self.temperatures[..self.filled]
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.timestamps().iter().zip(self.temperatures())
            .map(|(&timestamp_ms, &temperature)| Sample { timestamp_ms, temperature })
    }
}

/// Histories of the active channels. Written by the acquisition loop only.
#[derive(Debug)]
pub struct HistoryStore {
    channels: [Option<RwLock<ChannelHistory>>; CHANNEL_COUNT],
}

impl HistoryStore {
    pub fn new(active: [bool; CHANNEL_COUNT], length: usize) -> HistoryStore {
        HistoryStore {
            channels: std::array::from_fn(|index|
                active[index].then(|| RwLock::new(ChannelHistory::new(length)))),
        }
    }

    pub fn is_active(&self, channel: usize) -> bool {
        matches!(self.channels.get(channel), Some(Some(_)))
    }

    /// Absorbs `batch` and returns the channel's newest sample afterwards.
    pub fn absorb(&self, channel: usize, batch: &Batch) -> Option<Sample> {
        let mut history = self.channels.get(channel)?.as_ref()?.write();
        history.absorb(batch.timestamps, batch.temperatures);
        history.newest()
    }

    pub fn newest(&self, channel: usize) -> Option<Sample> {
        self.channels.get(channel)?.as_ref()?.read().newest()
    }

    /// Copies out the valid window of `channel`, newest first.
    pub fn snapshot(&self, channel: usize) -> Option<Vec<Sample>> {
        Some(self.channels.get(channel)?.as_ref()?.read().iter().collect())
    }

    /// Runs `f` on the channel's history with the lock held.
    pub fn with<R>(&self, channel: usize, f: impl FnOnce(&ChannelHistory) -> R) -> Option<R> {
        Some(f(&self.channels.get(channel)?.as_ref()?.read()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roll_simple() {
        let mut buffer = [5, 4, 3, 2, 1];
        roll(&mut buffer, &[60, 70]);
        assert_eq!(buffer, [70, 60, 5, 4, 3]);
    }

    #[test]
    fn test_roll_laws() {
        let before: Vec<i32> = (0..8).rev().collect();
        for count in 0..=8 {
            let batch: Vec<i32> = (100..100 + count).collect();
            let mut buffer = before.clone();
            roll(&mut buffer, &batch);
            let reversed: Vec<i32> = batch.iter().rev().copied().collect();
            assert_eq!(&buffer[..count as usize], &reversed[..], "count = {}", count);
            assert_eq!(&buffer[count as usize..], &before[..8 - count as usize], "count = {}", count);
        }
    }

    #[test]
    fn test_roll_empty() {
        let mut buffer = [1, 2, 3];
        roll(&mut buffer, &[]);
        assert_eq!(buffer, [1, 2, 3]);
        let mut buffer: [i32; 0] = [];
        roll(&mut buffer, &[1, 2]);
    }

    #[test]
    fn test_roll_oversized() {
        let mut buffer = [0; 4];
        roll(&mut buffer, &[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(buffer, [7, 6, 5, 4]);
        assert!(!buffer.iter().any(|value| [1, 2, 3].contains(value)));
    }

    #[test]
    fn test_roll_preserves_order() {
        let mut buffer = [0; 16];
        let mut next = 1;
        for count in [3, 0, 5, 1, 7, 2, 16, 4] {
            let batch: Vec<i32> = (next..next + count).collect();
            next += count;
            roll(&mut buffer, &batch);
            let present: Vec<i32> = buffer.iter().copied().filter(|&value| value != 0).collect();
            assert!(present.windows(2).all(|pair| pair[0] > pair[1]), "{:?}", buffer);
        }
        assert_eq!(buffer[0], next - 1);
    }

    #[test]
    fn test_channel_history() {
        let mut history = ChannelHistory::new(4);
        assert!(history.is_empty());
        assert_eq!(history.newest(), None);
        history.absorb(&[100, 200, 300], &[21.5, 21.6, 21.7]);
        assert_eq!(history.len(), 3);
        assert_eq!(history.timestamps(), [300, 200, 100]);
        assert_eq!(history.temperatures(), [21.7, 21.6, 21.5]);
        assert_eq!(history.get(3), None);
        history.absorb(&[400, 500], &[21.8, 21.9]);
        assert_eq!(history.len(), 4);
        assert_eq!(history.timestamps(), [500, 400, 300, 200]);
        assert_eq!(history.newest(), Some(Sample { timestamp_ms: 500, temperature: 21.9 }));
    }

    #[test]
    fn test_history_store() {
        let mut active = [false; CHANNEL_COUNT];
        active[2] = true;
        let store = HistoryStore::new(active, 8);
        let batch = Batch { timestamps: &[1, 2], temperatures: &[10.0, 11.0], overflow: false };
        assert_eq!(store.absorb(2, &batch), Some(Sample { timestamp_ms: 2, temperature: 11.0 }));
        assert_eq!(store.absorb(3, &batch), None);
        assert_eq!(store.absorb(42, &batch), None);
        assert!(store.is_active(2) && !store.is_active(3));
        assert_eq!(store.snapshot(2).unwrap().len(), 2);
        assert_eq!(store.with(2, |history| history.capacity()), Some(8));
        assert_eq!(store.newest(3), None);
    }
}
