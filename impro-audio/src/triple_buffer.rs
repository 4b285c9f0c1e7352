//! Lock-free triple buffer for publishing engine status.
//!
//! The writer fills its back slot and swaps it into the middle; the reader
//! swaps the middle into its front slot when fresh data is flagged. Neither
//! side blocks, and the reader always sees a complete value.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// State byte layout: [fresh:1][unused:1][back:2][middle:2][front:2]
const FRONT_SHIFT: u8 = 0;
const MIDDLE_SHIFT: u8 = 2;
const BACK_SHIFT: u8 = 4;
const SLOT_MASK: u8 = 0b11;
const FRESH: u8 = 0x80;

const INITIAL_STATE: u8 = (2 << BACK_SHIFT) | (1 << MIDDLE_SHIFT) | (0 << FRONT_SHIFT);

struct Shared<T> {
    slots: [UnsafeCell<T>; 3],
    state: AtomicU8,
}

// Safety: each slot is owned by exactly one side at a time, as tracked by `state`
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

fn slot(state: u8, shift: u8) -> u8 {
    (state >> shift) & SLOT_MASK
}

fn encode(back: u8, middle: u8, front: u8) -> u8 {
    (back << BACK_SHIFT) | (middle << MIDDLE_SHIFT) | (front << FRONT_SHIFT)
}

impl<T> Shared<T> {
    /// Swap back and middle, flag fresh.
    fn publish(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            let next = encode(slot(state, MIDDLE_SHIFT), slot(state, BACK_SHIFT), slot(state, FRONT_SHIFT)) | FRESH;
            match self
                .state
                .compare_exchange_weak(state, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => state = current,
            }
        }
    }

    /// Swap middle and front if fresh, clearing the flag.
    fn consume(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state & FRESH == 0 {
                return;
            }
            let next = encode(slot(state, BACK_SHIFT), slot(state, FRONT_SHIFT), slot(state, MIDDLE_SHIFT));
            match self
                .state
                .compare_exchange_weak(state, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => state = current,
            }
        }
    }

    fn index(&self, shift: u8) -> usize {
        slot(self.state.load(Ordering::Acquire), shift) as usize
    }
}

/// Writer half. Owned by the real-time thread.
pub struct TripleBufferWriter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> TripleBufferWriter<T> {
    /// Update the back slot in place and publish it. The back slot holds
    /// whatever was published two writes ago, so overwrite every field.
    pub fn publish_with<F>(&mut self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let back = self.shared.index(BACK_SHIFT);
        // Safety: the back slot is never touched by the reader
        unsafe { f(&mut *self.shared.slots[back].get()) };
        self.shared.publish();
    }

    pub fn write(&mut self, value: T) {
        self.publish_with(|slot| *slot = value);
    }
}

/// Reader half. Owned by the control side.
pub struct TripleBufferReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> TripleBufferReader<T> {
    pub fn has_fresh(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) & FRESH != 0
    }

    /// Inspect the latest published value without cloning.
    pub fn with<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.shared.consume();
        let front = self.shared.index(FRONT_SHIFT);
        // Safety: the front slot is never touched by the writer
        unsafe { f(&*self.shared.slots[front].get()) }
    }

    pub fn read(&mut self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }
}

/// Create a triple buffer with every slot set to `value`.
pub fn triple_buffer<T: Clone>(value: T) -> (TripleBufferWriter<T>, TripleBufferReader<T>) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(value.clone()),
            UnsafeCell::new(value.clone()),
            UnsafeCell::new(value),
        ],
        state: AtomicU8::new(INITIAL_STATE),
    });
    (
        TripleBufferWriter {
            shared: Arc::clone(&shared),
        },
        TripleBufferReader { shared },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_initial_value() {
        let (_writer, mut reader) = triple_buffer(7u64);
        assert!(!reader.has_fresh());
        assert_eq!(reader.read(), 7);
    }

    #[test]
    fn latest_write_wins() {
        let (mut writer, mut reader) = triple_buffer(0u64);
        writer.write(1);
        writer.write(2);
        writer.write(3);
        assert!(reader.has_fresh());
        assert_eq!(reader.read(), 3);
        assert!(!reader.has_fresh());
        assert_eq!(reader.read(), 3);
    }

    #[test]
    fn publish_with_updates_in_place() {
        let (mut writer, mut reader) = triple_buffer(vec![0u32; 4]);
        writer.publish_with(|v| v[2] = 9);
        assert_eq!(reader.with(|v| v[2]), 9);
    }

    #[test]
    fn concurrent_reader_sees_monotonic_values() {
        let (mut writer, mut reader) = triple_buffer(0u64);
        let handle = std::thread::spawn(move || {
            for i in 1..=10_000u64 {
                writer.write(i);
            }
        });
        let mut last = 0;
        while last < 10_000 {
            let value = reader.read();
            assert!(value >= last);
            last = value;
        }
        handle.join().unwrap();
    }
}
