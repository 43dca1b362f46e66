//! Concurrency primitives: atomic counters, a reader-biased read-write
//! lock, a seqlock for lock-free POD reads, and a lock-order guard.

use crate::{Error, Result};
use std::cell::UnsafeCell;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Monotonic u32 counter shared between threads.
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU32);

impl AtomicCounter {
    pub fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub fn decrement(&self) -> u32 {
        self.0.fetch_sub(1, Ordering::Relaxed).wrapping_sub(1)
    }

    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn store(&self, value: u32) {
        self.0.store(value, Ordering::Relaxed)
    }
}

/// Monotonically increasing handle source. `generate` returns the current
/// value and advances.
#[derive(Debug, Default)]
pub struct AtomicIdGenerator(AtomicU64);

impl AtomicIdGenerator {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn generate(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Raises the next value to at least `floor`. Used after recovery so
    /// generated ids never collide with replayed ones.
    pub fn bump_to(&self, floor: u64) {
        self.0.fetch_max(floor, Ordering::Relaxed);
    }
}

/// Reader-biased read-write lock.
///
/// Readers increment the reader count and back off only while a writer is
/// active; they do not wait for pending writers, so writer starvation is
/// tolerated. Intended for read-heavy workloads with short writes.
/// Acquisition is not interruptible and has no timeout.
#[derive(Debug)]
pub struct RwLock<T> {
    readers: AtomicU32,
    writer_active: AtomicBool,
    writer_gate: Mutex<()>,
    writer_pending: AtomicBool,
    cell: UnsafeCell<T>,
}

// SAFETY: access to `cell` is mediated by the reader count / writer_active
// protocol; shared references only exist while no writer is active and the
// exclusive reference only exists after all readers drained.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            readers: AtomicU32::new(0),
            writer_active: AtomicBool::new(false),
            writer_gate: Mutex::new(()),
            writer_pending: AtomicBool::new(false),
            cell: UnsafeCell::new(value),
        }
    }

    pub fn read(&self) -> ReadGuard<'_, T> {
        loop {
            self.readers.fetch_add(1, Ordering::Acquire);
            if !self.writer_active.load(Ordering::Acquire) {
                return ReadGuard { lock: self };
            }
            self.readers.fetch_sub(1, Ordering::Release);
            while self.writer_active.load(Ordering::Relaxed) {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
        }
    }

    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        self.readers.fetch_add(1, Ordering::Acquire);
        if !self.writer_active.load(Ordering::Acquire) {
            return Some(ReadGuard { lock: self });
        }
        self.readers.fetch_sub(1, Ordering::Release);
        None
    }

    pub fn write(&self) -> WriteGuard<'_, T> {
        let gate = self.writer_gate.lock().unwrap();
        self.writer_pending.store(true, Ordering::Release);
        while self.readers.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
        self.writer_active.store(true, Ordering::Release);
        WriteGuard {
            lock: self,
            _gate: gate,
        }
    }

    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let gate = self.writer_gate.try_lock().ok()?;
        self.writer_pending.store(true, Ordering::Release);
        if self.readers.load(Ordering::Acquire) != 0 {
            self.writer_pending.store(false, Ordering::Release);
            return None;
        }
        self.writer_active.store(true, Ordering::Release);
        Some(WriteGuard {
            lock: self,
            _gate: gate,
        })
    }
}

pub struct ReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> std::ops::Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: no writer is active while the reader count is held.
        unsafe { &*self.lock.cell.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.readers.fetch_sub(1, Ordering::Release);
    }
}

pub struct WriteGuard<'a, T> {
    lock: &'a RwLock<T>,
    _gate: std::sync::MutexGuard<'a, ()>,
}

impl<T> std::ops::Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: writer_active excludes all readers and other writers.
        unsafe { &*self.lock.cell.get() }
    }
}

impl<T> std::ops::DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; the guard is unique.
        unsafe { &mut *self.lock.cell.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.writer_active.store(false, Ordering::Release);
        self.lock.writer_pending.store(false, Ordering::Release);
    }
}

/// Sequence lock for small `Copy` records (stats and the like).
///
/// Writers pre-increment the sequence to odd, copy the value in, and
/// post-increment back to even with release ordering. Readers retry until
/// they observe the same even sequence on both sides of the copy. Writes
/// must be externally serialized; the engine performs them under its write
/// lock.
#[derive(Debug)]
pub struct SeqLock<T: Copy> {
    sequence: AtomicU32,
    cell: UnsafeCell<T>,
}

// SAFETY: readers copy the value out and validate the sequence afterwards;
// torn reads are detected and retried, never returned.
unsafe impl<T: Copy + Send> Send for SeqLock<T> {}
unsafe impl<T: Copy + Send> Sync for SeqLock<T> {}

impl<T: Copy> SeqLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            sequence: AtomicU32::new(0),
            cell: UnsafeCell::new(value),
        }
    }

    pub fn read(&self) -> T {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            // SAFETY: a torn copy is discarded when the sequence check
            // below fails; T: Copy so reading racing bytes of a copy that
            // we then throw away is acceptable for POD stats records.
            let value = unsafe { std::ptr::read_volatile(self.cell.get()) };
            let after = self.sequence.load(Ordering::Acquire);
            if before == after {
                return value;
            }
        }
    }

    pub fn write(&self, value: T) {
        self.sequence.fetch_add(1, Ordering::Acquire);
        // SAFETY: callers serialize writers; readers detect the odd
        // sequence and retry.
        unsafe { std::ptr::write_volatile(self.cell.get(), value) };
        self.sequence.fetch_add(1, Ordering::Release);
    }
}

pub const MAX_HELD_LOCKS: usize = 16;

/// Guards a fixed lock acquisition order for one thread by rejecting
/// re-acquisition of a lock id that is already held.
#[derive(Debug, Default)]
pub struct DeadlockDetector {
    held: [u32; MAX_HELD_LOCKS],
    len: usize,
}

impl DeadlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, lock_id: u32) -> Result<()> {
        if self.held[..self.len].contains(&lock_id) {
            return Err(Error::AlreadyLocked(lock_id));
        }
        if self.len == MAX_HELD_LOCKS {
            return Err(Error::LockTableFull);
        }
        self.held[self.len] = lock_id;
        self.len += 1;
        Ok(())
    }

    /// Releases `lock_id`. Locks are expected to be released in reverse
    /// acquisition order; releasing out of order still succeeds but keeps
    /// the remaining order intact.
    pub fn release(&mut self, lock_id: u32) {
        if let Some(pos) = self.held[..self.len].iter().position(|&id| id == lock_id) {
            self.held.copy_within(pos + 1..self.len, pos);
            self.len -= 1;
        }
    }

    pub fn held_count(&self) -> usize {
        self.len
    }
}
