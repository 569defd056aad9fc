// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A bounded wait-free single-producer/single-consumer ring.
//!
//! The producer and consumer cursors are free-running counters isolated to
//! their own cache lines. The producer publishes a slot with a release
//! store to `tail`; the consumer's acquire load of `tail` therefore
//! observes fully written data. The consumer releases a slot back with a
//! release store to `head`.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use std::sync::Arc;

/// Error returned by [`Producer::push`] on a full ring. Hands the rejected
/// item back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct Full<T>(pub T);

struct Shared<T> {
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// next slot to read, owned by the consumer
    head: CachePadded<AtomicUsize>,
    /// next slot to write, owned by the producer
    tail: CachePadded<AtomicUsize>,
}

// the ring hands each item from exactly one thread to exactly one other
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        for pos in head..tail {
            let cell = &self.cells[pos & self.mask];
            unsafe {
                (*cell.get()).assume_init_drop();
            }
        }
    }
}

pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a ring holding up to `capacity` items (rounded up to a power of
/// two) and returns the two endpoint handles. Ownership of the handles
/// enforces the single-producer/single-consumer contract.
pub fn ring<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0);
    let capacity = capacity.next_power_of_two();

    let mut cells = Vec::with_capacity(capacity);
    cells.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

    let shared = Arc::new(Shared {
        cells: cells.into_boxed_slice(),
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
    });

    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

impl<T> Producer<T> {
    /// Appends an item, failing without blocking when the ring is full.
    pub fn push(&mut self, item: T) -> Result<(), Full<T>> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) > shared.mask {
            return Err(Full(item));
        }

        let cell = &shared.cells[tail & shared.mask];
        unsafe {
            (*cell.get()).write(item);
        }
        shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.shared.mask + 1
    }
}

impl<T> Consumer<T> {
    /// Returns a reference to the oldest item without removing it.
    pub fn peek(&self) -> Option<&T> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let cell = &shared.cells[head & shared.mask];
        Some(unsafe { (*cell.get()).assume_init_ref() })
    }

    /// Removes and returns the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let cell = &shared.cells[head & shared.mask];
        let item = unsafe { (*cell.get()).assume_init_read() };
        shared.head.store(head.wrapping_add(1), Ordering::Release);
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        let shared = &*self.shared;
        shared.head.load(Ordering::Relaxed) == shared.tail.load(Ordering::Acquire)
    }
}
