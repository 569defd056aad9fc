// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Log-structured storage for cache entries.
//!
//! Entries are appended into fixed-size segments; an authoritative index
//! maps each key to its live entry. Reclamation is segment-granular: when
//! no free segment remains, the oldest closed segment is dropped
//! wholesale, index entries included. Expiry is lazy and observed at read
//! time.
//!
//! A `Logmem` shard is owned by exactly one worker and has no internal
//! locking.

#[macro_use]
extern crate log;

use ahash::RandomState;
use common::metrics::{ITEM_EXPIRE, SEGMENT_EVICT};
use common::strings;
use common::time::UnixInstant;
use std::collections::HashMap;
use thiserror::Error;

mod entry;
mod segments;

pub use entry::{entry_size, EntryHeader, ENTRY_ALIGN, ENTRY_HDR_SIZE};
use segments::Segments;

// bounded attempts at freeing a segment before giving up on an insert
const EVICT_RETRIES: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LogmemError {
    #[error("item larger than a segment")]
    ItemOversized,
    #[error("no free segments")]
    NoFreeSegments,
    #[error("item not found")]
    NotFound,
    #[error("cas mismatch")]
    Exists,
    #[error("value is not numeric")]
    NotNumeric,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    seg: u32,
    offset: u32,
    cas: u64,
}

/// A borrowed view of a live entry.
#[derive(Debug)]
pub struct Item<'a> {
    key: &'a [u8],
    value: &'a [u8],
    flags: u32,
    expiry: u32,
    cas: u64,
}

impl<'a> Item<'a> {
    pub fn key(&self) -> &'a [u8] {
        self.key
    }

    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Absolute expiry in unix seconds, zero meaning no expiration.
    pub fn expiry(&self) -> u32 {
        self.expiry
    }

    pub fn cas(&self) -> u64 {
        self.cas
    }
}

/// Builder for a [`Logmem`] shard.
pub struct Builder {
    heap_size: usize,
    segment_size: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            heap_size: 64 * 1024 * 1024,
            segment_size: 1024 * 1024,
        }
    }
}

impl Builder {
    /// Total bytes of entry storage for this shard.
    pub fn heap_size(mut self, bytes: usize) -> Self {
        self.heap_size = bytes;
        self
    }

    /// Size of each append-only segment. Bounds the largest storable
    /// entry.
    pub fn segment_size(mut self, bytes: usize) -> Self {
        self.segment_size = bytes;
        self
    }

    pub fn build(self) -> Logmem {
        Logmem {
            index: HashMap::with_hasher(RandomState::new()),
            segments: Segments::new(self.heap_size, self.segment_size),
            cas: 0,
        }
    }
}

pub struct Logmem {
    index: HashMap<Box<[u8]>, IndexEntry, RandomState>,
    segments: Segments,
    cas: u64,
}

impl Logmem {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Number of live keys in the shard.
    pub fn items(&self) -> usize {
        self.index.len()
    }

    pub fn free_segments(&self) -> usize {
        self.segments.free_count()
    }

    pub fn segment_size(&self) -> usize {
        self.segments.seg_size() as usize
    }

    /// Bytes still referenced by the index.
    pub fn live_bytes(&self) -> usize {
        self.segments.live_bytes()
    }

    /// Bytes appended into non-free segments, live or dead.
    pub fn used_bytes(&self) -> usize {
        self.segments.used_bytes()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.segments.nseg() * self.segments.seg_size() as usize
    }

    /// Stores `key -> value`, overwriting any previous entry. `expiry` is
    /// absolute unix seconds with zero meaning no expiration.
    pub fn insert(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiry: u32,
    ) -> Result<(), LogmemError> {
        assert!(!key.is_empty());
        assert!(key.len() <= u16::MAX as usize);

        let size = entry_size(key.len(), value.len());
        if size > self.segments.seg_size() as usize || value.len() > u32::MAX as usize {
            return Err(LogmemError::ItemOversized);
        }
        let size = size as u32;

        let mut retries = EVICT_RETRIES;
        let (seg, offset) = loop {
            if let Some(reserved) = self.segments.reserve(size) {
                break reserved;
            }
            if retries == 0 {
                return Err(LogmemError::NoFreeSegments);
            }
            retries -= 1;
            self.evict()?;
        };

        let header = EntryHeader {
            key_len: key.len() as u16,
            val_len: value.len() as u32,
            flags,
            expiry,
        };
        let mut header_bytes = [0u8; ENTRY_HDR_SIZE];
        header.write(&mut header_bytes);
        self.segments
            .write_entry(seg, offset, size, &[&header_bytes, key, value]);

        self.cas += 1;
        let entry = IndexEntry {
            seg,
            offset,
            cas: self.cas,
        };
        if let Some(old) = self.index.insert(key.into(), entry) {
            self.release(old);
        }
        Ok(())
    }

    /// Looks up a key. Expired entries are erased on observation and
    /// reported as a miss.
    pub fn get(&mut self, key: &[u8]) -> Option<Item<'_>> {
        let entry = *self.index.get(key)?;

        let header = self.read_header(entry);
        let stored_key = self.segments.bytes(
            entry.seg,
            entry.offset + ENTRY_HDR_SIZE as u32,
            header.key_len as usize,
        );
        if stored_key != key {
            // the index invariant is broken; surface loudly but do not
            // tear down the shard
            error!("index points at mismatched entry for key");
            return None;
        }

        if header.expiry != 0 && header.expiry <= UnixInstant::recent().as_secs() {
            self.index.remove(key);
            self.release(entry);
            ITEM_EXPIRE.increment();
            return None;
        }

        let data = self.segments.bytes(
            entry.seg,
            entry.offset,
            ENTRY_HDR_SIZE + header.key_len as usize + header.val_len as usize,
        );
        Some(Item {
            key: &data[ENTRY_HDR_SIZE..ENTRY_HDR_SIZE + header.key_len as usize],
            value: &data[ENTRY_HDR_SIZE + header.key_len as usize..],
            flags: header.flags,
            expiry: header.expiry,
            cas: entry.cas,
        })
    }

    /// Removes a key. Expired entries count as absent.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        let expired = match self.index.get(key) {
            Some(entry) => {
                let header = self.read_header(*entry);
                header.expiry != 0 && header.expiry <= UnixInstant::recent().as_secs()
            }
            None => return false,
        };
        let entry = self.index.remove(key).unwrap();
        self.release(entry);
        if expired {
            ITEM_EXPIRE.increment();
        }
        !expired
    }

    /// Stores the value only if the caller's cas token matches the live
    /// entry's token.
    pub fn cas_store(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiry: u32,
        cas: u64,
    ) -> Result<(), LogmemError> {
        match self.get(key) {
            Some(item) if item.cas() == cas => self.insert(key, value, flags, expiry),
            Some(_) => Err(LogmemError::Exists),
            None => Err(LogmemError::NotFound),
        }
    }

    /// Adds `delta` to a numeric ascii value, saturating at the maximum.
    /// Flags and expiry are preserved.
    pub fn saturating_incr(&mut self, key: &[u8], delta: u64) -> Result<u64, LogmemError> {
        self.arithmetic(key, |v| v.saturating_add(delta))
    }

    /// Subtracts `delta` from a numeric ascii value, saturating at zero.
    pub fn saturating_decr(&mut self, key: &[u8], delta: u64) -> Result<u64, LogmemError> {
        self.arithmetic(key, |v| v.saturating_sub(delta))
    }

    fn arithmetic(
        &mut self,
        key: &[u8],
        op: impl FnOnce(u64) -> u64,
    ) -> Result<u64, LogmemError> {
        let (value, flags, expiry) = match self.get(key) {
            Some(item) => {
                let value =
                    strings::parse_u64(item.value()).ok_or(LogmemError::NotNumeric)?;
                (value, item.flags(), item.expiry())
            }
            None => return Err(LogmemError::NotFound),
        };

        let updated = op(value);
        let mut buf = [0u8; strings::U64_MAX_DIGITS];
        let formatted = strings::format_u64(updated, &mut buf);
        // formatted values never exceed 20 bytes, so this cannot oversize
        self.insert(key, formatted, flags, expiry)?;
        Ok(updated)
    }

    /// Drops every entry and returns all segments to the free list.
    pub fn clear(&mut self) {
        self.index.clear();
        self.segments.clear();
    }

    fn read_header(&self, entry: IndexEntry) -> EntryHeader {
        EntryHeader::read(self.segments.bytes(entry.seg, entry.offset, ENTRY_HDR_SIZE))
    }

    fn release(&mut self, entry: IndexEntry) {
        let size = self.read_header(entry).total_size();
        self.segments.release_entry(entry.seg, size as u32);
    }

    /// Reclaims the closed segment with the oldest creation time,
    /// dropping its surviving entries from the index.
    fn evict(&mut self) -> Result<(), LogmemError> {
        let seg = self
            .segments
            .oldest_closed()
            .ok_or(LogmemError::NoFreeSegments)?;

        let end = self.segments.header(seg).write_offset();
        let mut offset = 0u32;
        while offset < end {
            let header =
                EntryHeader::read(self.segments.bytes(seg, offset, ENTRY_HDR_SIZE));
            let key = self.segments.bytes(
                seg,
                offset + ENTRY_HDR_SIZE as u32,
                header.key_len as usize,
            );
            if let Some(entry) = self.index.get(key) {
                // only this incarnation of the key dies with the segment
                if entry.seg == seg && entry.offset == offset {
                    self.index.remove(key);
                }
            }
            offset += header.total_size() as u32;
        }

        self.segments.reset(seg);
        SEGMENT_EVICT.increment();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(nseg: usize, seg_size: usize) -> Logmem {
        common::time::refresh_clock();
        Logmem::builder()
            .segment_size(seg_size)
            .heap_size(nseg * seg_size)
            .build()
    }

    #[test]
    fn get_miss() {
        let mut cache = small_cache(4, 4096);
        assert!(cache.get(b"coffee").is_none());
        assert_eq!(cache.items(), 0);
    }

    #[test]
    fn insert_and_get() {
        let mut cache = small_cache(4, 4096);
        assert!(cache.insert(b"coffee", b"strong", 7, 0).is_ok());
        assert_eq!(cache.items(), 1);
        assert_eq!(cache.free_segments(), 3);

        let item = cache.get(b"coffee").unwrap();
        assert_eq!(item.value(), b"strong");
        assert_eq!(item.flags(), 7);
        assert_eq!(item.expiry(), 0);
        assert_eq!(item.cas(), 1);
    }

    #[test]
    fn overwrite_is_last_write_wins() {
        let mut cache = small_cache(4, 4096);
        assert!(cache.insert(b"drink", b"coffee", 0, 0).is_ok());
        assert!(cache.insert(b"drink", b"espresso", 0, 0).is_ok());
        assert!(cache.insert(b"drink", b"whisky", 0, 0).is_ok());

        assert_eq!(cache.items(), 1);
        let item = cache.get(b"drink").unwrap();
        assert_eq!(item.value(), b"whisky");
        // each store advances the shard's cas token
        assert_eq!(item.cas(), 3);

        // dead incarnations are no longer live bytes
        assert_eq!(
            cache.live_bytes(),
            entry_size(b"drink".len(), b"whisky".len())
        );
        assert!(cache.used_bytes() >= 3 * entry_size(5, 6));
    }

    #[test]
    fn delete() {
        let mut cache = small_cache(4, 4096);
        assert!(!cache.delete(b"drink"));
        assert!(cache.insert(b"drink", b"coffee", 0, 0).is_ok());
        assert!(cache.delete(b"drink"));
        assert!(cache.get(b"drink").is_none());
        assert_eq!(cache.items(), 0);
        assert_eq!(cache.live_bytes(), 0);
    }

    #[test]
    fn lazy_expiry() {
        let mut cache = small_cache(4, 4096);
        let now = UnixInstant::recent().as_secs();

        assert!(cache.insert(b"later", b"x", 0, now + 1000).is_ok());
        assert!(cache.insert(b"past", b"x", 0, now.saturating_sub(10).max(1)).is_ok());

        assert!(cache.get(b"later").is_some());
        assert!(cache.get(b"past").is_none());
        // the expired entry was erased on observation
        assert_eq!(cache.items(), 1);

        // an expired entry deletes as a miss
        assert!(cache.insert(b"past", b"x", 0, 1).is_ok());
        assert!(!cache.delete(b"past"));
    }

    #[test]
    fn oversized_item_is_rejected() {
        let mut cache = small_cache(2, 128);
        let value = vec![0u8; 128];
        assert_eq!(
            cache.insert(b"k", &value, 0, 0),
            Err(LogmemError::ItemOversized)
        );
        // largest entry that fits is accepted
        let value = vec![0u8; 128 - ENTRY_HDR_SIZE - 1];
        assert!(cache.insert(b"k", &value, 0, 0).is_ok());
    }

    #[test]
    fn eviction_drops_oldest_segment() {
        let mut cache = small_cache(2, 128);

        // two entries per 128-byte segment at this entry size
        let value = [b'v'; 34];
        assert!(cache.insert(b"k1", &value, 0, 0).is_ok());
        assert!(cache.insert(b"k2", &value, 0, 0).is_ok());
        assert!(cache.insert(b"k3", &value, 0, 0).is_ok());
        assert!(cache.insert(b"k4", &value, 0, 0).is_ok());
        assert_eq!(cache.free_segments(), 0);

        // the next insert must evict the oldest segment, dropping k1/k2
        assert!(cache.insert(b"k5", &value, 0, 0).is_ok());
        assert!(cache.get(b"k1").is_none());
        assert!(cache.get(b"k2").is_none());
        assert!(cache.get(b"k3").is_some());
        assert!(cache.get(b"k4").is_some());
        assert!(cache.get(b"k5").is_some());
    }

    #[test]
    fn eviction_skips_reassigned_keys() {
        let mut cache = small_cache(2, 128);
        let value = [b'v'; 34];

        // k1 lands in segment 0, then its overwrite lands in segment 1
        assert!(cache.insert(b"k1", &value, 0, 0).is_ok());
        assert!(cache.insert(b"k2", &value, 0, 0).is_ok());
        assert!(cache.insert(b"k1", &value, 1, 0).is_ok());
        assert!(cache.insert(b"k3", &value, 0, 0).is_ok());

        // evicting segment 0 must not drop the live incarnation of k1
        assert!(cache.insert(b"k4", &value, 0, 0).is_ok());
        let item = cache.get(b"k1").unwrap();
        assert_eq!(item.flags(), 1);
        assert!(cache.get(b"k2").is_none());
    }

    #[test]
    fn accounting_invariant() {
        let mut cache = small_cache(4, 256);
        let value = [b'v'; 50];
        for i in 0..20u32 {
            let key = format!("key-{}", i);
            let _ = cache.insert(key.as_bytes(), &value, 0, 0);
            assert!(cache.live_bytes() <= cache.used_bytes());
            assert!(cache.used_bytes() <= cache.capacity_bytes());
        }
    }

    #[test]
    fn numeric_operations() {
        let mut cache = small_cache(4, 4096);

        assert_eq!(
            cache.saturating_incr(b"counter", 1),
            Err(LogmemError::NotFound)
        );

        assert!(cache.insert(b"counter", b"10", 3, 0).is_ok());
        assert_eq!(cache.saturating_incr(b"counter", 5), Ok(15));
        assert_eq!(cache.get(b"counter").unwrap().value(), b"15");
        // flags survive arithmetic
        assert_eq!(cache.get(b"counter").unwrap().flags(), 3);

        assert_eq!(cache.saturating_decr(b"counter", 20), Ok(0));
        assert_eq!(cache.get(b"counter").unwrap().value(), b"0");

        let max = format!("{}", u64::MAX);
        assert!(cache.insert(b"counter", max.as_bytes(), 0, 0).is_ok());
        assert_eq!(cache.saturating_incr(b"counter", 1), Ok(u64::MAX));

        assert!(cache.insert(b"words", b"abc", 0, 0).is_ok());
        assert_eq!(
            cache.saturating_incr(b"words", 1),
            Err(LogmemError::NotNumeric)
        );
    }

    #[test]
    fn cas_semantics() {
        let mut cache = small_cache(4, 4096);
        assert_eq!(
            cache.cas_store(b"k", b"v", 0, 0, 1),
            Err(LogmemError::NotFound)
        );

        assert!(cache.insert(b"k", b"v1", 0, 0).is_ok());
        let cas = cache.get(b"k").unwrap().cas();

        assert_eq!(
            cache.cas_store(b"k", b"v2", 0, 0, cas + 1),
            Err(LogmemError::Exists)
        );
        assert_eq!(cache.get(b"k").unwrap().value(), b"v1");

        assert!(cache.cas_store(b"k", b"v2", 0, 0, cas).is_ok());
        assert_eq!(cache.get(b"k").unwrap().value(), b"v2");
        assert!(cache.get(b"k").unwrap().cas() > cas);
    }

    #[test]
    fn clear_empties_the_shard() {
        let mut cache = small_cache(2, 128);
        let value = [b'v'; 34];
        for key in [&b"k1"[..], b"k2", b"k3"] {
            assert!(cache.insert(key, &value, 0, 0).is_ok());
        }
        cache.clear();
        assert_eq!(cache.items(), 0);
        assert_eq!(cache.free_segments(), 2);
        assert_eq!(cache.used_bytes(), 0);
        assert!(cache.get(b"k1").is_none());
        assert!(cache.insert(b"k1", &value, 0, 0).is_ok());
    }
}
