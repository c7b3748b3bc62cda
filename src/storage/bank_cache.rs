// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for bank directory pages.
//!
//! The gateway's bank list changes rarely, so pages are cached per cursor
//! to avoid a gateway round-trip on every settlement form load.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::providers::BankPage;

const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

struct CacheEntry {
    page: BankPage,
    inserted_at: Instant,
}

/// In-process LRU cache keyed by pagination cursor.
pub struct BankCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl BankCache {
    /// Create a new cache with the given capacity (pages) and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(MIN_CAPACITY),
            )),
            ttl,
        }
    }

    fn key(cursor: Option<&str>) -> String {
        cursor.unwrap_or_default().to_string()
    }

    /// Get a cached page. Returns `None` if not cached or expired.
    pub fn get(&self, cursor: Option<&str>) -> Option<BankPage> {
        let key = Self::key(cursor);
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.page.clone());
            }
            cache.pop(&key);
        }
        None
    }

    /// Store a page.
    pub fn put(&self, cursor: Option<&str>, page: BankPage) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                Self::key(cursor),
                CacheEntry {
                    page,
                    inserted_at: Instant::now(),
                },
            );
        }
    }
}
