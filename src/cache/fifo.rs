//! Bounded in-process cache evicting in insertion order.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::cache::Cache;

struct Entry {
    value: Bytes,
    stored_at: Instant,
}

/// FIFO cache with an optional validity period per entry.
pub struct FifoCache {
    entries: DashMap<String, Entry>,
    /// Keys in insertion order; the front is evicted first.
    order: Mutex<VecDeque<String>>,
    max_size_items: usize,
    validity: Duration,
}

impl FifoCache {
    /// `validity` of zero keeps entries until they are evicted.
    pub fn new(max_size_items: usize, validity: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_size_items,
            validity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, key: &str) -> Option<Bytes> {
        let (value, stored_at) = self
            .entries
            .get(key)
            .map(|e| (e.value.clone(), e.stored_at))?;

        if !self.validity.is_zero() && stored_at.elapsed() >= self.validity {
            self.entries.remove(key);
            let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
            order.retain(|k| k != key);
            return None;
        }
        Some(value)
    }

    fn put(&self, key: &str, value: Bytes) {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = Entry {
            value,
            stored_at: Instant::now(),
        };
        if self.entries.insert(key.to_string(), entry).is_none() {
            order.push_back(key.to_string());
        }

        while self.entries.len() > self.max_size_items {
            match order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl Cache for FifoCache {
    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Bytes>> {
        Box::pin(async move { self.get(key) })
    }

    fn store<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.put(key, value) })
    }

    fn stop(&self) {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.clear();
        self.entries.clear();
    }
}
