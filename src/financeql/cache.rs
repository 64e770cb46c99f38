//! TTL cache for data-backed builtin results.
//!
//! Keys follow `"<kind>:<ticker>[:<period>]"`. Expiry is lazy: entries die
//! when read past their deadline. No other eviction; query sessions are
//! short-lived.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::value::Value;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

pub struct EvalCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Value, Instant)>>,
}

impl EvalCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read().expect("cache lock");
            match entries.get(key) {
                Some((value, stored)) if stored.elapsed() < self.ttl => {
                    return Some(value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it under the write lock.
        self.entries.write().expect("cache lock").remove(key);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries
            .write()
            .expect("cache lock")
            .insert(key.into(), (value, Instant::now()));
    }

    pub fn clear(&self) {
        self.entries.write().expect("cache lock").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EvalCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
