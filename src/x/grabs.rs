//! Grab reference counting
//!
//! A passive grab is issued once per distinct key and shared by every binding
//! that needs it. The server answers a second identical grab with BadAccess,
//! and ungrabbing while another binding still depends on it would silently
//! break that binding, so the count lives here and nowhere else.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct GrabRegistry<K> {
    counts: HashMap<K, usize>,
}

impl<K> Default for GrabRegistry<K> {
    fn default() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> GrabRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `key`
    ///
    /// `grab` runs only for the first reference; if it fails no reference is
    /// taken and its error is returned.
    pub fn acquire<E>(&mut self, key: K, grab: impl FnOnce(&K) -> Result<(), E>) -> Result<(), E> {
        match self.counts.get_mut(&key) {
            Some(n) => *n += 1,
            None => {
                grab(&key)?;
                self.counts.insert(key, 1);
            }
        }
        Ok(())
    }

    /// Drop a reference on `key`
    ///
    /// `ungrab` runs when the last reference goes away. Releasing a key that
    /// holds no reference does nothing.
    pub fn release<E>(&mut self, key: &K, ungrab: impl FnOnce(&K) -> Result<(), E>) -> Result<(), E> {
        let Some(n) = self.counts.get_mut(key) else {
            return Ok(());
        };
        *n -= 1;
        if *n == 0 {
            self.counts.remove(key);
            ungrab(key)?;
        }
        Ok(())
    }

    pub fn count(&self, key: &K) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Forget every reference, returning the keys that were grabbed
    pub fn drain(&mut self) -> Vec<K> {
        self.counts.drain().map(|(k, _)| k).collect()
    }
}
