// src/cache/memstore.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

/// Millisecond values up to this are read as relative by [`Expiry::from_millis`].
pub const ONE_YEAR_MS: u64 = 31_536_000_000;

/// When an entry stops being visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
  Never,
  After(Duration),
  At(SystemTime),
}

impl Expiry {
  /// Up to one year of milliseconds is a relative lifetime; anything larger
  /// is an absolute Unix timestamp in milliseconds.
  pub fn from_millis(ms: u64) -> Self {
    if ms <= ONE_YEAR_MS {
      Expiry::After(Duration::from_millis(ms))
    } else {
      Expiry::At(UNIX_EPOCH + Duration::from_millis(ms))
    }
  }

  fn deadline(self, now: SystemTime) -> Option<SystemTime> {
    match self {
      Expiry::Never => None,
      Expiry::After(lifetime) => Some(now + lifetime),
      Expiry::At(at) => Some(at),
    }
  }
}

impl Default for Expiry {
  fn default() -> Self {
    Expiry::Never
  }
}

/// Remaining lifetime of a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
  Forever,
  Remaining(Duration),
}

#[derive(Debug)]
struct MemoryNode<T> {
  value: T,
  expires: Option<SystemTime>,
}

impl<T> MemoryNode<T> {
  fn is_expired(&self, now: SystemTime) -> bool {
    self.expires.map_or(false, |at| at <= now)
  }
}

/// A string-keyed in-memory table with optional per-entry expiry.
///
/// Expired entries are invisible: any read that runs into one removes it,
/// and [`MemoryTable::gc`] removes them all.
#[derive(Debug)]
pub struct MemoryTable<T> {
  spaces: Mutex<LinkedHashMap<String, MemoryNode<T>>>,
}

impl<T: Clone> MemoryTable<T> {
  pub fn new() -> Self {
    Self {
      spaces: Mutex::new(LinkedHashMap::new()),
    }
  }

  /// Inserts only if `key` has no live entry.
  pub fn add(&self, key: &str, value: T, expiry: Expiry) -> bool {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    if live(&mut spaces, key, now).is_some() {
      return false;
    }
    spaces.insert(key.to_string(), MemoryNode { value, expires: expiry.deadline(now) });
    true
  }

  /// Overwrites only if `key` has a live entry.
  pub fn replace(&self, key: &str, value: T, expiry: Expiry) -> bool {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    match live(&mut spaces, key, now) {
      Some(node) => {
        *node = MemoryNode { value, expires: expiry.deadline(now) };
        true
      }
      None => false,
    }
  }

  /// Inserts or overwrites.
  pub fn set(&self, key: &str, value: T, expiry: Expiry) -> &Self {
    let now = SystemTime::now();
    self
      .spaces
      .lock()
      .insert(key.to_string(), MemoryNode { value, expires: expiry.deadline(now) });
    self
  }

  pub fn get(&self, key: &str) -> Option<T> {
    let mut spaces = self.spaces.lock();
    live(&mut spaces, key, SystemTime::now()).map(|node| node.value.clone())
  }

  /// Live values among `keys`; missing and expired keys are left out.
  pub fn get_many(&self, keys: &[&str]) -> HashMap<String, T> {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    keys
      .iter()
      .filter_map(|key| live(&mut spaces, key, now).map(|node| (key.to_string(), node.value.clone())))
      .collect()
  }

  /// Removes `key` and returns its value if it was live.
  pub fn fetch(&self, key: &str) -> Option<T> {
    let now = SystemTime::now();
    let node = self.spaces.lock().remove(key)?;
    (!node.is_expired(now)).then_some(node.value)
  }

  pub fn fetch_many(&self, keys: &[&str]) -> HashMap<String, T> {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    keys
      .iter()
      .filter_map(|key| {
        let node = spaces.remove(*key)?;
        (!node.is_expired(now)).then(|| (key.to_string(), node.value))
      })
      .collect()
  }

  pub fn exists(&self, key: &str) -> bool {
    let mut spaces = self.spaces.lock();
    live(&mut spaces, key, SystemTime::now()).is_some()
  }

  /// True only if every key has a live entry.
  pub fn exists_all(&self, keys: &[&str]) -> bool {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    keys.iter().all(|key| live(&mut spaces, key, now).is_some())
  }

  /// `None` if `key` is missing or expired.
  pub fn ttl(&self, key: &str) -> Option<Ttl> {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    let node = live(&mut spaces, key, now)?;
    Some(match node.expires {
      None => Ttl::Forever,
      Some(at) => Ttl::Remaining(at.duration_since(now).unwrap_or_default()),
    })
  }

  /// Gives a live entry a new lifetime from now; `None` keeps it forever.
  pub fn set_ttl(&self, key: &str, ttl: Option<Duration>) -> bool {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    match live(&mut spaces, key, now) {
      Some(node) => {
        node.expires = ttl.map(|lifetime| now + lifetime);
        true
      }
      None => false,
    }
  }

  pub fn delete(&self, key: &str) -> &Self {
    self.spaces.lock().remove(key);
    self
  }

  pub fn delete_many(&self, keys: &[&str]) -> &Self {
    let mut spaces = self.spaces.lock();
    for key in keys {
      spaces.remove(*key);
    }
    self
  }

  pub fn truncate(&self) -> &Self {
    self.spaces.lock().clear();
    self
  }

  /// Number of live entries.
  pub fn len(&self) -> usize {
    let now = SystemTime::now();
    self.spaces.lock().values().filter(|node| !node.is_expired(now)).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Live keys in insertion order.
  pub fn keys(&self) -> Vec<String> {
    let now = SystemTime::now();
    self
      .spaces
      .lock()
      .iter()
      .filter(|(_, node)| !node.is_expired(now))
      .map(|(key, _)| key.clone())
      .collect()
  }

  /// Drops every expired entry. Returns how many were dropped.
  pub fn gc(&self) -> usize {
    let now = SystemTime::now();
    let mut spaces = self.spaces.lock();
    let expired: Vec<String> = spaces
      .iter()
      .filter(|(_, node)| node.is_expired(now))
      .map(|(key, _)| key.clone())
      .collect();
    for key in &expired {
      spaces.remove(key);
    }
    if !expired.is_empty() {
      tracing::debug!(dropped = expired.len(), "MemoryTable gc");
    }
    expired.len()
  }
}

impl<T: Clone> Default for MemoryTable<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// Looks `key` up, removing it if it has expired.
fn live<'a, T>(
  spaces: &'a mut LinkedHashMap<String, MemoryNode<T>>,
  key: &str,
  now: SystemTime,
) -> Option<&'a mut MemoryNode<T>> {
  if spaces.get(key)?.is_expired(now) {
    spaces.remove(key);
    return None;
  }
  spaces.get_mut(key)
}

/// Named [`MemoryTable`]s sharing one value type.
#[derive(Debug)]
pub struct MemoryStorage<T> {
  tables: Mutex<HashMap<String, Arc<MemoryTable<T>>>>,
}

impl<T: Clone> MemoryStorage<T> {
  pub fn new() -> Self {
    Self {
      tables: Mutex::new(HashMap::new()),
    }
  }

  /// Creates an empty table. Returns `false` if `name` is taken.
  pub fn create(&self, name: &str) -> bool {
    let mut tables = self.tables.lock();
    if tables.contains_key(name) {
      return false;
    }
    tracing::debug!(table = name, "Created memory table");
    tables.insert(name.to_string(), Arc::new(MemoryTable::new()));
    true
  }

  pub fn get(&self, name: &str) -> Option<Arc<MemoryTable<T>>> {
    self.tables.lock().get(name).cloned()
  }

  /// Forgets a table. Handles already obtained through `get` keep working.
  pub fn drop_table(&self, name: &str) -> bool {
    self.tables.lock().remove(name).is_some()
  }
}

impl<T: Clone> Default for MemoryStorage<T> {
  fn default() -> Self {
    Self::new()
  }
}
