// src/cache/mod.rs

//! In-memory tables with per-key expiry.

pub mod memstore;

pub use memstore::{Expiry, MemoryStorage, MemoryTable, Ttl, ONE_YEAR_MS};
