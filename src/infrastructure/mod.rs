//! Adapters behind the domain ports.

pub mod email;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod in_memory;
pub mod mpesa;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
