pub mod alerting;
pub mod bank_http;
pub mod in_memory;
pub mod proxy;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
