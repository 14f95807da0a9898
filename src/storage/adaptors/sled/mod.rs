mod sled_store;
pub use sled_store::*;

#[cfg(test)]
mod sled_store_test;
