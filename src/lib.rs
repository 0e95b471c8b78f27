#![doc = include_str!("RUSTDOC.md")]

pub mod firestore;

mod platform;

#[cfg(test)]
pub mod test_support;
