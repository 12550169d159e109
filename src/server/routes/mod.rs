//! JSON Routes
//!
//! Built-in endpoints that sit next to the configured route table.

pub mod health;
pub mod tree;
pub mod values;
