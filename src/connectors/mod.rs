// src/connectors/mod.rs
pub mod memory;
pub mod traits;
