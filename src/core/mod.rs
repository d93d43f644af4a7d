// src/core/mod.rs
pub mod evaluator;
pub mod runner;
pub mod summary;
