//! Self-update module

pub mod engine;
