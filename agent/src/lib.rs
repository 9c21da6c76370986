//! Pushdeploy Agent Library
//!
//! Core modules for the pushdeploy single-node deployment agent.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod logs;
pub mod models;
pub mod process;
pub mod server;
pub mod settings;
pub mod update;
pub mod utils;
