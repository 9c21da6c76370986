//! HTTP server module

pub mod handlers;
pub mod jobs;
pub mod serve;
pub mod signature;
pub mod state;
