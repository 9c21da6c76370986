//! Data models

pub mod webhook;
