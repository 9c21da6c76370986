//! Process management module

pub mod controller;
pub mod supervisor;
