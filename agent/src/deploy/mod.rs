//! Deployment module

pub mod config;
pub mod deployer;
pub mod git;
