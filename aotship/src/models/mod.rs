//! Data models

pub mod connection;
pub mod outcome;
pub mod target;
