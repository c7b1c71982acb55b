//! aotship library
//!
//! Publishes native AOT builds, cross-links them for foreign targets and
//! ships them to a local folder or an SSH server.

pub mod context;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod notify;
pub mod project;
pub mod publish;
pub mod remote;
pub mod storage;
pub mod toolchain;
pub mod utils;
