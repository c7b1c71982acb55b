//! Remote host access: sessions, file sync and command execution

pub mod exec;
pub mod session;
pub mod sync;
