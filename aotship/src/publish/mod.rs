//! Publishing: the build command and its post-build steps

pub mod compress;
pub mod package;
pub mod publisher;
pub mod runner;
