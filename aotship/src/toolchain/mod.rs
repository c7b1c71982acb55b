//! Cross toolchain detection, arguments and installation

pub mod cross;
pub mod detector;
pub mod installer;
