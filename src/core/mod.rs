//! The core module holds the device and the GPU entry points every other module builds on.

pub mod ash_functions;
pub mod device;
pub mod error;
pub mod functions;
pub mod settings;
