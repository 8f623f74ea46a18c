//! Various utilities

pub(crate) mod cache;
pub mod sync;
pub mod to_vk;
