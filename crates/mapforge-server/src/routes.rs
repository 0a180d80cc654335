//! HTTP route modules

pub mod map;
