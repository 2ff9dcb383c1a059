//! # Runtime Module
//!
//! Startup of the store server process.

pub mod initialization;

pub use initialization::*;
