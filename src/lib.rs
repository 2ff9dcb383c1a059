//! # squid-vault-auth
//!
//! Dynamic Squid proxy credentials.
//!
//! - [`store`]: file-backed user records
//! - [`server`]: HTTP service over the store (`squid-database`)
//! - [`issuer`]: credential issuer plugin driving the store from a secrets host
//!
//! `squidctl` checks proxy logins against the store for Squid's external helpers.

pub mod config;
pub mod constants;
pub mod issuer;
pub mod observability;
pub mod runtime;
pub mod server;
pub mod store;
