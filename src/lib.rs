//! Library entry for Shelfwire exposing core logic for integration tests.

pub mod args;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod net;
pub mod search;
pub mod util;
