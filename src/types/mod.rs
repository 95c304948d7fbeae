//! Shared type definitions
//!
//! Configuration and wire types used across the server.

pub mod config;
pub mod request;
