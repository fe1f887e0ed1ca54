//! Code relay: signs a chat account in by intercepting the login code the
//! platform delivers as a chat message, and forwards that code to CI/CD.

pub mod auth;
pub mod bot;
pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod scratch;
pub mod server;
pub mod webhook;
