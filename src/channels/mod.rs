//! Chat transport abstraction and the pieces that talk over it.

pub mod gateway;
pub mod responders;
pub mod transport;

pub use gateway::{GatewaySession, GatewayTransport};
pub use transport::*;
