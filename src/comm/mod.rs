//! Inter-partition communication.
//!
//! - [`world`]: endpoints, point-to-point messages and collectives
//! - [`exchange`]: the [`Communicator`] with its flow, scalar, transport
//!   and phase-halo channels
//!
//! The per half-step discipline is: `start` (pack and send), update the
//! interior range, `finish` (wait and unpack), update the exterior range,
//! then [`Endpoint::barrier`].

pub mod exchange;
pub mod world;

pub use exchange::{Channel, Communicator, PendingExchange};
pub use world::{Endpoint, ReduceOp, World};
