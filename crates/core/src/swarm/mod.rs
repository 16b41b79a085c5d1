//! Swarm engine abstraction.
//!
//! The peer-to-peer protocol is a black box behind `SwarmEngine`. The
//! production engine is an embedded librqbit session.

mod librqbit;
mod types;

pub use librqbit::LibrqbitEngine;
pub use types::*;
