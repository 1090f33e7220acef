//! Gossip wire messages and the internal events derived from them

mod consumed;
mod published;

pub use consumed::*;
pub use published::*;
