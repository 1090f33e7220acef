//! Adapters layer (Hexagonal Architecture)

mod gossip;
mod guardian_set;
mod reobservation;
mod signer;
mod store;

pub use gossip::*;
pub use guardian_set::*;
pub use reobservation::*;
pub use signer::*;
pub use store::*;
