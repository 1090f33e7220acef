//! Domain layer for the guardian processor
//!
//! - primitives: digests, addresses, chain ids
//! - crypto: keccak and secp256k1 signer recovery
//! - vaa: record construction, wire format, verification
//! - bucket: digest → lane routing
//! - state: per-digest aggregation state and lane shards

mod bucket;
mod config;
pub mod crypto;
mod errors;
mod guardian_set;
mod observation;
mod primitives;
mod state;
mod vaa;

pub use bucket::*;
pub use config::*;
pub use crypto::{address_from_pubkey, keccak256, recover_address};
pub use errors::*;
pub use guardian_set::*;
pub use observation::*;
pub use primitives::*;
pub use state::*;
pub use vaa::*;
