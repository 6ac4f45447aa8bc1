//! Shared utilities: random number generation and weight initialization.

pub mod init;
pub mod rng;

pub use init::HeNormal;
pub use rng::SimpleRng;
