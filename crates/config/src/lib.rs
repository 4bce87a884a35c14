//! # Vertex Core Configuration
//!
//! Chain parameters for the Vertex Core blockchain.
//!
//! Vertex Core uses a single-config philosophy: every protocol height,
//! penalty and bound the consensus state engine consults lives in one
//! [`ChainParams`] value, loaded from a single `vertex.toml` file (or taken
//! from the mainnet [`Default`]).
//!
//! ## Usage
//!
//! ```rust
//! use vertex_config::ChainParams;
//!
//! // Mainnet defaults
//! let params = ChainParams::default();
//! assert!(params.validate().is_ok());
//!
//! // Or from TOML
//! let params = ChainParams::from_toml_str(r#"
//!     max_inactive_rounds = 720
//!     deposit_lockup_blocks = 2160
//! "#).unwrap();
//! assert_eq!(params.max_inactive_rounds, 720);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod error;
mod params;

pub use error::{ConfigError, ConfigResult};
pub use params::ChainParams;
