//! Environment-driven server configuration.

mod env;
mod types;

pub use types::{
    ConfigSummary, DEFAULT_MAX_RESPONSE_BYTES, MAX_MAX_RESPONSE_BYTES, MIN_MAX_RESPONSE_BYTES,
    ServerConfig,
};
