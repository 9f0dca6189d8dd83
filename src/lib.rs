pub mod config;
pub mod convert;
pub mod error;
pub mod htlc;
pub mod logging;
pub mod stellar;

pub use config::BridgeConfig;
pub use error::BridgeError;
