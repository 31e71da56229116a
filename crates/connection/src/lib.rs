//! Connection manager for TempoShare peers.
//!
//! Owns the transport endpoint and at most one live [`DataChannel`], and
//! turns everything that happens on them into a single ordered stream of
//! [`ConnectionEvent`]s.
//!
//! [`DataChannel`]: temposhare_data_channel::DataChannel

pub mod error;
pub mod manager;
pub mod types;

pub use error::ConnectionError;
pub use manager::ConnectionManager;
pub use types::{ConnectPolicy, ConnectionEvent};
