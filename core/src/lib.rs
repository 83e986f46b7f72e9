// Switchboard Core Library
// In-process publish/subscribe message bus: listener graph, masks, broadcast

pub mod bus;
pub mod config;
pub mod edge;
pub mod handler;
pub mod ids;
pub mod message;
pub mod node;
mod registry;
pub mod stats;
pub mod telemetry;

// Export core types
pub use bus::Bus;
pub use config::BusConfig;
pub use edge::EdgeMask;
pub use handler::{handler_fn, FnHandler, MessageHandler, NoopHandler};
pub use ids::NodeId;
pub use message::{Message, FORWARD_BIT};
pub use node::Node;
pub use stats::BusStats;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Bus has been shut down")]
    ShutDown,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, BusError>;
