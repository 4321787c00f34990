//! CREST node shell.
//!
//! Thin collaborator around the voting engine: TOML configuration, tracing
//! setup, the block-notification loop that feeds the engine, and graceful
//! shutdown. Chain management itself lives upstream; this crate only wires
//! its events into `crest-voting`.

pub mod config;
pub mod error;
pub mod logging;
pub mod notifications;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use notifications::{run_notification_loop, BlockEvent, BlockNotifier};
pub use shutdown::ShutdownController;
