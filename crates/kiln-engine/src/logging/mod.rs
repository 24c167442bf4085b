//! Process-wide logger setup on top of the `log` facade.
//!
//! Engine modules log under `kiln::*` targets (`kiln::render`, `kiln::gpu`,
//! `kiln::runtime`), so `RUST_LOG=kiln::render=trace` isolates one subsystem.

mod init;

pub use init::{init_logging, LoggingConfig};
