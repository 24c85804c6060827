pub mod config;
pub mod ipc;
pub mod types;

pub use config::*;
pub use ipc::*;
pub use types::*;
