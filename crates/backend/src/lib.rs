mod actor;
mod server;

mod domain;
pub use domain::{config, downloader, error, game, module};

pub mod dirs;
pub mod ipc;

mod daemon;
pub use actor::{ClientEnd, ClientHandle, DomainState, Gateway, GatewayError};
pub use daemon::{Daemon, RuntimeConfig};
pub use server::{Server, ServerConfig, ServerError};
