//! Domain library - game instances, registries and module resolution
//!
//! Nothing in here is safe for concurrent use. The action worker owns every
//! manager and is the only caller.

pub mod config;
pub mod downloader;
pub mod error;
pub mod game;
pub mod installer;
pub mod instance;
pub mod module;
pub mod registry;
pub mod repo_data;
pub mod resolver;
pub mod user;
