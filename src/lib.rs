pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use app::launcher::{launch, Job};
pub use config::{cli::LocalStorage, CliConfig, WranglerConfig};
pub use core::{catalog::Catalog, session::Session};
pub use utils::error::{Result, WranglerError};
