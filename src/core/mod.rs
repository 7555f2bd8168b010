pub mod catalog;
pub mod coverage;
pub mod presentation;
pub mod script;
pub mod session;
pub mod views;

pub use crate::domain::ports::{ConfigProvider, CoverageProvider, Script, Storage};
pub use crate::utils::error::Result;
pub use catalog::Catalog;
pub use session::Session;
