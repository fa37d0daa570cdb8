//! # hubcomplete
//!
//! Application layer over [`hubcomplete_search`]: config file and directory
//! resolution, startup wiring, the per-session driver that turns keystrokes
//! into committed searches, and the stdio host bridge.

pub mod app_dirs;
pub mod config;
pub mod error;
pub mod host;
pub mod session;
pub mod startup;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use session::{Key, SearchSession};
pub use startup::initialize;

pub use hubcomplete_search as search;
