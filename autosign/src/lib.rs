//! Automatic daily check-in service for Baidu Tieba accounts.
//!
//! Persistence (accounts, forums, audit logs), the daily scheduler, and the
//! CLI live here; the protocol core is the `tieba-operator` crate.

pub mod database;
pub mod error;
pub mod scheduler;

pub use error::{Error, Result};
