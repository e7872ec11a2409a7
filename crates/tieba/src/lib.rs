//! Protocol core for automated Baidu Tieba daily check-ins.
//!
//! The crate infers server-side state from lightly-structured HTML and drives
//! each forum's once-daily check-in to a terminal result:
//!
//! - [`CookieJar`]: per-account credentials, importable from and exportable
//!   to a flat `name=value;...` string.
//! - [`RateLimitedClient`]: cookie-carrying HTTP client with a minimum
//!   spacing between requests and a mobile request mode.
//! - [`classify`]: pure classifier mapping one HTML document to a
//!   [`PageState`].
//! - [`TiebaOperator`]: favorites paginator and the bounded-retry sign
//!   convergence loop producing a [`SignOutcome`].
//!
//! Persistence, scheduling, and logging policy live in the caller; this crate
//! only returns outcomes and errors.

pub mod classify;
pub mod client;
pub mod cookies;
pub mod error;
pub mod operator;
mod utils;

pub use classify::{PageState, classify};
pub use client::{MIN_REQUEST_INTERVAL, RateLimitedClient, default_client};
pub use cookies::CookieJar;
pub use error::{OperatorError, Result};
pub use operator::{SIGN_RETRY_LIMIT, SignOutcome, TiebaOperator};
