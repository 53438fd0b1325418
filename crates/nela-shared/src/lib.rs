//! Nela shared contracts.
//!
//! Types crossing the classifier boundary, the per-user session state blob,
//! machine directives, trace events, and configuration. Pure data: the
//! arbitration logic lives in `nelad`.

pub mod classifier;
pub mod config;
pub mod error;
pub mod machine;
pub mod session;
pub mod signals;
pub mod trace;

pub use classifier::*;
pub use config::*;
pub use error::NelaError;
pub use machine::*;
pub use session::*;
pub use signals::*;
pub use trace::{DeferralReason, TraceEvent, TraceWriter};
