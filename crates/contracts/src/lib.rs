//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! producer-side sink capability, its closed set of emission results, the
//! minimal subscriber contract, and the declarative sink configuration.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Call model
//! - Every `try_emit_*` call is synchronous and non-blocking
//! - Operational failures are `EmitResult` values, never errors or panics

mod config;
mod context;
mod emission;
mod error;
mod retry;
mod scan;
mod sink;
mod subscriber;
mod time;

pub use config::*;
pub use context::{Context, DiscardHook};
pub use emission::EmitResult;
pub use error::*;
pub use retry::*;
pub use scan::{Attr, AttrValue, Scannable};
pub use sink::{Many, ManySink};
pub use subscriber::*;
pub use time::*;
