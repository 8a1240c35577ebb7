//! Self defence — a shared-memory driven admission filter.
//!
//! An external monitor writes single-byte signals into a System V shared
//! memory segment. For each primary request the filter reads the byte its
//! route observes, matches it against the route's action table, and decides
//! whether the request passes, is rejected, redirected, or handed to a named
//! internal route. Operators flip live traffic without reloading the server.
//!
//! Layers, leaves first:
//! - [`region`]: the control region and its backends
//! - [`action`], [`scope`]: validated action tables and scope inheritance
//! - [`engine`]: the per-request decision
//! - [`host`]: how a host pipeline carries out a verdict
//! - [`runtime`], [`config`]: startup wiring

#![warn(missing_docs)]

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod logging;
pub mod region;
pub mod runtime;
pub mod scope;
pub mod watch;

pub use engine::{AdmissionFilter, Request, RequestFilter, Verdict};
pub use runtime::DefenceRuntime;
