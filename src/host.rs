//! Seam between verdicts and the host request pipeline.
//!
//! The filter decides; the host executes. [`enact`] maps a verdict onto the
//! primitives a host provides and tells it whether the request continues.

use crate::engine::Verdict;

/// Status code returned for rejected requests.
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// How the pipeline proceeds after the filter ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the remaining phases.
    Continue,
    /// Stop and answer with this status.
    Respond(u16),
    /// Stop; the request was handed elsewhere and is finalised.
    Done,
}

/// Primitives the host pipeline exposes to the filter.
pub trait RequestHost {
    /// Continue processing in the named internal route (`@name`).
    fn dispatch_named(&mut self, route: &str);

    /// Internally redirect to `path`, keeping `query`.
    fn redirect(&mut self, path: &str, query: Option<&str>);

    /// Mark the request handled; no further phases run.
    fn finalize(&mut self);
}

/// Carry out `verdict` on `host`.
pub fn enact(verdict: &Verdict, host: &mut dyn RequestHost) -> Flow {
    match verdict {
        Verdict::Pass => Flow::Continue,
        Verdict::Reject => Flow::Respond(SERVICE_UNAVAILABLE),
        Verdict::Dispatch { route } => {
            host.dispatch_named(route);
            host.finalize();
            Flow::Done
        }
        Verdict::Redirect { path, query } => {
            host.redirect(path, query.as_deref());
            host.finalize();
            Flow::Done
        }
    }
}
