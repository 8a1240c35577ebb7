//! Admission decision engine.
//!
//! Once per primary request the engine reads the route's control byte,
//! scans the route's action table in order, and returns the first action
//! that both matches the byte and samples the request in. The decision is
//! pure: no locks, no I/O, no state changes.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, trace, warn};

use crate::action::{Action, Target};
use crate::region::ControlRegion;
use crate::scope::{PolicySet, RoutePolicy};

/// Log target for records emitted when an action fires.
pub const ALERT_TARGET: &str = "self_defence::alert";

// ---------------------------------------------------------------------------
// Request and verdict
// ---------------------------------------------------------------------------

/// What the host tells the engine about one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    /// Stable per-connection number, used for sampling.
    pub connection_id: u64,
    /// `false` for internally generated sub-requests.
    pub primary: bool,
    /// Server the request was routed to.
    pub server: &'a str,
    /// Location inside the server, if the host matched one.
    pub location: Option<&'a str>,
    /// Original query string, without the `?`.
    pub query: Option<&'a str>,
}

impl<'a> Request<'a> {
    /// Primary request on `server` with no location or query.
    pub fn new(server: &'a str, connection_id: u64) -> Self {
        Self {
            connection_id,
            primary: true,
            server,
            location: None,
            query: None,
        }
    }

    /// Set the matched location.
    pub fn location(mut self, location: &'a str) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the query string.
    pub fn query(mut self, query: &'a str) -> Self {
        self.query = Some(query);
        self
    }

    /// Mark as a sub-request.
    pub fn subrequest(mut self) -> Self {
        self.primary = false;
        self
    }
}

/// Outcome of the admission decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Continue normal processing.
    Pass,
    /// Answer with service unavailable.
    Reject,
    /// Hand the request to a named internal route.
    Dispatch {
        /// Route name, including the leading `@`.
        route: String,
    },
    /// Redirect to `path`, carrying the original query string.
    Redirect {
        /// Redirect path.
        path: String,
        /// Query string of the original request.
        query: Option<String>,
    },
}

impl Verdict {
    /// Verdict for a fired action.
    pub fn for_action(action: &Action, request: &Request<'_>) -> Self {
        match action.target() {
            Target::Reject => Self::Reject,
            Target::Named(route) => Self::Dispatch {
                route: route.clone(),
            },
            Target::Redirect(path) => Self::Redirect {
                path: path.clone(),
                query: request.query.map(str::to_owned),
            },
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Reject => f.write_str("reject"),
            Self::Dispatch { route } => write!(f, "dispatch {route}"),
            Self::Redirect { path, query: None } => write!(f, "redirect {path}"),
            Self::Redirect {
                path,
                query: Some(q),
            } => write!(f, "redirect {path}?{q}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// A per-request admission check the host pipeline calls before access
/// control.
pub trait RequestFilter: Send + Sync {
    /// Decide what happens to `request`.
    fn decide(&self, request: &Request<'_>) -> Verdict;
}

/// First action in `actions` that fires for `value` and `request_id`.
///
/// Each action's own ratio gates it; a ratio of 0 disables only that action.
pub fn first_firing(actions: &[Action], value: u8, request_id: u64) -> Option<&Action> {
    actions.iter().find(|action| {
        let fires = action.fires(value, request_id);
        if !fires && action.trigger() == value {
            trace!(
                value,
                ratio = action.ratio().get(),
                request_id,
                "action matched but sampled out"
            );
        }
        fires
    })
}

/// Decision engine over resolved policies and the attached region.
#[derive(Clone)]
pub struct AdmissionFilter {
    policies: Arc<PolicySet>,
    region: Option<Arc<dyn ControlRegion>>,
}

impl AdmissionFilter {
    /// Engine over `policies`; without a region every request passes.
    pub fn new(policies: Arc<PolicySet>, region: Option<Arc<dyn ControlRegion>>) -> Self {
        Self { policies, region }
    }

    /// Decide `request` against an already selected policy.
    pub fn evaluate(&self, policy: &RoutePolicy, request: &Request<'_>) -> Verdict {
        let Some(region) = &self.region else {
            return Verdict::Pass;
        };
        if !request.primary {
            return Verdict::Pass;
        }
        let actions = policy.actions();
        if actions.is_empty() {
            return Verdict::Pass;
        }

        let offset = policy.offset();
        let Some(value) = region.read(offset) else {
            warn!(offset, len = region.len(), "offset outside control region");
            return Verdict::Pass;
        };

        match first_firing(actions, value, request.connection_id) {
            Some(action) => {
                error!(
                    target: ALERT_TARGET,
                    offset,
                    value,
                    action = %action.target(),
                    scope = %policy.name(),
                    "self defence limited request"
                );
                Verdict::for_action(action, request)
            }
            None => Verdict::Pass,
        }
    }
}

impl RequestFilter for AdmissionFilter {
    fn decide(&self, request: &Request<'_>) -> Verdict {
        let policy = self.policies.lookup(request.server, request.location);
        self.evaluate(policy, request)
    }
}

impl fmt::Debug for AdmissionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionFilter")
            .field("policies", &self.policies)
            .field("region_len", &self.region.as_ref().map(|r| r.len()))
            .finish()
    }
}
