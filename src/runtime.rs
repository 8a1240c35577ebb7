//! Process-wide defence state.
//!
//! Built once at startup: policies are resolved and the control region is
//! attached before any request is decided. Filters get the state handed to
//! them; nothing is looked up globally. Dropping the runtime detaches.

use std::sync::Arc;

use tracing::info;

use crate::config::DefenceConfig;
use crate::engine::AdmissionFilter;
use crate::error::ConfigError;
use crate::region::{self, ControlRegion};
use crate::scope::PolicySet;

/// Resolved policies plus the attached region.
#[derive(Clone)]
pub struct DefenceRuntime {
    policies: Arc<PolicySet>,
    region: Option<Arc<dyn ControlRegion>>,
}

impl DefenceRuntime {
    /// Resolve `config` and attach the shared segment it declares.
    ///
    /// Any failure is fatal to startup.
    pub fn start(config: &DefenceConfig) -> Result<Self, ConfigError> {
        let policies = config.build_policies()?;
        let region = match policies.region() {
            Some(spec) => Some(region::attach(spec)?),
            None => {
                info!("no control region declared, self defence disabled");
                None
            }
        };
        Ok(Self::with_region(policies, region))
    }

    /// Runtime over already resolved policies and any region implementation.
    pub fn with_region(policies: PolicySet, region: Option<Arc<dyn ControlRegion>>) -> Self {
        Self {
            policies: Arc::new(policies),
            region,
        }
    }

    /// Filter sharing this runtime's state.
    pub fn filter(&self) -> AdmissionFilter {
        AdmissionFilter::new(Arc::clone(&self.policies), self.region.clone())
    }

    /// Resolved policies.
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Attached region, if one was declared.
    pub fn region(&self) -> Option<&Arc<dyn ControlRegion>> {
        self.region.as_ref()
    }
}

impl std::fmt::Debug for DefenceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefenceRuntime")
            .field("policies", &self.policies)
            .field("attached", &self.region.is_some())
            .finish()
    }
}
