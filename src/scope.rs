//! Scope hierarchy and inheritance of per-route settings.
//!
//! Scopes nest main → server → location. Configuration is registered into a
//! [`PolicyBuilder`], validated as it arrives, and resolved once by
//! [`PolicyBuilder::build`] into an immutable [`PolicySet`].
//!
//! The offset and the action table inherit independently. A scope that sets
//! a field keeps its own value; one that does not takes the nearest
//! ancestor's value whole. Action tables are never merged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::action::Action;
use crate::error::ConfigError;
use crate::region::RegionSpec;

// ---------------------------------------------------------------------------
// Tri-state setting
// ---------------------------------------------------------------------------

/// Where a resolved field came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting<T> {
    /// Neither the scope nor any ancestor set it.
    Unset,
    /// Taken from an ancestor.
    Inherited(T),
    /// Set by the scope itself.
    Explicit(T),
}

impl<T> Setting<T> {
    /// The value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Unset => None,
            Self::Inherited(v) | Self::Explicit(v) => Some(v),
        }
    }

    /// Whether the scope set the field itself.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }

    /// Short label for diagnostics.
    pub fn origin(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Inherited(_) => "inherited",
            Self::Explicit(_) => "explicit",
        }
    }
}

impl<T: Clone> Setting<T> {
    /// Resolve a scope's own value against its parent's resolved setting.
    fn resolve(own: Option<T>, parent: Option<&Setting<T>>) -> Self {
        match (own, parent.and_then(Setting::value)) {
            (Some(v), _) => Self::Explicit(v),
            (None, Some(v)) => Self::Inherited(v.clone()),
            (None, None) => Self::Unset,
        }
    }
}

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Self::Unset
    }
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

/// Level of a scope in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Process-wide defaults.
    Main,
    /// A virtual server.
    Server,
    /// A location inside a server.
    Location,
}

/// Handle to a scope registered in a [`PolicyBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Name of a scope: `main`, a server name, or `server location`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeName {
    /// The main scope.
    Main,
    /// A server.
    Server(String),
    /// A location inside a server.
    Location {
        /// Owning server.
        server: String,
        /// Location path.
        path: String,
    },
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Server(name) => write!(f, "server {name}"),
            Self::Location { server, path } => write!(f, "server {server} location {path}"),
        }
    }
}

#[derive(Debug)]
struct ScopeNode {
    name: ScopeName,
    kind: ScopeKind,
    parent: Option<ScopeId>,
    offset: Option<usize>,
    actions: Vec<Action>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects and validates configuration, then resolves inheritance.
#[derive(Debug)]
pub struct PolicyBuilder {
    region: Option<RegionSpec>,
    scopes: Vec<ScopeNode>,
}

impl PolicyBuilder {
    /// Handle of the main scope, present in every builder.
    pub const MAIN: ScopeId = ScopeId(0);

    /// Builder holding only an empty main scope.
    pub fn new() -> Self {
        Self {
            region: None,
            scopes: vec![ScopeNode {
                name: ScopeName::Main,
                kind: ScopeKind::Main,
                parent: None,
                offset: None,
                actions: Vec::new(),
            }],
        }
    }

    /// Declare the control region. Allowed once.
    pub fn declare_region(&mut self, spec: RegionSpec) -> Result<(), ConfigError> {
        if self.region.is_some() {
            return Err(ConfigError::DuplicateRegion);
        }
        self.region = Some(spec);
        Ok(())
    }

    /// Region declared so far.
    pub fn region(&self) -> Option<RegionSpec> {
        self.region
    }

    /// Register a server under the main scope.
    pub fn server(&mut self, name: &str) -> Result<ScopeId, ConfigError> {
        let scope = ScopeName::Server(name.to_owned());
        self.push(scope, ScopeKind::Server, Self::MAIN)
    }

    /// Register a location under `server`.
    pub fn location(&mut self, server: ScopeId, path: &str) -> Result<ScopeId, ConfigError> {
        let node = self.node(server)?;
        let ScopeName::Server(server_name) = &node.name else {
            return Err(ConfigError::UnknownScope(format!(
                "{} cannot hold locations",
                node.name
            )));
        };
        let scope = ScopeName::Location {
            server: server_name.clone(),
            path: path.to_owned(),
        };
        self.push(scope, ScopeKind::Location, server)
    }

    /// Set the observed offset of `scope`. Must fit the declared region.
    pub fn set_offset(&mut self, scope: ScopeId, offset: i64) -> Result<(), ConfigError> {
        let region = self.region.ok_or(ConfigError::RegionNotDeclared {
            directive: "offset",
        })?;
        let length = region.length();
        let valid = usize::try_from(offset)
            .ok()
            .filter(|o| *o < usize::from(length))
            .ok_or(ConfigError::InvalidOffset { offset, length })?;

        let node = self.node_mut(scope)?;
        if node.offset.is_some() {
            return Err(ConfigError::DuplicateOffset {
                scope: node.name.to_string(),
            });
        }
        node.offset = Some(valid);
        Ok(())
    }

    /// Append an action to the table of `scope`.
    pub fn add_action(
        &mut self,
        scope: ScopeId,
        trigger: i64,
        target: Option<&str>,
        ratio: Option<i64>,
    ) -> Result<(), ConfigError> {
        if self.region.is_none() {
            return Err(ConfigError::RegionNotDeclared {
                directive: "action",
            });
        }
        let action = Action::register(trigger, target, ratio)?;
        self.node_mut(scope)?.actions.push(action);
        Ok(())
    }

    /// Resolve inheritance for every scope.
    pub fn build(self) -> PolicySet {
        let mut resolved: Vec<Arc<RoutePolicy>> = Vec::with_capacity(self.scopes.len());

        // Parents are always registered before their children.
        for node in self.scopes {
            let parent = node.parent.and_then(|p| resolved.get(p.0)).cloned();
            let own_actions = if node.actions.is_empty() {
                None
            } else {
                Some(Arc::<[Action]>::from(node.actions))
            };
            let policy = RoutePolicy {
                name: node.name,
                kind: node.kind,
                offset: Setting::resolve(node.offset, parent.as_deref().map(|p| &p.offset)),
                actions: Setting::resolve(own_actions, parent.as_deref().map(|p| &p.actions)),
            };
            resolved.push(Arc::new(policy));
        }

        PolicySet::new(self.region, resolved)
    }

    fn push(
        &mut self,
        name: ScopeName,
        kind: ScopeKind,
        parent: ScopeId,
    ) -> Result<ScopeId, ConfigError> {
        if self.scopes.iter().any(|s| s.name == name) {
            return Err(ConfigError::DuplicateScope(name.to_string()));
        }
        let id = ScopeId(self.scopes.len());
        self.scopes.push(ScopeNode {
            name,
            kind,
            parent: Some(parent),
            offset: None,
            actions: Vec::new(),
        });
        Ok(id)
    }

    fn node(&self, id: ScopeId) -> Result<&ScopeNode, ConfigError> {
        self.scopes
            .get(id.0)
            .ok_or_else(|| ConfigError::UnknownScope(format!("#{}", id.0)))
    }

    fn node_mut(&mut self, id: ScopeId) -> Result<&mut ScopeNode, ConfigError> {
        self.scopes
            .get_mut(id.0)
            .ok_or_else(|| ConfigError::UnknownScope(format!("#{}", id.0)))
    }
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Resolved policies
// ---------------------------------------------------------------------------

/// Resolved, immutable settings of one scope.
#[derive(Debug)]
pub struct RoutePolicy {
    name: ScopeName,
    kind: ScopeKind,
    offset: Setting<usize>,
    actions: Setting<Arc<[Action]>>,
}

impl RoutePolicy {
    /// Scope name.
    pub fn name(&self) -> &ScopeName {
        &self.name
    }

    /// Scope level.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Observed offset; 0 when no scope set one.
    pub fn offset(&self) -> usize {
        self.offset.value().copied().unwrap_or(0)
    }

    /// Action table in match priority order; empty when none applies.
    pub fn actions(&self) -> &[Action] {
        self.actions.value().map(|a| &a[..]).unwrap_or(&[])
    }

    /// Offset with its origin.
    pub fn offset_setting(&self) -> &Setting<usize> {
        &self.offset
    }

    /// Action table with its origin.
    pub fn actions_setting(&self) -> &Setting<Arc<[Action]>> {
        &self.actions
    }
}

/// Every resolved scope, plus the region they observe.
#[derive(Debug)]
pub struct PolicySet {
    region: Option<RegionSpec>,
    scopes: Vec<Arc<RoutePolicy>>,
    servers: HashMap<String, usize>,
    // Server name, then location path; both levels take a borrowed `&str`.
    locations: HashMap<String, HashMap<String, usize>>,
}

impl PolicySet {
    fn new(region: Option<RegionSpec>, scopes: Vec<Arc<RoutePolicy>>) -> Self {
        let mut servers = HashMap::new();
        let mut locations: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for (idx, scope) in scopes.iter().enumerate() {
            match &scope.name {
                ScopeName::Main => {}
                ScopeName::Server(name) => {
                    servers.insert(name.clone(), idx);
                }
                ScopeName::Location { server, path } => {
                    locations
                        .entry(server.clone())
                        .or_default()
                        .insert(path.clone(), idx);
                }
            }
        }
        Self {
            region,
            scopes,
            servers,
            locations,
        }
    }

    /// Declared region, if any.
    pub fn region(&self) -> Option<RegionSpec> {
        self.region
    }

    /// The main scope.
    pub fn main(&self) -> &Arc<RoutePolicy> {
        // The builder always creates the main scope first.
        &self.scopes[0]
    }

    /// Most specific policy for a request: its location, else its server,
    /// else main.
    pub fn lookup(&self, server: &str, location: Option<&str>) -> &Arc<RoutePolicy> {
        let by_location = location.and_then(|path| {
            self.locations
                .get(server)
                .and_then(|paths| paths.get(path))
                .copied()
        });
        by_location
            .or_else(|| self.servers.get(server).copied())
            .and_then(|idx| self.scopes.get(idx))
            .unwrap_or_else(|| self.main())
    }

    /// Every scope in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RoutePolicy>> {
        self.scopes.iter()
    }

    /// Whether no scope has any action.
    pub fn has_actions(&self) -> bool {
        self.scopes.iter().any(|s| !s.actions().is_empty())
    }
}
