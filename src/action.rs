//! Action table entries.
//!
//! An action pairs a trigger byte with what to do when the observed control
//! byte equals it, and how often. Values are validated once at registration
//! and trusted at request time.

use std::fmt;

use serde::Serialize;

use crate::error::ConfigError;

/// Number of sampling buckets a request identifier is folded into.
pub const SAMPLING_BUCKETS: u64 = 100;

/// What happens to a request once an action fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "to", rename_all = "snake_case")]
pub enum Target {
    /// Empty target: reject with service unavailable.
    Reject,
    /// `@name`: hand the request to a named internal route.
    Named(String),
    /// `/path`: redirect, keeping the original query string.
    Redirect(String),
}

impl Target {
    /// Parse a configured target. It must start with `@` or `/`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.as_bytes().first() {
            Some(b'@') => Ok(Self::Named(raw.to_owned())),
            Some(b'/') => Ok(Self::Redirect(raw.to_owned())),
            _ => Err(ConfigError::InvalidTarget(raw.to_owned())),
        }
    }

    /// Target as configured; empty for [`Target::Reject`].
    pub fn as_str(&self) -> &str {
        match self {
            Self::Reject => "",
            Self::Named(s) | Self::Redirect(s) => s,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage of matching requests an action fires for, 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SamplingRatio(u8);

impl SamplingRatio {
    /// Fires for every matching request.
    pub const ALWAYS: Self = Self(100);
    /// Never fires.
    pub const NEVER: Self = Self(0);

    /// Validate a configured ratio.
    pub fn new(ratio: i64) -> Result<Self, ConfigError> {
        match u8::try_from(ratio) {
            Ok(r) if r <= 100 => Ok(Self(r)),
            _ => Err(ConfigError::InvalidRatio(ratio)),
        }
    }

    /// Percentage value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether the request with `request_id` falls inside the sample.
    ///
    /// Deterministic: the same identifier always lands in the same bucket.
    pub fn admits(self, request_id: u64) -> bool {
        match self.0 {
            0 => false,
            100 => true,
            ratio => request_id % SAMPLING_BUCKETS < u64::from(ratio),
        }
    }
}

impl Default for SamplingRatio {
    fn default() -> Self {
        Self::ALWAYS
    }
}

/// One configured action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    trigger: u8,
    target: Target,
    ratio: SamplingRatio,
}

impl Action {
    /// Validate and build an action.
    ///
    /// `trigger` must be a byte, `target` (default reject) must start with
    /// `@` or `/`, and `ratio` (default 100) must be within 0..=100.
    pub fn register(
        trigger: i64,
        target: Option<&str>,
        ratio: Option<i64>,
    ) -> Result<Self, ConfigError> {
        let trigger = u8::try_from(trigger).map_err(|_| ConfigError::InvalidTriggerValue(trigger))?;
        let target = match target {
            Some(raw) => Target::parse(raw)?,
            None => Target::Reject,
        };
        let ratio = match ratio {
            Some(r) => SamplingRatio::new(r)?,
            None => SamplingRatio::default(),
        };
        Ok(Self {
            trigger,
            target,
            ratio,
        })
    }

    /// Byte value that arms this action.
    pub fn trigger(&self) -> u8 {
        self.trigger
    }

    /// Outcome when the action fires.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Sampling ratio.
    pub fn ratio(&self) -> SamplingRatio {
        self.ratio
    }

    /// Whether this action fires for `value` observed by request `request_id`.
    pub fn fires(&self, value: u8, request_id: u64) -> bool {
        self.trigger == value && self.ratio.admits(request_id)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Reject => write!(f, "{} -> reject", self.trigger)?,
            target => write!(f, "{} -> {target}", self.trigger)?,
        }
        if self.ratio != SamplingRatio::ALWAYS {
            write!(f, " ({}%)", self.ratio.get())?;
        }
        Ok(())
    }
}
