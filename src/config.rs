//! Store selection.
//!
//! A run targets one of two named backing stores. Connection strings are passed in explicitly
//! (the binary reads them from flags or the environment); nothing here reads global state.

use std::fmt;
use std::str::FromStr;

use crate::error::{LoadError, LoadResult};

/// Which backing store a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreTier {
    #[default]
    Premium,
    Standard,
}

impl StoreTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreTier::Premium => "premium",
            StoreTier::Standard => "standard",
        }
    }
}

impl fmt::Display for StoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "premium" => Ok(StoreTier::Premium),
            "standard" => Ok(StoreTier::Standard),
            other => Err(format!("unknown store tier '{other}' (expected premium or standard)")),
        }
    }
}

/// Named connection strings, one per tier.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub premium: Option<String>,
    pub standard: Option<String>,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Connection strings may embed account keys.
        f.debug_struct("ConnectionSettings")
            .field("premium_set", &self.premium.is_some())
            .field("standard_set", &self.standard.is_some())
            .finish()
    }
}

impl ConnectionSettings {
    /// Connection string for `tier`.
    pub fn resolve(&self, tier: StoreTier) -> LoadResult<&str> {
        let value = match tier {
            StoreTier::Premium => self.premium.as_deref(),
            StoreTier::Standard => self.standard.as_deref(),
        };
        value
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LoadError::InvalidOptions {
                message: format!("no connection string configured for the {tier} store"),
            })
    }
}
