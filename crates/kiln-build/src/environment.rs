//! Network profile selection
//!
//! A network profile carries the runtime policy the validation stage applies
//! to compiled artifacts. Exactly one is active per build.

use crate::error::{BuildError, BuildResult};
use kiln_config::NetworkConfig;
use serde::Serialize;
use std::collections::BTreeMap;

/// Deployed code size limit of EVM networks (EIP-170)
pub const DEFAULT_SIZE_LIMIT: u64 = 24_576;

/// Name of the built-in sandbox network
pub const LOCAL_NETWORK: &str = "local";

/// Runtime policy bundle for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkProfile {
    pub name: String,
    /// Fail the build when an artifact exceeds `max_artifact_size`
    pub enforce_size_limit: bool,
    /// Maximum deployed bytecode size in bytes
    pub max_artifact_size: u64,
}

impl NetworkProfile {
    /// Create a network profile with the default size limit
    pub fn new(name: impl Into<String>, enforce_size_limit: bool) -> Self {
        Self {
            name: name.into(),
            enforce_size_limit,
            max_artifact_size: DEFAULT_SIZE_LIMIT,
        }
    }

    /// The built-in sandbox profile, which enforces the size limit
    pub fn local() -> Self {
        Self::new(LOCAL_NETWORK, true)
    }

    /// Build from the configuration document
    pub fn from_config(name: &str, config: &NetworkConfig) -> Self {
        Self {
            name: name.to_string(),
            enforce_size_limit: !config.allow_unlimited_contract_size,
            max_artifact_size: config.max_artifact_size.unwrap_or(DEFAULT_SIZE_LIMIT),
        }
    }

    /// Set the size limit
    pub fn with_max_artifact_size(mut self, limit: u64) -> Self {
        self.max_artifact_size = limit;
        self
    }
}

/// Chooses the active network profile for a run
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSelector {
    profiles: BTreeMap<String, NetworkProfile>,
    default_name: Option<String>,
}

impl EnvironmentSelector {
    /// Create a selector knowing only the built-in local profile
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every network from the configuration document
    pub fn from_config(
        networks: &BTreeMap<String, NetworkConfig>,
        default_name: Option<&str>,
    ) -> Self {
        let mut selector = Self::new();
        for (name, config) in networks {
            selector.register(NetworkProfile::from_config(name, config));
        }
        selector.default_name = default_name.map(str::to_string);
        selector
    }

    /// Register a profile, replacing any profile with the same name
    pub fn register(&mut self, profile: NetworkProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Use `name` when no network is requested explicitly
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    /// Select the active network profile
    ///
    /// With no name, the configured default is used, and failing that the
    /// built-in local profile.
    pub fn select(&self, name: Option<&str>) -> BuildResult<NetworkProfile> {
        let Some(name) = name.or(self.default_name.as_deref()) else {
            return Ok(self.local());
        };

        if let Some(profile) = self.profiles.get(name) {
            return Ok(profile.clone());
        }
        if name == LOCAL_NETWORK {
            return Ok(NetworkProfile::local());
        }

        Err(BuildError::UnknownNetworkProfile {
            name: name.to_string(),
            available: self.names(),
        })
    }

    /// Known network names, including the built-in local profile
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        if !self.profiles.contains_key(LOCAL_NETWORK) {
            names.push(LOCAL_NETWORK.to_string());
            names.sort();
        }
        names
    }

    fn local(&self) -> NetworkProfile {
        self.profiles
            .get(LOCAL_NETWORK)
            .cloned()
            .unwrap_or_else(NetworkProfile::local)
    }
}
