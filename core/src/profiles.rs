//! Shared settings profiles
//!
//! A descriptor may name a profile with the `profile` setting. Profiles are
//! loaded from a YAML document:
//!
//! ```yaml
//! profiles:
//!   fast:
//!     max_threads: 16
//!     use_uncompressed_cache: 1
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::descriptor::scalar_map;
use crate::error::{BenchError, BenchResult};
use crate::traits::QuerySettings;

/// Setting naming the profile to apply
pub const PROFILE_SETTING: &str = "profile";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfilesDocument {
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct Profile {
    #[serde(deserialize_with = "scalar_map")]
    settings: BTreeMap<String, String>,
}

/// Named setting profiles
#[derive(Debug, Clone, Default)]
pub struct Profiles {
    profiles: BTreeMap<String, QuerySettings>,
}

impl Profiles {
    /// No profiles
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile
    pub fn with_profile(mut self, name: impl Into<String>, settings: QuerySettings) -> Self {
        self.profiles.insert(name.into(), settings);
        self
    }

    /// Parse a profiles document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let document: ProfilesDocument = serde_yaml::from_str(yaml)?;
        Ok(Self {
            profiles: document
                .profiles
                .into_iter()
                .map(|(name, profile)| (name, profile.settings))
                .collect(),
        })
    }

    /// Load a profiles file
    pub fn load(path: &Path) -> BenchResult<Self> {
        if !path.exists() {
            return Err(BenchError::MissingFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let profiles = Self::from_yaml_str(&content).map_err(|source| BenchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), count = profiles.len(), "Loaded settings profiles");
        Ok(profiles)
    }

    /// Settings of a profile
    pub fn get(&self, name: &str) -> Option<&QuerySettings> {
        self.profiles.get(name)
    }

    /// Number of profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profile is defined
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Merge a descriptor's settings over the profile it names
    ///
    /// The `profile` key itself is consumed. Empty values become `"true"`.
    pub fn merge(&self, local: &BTreeMap<String, String>) -> BenchResult<QuerySettings> {
        let mut merged = QuerySettings::new();

        if let Some(name) = local.get(PROFILE_SETTING) {
            let profile = self
                .get(name)
                .ok_or_else(|| BenchError::config(format!("unknown settings profile '{}'", name)))?;
            merged.extend(profile.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        for (key, value) in local {
            if key != PROFILE_SETTING {
                merged.insert(key.clone(), value.clone());
            }
        }

        for value in merged.values_mut() {
            if value.is_empty() {
                *value = "true".to_string();
            }
        }

        Ok(merged)
    }
}
