//! Test descriptors
//!
//! A descriptor is a YAML document describing one benchmark: which queries
//! to run, how often, under which settings, when to stop and what to report.
//!
//! ```yaml
//! name: group_by_key
//! tags: [aggregation]
//! type: loop
//! times_to_run: 2
//! query: SELECT key, count() FROM {table} GROUP BY key
//! substitutions:
//!   - name: table
//!     values: [hits_10m, hits_100m]
//! stop_conditions:
//!   any_of:
//!     total_time_ms: 10000
//! metrics: [min_time, quantiles]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::metrics::Metric;
use crate::precondition::Precondition;
use crate::stop_conditions::StopConditionsTemplate;

/// How each query of a test is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionType {
    /// Repeat the query until the stop conditions are fulfilled
    Loop,
    /// Run the query a single time
    Once,
}

impl std::fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionType::Loop => f.write_str("loop"),
            ExecutionType::Once => f.write_str("once"),
        }
    }
}

/// One or more inline queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryList {
    /// `query: SELECT 1`
    One(String),
    /// `query: [SELECT 1, SELECT 2]`
    Many(Vec<String>),
}

impl QueryList {
    /// Queries in declaration order
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            QueryList::One(query) => vec![query.clone()],
            QueryList::Many(queries) => queries.clone(),
        }
    }
}

/// A named placeholder and its candidate values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionDimension {
    /// Placeholder name, referenced as `{name}` in queries
    pub name: String,

    /// Candidate values in declaration order
    #[serde(default, deserialize_with = "scalar_list")]
    pub values: Vec<String>,
}

impl SubstitutionDimension {
    /// Create a dimension
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// The `{name}` token this dimension replaces
    pub fn placeholder(&self) -> String {
        format!("{{{}}}", self.name)
    }
}

/// A parsed benchmark descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSpec {
    /// Test name
    pub name: String,

    /// Free-form tags used for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Execution type (`loop` or `once`)
    #[serde(rename = "type", default)]
    pub execution: Option<ExecutionType>,

    /// How many times the whole query set is run
    #[serde(default = "default_times_to_run")]
    pub times_to_run: usize,

    /// Inline queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryList>,

    /// File holding the queries (`.tsv`: one escaped query per line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_file: Option<PathBuf>,

    /// Query settings; `profile` names a shared profile
    #[serde(default, deserialize_with = "scalar_map")]
    pub settings: BTreeMap<String, String>,

    /// Substitution table in declaration order
    #[serde(default)]
    pub substitutions: Vec<SubstitutionDimension>,

    /// Environment checks performed before the test runs
    #[serde(default)]
    pub preconditions: Vec<Precondition>,

    /// Stop condition template
    #[serde(default)]
    pub stop_conditions: StopConditionsTemplate,

    /// Metrics to report
    #[serde(default)]
    pub metrics: Vec<Metric>,

    /// Metric used for lite output; defaults to the first declared metric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_metric: Option<Metric>,

    /// File the descriptor was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_times_to_run() -> usize {
    1
}

impl TestSpec {
    /// Create an empty descriptor with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            execution: None,
            times_to_run: default_times_to_run(),
            query: None,
            query_file: None,
            settings: BTreeMap::new(),
            substitutions: Vec::new(),
            preconditions: Vec::new(),
            stop_conditions: StopConditionsTemplate::default(),
            metrics: Vec::new(),
            main_metric: None,
            source: None,
        }
    }

    /// Parse a descriptor from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a descriptor file
    pub fn load(path: &Path) -> BenchResult<Self> {
        if !path.exists() {
            return Err(BenchError::MissingFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut spec = Self::from_yaml_str(&content).map_err(|source| BenchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        spec.source = Some(path.to_path_buf());

        tracing::debug!(test = %spec.name, path = %path.display(), "Loaded test descriptor");
        Ok(spec)
    }

    /// Whether the descriptor carries the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Directory relative query files are resolved against
    pub fn base_dir(&self) -> Option<&Path> {
        self.source.as_deref().and_then(Path::parent)
    }
}

/// The fields of a descriptor needed to select it
///
/// Read leniently so that descriptors excluded by filters are never fully
/// validated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DescriptorHeader {
    /// Test name
    pub name: String,

    /// Free-form tags used for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// File the header was read from
    #[serde(skip)]
    pub source: PathBuf,
}

impl DescriptorHeader {
    /// Parse a header from YAML text
    ///
    /// Returns `Ok(None)` for documents that are not descriptors at all:
    /// anything other than a mapping with a `name` key.
    pub fn from_yaml_str(yaml: &str) -> Result<Option<Self>, serde_yaml::Error> {
        let document: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let is_descriptor = document
            .as_mapping()
            .is_some_and(|mapping| mapping.contains_key("name"));
        if !is_descriptor {
            return Ok(None);
        }
        serde_yaml::from_value(document).map(Some)
    }

    /// Read the header of a descriptor file
    pub fn load(path: &Path) -> BenchResult<Option<Self>> {
        if !path.exists() {
            return Err(BenchError::MissingFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let header = Self::from_yaml_str(&content).map_err(|source| BenchError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(header.map(|mut header| {
            header.source = path.to_path_buf();
            header
        }))
    }
}

/// Render a YAML scalar as a string; null becomes empty
fn scalar_to_string(value: serde_yaml::Value) -> Result<String, String> {
    match value {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::String(s) => Ok(s),
        other => Err(format!("expected a scalar value, found {:?}", other)),
    }
}

fn scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<serde_yaml::Value>::deserialize(deserializer)?
        .into_iter()
        .map(|value| scalar_to_string(value).map_err(serde::de::Error::custom))
        .collect()
}

pub(crate) fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            scalar_to_string(value)
                .map(|value| (key, value))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}
