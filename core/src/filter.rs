//! Descriptor selection by tag, name and name pattern
//!
//! Keep passes run first, each removing descriptors that do not match any of
//! its values; skip passes then remove descriptors that match. A pass with no
//! values leaves the collection untouched.

use regex::Regex;

use crate::descriptor::{DescriptorHeader, TestSpec};
use crate::error::{BenchError, BenchResult};

/// What a filter pass matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    Tag,
    Name,
    NamePattern,
}

/// Compiled filter options
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    tags: Vec<String>,
    names: Vec<String>,
    name_patterns: Vec<Regex>,
    skip_tags: Vec<String>,
    skip_names: Vec<String>,
    skip_name_patterns: Vec<Regex>,
}

impl FilterCriteria {
    /// Criteria that keep everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only descriptors carrying one of these tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Keep only descriptors with one of these names
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    /// Keep only descriptors whose name matches one of these patterns
    pub fn with_name_patterns(mut self, patterns: &[String]) -> BenchResult<Self> {
        self.name_patterns = compile(patterns)?;
        Ok(self)
    }

    /// Drop descriptors carrying one of these tags
    pub fn with_skip_tags(mut self, tags: Vec<String>) -> Self {
        self.skip_tags = tags;
        self
    }

    /// Drop descriptors with one of these names
    pub fn with_skip_names(mut self, names: Vec<String>) -> Self {
        self.skip_names = names;
        self
    }

    /// Drop descriptors whose name matches one of these patterns
    pub fn with_skip_name_patterns(mut self, patterns: &[String]) -> BenchResult<Self> {
        self.skip_name_patterns = compile(patterns)?;
        Ok(self)
    }
}

fn compile(patterns: &[String]) -> BenchResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| {
                BenchError::config(format!("invalid name pattern '{}': {}", pattern, e))
            })
        })
        .collect()
}

/// Anything that can be selected by name and tags
pub trait Selectable {
    /// Test name
    fn name(&self) -> &str;
    /// Tags attached to the test
    fn tags(&self) -> &[String];
}

impl Selectable for TestSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Selectable for DescriptorHeader {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }
}

fn matches<T: Selectable>(
    spec: &T,
    kind: FilterKind,
    values: &[String],
    patterns: &[Regex],
) -> bool {
    match kind {
        FilterKind::Tag => spec.tags().iter().any(|tag| values.contains(tag)),
        FilterKind::Name => values.iter().any(|name| name == spec.name()),
        FilterKind::NamePattern => patterns.iter().any(|re| re.is_match(spec.name())),
    }
}

/// Remove descriptors matching (or, with `keep`, not matching) the values
fn remove_if<T: Selectable>(
    specs: &mut Vec<T>,
    kind: FilterKind,
    values: &[String],
    patterns: &[Regex],
    keep: bool,
) {
    if values.is_empty() && patterns.is_empty() {
        return;
    }

    specs.retain(|spec| matches(spec, kind, values, patterns) == keep);
}

/// Apply all keep passes, then all skip passes
pub fn filter_specs<T: Selectable>(mut specs: Vec<T>, criteria: &FilterCriteria) -> Vec<T> {
    let before = specs.len();

    remove_if(&mut specs, FilterKind::Tag, &criteria.tags, &[], true);
    remove_if(&mut specs, FilterKind::Name, &criteria.names, &[], true);
    remove_if(
        &mut specs,
        FilterKind::NamePattern,
        &[],
        &criteria.name_patterns,
        true,
    );

    remove_if(&mut specs, FilterKind::Tag, &criteria.skip_tags, &[], false);
    remove_if(&mut specs, FilterKind::Name, &criteria.skip_names, &[], false);
    remove_if(
        &mut specs,
        FilterKind::NamePattern,
        &[],
        &criteria.skip_name_patterns,
        false,
    );

    tracing::debug!(before, after = specs.len(), "Filtered test descriptors");
    specs
}
