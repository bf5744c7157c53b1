//! Query template expansion
//!
//! A template such as `SELECT * FROM {table} LIMIT {limit}` is expanded into
//! the Cartesian product of the values of every dimension it references.
//! Dimensions are processed in declaration order, so earlier dimensions vary
//! slower than later ones. A dimension whose placeholder does not occur in
//! the template adds no branching.

use crate::descriptor::SubstitutionDimension;

/// One concrete query produced from a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Query text with every referenced placeholder replaced
    pub query: String,

    /// `(dimension, value)` pairs applied, in declaration order
    pub parameters: Vec<(String, String)>,
}

impl Expansion {
    /// A query that needed no substitution
    pub fn literal(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }
}

/// Expand a template into concrete queries
pub fn expand(template: &str, dimensions: &[SubstitutionDimension]) -> Vec<String> {
    expand_with_parameters(template, dimensions)
        .into_iter()
        .map(|expansion| expansion.query)
        .collect()
}

/// Expand a template, keeping the values applied to each query
pub fn expand_with_parameters(
    template: &str,
    dimensions: &[SubstitutionDimension],
) -> Vec<Expansion> {
    let mut out = Vec::new();
    expand_into(template, dimensions, &mut Vec::new(), &mut out);
    out
}

fn expand_into(
    template: &str,
    dimensions: &[SubstitutionDimension],
    applied: &mut Vec<(String, String)>,
    out: &mut Vec<Expansion>,
) {
    let Some((dimension, rest)) = dimensions.split_first() else {
        out.push(Expansion {
            query: template.to_string(),
            parameters: applied.clone(),
        });
        return;
    };

    let placeholder = dimension.placeholder();
    if !template.contains(&placeholder) {
        expand_into(template, rest, applied, out);
        return;
    }

    for value in &dimension.values {
        let query = template.replace(&placeholder, value);
        applied.push((dimension.name.clone(), value.clone()));
        expand_into(&query, rest, applied, out);
        applied.pop();
    }
}

/// Referenced dimensions that declare no values
///
/// Any such dimension makes the expansion of `template` empty.
pub fn empty_referenced_dimensions<'a>(
    template: &str,
    dimensions: &'a [SubstitutionDimension],
) -> Vec<&'a str> {
    dimensions
        .iter()
        .filter(|d| d.values.is_empty() && template.contains(&d.placeholder()))
        .map(|d| d.name.as_str())
        .collect()
}
