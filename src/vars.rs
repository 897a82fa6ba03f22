//! Variable export for host UIs.
//!
//! Flattens the cache and rate-limiter state into named key/value pairs. Name
//! sanitization and display belong to the host; this module only decides
//! which variables exist and what their current values are.

use crate::a1;
use crate::cache::SheetCache;
use crate::ratelimit::RateLimiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

impl Variable {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Export the full variable set from the current cache and rate state.
pub fn export(cache: &SheetCache, rate: &RateLimiter) -> Vec<Variable> {
    let totals = rate.totals();
    let mut variables = vec![
        Variable::new("read_requests", totals.read.to_string()),
        Variable::new("write_requests", totals.write.to_string()),
        Variable::new("exceeded_requests", totals.exceeded.to_string()),
        Variable::new("backoff_timer", rate.backoff_ms().to_string()),
    ];

    for (id, entry) in cache.entries() {
        let title = &entry.metadata.properties.title;
        variables.push(Variable::new(format!("{title}_id"), id));

        for sheet in &entry.metadata.sheets {
            variables.push(Variable::new(
                format!("{title}_sheet_{}", sheet.properties.index),
                sheet.properties.title.clone(),
            ));
        }

        for value_range in &entry.value_ranges {
            let sheet_name = value_range.range.split('!').next().unwrap_or_default();
            let column_count = value_range
                .values
                .iter()
                .map(Vec::len)
                .max()
                .unwrap_or(0);

            for row in 0..value_range.values.len() {
                for column in 0..column_count {
                    let value = value_range
                        .values
                        .get(row)
                        .and_then(|cells| cells.get(column))
                        .cloned()
                        .unwrap_or_default();
                    variables.push(Variable::new(
                        format!(
                            "{title}_{sheet_name}!{}{}",
                            a1::column_index_to_letter(column),
                            row + 1
                        ),
                        value,
                    ));
                }
            }
        }
    }

    variables
}
