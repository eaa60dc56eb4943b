//! Three-way field comparison.

use crate::DataConflict;
use chrono::Utc;
use entity_cache::fields;
use serde_json::Value;
use std::collections::BTreeSet;

/// Compare the local pending value, the server value and the baseline.
///
/// A field conflicts only when all three differ pairwise: local moved off
/// the baseline, the server moved off the baseline, and they disagree.
/// Fields missing on one side compare as null. Results are ordered by
/// field name.
pub fn detect(
    resource_type: &str,
    resource_id: &str,
    local: &Value,
    server: &Value,
    baseline: Option<&Value>,
) -> Vec<DataConflict> {
    let null = Value::Null;
    let base = baseline.unwrap_or(&null);

    let names: BTreeSet<String> = fields::names(local)
        .into_iter()
        .chain(fields::names(server))
        .chain(fields::names(base))
        .collect();

    let detected_at = Utc::now();
    names
        .into_iter()
        .filter_map(|field| {
            let l = fields::get(local, &field);
            let s = fields::get(server, &field);
            let b = fields::get(base, &field);
            if l == b || s == b || l == s {
                return None;
            }
            Some(DataConflict {
                id: uuid::Uuid::new_v4().to_string(),
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
                field,
                local_value: l,
                server_value: s,
                last_synced_value: baseline.map(|_| b),
                detected_at,
            })
        })
        .collect()
}
