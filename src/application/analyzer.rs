//! Read-only preview of a candidate archive.
//!
//! Counts what a restore would write and flags structural problems the user
//! should know about before committing to it. Never touches any store.

use serde_json::{Map, Value};

use crate::domain::registry::{self, FieldRule};
use crate::domain::{BackupAnalysis, REGISTRY};

/// Items inspected per collection for heuristic warnings.
const SAMPLE_SIZE: usize = 5;

/// Analyze a parsed archive candidate.
#[must_use]
pub fn analyze(candidate: &Value) -> BackupAnalysis {
    let mut analysis = BackupAnalysis::default();

    let Some(data) = candidate.get("data").and_then(Value::as_object) else {
        analysis.warnings.push(
            "Backup has no data container; this does not look like a study-vault backup."
                .to_string(),
        );
        return analysis;
    };

    analysis.valid = true;

    for spec in REGISTRY {
        let Some(value) = data.get(spec.name) else {
            continue;
        };
        let Some(items) = value.as_array() else {
            analysis.warnings.push(format!(
                "{}: expected a list of items, found something else; it will be skipped.",
                spec.name
            ));
            continue;
        };

        analysis.counts.insert(spec.name.to_string(), items.len());
        analysis.total_items += items.len();
        check_sample(spec.name, spec.rules, items, &mut analysis.warnings);
    }

    for (_, sub) in registry::nested_families() {
        let Some(parents) = data.get(sub.archive_key).and_then(Value::as_object) else {
            continue;
        };
        let count = count_nested(sub.archive_key, parents, &mut analysis.warnings);
        analysis.counts.insert(sub.archive_key.to_string(), count);
        analysis.total_items += count;
    }

    for key in data.keys().filter(|key| !registry::is_known_archive_key(key)) {
        analysis
            .warnings
            .push(format!("{key}: not a known collection; it will be ignored."));
    }

    if analysis.total_items == 0 {
        analysis
            .warnings
            .push("Backup contains zero items; restoring it will not change anything.".to_string());
    }

    analysis
}

fn check_sample(
    name: &str,
    rules: &[FieldRule],
    items: &[Value],
    warnings: &mut Vec<String>,
) {
    let sample: Vec<&Map<String, Value>> = items
        .iter()
        .take(SAMPLE_SIZE)
        .filter_map(Value::as_object)
        .collect();

    if sample.len() < items.len().min(SAMPLE_SIZE) {
        warnings.push(format!(
            "{name}: some sampled items are not objects; they will be skipped."
        ));
    }

    if sample.iter().any(|item| !item.contains_key("id")) {
        warnings.push(format!(
            "{name}: some sampled items have no 'id'; they will be skipped."
        ));
    }

    for rule in rules {
        if sample.iter().any(|item| rule.is_missing(item)) {
            warnings.push(format!(
                "{name}: sampled items lack '{}'; {}.",
                rule.field,
                rule.fallback.describe()
            ));
        }
    }
}

fn count_nested(key: &str, parents: &Map<String, Value>, warnings: &mut Vec<String>) -> usize {
    let mut count = 0;
    let mut malformed = 0;
    for list in parents.values() {
        match list.as_array() {
            Some(items) => count += items.len(),
            None => malformed += 1,
        }
    }
    if malformed > 0 {
        warnings.push(format!(
            "{key}: {malformed} parent entries are not lists; they will be skipped."
        ));
    }
    count
}
