//! Grouped averages over store records.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::Record;

#[derive(Default)]
struct Group {
    department: Value,
    sum: f64,
    count: u64,
}

/// Groups `records` by their `department` field and averages their numeric
/// `marks`, rounding half-to-even to a whole number.
///
/// Each output document is `{"average": n, "department": d}`. Records without
/// a department fall into the `null` group. Non-numeric or missing marks are
/// skipped; a group with no numeric marks averages to `null`. Groups come out
/// ordered by the JSON text of their department, so the result is stable
/// across calls.
///
/// ```
/// use cachet::database::aggregate::average_marks_by_department;
/// use serde_json::json;
///
/// let records = vec![
///     json!({ "department": "cs", "marks": 80 }),
///     json!({ "department": "cs", "marks": 91 }),
///     json!({ "department": "ee", "marks": 70 }),
/// ];
/// assert_eq!(
///     average_marks_by_department(&records),
///     vec![
///         json!({ "average": 86, "department": "cs" }),
///         json!({ "average": 70, "department": "ee" }),
///     ]
/// );
/// ```
pub fn average_marks_by_department(records: &[Record]) -> Vec<Record> {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();

    for record in records {
        let department = record.get("department").cloned().unwrap_or(Value::Null);
        let group = groups.entry(department.to_string()).or_insert_with(|| Group {
            department,
            ..Group::default()
        });
        if let Some(marks) = record.get("marks").and_then(Value::as_f64) {
            group.sum += marks;
            group.count += 1;
        }
    }

    groups
        .into_values()
        .map(|group| {
            let average = if group.count == 0 {
                Value::Null
            } else {
                json!((group.sum / group.count as f64).round_ties_even() as i64)
            };
            json!({ "average": average, "department": group.department })
        })
        .collect()
}
