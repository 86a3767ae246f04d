//! Query evaluation over JSON rows

use std::cmp::Ordering;

use serde_json::Value;
use unitwork_contracts::{Filter, QuerySpec, SortDirection};

fn column<'a>(row: &'a Value, name: &str) -> &'a Value {
    row.get(name).unwrap_or(&Value::Null)
}

pub fn matches(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Compare { column: name, op, value } => value
            .compare_json(column(row, name))
            .is_some_and(|ordering| op.accepts(ordering)),
        Filter::In { column: name, values } => {
            let stored = column(row, name);
            values
                .iter()
                .any(|value| value.compare_json(stored) == Some(Ordering::Equal))
        }
        Filter::IsNull { column: name, negated } => column(row, name).is_null() != *negated,
    })
}

/// Total order over stored values: nulls first, then booleans, numbers, text
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Filter, order and page `rows`
pub fn select<'a>(rows: impl Iterator<Item = &'a Value>, spec: &QuerySpec) -> Vec<Value> {
    let mut selected: Vec<&Value> = rows.filter(|row| matches(&spec.filters, row)).collect();
    if !spec.order.is_empty() {
        selected.sort_by(|a, b| {
            spec.order
                .iter()
                .map(|key| {
                    let ordering = compare_values(column(a, &key.column), column(b, &key.column));
                    match key.direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
    let offset = spec.offset.unwrap_or(0) as usize;
    let limit = spec.limit.map_or(usize::MAX, |limit| limit as usize);
    selected
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect()
}

/// Number of rows `select` would return, without cloning them
pub fn count<'a>(rows: impl Iterator<Item = &'a Value>, spec: &QuerySpec) -> u64 {
    let found = rows.filter(|row| matches(&spec.filters, row)).count() as u64;
    let remaining = found.saturating_sub(spec.offset.unwrap_or(0));
    spec.limit.map_or(remaining, |limit| remaining.min(limit))
}
