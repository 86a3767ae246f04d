//! SQL rendering for generic row access
//!
//! Rows travel as `jsonb`: reads select `to_jsonb(t)` and writes expand the
//! bound row with `jsonb_populate_record`, so one statement shape serves
//! every entity type. Identifiers are validated and quoted; values are
//! always bound.

use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use unitwork_common::{Error, Result};
use unitwork_contracts::{is_identifier, EntityMeta, FieldValue, Filter, QuerySpec, SortDirection};

/// Double-quote an identifier after checking it is a plain name
pub fn quote(name: &str) -> Result<String> {
    if !is_identifier(name) {
        return Err(Error::InvalidArgument(format!(
            "'{}' is not a valid identifier",
            name
        )));
    }
    Ok(format!("\"{}\"", name))
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Null => {
            qb.push("NULL");
        }
        FieldValue::Bool(b) => {
            qb.push_bind(*b);
        }
        FieldValue::Int(i) => {
            qb.push_bind(*i);
        }
        FieldValue::Float(f) => {
            qb.push_bind(*f);
        }
        FieldValue::Text(s) => {
            qb.push_bind(s.clone());
        }
        FieldValue::Uuid(u) => {
            qb.push_bind(*u);
        }
        FieldValue::Timestamp(t) => {
            qb.push_bind(*t);
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &[Filter]) -> Result<()> {
    for (idx, filter) in filters.iter().enumerate() {
        qb.push(if idx == 0 { " WHERE " } else { " AND " });
        qb.push("t.").push(quote(filter.column())?);
        match filter {
            Filter::Compare { op, value, .. } => {
                qb.push(" ").push(op.as_sql()).push(" ");
                push_value(qb, value);
            }
            Filter::In { values, .. } => {
                qb.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    push_value(qb, value);
                }
                qb.push(")");
            }
            Filter::IsNull { negated, .. } => {
                qb.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
        }
    }
    Ok(())
}

fn push_paging(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec) {
    if let Some(limit) = spec.limit {
        qb.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(offset) = spec.offset {
        qb.push(" OFFSET ").push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
}

/// `SELECT to_jsonb(t) FROM "table" t WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
pub fn select(meta: &EntityMeta, spec: &QuerySpec) -> Result<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new("SELECT to_jsonb(t) AS data FROM ");
    qb.push(quote(meta.table)?).push(" t");
    push_filters(&mut qb, &spec.filters)?;
    for (idx, key) in spec.order.iter().enumerate() {
        qb.push(if idx == 0 { " ORDER BY " } else { ", " });
        qb.push("t.").push(quote(&key.column)?);
        qb.push(match key.direction {
            SortDirection::Asc => " ASC NULLS FIRST",
            SortDirection::Desc => " DESC NULLS LAST",
        });
    }
    push_paging(&mut qb, spec);
    Ok(qb)
}

/// `SELECT COUNT(*)` over the paged selection
pub fn count(meta: &EntityMeta, spec: &QuerySpec) -> Result<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM (SELECT 1 FROM ");
    qb.push(quote(meta.table)?).push(" t");
    push_filters(&mut qb, &spec.filters)?;
    push_paging(&mut qb, spec);
    qb.push(") AS matched");
    Ok(qb)
}

pub fn insert(meta: &EntityMeta) -> Result<String> {
    let table = quote(meta.table)?;
    Ok(format!(
        "INSERT INTO {table} SELECT * FROM jsonb_populate_record(NULL::{table}, $1)"
    ))
}

/// Replace every column present in `row` except the id
pub fn update(meta: &EntityMeta, row: &Value) -> Result<String> {
    let table = quote(meta.table)?;
    let id = quote(meta.id_column)?;
    let object = row.as_object().ok_or_else(|| {
        Error::InvalidArgument(format!("{} must serialize to a JSON object", meta.entity))
    })?;
    let columns = object
        .keys()
        .filter(|c| c.as_str() != meta.id_column)
        .map(|c| quote(c))
        .collect::<Result<Vec<_>>>()?;
    if columns.is_empty() {
        return Ok(format!(
            "UPDATE {table} AS t SET {id} = t.{id} \
             WHERE t.{id} = (SELECT r.{id} FROM jsonb_populate_record(NULL::{table}, $1) r)"
        ));
    }
    let targets = columns.join(", ");
    let sources = columns
        .iter()
        .map(|c| format!("r.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "UPDATE {table} AS t SET ({targets}) = \
         (SELECT {sources} FROM jsonb_populate_record(NULL::{table}, $1) r) \
         WHERE t.{id} = (SELECT r.{id} FROM jsonb_populate_record(NULL::{table}, $1) r)"
    ))
}

pub fn delete(meta: &EntityMeta) -> Result<String> {
    let table = quote(meta.table)?;
    let id = quote(meta.id_column)?;
    Ok(format!(
        "DELETE FROM {table} AS t \
         WHERE t.{id} = (SELECT r.{id} FROM jsonb_populate_record(NULL::{table}, $1) r)"
    ))
}
