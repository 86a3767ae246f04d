//! Lazy, composable read sequences
//!
//! A [`Query`] is a description of rows to read (filters, ordering, paging and
//! tracking mode). Nothing touches the store until one of the materialising
//! methods (`to_list`, `single_or_none`, `count`, ...) is awaited, and every
//! materialisation re-runs the query from scratch.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use unitwork_common::{Error, Result};

use crate::entity::{Entity, EntityMeta};
use crate::value::FieldValue;

/// Comparison operator of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// SQL spelling of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Whether `stored.cmp(value)` satisfies the operator
    pub fn accepts(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
        }
    }
}

/// A single predicate; a query matches rows satisfying all of its filters
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        column: String,
        op: CompareOp,
        value: FieldValue,
    },
    In {
        column: String,
        values: Vec<FieldValue>,
    },
    IsNull {
        column: String,
        negated: bool,
    },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Filter::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<FieldValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Compare { column, .. } | Filter::In { column, .. } | Filter::IsNull { column, .. } => {
                column
            }
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One ordering term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

/// Backend-neutral description of a read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filters: Vec<Filter>,
    pub order: Vec<SortKey>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    /// `None` defers to the container's tracking option
    pub tracking: Option<bool>,
}

impl QuerySpec {
    /// Reject column names that are not plain identifiers
    pub fn validate(&self) -> Result<()> {
        let columns = self
            .filters
            .iter()
            .map(Filter::column)
            .chain(self.order.iter().map(|key| key.column.as_str()));
        for column in columns {
            if !is_identifier(column) {
                return Err(Error::InvalidArgument(format!(
                    "'{}' is not a valid column name",
                    column
                )));
            }
        }
        Ok(())
    }

    /// Whether an `IN` filter with no values makes the result empty
    pub fn is_trivially_empty(&self) -> bool {
        self.limit == Some(0)
            || self
                .filters
                .iter()
                .any(|f| matches!(f, Filter::In { values, .. } if values.is_empty()))
    }
}

/// Whether `name` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Something able to materialise queries, usually a session container
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Fetch the rows matching `spec` as JSON objects keyed by column
    async fn fetch_rows(
        &self,
        meta: EntityMeta,
        spec: QuerySpec,
        ct: &CancellationToken,
    ) -> Result<Vec<Value>>;

    /// Count the rows matching `spec`, honouring offset and limit
    async fn count_rows(&self, meta: EntityMeta, spec: QuerySpec, ct: &CancellationToken)
        -> Result<u64>;
}

/// Lazy read sequence over one entity type
pub struct Query<E> {
    source: Arc<dyn QuerySource>,
    spec: QuerySpec,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            spec: self.spec.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("spec", &self.spec).finish()
    }
}

impl<E: Entity> Query<E> {
    pub fn new(source: Arc<dyn QuerySource>) -> Self {
        Self {
            source,
            spec: QuerySpec::default(),
            _entity: PhantomData,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.spec.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.compare(column, CompareOp::Eq, value)
    }

    pub fn ne(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.compare(column, CompareOp::Ne, value)
    }

    pub fn lt(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.compare(column, CompareOp::Lt, value)
    }

    pub fn le(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.compare(column, CompareOp::Le, value)
    }

    pub fn gt(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.compare(column, CompareOp::Gt, value)
    }

    pub fn ge(self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.compare(column, CompareOp::Ge, value)
    }

    pub fn compare(self, column: &str, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        self.filter(Filter::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        })
    }

    pub fn is_in<V: Into<FieldValue>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::is_in(column, values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::IsNull {
            column: column.to_string(),
            negated: false,
        })
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.filter(Filter::IsNull {
            column: column.to_string(),
            negated: true,
        })
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.spec.order.push(SortKey {
            column: column.to_string(),
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.spec.order.push(SortKey {
            column: column.to_string(),
            direction: SortDirection::Desc,
        });
        self
    }

    pub fn skip(mut self, count: u64) -> Self {
        self.spec.offset = Some(count);
        self
    }

    pub fn take(mut self, count: u64) -> Self {
        self.spec.limit = Some(self.spec.limit.map_or(count, |limit| limit.min(count)));
        self
    }

    /// Record materialised entities in the session's identity map
    pub fn as_tracking(mut self) -> Self {
        self.spec.tracking = Some(true);
        self
    }

    pub fn as_no_tracking(mut self) -> Self {
        self.spec.tracking = Some(false);
        self
    }

    /// Materialise every matching entity
    pub async fn to_list(&self, ct: &CancellationToken) -> Result<Vec<E>> {
        self.spec.validate()?;
        let rows = self
            .source
            .fetch_rows(E::meta(), self.spec.clone(), ct)
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(Error::from))
            .collect()
    }

    /// First matching entity, if any
    pub async fn first_or_none(&self, ct: &CancellationToken) -> Result<Option<E>> {
        let mut rows = self.clone().take(1).to_list(ct).await?;
        Ok(rows.pop())
    }

    /// The only matching entity; more than one match is an error
    pub async fn single_or_none(&self, ct: &CancellationToken) -> Result<Option<E>> {
        let mut rows = self.clone().take(2).to_list(ct).await?;
        if rows.len() > 1 {
            return Err(Error::MultipleResults {
                entity: E::meta().entity,
                count: rows.len(),
            });
        }
        Ok(rows.pop())
    }

    pub async fn count(&self, ct: &CancellationToken) -> Result<u64> {
        self.spec.validate()?;
        self.source
            .count_rows(E::meta(), self.spec.clone(), ct)
            .await
    }

    pub async fn any(&self, ct: &CancellationToken) -> Result<bool> {
        Ok(self.clone().take(1).count(ct).await? > 0)
    }
}
