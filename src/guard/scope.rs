use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::filter::{ColumnType, Columns, Filter, FilterData, FilterError, SqlResult};
use crate::types::TenantId;

/// Column every tenant-owned table carries
pub const TENANT_COLUMN: &str = "tenant_id";

/// Anything that can be handed to `scope_query`
pub trait QueryDescriptor {
    fn into_parts(self) -> (BTreeSet<TenantId>, FilterData);
}

impl QueryDescriptor for FilterData {
    fn into_parts(self) -> (BTreeSet<TenantId>, FilterData) {
        (BTreeSet::new(), self)
    }
}

impl QueryDescriptor for ScopedQuery {
    fn into_parts(self) -> (BTreeSet<TenantId>, FilterData) {
        (self.tenants, self.filter)
    }
}

/// A query descriptor carrying mandatory `tenant_id = ?` constraints.
///
/// Only the access guard can construct one, and the persistence layer only
/// reads through one, so a tenant filter cannot be forgotten at a call site.
/// Constraints form a set joined by AND: re-scoping to the same tenant is a
/// no-op, scoping to two tenants matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    tenants: BTreeSet<TenantId>,
    filter: FilterData,
}

impl ScopedQuery {
    pub(crate) fn new(tenant_id: TenantId, base: impl QueryDescriptor) -> Self {
        let (mut tenants, filter) = base.into_parts();
        tenants.insert(tenant_id);
        Self { tenants, filter }
    }

    pub fn tenant_ids(&self) -> impl Iterator<Item = &TenantId> {
        self.tenants.iter()
    }

    pub fn filter(&self) -> &FilterData {
        &self.filter
    }

    /// Narrow with an extra WHERE condition; tenant constraints are kept.
    pub fn and_where(mut self, condition: Value) -> Self {
        self.filter.where_clause = Some(match self.filter.where_clause.take() {
            None | Some(Value::Null) => condition,
            Some(existing) => json!({ "$and": [existing, condition] }),
        });
        self
    }

    /// Compiled filter for `table`, tenant constraints included
    pub fn compile(&self, table: &str, columns: Columns) -> Result<Filter, FilterError> {
        let mut filter = Filter::with_columns(table, columns)?;
        filter.assign(&self.filter)?;
        for tenant_id in &self.tenants {
            filter.scope_eq(TENANT_COLUMN, ColumnType::Uuid, json!(tenant_id));
        }
        Ok(filter)
    }

    pub fn to_sql(&self, table: &str, columns: Columns) -> Result<SqlResult, FilterError> {
        Ok(self.compile(table, columns)?.to_sql())
    }
}
