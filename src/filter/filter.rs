use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::is_identifier;
use super::types::{ColumnType, Columns, FilterData, FilterOp, FilterOrderInfo, FilterWhereInfo, SqlResult, WhereNode};

pub struct Filter {
    table_name: String,
    allowed_columns: Option<Columns>,
    scope: Vec<(FilterWhereInfo, ColumnType)>,
    where_node: WhereNode,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        if table_name.is_empty() {
            return Err(FilterError::InvalidTableName("Table name cannot be empty".to_string()));
        }
        if !is_identifier(&table_name) {
            return Err(FilterError::InvalidTableName(format!("Invalid table name format: {}", table_name)));
        }
        Ok(Self {
            table_name,
            allowed_columns: None,
            scope: vec![],
            where_node: WhereNode::All(vec![]),
            order_data: vec![],
            limit: None,
            offset: None,
        })
    }

    /// Restrict WHERE and ORDER to a fixed column set
    pub fn with_columns(table_name: impl Into<String>, columns: Columns) -> Result<Self, FilterError> {
        let mut filter = Self::new(table_name)?;
        filter.allowed_columns = Some(columns);
        Ok(filter)
    }

    pub fn assign(&mut self, data: &FilterData) -> Result<&mut Self, FilterError> {
        if let Some(where_clause) = &data.where_clause { self.where_clause(where_clause)?; }
        if let Some(order) = &data.order { self.order(order)?; }
        match (data.limit, data.offset) {
            (Some(limit), offset) => { self.limit(limit, offset)?; }
            (None, Some(offset)) => { self.offset(offset)?; }
            (None, None) => {}
        }
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: &Value) -> Result<&mut Self, FilterError> {
        let node = FilterWhere::parse(conditions)?;
        if let Some(columns) = self.allowed_columns {
            FilterWhere::validate_columns(&node, columns)?;
        }
        self.where_node = node;
        Ok(self)
    }

    pub fn order(&mut self, order_spec: &Value) -> Result<&mut Self, FilterError> {
        let order_info = FilterOrder::validate_and_parse(order_spec)?;
        if let Some(columns) = self.allowed_columns {
            if let Some(bad) = order_info.iter().find(|i| !columns.iter().any(|(name, _)| *name == i.column)) {
                return Err(FilterError::InvalidColumn(format!("Unknown column: {}", bad.column)));
            }
        }
        self.order_data = order_info;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i64, offset: Option<i64>) -> Result<&mut Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string())); }
        if let Some(off) = offset { self.offset(off)?; }

        // Apply max limit from config
        let max_limit = crate::config::CONFIG.filter.max_limit.unwrap_or(i64::MAX);
        let applied_limit = if limit > max_limit {
            if crate::config::CONFIG.filter.debug_logging {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max_limit);
            }
            max_limit
        } else {
            limit
        };

        self.limit = Some(applied_limit);
        Ok(self)
    }

    fn offset(&mut self, offset: i64) -> Result<&mut Self, FilterError> {
        if offset < 0 { return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string())); }
        self.offset = Some(offset);
        Ok(self)
    }

    /// Mandatory equality constraint, rendered ahead of (and ANDed with) the
    /// caller's WHERE tree. Only the access guard's scoped queries add these.
    pub(crate) fn scope_eq(&mut self, column: &'static str, column_type: ColumnType, value: Value) -> &mut Self {
        let info = FilterWhereInfo { column: column.to_string(), operator: FilterOp::Eq, data: value };
        self.scope.push((info, column_type));
        self
    }

    fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.scope
            .iter()
            .find(|(info, _)| info.column == column)
            .map(|(_, ty)| *ty)
            .or_else(|| self.allowed_columns?.iter().find(|(name, _)| *name == column).map(|(_, ty)| *ty))
    }

    fn full_where(&self) -> WhereNode {
        if self.scope.is_empty() {
            return self.where_node.clone();
        }
        let mut nodes: Vec<WhereNode> = self.scope.iter().map(|(info, _)| WhereNode::Condition(info.clone())).collect();
        if self.where_node != WhereNode::All(vec![]) {
            nodes.push(self.where_node.clone());
        }
        WhereNode::All(nodes)
    }

    pub fn to_where_sql(&self) -> SqlResult {
        let mut fw = FilterWhere::new(0);
        let query = fw.generate(&self.full_where());
        let (params, columns) = fw.into_typed_params();
        let param_types = columns.iter().map(|c| self.column_type(c)).collect();
        SqlResult { query, params, param_types }
    }

    pub fn to_sql(&self) -> SqlResult {
        let where_result = self.to_where_sql();
        let query = [
            "SELECT *".to_string(),
            format!("FROM \"{}\"", self.table_name),
            format!("WHERE {}", where_result.query),
            FilterOrder::generate(&self.order_data),
            self.build_limit_clause(),
        ].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");

        SqlResult { query, ..where_result }
    }

    pub fn to_count_sql(&self) -> SqlResult {
        let where_result = self.to_where_sql();
        let query = format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", self.table_name, where_result.query);
        SqlResult { query, ..where_result }
    }

    pub fn matches(&self, row: &Value) -> bool {
        FilterWhere::matches(&self.full_where(), row)
    }

    /// In-memory equivalent of `to_sql`: filter, order, then page
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut out: Vec<Value> = rows.into_iter().filter(|row| self.matches(row)).collect();
        FilterOrder::sort_rows(&mut out, &self.order_data);
        let offset = self.offset.unwrap_or(0).max(0) as usize;
        let limit = self.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        out.into_iter().skip(offset).take(limit).collect()
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}
