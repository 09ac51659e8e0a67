use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$like")] Like,
    #[serde(rename = "$ilike")] ILike,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,
}

impl FilterOp {
    pub fn parse(op_key: &str) -> Option<Self> {
        Some(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            _ => return None,
        })
    }
}

/// Query descriptor as received from API callers.
///
/// On its own a `FilterData` carries no tenant constraint; persistence only
/// accepts it once wrapped by the access guard into a scoped query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterData {
    #[serde(rename = "where", alias = "where_clause", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl FilterData {
    pub fn where_eq(column: &str, value: impl Into<Value>) -> Self {
        Self {
            where_clause: Some(serde_json::json!({ column: value.into() })),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: Value,
}

/// Parsed WHERE tree
#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    All(Vec<WhereNode>),
    Any(Vec<WhereNode>),
    Not(Box<WhereNode>),
    Condition(FilterWhereInfo),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

/// SQL type of a filterable column. Bound parameters take the type of the
/// column they are compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Timestamp,
}

/// Filterable columns of one table with their SQL types
pub type Columns = &'static [(&'static str, ColumnType)];

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
    /// Column type per entry of `params`; `None` when the filter has no
    /// typed column list
    pub param_types: Vec<Option<ColumnType>>,
}
