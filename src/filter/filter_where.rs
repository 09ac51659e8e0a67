use std::cmp::Ordering;

use serde_json::Value;

use super::error::FilterError;
use super::types::{ColumnType, FilterOp, FilterWhereInfo, WhereNode};
use super::{compare_values, is_identifier};

/// Parses WHERE descriptors and renders them either as parameterized SQL or
/// as an in-memory predicate. Both renderings share one parse tree so the
/// two backends cannot drift apart.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_columns: Vec<String>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_columns: vec![],
            param_index: starting_param_index,
        }
    }

    pub fn parse(where_data: &Value) -> Result<WhereNode, FilterError> {
        match where_data {
            Value::Null => Ok(WhereNode::All(vec![])),
            Value::Object(obj) => {
                let mut nodes = Vec::with_capacity(obj.len());
                for (key, value) in obj {
                    if key.starts_with('$') {
                        nodes.push(Self::parse_logical_operator(key, value)?);
                    } else {
                        Self::parse_field_condition(key, value, &mut nodes)?;
                    }
                }
                Ok(match nodes.len() {
                    1 => nodes.remove(0),
                    _ => WhereNode::All(nodes),
                })
            }
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse_logical_operator(op: &str, value: &Value) -> Result<WhereNode, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let children = arr.iter().map(Self::parse).collect::<Result<Vec<_>, _>>()?;
                Ok(if op == "$and" { WhereNode::All(children) } else { WhereNode::Any(children) })
            }
            "$not" => Ok(WhereNode::Not(Box::new(Self::parse(value)?))),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value, out: &mut Vec<WhereNode>) -> Result<(), FilterError> {
        if !is_identifier(field) {
            return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", field)));
        }

        match value {
            Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => {
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    Self::validate_operand(operator, op_val)?;
                    out.push(WhereNode::Condition(FilterWhereInfo {
                        column: field.to_string(),
                        operator,
                        data: op_val.clone(),
                    }));
                }
            }
            // Implicit equality: { field: value }
            _ => out.push(WhereNode::Condition(FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            })),
        }
        Ok(())
    }

    fn validate_operand(operator: FilterOp, data: &Value) -> Result<(), FilterError> {
        match operator {
            FilterOp::In | FilterOp::NIn if !data.is_array() => Err(FilterError::InvalidOperatorData(
                "$in/$nin require an array".to_string(),
            )),
            FilterOp::Like | FilterOp::ILike if !data.is_string() => Err(FilterError::InvalidOperatorData(
                "$like/$ilike require a string pattern".to_string(),
            )),
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte
                if !(data.is_number() || data.is_string()) =>
            {
                Err(FilterError::InvalidOperatorData(
                    "range operators require a number or string".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Rejects conditions on columns outside `allowed`.
    pub fn validate_columns(node: &WhereNode, allowed: &[(&str, ColumnType)]) -> Result<(), FilterError> {
        match node {
            WhereNode::All(children) | WhereNode::Any(children) => {
                children.iter().try_for_each(|c| Self::validate_columns(c, allowed))
            }
            WhereNode::Not(inner) => Self::validate_columns(inner, allowed),
            WhereNode::Condition(info) => {
                if allowed.iter().any(|(name, _)| *name == info.column) {
                    Ok(())
                } else {
                    Err(FilterError::InvalidColumn(format!("Unknown column: {}", info.column)))
                }
            }
        }
    }

    pub fn generate(&mut self, node: &WhereNode) -> String {
        match node {
            WhereNode::All(children) => self.join(children, " AND ", "1=1"),
            WhereNode::Any(children) => self.join(children, " OR ", "1=0"),
            WhereNode::Not(inner) => format!("NOT ({})", self.generate(inner)),
            WhereNode::Condition(info) => self.build_sql_condition(info),
        }
    }

    fn join(&mut self, children: &[WhereNode], joiner: &str, empty: &str) -> String {
        match children {
            [] => empty.to_string(),
            [only] => self.generate(only),
            _ => children
                .iter()
                .map(|c| format!("({})", self.generate(c)))
                .collect::<Vec<_>>()
                .join(joiner),
        }
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> String {
        let quoted_column = format!("\"{}\"", condition.column);
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", quoted_column),
            FilterOp::Eq => format!("{} = {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Ne if data.is_null() => format!("{} IS NOT NULL", quoted_column),
            FilterOp::Ne => format!("{} <> {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Gt => format!("{} > {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Gte => format!("{} >= {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Lt => format!("{} < {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Lte => format!("{} <= {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::Like => format!("{} LIKE {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::ILike => format!("{} ILIKE {}", quoted_column, self.param(&condition.column, data.clone())),
            FilterOp::In | FilterOp::NIn => {
                let values = data.as_array().map(Vec::as_slice).unwrap_or_default();
                let negate = condition.operator == FilterOp::NIn;
                if values.is_empty() {
                    return if negate { "1=1".to_string() } else { "1=0".to_string() };
                }
                let params: Vec<String> = values.iter().map(|v| self.param(&condition.column, v.clone())).collect();
                let keyword = if negate { "NOT IN" } else { "IN" };
                format!("{} {} ({})", quoted_column, keyword, params.join(", "))
            }
        }
    }

    pub fn param(&mut self, column: &str, value: Value) -> String {
        self.param_values.push(value);
        self.param_columns.push(column.to_string());
        self.param_index += 1;
        format!("${}", self.param_index)
    }

    /// Parameter values with the column each one is compared against
    pub fn into_typed_params(self) -> (Vec<Value>, Vec<String>) {
        (self.param_values, self.param_columns)
    }

    /// Evaluates the tree against a JSON object with SQL null semantics:
    /// comparisons against a missing or null column never match.
    pub fn matches(node: &WhereNode, row: &Value) -> bool {
        match node {
            WhereNode::All(children) => children.iter().all(|c| Self::matches(c, row)),
            WhereNode::Any(children) => children.iter().any(|c| Self::matches(c, row)),
            WhereNode::Not(inner) => !Self::matches(inner, row),
            WhereNode::Condition(info) => Self::matches_condition(info, row),
        }
    }

    fn matches_condition(condition: &FilterWhereInfo, row: &Value) -> bool {
        let field = row.get(&condition.column).unwrap_or(&Value::Null);
        let data = &condition.data;
        match condition.operator {
            FilterOp::Eq if data.is_null() => field.is_null(),
            FilterOp::Ne if data.is_null() => !field.is_null(),
            FilterOp::Eq => compare_values(field, data) == Some(Ordering::Equal),
            FilterOp::Ne => matches!(compare_values(field, data), Some(o) if o != Ordering::Equal),
            FilterOp::Gt => compare_values(field, data) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(compare_values(field, data), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => compare_values(field, data) == Some(Ordering::Less),
            FilterOp::Lte => matches!(compare_values(field, data), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Like | FilterOp::ILike => match (field.as_str(), data.as_str()) {
                (Some(text), Some(pattern)) => like(text, pattern, condition.operator == FilterOp::ILike),
                _ => false,
            },
            FilterOp::In => data
                .as_array()
                .is_some_and(|vs| vs.iter().any(|v| compare_values(field, v) == Some(Ordering::Equal))),
            FilterOp::NIn => {
                !field.is_null()
                    && data
                        .as_array()
                        .is_some_and(|vs| vs.iter().all(|v| compare_values(field, v) != Some(Ordering::Equal)))
            }
        }
    }
}

/// SQL LIKE: `%` any run, `_` one char, backslash escapes the next char.
fn like(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    enum Token {
        Any,
        One,
        Lit(char),
    }

    let fold = |c: char| if case_insensitive { c.to_lowercase().next().unwrap_or(c) } else { c };

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => Token::Lit(fold(chars.next().unwrap_or('\\'))),
            other => Token::Lit(fold(other)),
        });
    }
    let text: Vec<char> = text.chars().map(fold).collect();

    // matched[j]: pattern prefix of length i matches text prefix of length j
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::Any => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= matched[j];
                    next[j] = seen;
                }
            }
            Token::One => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1];
                }
            }
            Token::Lit(c) => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && text[j - 1] == *c;
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql(where_data: Value) -> (String, Vec<Value>) {
        let node = FilterWhere::parse(&where_data).unwrap();
        let mut fw = FilterWhere::new(0);
        let sql = fw.generate(&node);
        (sql, fw.into_typed_params().0)
    }

    #[test]
    fn implicit_equality_and_operators() {
        let (query, params) = sql(json!({ "title": "groceries", "views": { "$gte": 3 } }));
        assert_eq!(query, "(\"title\" = $1) AND (\"views\" >= $2)");
        assert_eq!(params, vec![json!("groceries"), json!(3)]);
    }

    #[test]
    fn logical_operators_nest_with_continuous_params() {
        let (query, params) = sql(json!({
            "$or": [ { "title": "a" }, { "$not": { "content": { "$ilike": "%x%" } } } ]
        }));
        assert_eq!(query, "(\"title\" = $1) OR (NOT (\"content\" ILIKE $2))");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn null_and_empty_sets() {
        assert_eq!(sql(json!({ "content": null })).0, "\"content\" IS NULL");
        assert_eq!(sql(json!({ "id": { "$in": [] } })).0, "1=0");
        assert_eq!(sql(json!({ "id": { "$nin": [] } })).0, "1=1");
        assert_eq!(sql(Value::Null).0, "1=1");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            FilterWhere::parse(&json!({ "title": { "$regex": "x" } })),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::parse(&json!({ "bad column": 1 })),
            Err(FilterError::InvalidColumn(_))
        ));
        assert!(matches!(
            FilterWhere::parse(&json!("1=1; DROP TABLE notes")),
            Err(FilterError::InvalidWhereClause(_))
        ));
        assert!(FilterWhere::parse(&json!({ "id": { "$in": "x" } })).is_err());
    }

    #[test]
    fn column_allowlist() {
        let node = FilterWhere::parse(&json!({ "$and": [ { "title": "a" }, { "password_hash": "x" } ] })).unwrap();
        let title = ("title", ColumnType::Text);
        let hash = ("password_hash", ColumnType::Text);
        assert!(FilterWhere::validate_columns(&node, &[title]).is_err());
        assert!(FilterWhere::validate_columns(&node, &[title, hash]).is_ok());
    }

    #[test]
    fn params_remember_their_column() {
        let node = FilterWhere::parse(&json!({ "title": "a", "id": { "$in": ["x", "y"] } })).unwrap();
        let mut fw = FilterWhere::new(0);
        fw.generate(&node);
        let (values, columns) = fw.into_typed_params();
        assert_eq!(values.len(), 3);
        assert_eq!(columns, vec!["title", "id", "id"]);
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let row = json!({ "created_at": "2024-05-01T10:00:20.100001Z" });
        let check = |w: Value| FilterWhere::matches(&FilterWhere::parse(&w).unwrap(), &row);

        assert!(check(json!({ "created_at": { "$gt": "2024-05-01T10:00:20.100Z" } })));
        assert!(check(json!({ "created_at": { "$gt": "2024-05-01T11:00:00+02:00" } })));
        assert!(check(json!({ "created_at": "2024-05-01T10:00:20.100001000Z" })));
    }

    #[test]
    fn in_memory_matching_follows_sql_semantics() {
        let row = json!({ "title": "Weekly Plan", "views": 4, "content": null });
        let check = |w: Value| FilterWhere::matches(&FilterWhere::parse(&w).unwrap(), &row);

        assert!(check(json!({ "title": "Weekly Plan" })));
        assert!(check(json!({ "views": { "$gt": 3, "$lte": 4 } })));
        assert!(check(json!({ "title": { "$like": "Weekly%" } })));
        assert!(!check(json!({ "title": { "$like": "weekly%" } })));
        assert!(check(json!({ "title": { "$ilike": "weekly_plan" } })));
        assert!(check(json!({ "content": null })));
        assert!(!check(json!({ "content": { "$ne": "x" } })));
        assert!(!check(json!({ "missing": { "$nin": ["x"] } })));
        assert!(check(json!({ "$or": [ { "views": 1 }, { "views": { "$in": [4, 5] } } ] })));
        assert!(check(json!({ "$not": { "title": "Other" } })));
    }

    #[test]
    fn like_escapes_and_wildcards() {
        assert!(like("100%", "100\\%", false));
        assert!(!like("1000", "100\\%", false));
        assert!(like("abc", "a_c", false));
        assert!(like("", "%", false));
        assert!(!like("abc", "a_", false));
    }
}
