use std::cmp::Ordering;

use serde_json::Value;

use super::error::FilterError;
use super::{compare_values, is_identifier};
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::Null => vec![],
            Value::String(s) => Self::parse_order_string(s)?,
            Value::Array(arr) => {
                // ["created_at desc", "title asc"]
                let mut out = Vec::new();
                for v in arr {
                    let s = v
                        .as_str()
                        .ok_or_else(|| FilterError::InvalidOrder("order array must contain strings".to_string()))?;
                    out.extend(Self::parse_order_string(s)?);
                }
                out
            }
            Value::Object(obj) => {
                // { "created_at": "desc", "title": "asc" }
                let mut out = Vec::new();
                for (k, v) in obj {
                    let dir = v.as_str().unwrap_or("asc");
                    out.push(FilterOrderInfo { column: k.clone(), sort: Self::parse_direction(dir)? });
                }
                out
            }
            _ => return Err(FilterError::InvalidOrder("order must be a string, array or object".to_string())),
        };

        for info in &infos {
            if !is_identifier(&info.column) {
                return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", info.column)));
            }
        }
        Ok(infos)
    }

    fn parse_direction(dir: &str) -> Result<SortDirection, FilterError> {
        if dir.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if dir.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(FilterError::InvalidOrder(format!("unknown sort direction '{}'", dir)))
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let sort = Self::parse_direction(it.next().unwrap_or("asc"))?;
                if it.next().is_some() {
                    return Err(FilterError::InvalidOrder(format!("unexpected tokens in '{}'", trimmed)));
                }
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() { return String::new(); }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }

    /// Stable in-memory sort. Nulls sort last ascending, first descending,
    /// matching PostgreSQL defaults.
    pub fn sort_rows(rows: &mut [Value], infos: &[FilterOrderInfo]) {
        rows.sort_by(|a, b| {
            for info in infos {
                let ord = compare_for_sort(
                    a.get(&info.column).unwrap_or(&Value::Null),
                    b.get(&info.column).unwrap_or(&Value::Null),
                );
                let ord = match info.sort {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

fn compare_for_sort(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_all_order_shapes() {
        let from_str = FilterOrder::validate_and_parse(&json!("created_at desc, title")).unwrap();
        assert_eq!(from_str.len(), 2);
        assert_eq!(from_str[0].sort, SortDirection::Desc);
        assert_eq!(from_str[1].sort, SortDirection::Asc);

        let from_arr = FilterOrder::validate_and_parse(&json!(["title DESC"])).unwrap();
        assert_eq!(FilterOrder::generate(&from_arr), "ORDER BY \"title\" DESC");

        let from_obj = FilterOrder::validate_and_parse(&json!({ "updated_at": "asc" })).unwrap();
        assert_eq!(from_obj[0].column, "updated_at");
    }

    #[test]
    fn rejects_injection_and_bad_directions() {
        assert!(FilterOrder::validate_and_parse(&json!("title; DROP TABLE notes")).is_err());
        assert!(FilterOrder::validate_and_parse(&json!("title sideways")).is_err());
        assert!(FilterOrder::validate_and_parse(&json!(42)).is_err());
    }

    #[test]
    fn sorts_rows_in_memory() {
        let mut rows = vec![json!({ "t": "b" }), json!({ "t": null }), json!({ "t": "a" })];
        let infos = FilterOrder::validate_and_parse(&json!("t asc")).unwrap();
        FilterOrder::sort_rows(&mut rows, &infos);
        assert_eq!(rows, vec![json!({ "t": "a" }), json!({ "t": "b" }), json!({ "t": null })]);

        let infos = FilterOrder::validate_and_parse(&json!("t desc")).unwrap();
        FilterOrder::sort_rows(&mut rows, &infos);
        assert_eq!(rows[0], json!({ "t": null }));
    }

    #[test]
    fn timestamps_sort_by_instant_not_text() {
        // chrono drops trailing zero groups, so the later instant is the
        // lexically smaller string here
        let mut rows = vec![
            json!({ "id": "early", "created_at": "2024-05-01T10:00:20.100Z" }),
            json!({ "id": "late", "created_at": "2024-05-01T10:00:20.100001Z" }),
            json!({ "id": "first", "created_at": "2024-05-01T10:00:20Z" }),
        ];
        let infos = FilterOrder::validate_and_parse(&json!("created_at desc")).unwrap();
        FilterOrder::sort_rows(&mut rows, &infos);

        let ids: Vec<&str> = rows.iter().filter_map(|r| r["id"].as_str()).collect();
        assert_eq!(ids, vec!["late", "early", "first"]);
    }
}
