use crate::errors::StoreError;
use bson::{Bson, Document};

use super::eval::check_path;
use super::types::MAX_IN_SET;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Predicate tree compiled from a store-style filter document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, pattern: String, case_insensitive: bool },
}

impl TryFrom<&Document> for Filter {
    type Error = StoreError;

    /// Compiles `{field: value}`, `{field: {$op: value}}` and the `$and`/`$or`/`$nor`
    /// combinators. Top-level keys are implicitly AND-ed.
    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let mut clauses = Vec::with_capacity(doc.len());
        for (key, value) in doc {
            clauses.push(match key.as_str() {
                "$and" => Self::And(sub_filters(key, value)?),
                "$or" => Self::Or(sub_filters(key, value)?),
                "$nor" => Self::Not(Box::new(Self::Or(sub_filters(key, value)?))),
                k if k.starts_with('$') => {
                    return Err(StoreError::InvalidQuery(format!("unknown top-level operator {k}")));
                }
                path => field_clause(path, value)?,
            });
        }
        Ok(match clauses.len() {
            0 => Self::True,
            1 => clauses.remove(0),
            _ => Self::And(clauses),
        })
    }
}

fn sub_filters(op: &str, value: &Bson) -> Result<Vec<Filter>, StoreError> {
    let Bson::Array(items) = value else {
        return Err(StoreError::InvalidQuery(format!("{op} requires an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Filter::try_from(d),
            _ => Err(StoreError::InvalidQuery(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn field_clause(path: &str, value: &Bson) -> Result<Filter, StoreError> {
    check_path(path)?;
    match value {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
            operator_clauses(path, ops)
        }
        v => Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: v.clone() }),
    }
}

fn operator_clauses(path: &str, ops: &Document) -> Result<Filter, StoreError> {
    let mut out = Vec::with_capacity(ops.len());
    #[cfg(feature = "regex")]
    let case_insensitive = matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
    for (op, v) in ops {
        let path = path.to_string();
        out.push(match op.as_str() {
            "$eq" => Filter::Cmp { path, op: CmpOp::Eq, value: v.clone() },
            "$ne" => Filter::Cmp { path, op: CmpOp::Ne, value: v.clone() },
            "$gt" => Filter::Cmp { path, op: CmpOp::Gt, value: v.clone() },
            "$gte" => Filter::Cmp { path, op: CmpOp::Gte, value: v.clone() },
            "$lt" => Filter::Cmp { path, op: CmpOp::Lt, value: v.clone() },
            "$lte" => Filter::Cmp { path, op: CmpOp::Lte, value: v.clone() },
            "$in" => Filter::In { path, values: value_list(op, v)? },
            "$nin" => Filter::Nin { path, values: value_list(op, v)? },
            "$exists" => Filter::Exists { path, exists: truthy(v) },
            "$not" => match v {
                Bson::Document(inner) => Filter::Not(Box::new(operator_clauses(&path, inner)?)),
                _ => return Err(StoreError::InvalidQuery("$not requires an operator document".into())),
            },
            #[cfg(feature = "regex")]
            "$regex" => match v {
                Bson::String(pattern) => Filter::Regex { path, pattern: pattern.clone(), case_insensitive },
                Bson::RegularExpression(re) => Filter::Regex {
                    path,
                    pattern: re.pattern.clone(),
                    case_insensitive: case_insensitive || re.options.contains('i'),
                },
                _ => return Err(StoreError::InvalidQuery("$regex requires a string".into())),
            },
            #[cfg(feature = "regex")]
            "$options" => continue,
            other => return Err(StoreError::InvalidQuery(format!("unsupported operator {other}"))),
        });
    }
    Ok(if out.len() == 1 { out.remove(0) } else { Filter::And(out) })
}

fn value_list(op: &str, v: &Bson) -> Result<Vec<Bson>, StoreError> {
    match v {
        Bson::Array(items) if items.len() > MAX_IN_SET => Err(StoreError::InvalidQuery(format!(
            "{op} has {} values, at most {MAX_IN_SET} are allowed",
            items.len()
        ))),
        Bson::Array(items) => Ok(items.clone()),
        _ => Err(StoreError::InvalidQuery(format!("{op} requires an array"))),
    }
}

fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn implicit_equality_and_operators() {
        let f = Filter::try_from(&doc! { "bookId": 7, "rating": { "$ne": Bson::Null } }).unwrap();
        let Filter::And(parts) = f else { panic!("expected $and") };
        assert_eq!(parts[0], Filter::Cmp { path: "bookId".into(), op: CmpOp::Eq, value: Bson::Int32(7) });
        assert_eq!(parts[1], Filter::Cmp { path: "rating".into(), op: CmpOp::Ne, value: Bson::Null });
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(Filter::try_from(&doc! {}).unwrap(), Filter::True);
    }

    #[test]
    fn combinators_and_ranges() {
        let f = Filter::try_from(&doc! {
            "$or": [ { "username": "ann" }, { "email": "ann@example.com" } ],
            "age": { "$gte": 18, "$lt": 65 },
        })
        .unwrap();
        let Filter::And(parts) = f else { panic!("expected $and") };
        assert!(matches!(&parts[0], Filter::Or(v) if v.len() == 2));
        assert!(matches!(&parts[1], Filter::And(v) if v.len() == 2));
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(Filter::try_from(&doc! { "x": { "$near": 1 } }).is_err());
        assert!(Filter::try_from(&doc! { "$where": "1" }).is_err());
        assert!(Filter::try_from(&doc! { "$and": 1 }).is_err());
    }

    #[test]
    fn embedded_document_without_operators_is_equality() {
        let f = Filter::try_from(&doc! { "meta": { "lang": "ru" } }).unwrap();
        assert!(matches!(f, Filter::Cmp { op: CmpOp::Eq, value: Bson::Document(_), .. }));
    }

    #[test]
    fn value_sets_over_the_limit_are_rejected() {
        let at_limit: Vec<Bson> = (0..MAX_IN_SET).map(|i| Bson::Int64(i64::try_from(i).unwrap())).collect();
        let f = Filter::try_from(&doc! { "n": { "$in": at_limit.clone() } }).unwrap();
        assert!(matches!(f, Filter::In { ref values, .. } if values.len() == MAX_IN_SET));

        let mut over = at_limit;
        over.push(Bson::Int64(-1));
        let err = Filter::try_from(&doc! { "n": { "$nin": over } }).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(m) if m.contains("$nin")));

        let mut deep = Document::new();
        deep.insert(vec!["a"; 33].join("."), 1);
        assert!(Filter::try_from(&deep).is_err());
    }
}
