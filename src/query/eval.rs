use bson::{Bson, Document};
use std::cmp::Ordering;

use super::filter::{CmpOp, Filter};
use super::types::{MAX_PATH_DEPTH, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, Order, Projection, SortSpec};
use crate::errors::StoreError;

static NULL: Bson = Bson::Null;

pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => !get_values(doc, path).is_empty() == *exists,
        Filter::In { path, values } => any_value(doc, path, |v| values.iter().any(|x| matches_value(v, x))),
        Filter::Nin { path, values } => !any_value(doc, path, |v| values.iter().any(|x| matches_value(v, x))),
        Filter::Cmp { path, op, value } => match op {
            CmpOp::Eq => any_value(doc, path, |v| matches_value(v, value)),
            CmpOp::Ne => !any_value(doc, path, |v| matches_value(v, value)),
            CmpOp::Gt => any_value(doc, path, |v| cmp_any(v, value, |o| o == Ordering::Greater)),
            CmpOp::Gte => any_value(doc, path, |v| cmp_any(v, value, |o| o != Ordering::Less)),
            CmpOp::Lt => any_value(doc, path, |v| cmp_any(v, value, |o| o == Ordering::Less)),
            CmpOp::Lte => any_value(doc, path, |v| cmp_any(v, value, |o| o != Ordering::Greater)),
        },
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            let mut re = regex::RegexBuilder::new(pattern);
            re.case_insensitive(*case_insensitive);
            let Ok(r) = re.build() else { return false };
            any_value(doc, path, |v| match v {
                Some(Bson::String(s)) => r.is_match(s),
                Some(Bson::Array(items)) => items.iter().any(|x| matches!(x, Bson::String(s) if r.is_match(s))),
                _ => false,
            })
        }
    }
}

// A path with no value at all is tested once as missing.
fn any_value(doc: &Document, path: &str, pred: impl Fn(Option<&Bson>) -> bool) -> bool {
    let values = get_values(doc, path);
    if values.is_empty() { pred(None) } else { values.into_iter().any(|v| pred(Some(v))) }
}

/// Equality as the store applies it: a missing field equals `null`, and an array field
/// matches when the whole array or any element equals `target`.
pub fn matches_value(field: Option<&Bson>, target: &Bson) -> bool {
    match field {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|x| bson_equal(x, target))
        }
        Some(v) => bson_equal(v, target),
    }
}

fn cmp_any(field: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match field {
        Some(Bson::Array(items)) => items.iter().any(|x| comparable(x, target) && accept(compare_bson(x, target))),
        Some(v) => comparable(v, target) && accept(compare_bson(v, target)),
        None => false,
    }
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b)) || std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn segments(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let segs: Vec<&str> = path.split('.').collect();
    (segs.len() <= MAX_PATH_DEPTH).then_some(segs)
}

/// Value at a dotted path through embedded documents only. Use [`get_values`] when the path
/// may cross an array.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let segs = segments(path)?;
    let (first, rest) = segs.split_first()?;
    let mut cur = doc.get(*first);
    for part in rest {
        match cur {
            Some(Bson::Document(d)) => cur = d.get(*part),
            _ => return None,
        }
    }
    cur
}

/// Every value a dotted path reaches. Arrays met before the last segment are crossed
/// element-wise (`author.name` over a joined `author` array yields each name), and a numeric
/// segment also indexes into the array.
pub fn get_values<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    if let Some(segs) = segments(path)
        && let Some((first, rest)) = segs.split_first()
    {
        collect_values(doc.get(*first), rest, &mut out);
    }
    out
}

fn collect_values<'a>(cur: Option<&'a Bson>, rest: &[&str], out: &mut Vec<&'a Bson>) {
    let Some(v) = cur else { return };
    let Some((head, tail)) = rest.split_first() else {
        out.push(v);
        return;
    };
    match v {
        Bson::Document(d) => collect_values(d.get(*head), tail, out),
        Bson::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                collect_values(items.get(idx), tail, out);
            }
            for item in items {
                if let Bson::Document(d) = item {
                    collect_values(d.get(*head), tail, out);
                }
            }
        }
        _ => {}
    }
}

/// Writes `value` at a dotted path, creating intermediate documents. Returns whether the
/// stored value changed.
pub fn set_path(root: &mut Document, path: &str, value: Bson) -> bool {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            let changed = cur.get(seg) != Some(&value);
            cur.insert(seg.to_string(), value);
            return changed;
        }
        if !matches!(cur.get(seg), Some(Bson::Document(_))) {
            cur.insert(seg.to_string(), Bson::Document(Document::new()));
        }
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    false
}

/// Removes a dotted path, descending into every document element of an array on the way.
pub fn unset_path(root: &mut Document, path: &str) -> bool {
    segments(path).is_some_and(|segs| unset_segments(root, &segs))
}

fn unset_segments(doc: &mut Document, segs: &[&str]) -> bool {
    let Some((head, rest)) = segs.split_first() else { return false };
    if rest.is_empty() {
        return doc.remove(*head).is_some();
    }
    match doc.get_mut(*head) {
        Some(Bson::Document(sub)) => unset_segments(sub, rest),
        Some(Bson::Array(items)) => {
            let mut removed = false;
            for item in items {
                if let Bson::Document(sub) = item {
                    removed |= unset_segments(sub, rest);
                }
            }
            removed
        }
        _ => false,
    }
}

// Copies one included path from `src` into `out`, merging with what earlier paths copied.
// Arrays keep only their document elements, each projected to the remaining path.
fn include_segments(src: &Document, out: &mut Document, segs: &[&str]) {
    let Some((head, rest)) = segs.split_first() else { return };
    let Some(v) = src.get(*head) else { return };
    if rest.is_empty() {
        out.insert(*head, v.clone());
        return;
    }
    match v {
        Bson::Document(sub) => {
            let mut target = match out.remove(*head) {
                Some(Bson::Document(d)) => d,
                _ => Document::new(),
            };
            include_segments(sub, &mut target, rest);
            out.insert(*head, Bson::Document(target));
        }
        Bson::Array(items) => {
            let mut previous = match out.remove(*head) {
                Some(Bson::Array(a)) => a.into_iter(),
                _ => Vec::new().into_iter(),
            };
            let mut projected = Vec::new();
            for item in items {
                if let Bson::Document(sub) = item {
                    let mut target = match previous.next() {
                        Some(Bson::Document(d)) => d,
                        _ => Document::new(),
                    };
                    include_segments(sub, &mut target, rest);
                    projected.push(Bson::Document(target));
                }
            }
            out.insert(*head, Bson::Array(projected));
        }
        _ => {}
    }
}

pub fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

const fn as_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

const fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

#[allow(clippy::float_cmp)]
pub fn bson_equal(a: &Bson, b: &Bson) -> bool {
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return x == y;
    }
    if is_num(a) && is_num(b) {
        return match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
    }
    a == b
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return x.cmp(&y);
    }
    if is_num(a) && is_num(b) {
        return as_f64(a).unwrap_or(f64::NAN).total_cmp(&as_f64(b).unwrap_or(f64::NAN));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// Cross-type order used by the store: null < numbers < strings < documents < arrays < ...
const fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::Symbol(_) | Bson::String(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 13,
        Bson::MaxKey => 255,
    }
}

/// # Errors
/// Returns `StoreError::InvalidQuery` for an empty path or one deeper than `MAX_PATH_DEPTH`.
pub fn check_path(path: &str) -> Result<(), StoreError> {
    if segments(path).is_none() {
        return Err(StoreError::InvalidQuery(format!(
            "field path '{path}' is empty or deeper than {MAX_PATH_DEPTH} segments"
        )));
    }
    Ok(())
}

/// Rejects sorts the store will not run.
///
/// # Errors
/// Returns `StoreError::InvalidQuery` for more than `MAX_SORT_FIELDS` keys or a bad path.
pub fn check_sort(sort: &[SortSpec]) -> Result<(), StoreError> {
    if sort.len() > MAX_SORT_FIELDS {
        return Err(StoreError::InvalidQuery(format!(
            "sort has {} keys, at most {MAX_SORT_FIELDS} are allowed",
            sort.len()
        )));
    }
    sort.iter().try_for_each(|s| check_path(&s.field))
}

// An array sorts by its smallest element ascending and its largest descending. A path with
// no value, or only empty arrays, sorts as null.
fn sort_key<'a>(doc: &'a Document, field: &str, order: Order) -> &'a Bson {
    let mut keys = Vec::new();
    for v in get_values(doc, field) {
        match v {
            Bson::Array(items) => keys.extend(items.iter()),
            other => keys.push(other),
        }
    }
    let pick = match order {
        Order::Asc => keys.into_iter().min_by(|x, y| compare_bson(x, y)),
        Order::Desc => keys.into_iter().max_by(|x, y| compare_bson(x, y)),
    };
    pick.unwrap_or(&NULL)
}

pub fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for s in sort {
        let ord = compare_bson(sort_key(a, &s.field, s.order), sort_key(b, &s.field, s.order));
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

/// Applies an inclusive or exclusive projection. Dotted paths that cross an array apply to
/// each document element of it.
///
/// # Errors
/// Returns `StoreError::InvalidQuery` when inclusions and exclusions are mixed on fields
/// other than `_id`, or when more than `MAX_PROJECTION_FIELDS` fields are named.
pub fn apply_projection(doc: &Document, projection: &Projection) -> Result<Document, StoreError> {
    let fields = &projection.fields;
    if fields.len() > MAX_PROJECTION_FIELDS {
        return Err(StoreError::InvalidQuery(format!(
            "projection names {} fields, at most {MAX_PROJECTION_FIELDS} are allowed",
            fields.len()
        )));
    }
    fields.iter().try_for_each(|(f, _)| check_path(f))?;
    let id_flag = fields.iter().find(|(f, _)| f == "_id").map(|(_, keep)| *keep);
    let rest: Vec<&(String, bool)> = fields.iter().filter(|(f, _)| f != "_id").collect();
    let inclusive = rest.iter().any(|(_, keep)| *keep) || (rest.is_empty() && id_flag == Some(true));
    if inclusive && rest.iter().any(|(_, keep)| !*keep) {
        return Err(StoreError::InvalidQuery("cannot mix inclusion and exclusion in a projection".into()));
    }

    if inclusive {
        let mut out = Document::new();
        if id_flag != Some(false)
            && let Some(id) = doc.get("_id")
        {
            out.insert("_id", id.clone());
        }
        for (f, _) in rest {
            let segs: Vec<&str> = f.split('.').collect();
            include_segments(doc, &mut out, &segs);
        }
        Ok(out)
    } else {
        let mut out = doc.clone();
        for (f, _) in rest {
            unset_path(&mut out, f);
        }
        if id_flag == Some(false) {
            out.remove("_id");
        }
        Ok(out)
    }
}

/// Join predicate of a lookup: missing and `null` match each other, arrays on either side
/// match element-wise.
pub fn lookup_matches(local: Option<&Bson>, foreign: Option<&Bson>) -> bool {
    let local = local.unwrap_or(&Bson::Null);
    match local {
        Bson::Array(items) => items.iter().any(|x| matches_value(foreign, x)),
        v => matches_value(foreign, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn missing_field_counts_as_null() {
        let d = doc! { "bookId": 1, "rating": Bson::Null };
        let ne_null = Filter::Cmp { path: "rating".into(), op: CmpOp::Ne, value: Bson::Null };
        assert!(!eval_filter(&d, &ne_null));
        assert!(!eval_filter(&doc! { "bookId": 1 }, &ne_null));
        assert!(eval_filter(&doc! { "rating": 4 }, &ne_null));
    }

    #[test]
    fn numeric_equality_across_types() {
        let d = doc! { "n": 4_i64 };
        assert!(eval_filter(&d, &Filter::Cmp { path: "n".into(), op: CmpOp::Eq, value: Bson::Double(4.0) }));
        assert!(eval_filter(&d, &Filter::Cmp { path: "n".into(), op: CmpOp::Gt, value: Bson::Int32(3) }));
        assert!(!eval_filter(&d, &Filter::Cmp { path: "n".into(), op: CmpOp::Gt, value: "3".into() }));
    }

    #[test]
    fn sort_puts_missing_first_ascending() {
        let a = doc! { "k": 2 };
        let b = doc! {};
        assert_eq!(compare_docs(&a, &b, &[SortSpec::asc("k")]), Ordering::Greater);
        assert_eq!(compare_docs(&a, &b, &[SortSpec::desc("k")]), Ordering::Less);
    }

    #[test]
    fn inclusive_projection_keeps_id_unless_excluded() {
        let d = doc! { "_id": 1, "title": "Dune", "meta": { "pages": 412, "lang": "en" } };
        let p = Projection::new().include("title").include("meta.pages");
        assert_eq!(apply_projection(&d, &p).unwrap(), doc! { "_id": 1, "title": "Dune", "meta": { "pages": 412 } });
        let p = Projection::new().include("title").exclude("_id");
        assert_eq!(apply_projection(&d, &p).unwrap(), doc! { "title": "Dune" });
    }

    #[test]
    fn exclusive_projection_and_mixed_error() {
        let d = doc! { "_id": 1, "username": "ann", "passwordHash": "x" };
        let p = Projection::new().exclude("passwordHash");
        assert_eq!(apply_projection(&d, &p).unwrap(), doc! { "_id": 1, "username": "ann" });
        let p = Projection::new().include("username").exclude("passwordHash");
        assert!(apply_projection(&d, &p).is_err());
    }

    #[test]
    fn lookup_null_and_array_semantics() {
        assert!(lookup_matches(None, None));
        assert!(lookup_matches(Some(&Bson::Null), None));
        assert!(!lookup_matches(Some(&Bson::Int32(1)), None));
        let ids = Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]);
        assert!(lookup_matches(Some(&ids), Some(&Bson::Int32(2))));
        assert!(lookup_matches(Some(&Bson::Int32(2)), Some(&ids)));
    }

    #[test]
    fn set_and_unset_nested_paths() {
        let mut d = doc! { "a": 1 };
        assert!(set_path(&mut d, "b.c", Bson::Int32(2)));
        assert!(!set_path(&mut d, "b.c", Bson::Int32(2)));
        assert_eq!(d, doc! { "a": 1, "b": { "c": 2 } });
        assert!(unset_path(&mut d, "b.c"));
        assert!(!unset_path(&mut d, "x.y"));
    }

    #[test]
    fn dotted_filter_crosses_arrays_of_documents() {
        let d = doc! { "author": [ { "name": "Tolstoy" }, { "name": "Chekhov" } ], "tags": ["a", "b"] };
        let eq = |path: &str, value: Bson| Filter::Cmp { path: path.into(), op: CmpOp::Eq, value };
        assert!(eval_filter(&d, &eq("author.name", "Chekhov".into())));
        assert!(!eval_filter(&d, &eq("author.name", "Gogol".into())));
        assert!(eval_filter(&d, &eq("author.0.name", "Tolstoy".into())));
        assert!(eval_filter(&d, &Filter::Exists { path: "author.name".into(), exists: true }));
        assert!(eval_filter(&d, &Filter::Exists { path: "author.bio".into(), exists: false }));
        assert!(eval_filter(&d, &eq("author.bio", Bson::Null)));
        assert_eq!(get_values(&d, "author.name").len(), 2);
        assert!(get_path(&d, "author.name").is_none());
    }

    #[test]
    fn projection_applies_to_each_joined_element() {
        let d = doc! {
            "_id": 1,
            "title": "War and Peace",
            "author": [ { "_id": 7, "name": "Tolstoy", "bio": "long" }, "stray" ],
        };
        let p = Projection::new().include("title").include("author.name");
        assert_eq!(
            apply_projection(&d, &p).unwrap(),
            doc! { "_id": 1, "title": "War and Peace", "author": [ { "name": "Tolstoy" } ] }
        );
        let p = Projection::new().include("author.name").include("author._id");
        assert_eq!(apply_projection(&d, &p).unwrap(), doc! { "_id": 1, "author": [ { "name": "Tolstoy", "_id": 7 } ] });
        let p = Projection::new().exclude("author.bio");
        assert_eq!(
            apply_projection(&d, &p).unwrap(),
            doc! { "_id": 1, "title": "War and Peace", "author": [ { "_id": 7, "name": "Tolstoy" }, "stray" ] }
        );
    }

    #[test]
    fn array_fields_sort_by_their_extreme_element() {
        let a = doc! { "k": [1, 10] };
        let b = doc! { "k": 5 };
        // ascending compares 1 with 5, descending compares 10 with 5
        assert_eq!(compare_docs(&a, &b, &[SortSpec::asc("k")]), Ordering::Less);
        assert_eq!(compare_docs(&a, &b, &[SortSpec::desc("k")]), Ordering::Less);
        let joined = doc! { "author": [ { "name": "Chekhov" } ] };
        let other = doc! { "author": [ { "name": "Bunin" } ] };
        assert_eq!(compare_docs(&joined, &other, &[SortSpec::asc("author.name")]), Ordering::Greater);
        let empty = doc! { "k": [] };
        assert_eq!(compare_docs(&empty, &b, &[SortSpec::asc("k")]), Ordering::Less);
    }

    #[test]
    fn limits_are_errors_not_truncation() {
        let sort: Vec<SortSpec> = (0..MAX_SORT_FIELDS).map(|i| SortSpec::asc(format!("k{i}"))).collect();
        assert!(check_sort(&sort).is_ok());
        let mut over = sort;
        over.push(SortSpec::asc("extra"));
        assert!(matches!(check_sort(&over), Err(StoreError::InvalidQuery(_))));

        let d = doc! { "_id": 1, "f0": 0 };
        let mut p = Projection::new();
        for i in 0..MAX_PROJECTION_FIELDS {
            p = p.include(format!("f{i}"));
        }
        assert_eq!(apply_projection(&d, &p).unwrap(), doc! { "_id": 1, "f0": 0 });
        let p = p.include("one_more");
        assert!(matches!(apply_projection(&d, &p), Err(StoreError::InvalidQuery(_))));

        let deep = vec!["x"; MAX_PATH_DEPTH + 1].join(".");
        assert!(check_path(&vec!["x"; MAX_PATH_DEPTH].join(".")).is_ok());
        assert!(check_sort(&[SortSpec::asc(deep.clone())]).is_err());
        assert!(apply_projection(&d, &Projection::new().exclude(deep)).is_err());
    }
}
