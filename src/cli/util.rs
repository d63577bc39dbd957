use bson::{Bson, Document};

use crate::errors::{CatalogError, Result};
use crate::query::{Lookup, Order, Projection, SortSpec};

/// # Errors
/// `CatalogError::InvalidFilter` when `s` is not a JSON object.
pub fn parse_filter_json(s: &str) -> Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(s).map_err(|e| CatalogError::InvalidFilter(format!("{s}: {e}")))?;
    match Bson::try_from(value) {
        Ok(Bson::Document(d)) => Ok(d),
        Ok(_) => Err(CatalogError::InvalidFilter("filter must be a JSON object".into())),
        Err(e) => Err(CatalogError::InvalidFilter(e.to_string())),
    }
}

/// Parses `a:asc,b:desc`; `-a` and `+a` are accepted as shorthands.
///
/// # Errors
/// `CatalogError::InvalidFilter` for an unknown direction.
pub fn parse_sort(s: &str) -> Result<Vec<SortSpec>> {
    let mut specs = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (field, order) = match part.split_once(':') {
            Some((f, dir)) => match dir.trim().to_ascii_lowercase().as_str() {
                "asc" | "1" => (f.trim(), Order::Asc),
                "desc" | "-1" => (f.trim(), Order::Desc),
                other => return Err(CatalogError::InvalidFilter(format!("unknown sort direction '{other}'"))),
            },
            None => match part.strip_prefix('-') {
                Some(rest) => (rest, Order::Desc),
                None => (part.strip_prefix('+').unwrap_or(part), Order::Asc),
            },
        };
        specs.push(SortSpec { field: field.to_string(), order });
    }
    Ok(specs)
}

#[must_use]
pub fn parse_projection(s: &str) -> Projection {
    s.split(',').map(str::trim).filter(|p| !p.is_empty()).fold(Projection::new(), |p, field| {
        match field.strip_prefix('-') {
            Some(rest) => p.exclude(rest),
            None => p.include(field.strip_prefix('+').unwrap_or(field)),
        }
    })
}

/// # Errors
/// `CatalogError::InvalidFilter` unless `s` has exactly four non-empty `:`-separated parts.
pub fn parse_populate(s: &str) -> Result<Lookup> {
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    match parts.as_slice() {
        [from, local, foreign, as_field] if parts.iter().all(|p| !p.is_empty()) => {
            Ok(Lookup::new(*from, *local, *foreign, *as_field))
        }
        _ => Err(CatalogError::InvalidFilter(format!("populate '{s}' must be from:localField:foreignField:as"))),
    }
}

/// One NDJSON line in relaxed extended JSON.
#[must_use]
pub fn to_ndjson_line(doc: Document) -> String {
    Bson::Document(doc).into_relaxed_extjson().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_forms() {
        let specs = parse_sort("createdAt:desc, title , -rating").unwrap();
        assert_eq!(specs, vec![SortSpec::desc("createdAt"), SortSpec::asc("title"), SortSpec::desc("rating")]);
        assert!(parse_sort("title:sideways").is_err());
    }

    #[test]
    fn projection_forms() {
        let p = parse_projection("title,author,-_id");
        assert_eq!(p, Projection::new().include("title").include("author").exclude("_id"));
        assert!(parse_projection(" , ").is_empty());
    }

    #[test]
    fn populate_needs_four_parts() {
        assert_eq!(parse_populate("author:author:_id:author").unwrap(), Lookup::new("author", "author", "_id", "author"));
        assert!(parse_populate("author:author:_id").is_err());
        assert!(parse_populate("author::_id:author").is_err());
    }

    #[test]
    fn filter_accepts_extended_json() {
        let d = parse_filter_json(r#"{"_id": {"$oid": "507f1f77bcf86cd799439011"}, "n": 1}"#).unwrap();
        assert!(matches!(d.get("_id"), Some(Bson::ObjectId(_))));
        assert!(matches!(parse_filter_json("[1]"), Err(CatalogError::InvalidFilter(_))));
        assert!(matches!(parse_filter_json("{"), Err(CatalogError::InvalidFilter(_))));
    }
}
