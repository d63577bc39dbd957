use bson::{Bson, Document, doc};

use super::types::{Accumulator, FindOptions, Group, Lookup, Projection, SortSpec, Stage};

/// Stages for a joined read, always in the order
/// match → lookup (in `populate` order) → sort → limit → project.
///
/// Sort, limit and project are emitted only when present.
#[must_use]
pub fn build_pipeline(filter: Document, opts: &FindOptions) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(opts.populate.len() + 4);
    stages.push(Stage::Match(filter));
    stages.extend(opts.populate.iter().cloned().map(Stage::Lookup));
    if !opts.sort.is_empty() {
        stages.push(Stage::Sort(opts.sort.clone()));
    }
    if opts.limit > 0 {
        stages.push(Stage::Limit(opts.limit));
    }
    if let Some(p) = opts.effective_projection() {
        stages.push(Stage::Project(p.clone()));
    }
    stages
}

#[must_use]
pub fn sort_document(specs: &[SortSpec]) -> Document {
    let mut out = Document::new();
    for s in specs {
        out.insert(s.field.clone(), s.order.direction());
    }
    out
}

#[must_use]
pub fn projection_document(projection: &Projection) -> Document {
    let mut out = Document::new();
    for (field, keep) in &projection.fields {
        out.insert(field.clone(), i32::from(*keep));
    }
    out
}

fn lookup_document(l: &Lookup) -> Document {
    doc! {
        "from": l.from.clone(),
        "localField": l.local_field.clone(),
        "foreignField": l.foreign_field.clone(),
        "as": l.as_field.clone(),
    }
}

fn group_document(g: &Group) -> Document {
    let mut out = doc! { "_id": g.key.as_ref().map_or(Bson::Null, |k| Bson::String(format!("${k}"))) };
    for (name, acc) in &g.outputs {
        let expr = match acc {
            Accumulator::Avg(field) => doc! { "$avg": format!("${field}") },
            Accumulator::Sum(field) => doc! { "$sum": format!("${field}") },
            Accumulator::Count => doc! { "$sum": 1 },
        };
        out.insert(name.clone(), expr);
    }
    out
}

impl Stage {
    /// Native aggregation-stage document, as sent to the server.
    #[must_use]
    pub fn to_document(&self) -> Document {
        match self {
            Self::Match(filter) => doc! { "$match": filter.clone() },
            Self::Lookup(l) => doc! { "$lookup": lookup_document(l) },
            Self::Sort(specs) => doc! { "$sort": sort_document(specs) },
            Self::Limit(n) => doc! { "$limit": i64::try_from(*n).unwrap_or(i64::MAX) },
            Self::Project(p) => doc! { "$project": projection_document(p) },
            Self::Group(g) => doc! { "$group": group_document(g) },
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Lookup(_) => "$lookup",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Project(_) => "$project",
            Self::Group(_) => "$group",
        }
    }
}
