use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    #[must_use]
    pub const fn direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Ordered `field -> include` flags.
///
/// A projection is either inclusive (every flag `true`) or exclusive (every flag `false`);
/// `_id` is the one field that may be excluded from an inclusive projection. Fields not
/// mentioned keep their default: `_id` is always returned unless excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub fields: Vec<(String, bool)>,
}

impl Projection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), true));
        self
    }

    #[must_use]
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), false));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Left-outer join: attach every document of `from` whose `foreign_field` equals this
/// document's `local_field` as an array under `as_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
}

impl Lookup {
    pub fn new(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
        }
    }
}

/// Options for `QueryComposer::find` and friends.
///
/// Semantics:
/// - `projection`: applied to every returned document on both the plain and the joined path.
/// - `sort`: empty means the store's natural order; nothing stronger is promised.
/// - `limit`: `0` means unbounded. There is no implicit default.
/// - `populate`: when non-empty the read runs as the pipeline
///   match → lookup (in order) → sort → limit → project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub projection: Option<Projection>,
    #[serde(default)]
    pub sort: Vec<SortSpec>,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub populate: Vec<Lookup>,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, spec: SortSpec) -> Self {
        self.sort.push(spec);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_populate(mut self, lookup: Lookup) -> Self {
        self.populate.push(lookup);
        self
    }

    /// The projection, if one was given and it names at least one field.
    #[must_use]
    pub fn effective_projection(&self) -> Option<&Projection> {
        self.projection.as_ref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Accumulator {
    Avg(String),
    Sum(String),
    Count,
}

/// `$group` stage: `key` is a field path, or `None` to fold every input into one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub key: Option<String>,
    pub outputs: Vec<(String, Accumulator)>,
}

impl Group {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn by(key: impl Into<String>) -> Self {
        Self { key: Some(key.into()), outputs: Vec::new() }
    }

    #[must_use]
    pub fn avg(mut self, output: impl Into<String>, field: impl Into<String>) -> Self {
        self.outputs.push((output.into(), Accumulator::Avg(field.into())));
        self
    }

    #[must_use]
    pub fn sum(mut self, output: impl Into<String>, field: impl Into<String>) -> Self {
        self.outputs.push((output.into(), Accumulator::Sum(field.into())));
        self
    }

    #[must_use]
    pub fn count(mut self, output: impl Into<String>) -> Self {
        self.outputs.push((output.into(), Accumulator::Count));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    Match(Document),
    Lookup(Lookup),
    Sort(Vec<SortSpec>),
    Limit(u64),
    Project(Projection),
    Group(Group),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}
