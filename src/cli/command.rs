/// Programmatic form of the `libra-catalog` subcommands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Find {
        collection: String,
        /// JSON object, extended JSON allowed (`{"_id": {"$oid": "..."}}`).
        filter_json: Option<String>,
        /// `field:asc,other:desc`, or `-field` for descending.
        sort: Option<String>,
        limit: Option<u64>,
        /// `a,b` includes, `-c` excludes.
        project: Option<String>,
        /// Each `from:localField:foreignField:as`.
        populate: Vec<String>,
    },
    FindOne {
        collection: String,
        id: String,
        project: Option<String>,
        populate: Vec<String>,
    },
    Recalc {
        book_id: String,
    },
    RecalcAll,
    Ping,
}
