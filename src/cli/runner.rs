use bson::doc;
use serde_json::json;

use super::command::Command;
use super::util::{parse_filter_json, parse_populate, parse_projection, parse_sort, to_ndjson_line};
use crate::connection::Connection;
use crate::errors::Result;
use crate::query::{FindOptions, QueryComposer};
use crate::rating::RatingAggregator;

fn find_options(
    sort: Option<&str>,
    limit: Option<u64>,
    project: Option<&str>,
    populate: &[String],
) -> Result<FindOptions> {
    let mut opts = FindOptions::new();
    if let Some(s) = sort {
        opts.sort = parse_sort(s)?;
    }
    opts.limit = limit.unwrap_or(0);
    if let Some(p) = project {
        opts.projection = Some(parse_projection(p));
    }
    opts.populate = populate.iter().map(|p| parse_populate(p)).collect::<Result<_>>()?;
    Ok(opts)
}

/// Runs `cmd` against `conn` and returns its output as NDJSON lines.
///
/// # Errors
/// Whatever the underlying operation reports; argument errors are `InvalidFilter`.
pub async fn run(conn: &Connection, cmd: Command) -> Result<Vec<String>> {
    match cmd {
        Command::Find { collection, filter_json, sort, limit, project, populate } => {
            let filter = match filter_json.as_deref() {
                Some(s) if !s.trim().is_empty() => parse_filter_json(s)?,
                _ => doc! {},
            };
            let opts = find_options(sort.as_deref(), limit, project.as_deref(), &populate)?;
            let docs = QueryComposer::new(conn.clone()).find(&collection, filter, &opts).await?;
            Ok(docs.into_iter().map(to_ndjson_line).collect())
        }
        Command::FindOne { collection, id, project, populate } => {
            let opts = find_options(None, None, project.as_deref(), &populate)?;
            let doc = QueryComposer::new(conn.clone()).find_by_id(&collection, &id, &opts).await?;
            Ok(doc.into_iter().map(to_ndjson_line).collect())
        }
        Command::Recalc { book_id } => {
            let rating = RatingAggregator::new(conn.clone()).recalc_rating(&book_id).await?;
            Ok(vec![json!({ "bookId": book_id, "rating": rating }).to_string()])
        }
        Command::RecalcAll => {
            let n = RatingAggregator::new(conn.clone()).recalc_all().await?;
            Ok(vec![json!({ "recalculated": n }).to_string()])
        }
        Command::Ping => {
            conn.ping().await?;
            Ok(vec![json!({ "ok": 1, "backend": conn.backend_name() }).to_string()])
        }
    }
}
