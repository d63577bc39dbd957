mod command;
mod runner;
mod util;

pub use command::Command;
pub use runner::run;
pub use util::{parse_filter_json, parse_populate, parse_projection, parse_sort, to_ndjson_line};
