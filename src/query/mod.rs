// Submodules for separation of concerns
mod compose;
pub mod eval;
mod filter;
pub mod pipeline;
mod types;

pub use compose::QueryComposer;
pub use eval::{apply_projection, compare_bson, eval_filter, get_path, get_values};
pub use filter::{CmpOp, Filter};
pub use pipeline::build_pipeline;
pub use types::{
    Accumulator, DeleteReport, FindOptions, Group, Lookup, Order, Projection, SortSpec, Stage,
    UpdateReport,
};
