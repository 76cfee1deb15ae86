//! Sweep mechanics shared by the commands: fast/slow scan selection and
//! bounded fan-out over targets.

pub mod dual_path;
pub mod fanout;

pub use dual_path::{classify, fetch_scope, FastOutcome, FetchMethod};
