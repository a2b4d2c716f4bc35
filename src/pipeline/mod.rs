// Quarterly financials pipeline: extract, normalize, check, load

pub mod extract;
pub mod integrity;
pub mod load;
pub mod normalize;
pub mod orchestrator;

pub use load::{apply, LoadMethod};
pub use normalize::{normalize, normalize_with_report, FieldIssue, NormalizeReport};
pub use orchestrator::{FileOutcome, Pipeline, PipelineResult};
