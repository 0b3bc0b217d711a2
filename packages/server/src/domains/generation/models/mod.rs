mod artifact;
mod content;
mod pipeline_run;

pub use artifact::Artifact;
pub use content::{ContentJob, ContentType, GenerationRequest};
pub use pipeline_run::{PipelineRun, PipelineStatus};
