//! Data types flowing through the step chain.

pub mod id;
pub mod interview;
pub mod research;
pub mod script;

pub use id::{Id, InterviewId, PostId, RunId};
pub use interview::{ImageConfig, Interview, WordRange};
pub use research::{
    OptimizedResearch, RankedSummary, ResearchPlan, ResearchResult, SearchHit, SourceMetadata,
    Summary, MAX_QUERIES,
};
pub use script::Script;
