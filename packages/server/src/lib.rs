// Blog Post Generation - API Core
//
// Backend for researching and writing blog posts: generation requests become
// deduplicated jobs, workers run them through the research step chain, and
// each post's pipeline run reports progress.
//
// Domain logic lives in domains/*, shared infrastructure (the job queue) in
// kernel/.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
