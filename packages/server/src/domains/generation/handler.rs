//! Executes generation jobs.
//!
//! A job first makes sure its post has a script (running the step chain at
//! most once per post at a time), then writes its own piece of content from
//! that script and stores it as an artifact.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use research::{Checkpoint, Interview, PipelineError, PostId, Script, Step, StepChain};

use super::dispatcher::GenerationDispatcher;
use super::keys;
use super::models::{Artifact, ContentJob};
use super::prompts::{self, ImageBrief};
use super::stores::PostStore;
use crate::kernel::jobs::{ErrorKind, Job, JobError, JobHandler};

type ScriptLocks = std::sync::Mutex<HashMap<PostId, Arc<tokio::sync::Mutex<()>>>>;

pub struct GenerationHandler {
    chain: StepChain,
    posts: Arc<dyn PostStore>,
    dispatcher: Arc<GenerationDispatcher>,
    script_locks: ScriptLocks,
}

impl GenerationHandler {
    pub fn new(chain: StepChain, posts: Arc<dyn PostStore>, dispatcher: Arc<GenerationDispatcher>) -> Self {
        Self {
            chain,
            posts,
            dispatcher,
            script_locks: ScriptLocks::default(),
        }
    }

    async fn generate(
        &self,
        post_id: PostId,
        job: &Job,
        content: &ContentJob,
        checkpoint: &RunCheckpoint<'_>,
    ) -> Result<(), JobError> {
        let interview = self
            .posts
            .interview(post_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| JobError::non_retryable(format!("post {} has no interview", post_id)))?;

        let script = self.script_for(post_id, &interview, checkpoint).await?;

        checkpoint
            .check(content.content_type().as_str(), content.content_type().label())
            .await?;
        let body = self.write(content, &interview, &script).await?;

        let key = keys::artifact_key(content, job.idempotency_key.as_deref());
        self.posts
            .save_artifact(&Artifact::new(post_id, key.clone(), content.content_type(), body))
            .await
            .map_err(store_error)?;

        info!(job_id = %job.id, post_id = %post_id, artifact = %key, "content written");
        Ok(())
    }

    /// The post's script, generated on first use.
    async fn script_for(
        &self,
        post_id: PostId,
        interview: &Interview,
        checkpoint: &RunCheckpoint<'_>,
    ) -> Result<Script, JobError> {
        if let Some(script) = self.posts.script(post_id).await.map_err(store_error)? {
            debug!(post_id = %post_id, "using stored script");
            return Ok(script);
        }

        let lock = self.script_lock(post_id);
        let guard = lock.lock().await;
        let script = self.script_under_lock(post_id, interview, checkpoint).await;
        drop(guard);

        self.release_script_lock(post_id, &lock);
        script
    }

    async fn script_under_lock(
        &self,
        post_id: PostId,
        interview: &Interview,
        checkpoint: &RunCheckpoint<'_>,
    ) -> Result<Script, JobError> {
        // Another job may have finished the chain while we waited.
        if let Some(script) = self.posts.script(post_id).await.map_err(store_error)? {
            return Ok(script);
        }
        self.research(post_id, interview, checkpoint).await
    }

    async fn research(
        &self,
        post_id: PostId,
        interview: &Interview,
        checkpoint: &RunCheckpoint<'_>,
    ) -> Result<Script, JobError> {
        let output = self.chain.run(interview, checkpoint).await?;

        self.posts
            .save_script(post_id, &output.script)
            .await
            .map_err(store_error)?;

        info!(
            post_id = %post_id,
            title = %output.script.title,
            sections = output.script.outline.len(),
            sources = output.script.sources.len(),
            "script generated"
        );
        Ok(output.script)
    }

    async fn write(&self, content: &ContentJob, interview: &Interview, script: &Script) -> Result<String, JobError> {
        let (system, user) = prompts::content_prompt(content, interview, script);
        let text = self.chain.generate(system, &user).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::permanent(
                self.chain.generator().provider(),
                format!("empty {} output", content.content_type()),
            )
            .into());
        }

        match content {
            ContentJob::Image { prompt, section } => {
                let brief = ImageBrief {
                    request: prompt,
                    section: section.as_deref(),
                    style: interview.images.style.as_deref(),
                    prompt: text.to_string(),
                    alt_text: prompts::alt_text(text),
                };
                serde_json::to_string(&brief)
                    .map_err(|e| JobError::non_retryable(format!("could not encode image brief: {}", e)))
            }
            _ => Ok(text.to_string()),
        }
    }

    fn script_lock(&self, post_id: PostId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.script_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(post_id).or_default().clone()
    }

    /// Drops the post's lock entry once no other job holds or waits on it.
    fn release_script_lock(&self, post_id: PostId, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.script_locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(&post_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(&post_id);
        }
    }
}

#[async_trait]
impl JobHandler for GenerationHandler {
    async fn execute(&self, job: &Job, cancel: CancellationToken) -> Result<(), JobError> {
        let content: ContentJob = serde_json::from_value(job.args.clone())
            .map_err(|e| JobError::non_retryable(format!("invalid job args: {}", e)))?;
        let post_id = PostId::from_uuid(job.reference_id);

        let checkpoint = RunCheckpoint {
            dispatcher: &self.dispatcher,
            job,
            cancel: &cancel,
        };

        match self.generate(post_id, job, &content, &checkpoint).await {
            // Stopped by worker shutdown rather than by the run.
            Err(error) if error.kind == ErrorKind::Cancelled && cancel.is_cancelled() => {
                Err(JobError::shutdown())
            }
            result => result,
        }
    }
}

/// Stops a job once its run is terminal or the worker is shutting down,
/// and keeps the run's label on the step being started.
struct RunCheckpoint<'a> {
    dispatcher: &'a GenerationDispatcher,
    job: &'a Job,
    cancel: &'a CancellationToken,
}

impl RunCheckpoint<'_> {
    async fn check(&self, step: &str, label: &str) -> research::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { step: step.to_string() });
        }

        match self.dispatcher.begin_step(self.job, label).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PipelineError::Cancelled { step: step.to_string() }),
            Err(e) => Err(PipelineError::transient("pipeline-runs", e)),
        }
    }
}

#[async_trait]
impl Checkpoint for RunCheckpoint<'_> {
    async fn before_step(&self, step: Step) -> research::Result<()> {
        self.check(step.name(), step.label()).await
    }
}

impl From<PipelineError> for JobError {
    fn from(e: PipelineError) -> Self {
        if e.is_cancelled() {
            JobError::cancelled(e.to_string())
        } else if e.is_retryable() {
            JobError::retryable(e.to_string())
        } else {
            JobError::non_retryable(e.to_string())
        }
    }
}

fn store_error(e: anyhow::Error) -> JobError {
    JobError::retryable(format!("store error: {:#}", e))
}
