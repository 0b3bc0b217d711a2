use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use research::{Interview, PostId, Script};

use crate::domains::generation::models::{Artifact, ContentType};

/// Read/write contract for the post records the pipeline works on.
///
/// The interview is input only; the script and artifacts are written by
/// generation jobs, last write wins.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn interview(&self, post_id: PostId) -> Result<Option<Interview>>;

    /// Stores the interview and drops any script built from a previous one.
    async fn save_interview(&self, post_id: PostId, interview: &Interview) -> Result<()>;

    /// Research script cached for the post, if one was generated.
    async fn script(&self, post_id: PostId) -> Result<Option<Script>>;

    async fn save_script(&self, post_id: PostId, script: &Script) -> Result<()>;

    async fn save_artifact(&self, artifact: &Artifact) -> Result<()>;

    async fn artifacts(&self, post_id: PostId) -> Result<Vec<Artifact>>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct PostRecord {
    interview: Option<Interview>,
    script: Option<Script>,
    artifacts: Vec<Artifact>,
}

#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<HashMap<PostId, PostRecord>>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn posts(&self) -> MutexGuard<'_, HashMap<PostId, PostRecord>> {
        self.posts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn interview(&self, post_id: PostId) -> Result<Option<Interview>> {
        Ok(self
            .posts()
            .get(&post_id)
            .and_then(|post| post.interview.clone()))
    }

    async fn save_interview(&self, post_id: PostId, interview: &Interview) -> Result<()> {
        let mut posts = self.posts();
        let post = posts.entry(post_id).or_default();
        post.interview = Some(interview.clone());
        post.script = None;
        Ok(())
    }

    async fn script(&self, post_id: PostId) -> Result<Option<Script>> {
        Ok(self.posts().get(&post_id).and_then(|post| post.script.clone()))
    }

    async fn save_script(&self, post_id: PostId, script: &Script) -> Result<()> {
        self.posts().entry(post_id).or_default().script = Some(script.clone());
        Ok(())
    }

    async fn save_artifact(&self, artifact: &Artifact) -> Result<()> {
        let mut posts = self.posts();
        let artifacts = &mut posts.entry(artifact.post_id).or_default().artifacts;
        match artifacts.iter_mut().find(|a| a.key == artifact.key) {
            Some(existing) => *existing = artifact.clone(),
            None => artifacts.push(artifact.clone()),
        }
        Ok(())
    }

    async fn artifacts(&self, post_id: PostId) -> Result<Vec<Artifact>> {
        Ok(self
            .posts()
            .get(&post_id)
            .map(|post| post.artifacts.clone())
            .unwrap_or_default())
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(FromRow)]
struct ArtifactRow {
    post_id: Uuid,
    key: String,
    content_type: String,
    body: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = anyhow::Error;

    fn try_from(row: ArtifactRow) -> Result<Self> {
        Ok(Self {
            post_id: PostId::from_uuid(row.post_id),
            key: row.key,
            content_type: row.content_type.parse::<ContentType>()?,
            body: row.body,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PostgresPostStore {
    pool: PgPool,
}

impl PostgresPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PostgresPostStore {
    async fn interview(&self, post_id: PostId) -> Result<Option<Interview>> {
        let interview = sqlx::query_scalar::<_, Json<Interview>>(
            "SELECT interview FROM posts WHERE id = $1",
        )
        .bind(post_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(interview.map(|Json(interview)| interview))
    }

    async fn save_interview(&self, post_id: PostId, interview: &Interview) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, interview)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET interview = EXCLUDED.interview,
                script = NULL,
                updated_at = NOW()
            "#,
        )
        .bind(post_id.into_uuid())
        .bind(Json(interview))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn script(&self, post_id: PostId) -> Result<Option<Script>> {
        let script = sqlx::query_scalar::<_, Option<Json<Script>>>(
            "SELECT script FROM posts WHERE id = $1",
        )
        .bind(post_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(script.flatten().map(|Json(script)| script))
    }

    async fn save_script(&self, post_id: PostId, script: &Script) -> Result<()> {
        sqlx::query("UPDATE posts SET script = $2, updated_at = NOW() WHERE id = $1")
            .bind(post_id.into_uuid())
            .bind(Json(script))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_artifact(&self, artifact: &Artifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_artifacts (post_id, key, content_type, body, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (post_id, key) DO UPDATE
            SET content_type = EXCLUDED.content_type,
                body = EXCLUDED.body,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(artifact.post_id.into_uuid())
        .bind(&artifact.key)
        .bind(artifact.content_type.as_str())
        .bind(&artifact.body)
        .bind(artifact.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn artifacts(&self, post_id: PostId) -> Result<Vec<Artifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT post_id, key, content_type, body, updated_at FROM post_artifacts \
             WHERE post_id = $1 ORDER BY updated_at",
        )
        .bind(post_id.into_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Artifact::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use research::testing::sample_interview;

    #[tokio::test]
    async fn artifacts_are_last_write_wins() {
        let store = MemoryPostStore::new();
        let post = PostId::new();

        store
            .save_artifact(&Artifact::new(post, "faq", ContentType::Faq, "first"))
            .await
            .unwrap();
        store
            .save_artifact(&Artifact::new(post, "faq", ContentType::Faq, "second"))
            .await
            .unwrap();
        store
            .save_artifact(&Artifact::new(post, "introduction", ContentType::Introduction, "hi"))
            .await
            .unwrap();

        let artifacts = store.artifacts(post).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].body, "second");
    }

    #[tokio::test]
    async fn interview_round_trips() {
        let store = MemoryPostStore::new();
        let post = PostId::new();
        assert!(store.interview(post).await.unwrap().is_none());

        let interview = sample_interview();
        store.save_interview(post, &interview).await.unwrap();
        let loaded = store.interview(post).await.unwrap().unwrap();
        assert_eq!(loaded.main_keyword, "online marketing");
        assert!(store.script(post).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_interview_drops_the_cached_script() {
        let store = MemoryPostStore::new();
        let post = PostId::new();
        store.save_interview(post, &sample_interview()).await.unwrap();
        let script = Script {
            title: "Guide to online marketing".to_string(),
            outline: vec!["What is online marketing".to_string()],
            body: "# Guide to online marketing".to_string(),
            language: "es".to_string(),
            sources: Vec::new(),
            prompt_hash: String::new(),
            generated_at: Utc::now(),
        };
        store.save_script(post, &script).await.unwrap();
        assert!(store.script(post).await.unwrap().is_some());

        store
            .save_interview(post, &Interview::new("recetas veganas"))
            .await
            .unwrap();

        assert!(store.script(post).await.unwrap().is_none());
        let loaded = store.interview(post).await.unwrap().unwrap();
        assert_eq!(loaded.main_keyword, "recetas veganas");
    }
}
