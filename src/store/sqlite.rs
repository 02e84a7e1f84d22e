//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as JSON arrays next to their precomputed norm, and
//! similarity is computed inside SQLite: `top_k` expands the stored and the
//! query vector with `json_each`, sums the pairwise products, and divides by
//! both norms, so ranking and the `LIMIT` happen in a single statement.
//! Scoring is linear in the vector dimension per row.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use super::{vector_norm, Store};
use crate::error::PersistenceError;
use crate::models::{
    CommitRecord, FileReference, Project, QuestionRecord, SourceRecord, SourceUpsert,
};

/// The query vector is expanded once into a materialized CTE keyed by
/// component index; each stored vector is then walked once and probes `q` by
/// key, so scoring a row is linear in the dimension.
const TOP_K_SQL: &str = r#"
    WITH q(k, v) AS MATERIALIZED (
        SELECT CAST(key AS INTEGER), value FROM json_each(?1)
    )
    SELECT r.file_name, r.summary, r.source_code,
           CASE WHEN r.embedding_norm > 0 AND ?2 > 0 THEN
               COALESCE((SELECT SUM(e.value * q.v)
                         FROM json_each(r.embedding) AS e
                         CROSS JOIN q ON q.k = e.key), 0.0)
               / (r.embedding_norm * ?2)
           ELSE 0.0 END AS similarity
    FROM source_code_embeddings AS r
    WHERE r.project_id = ?3 AND r.embedding IS NOT NULL
    ORDER BY similarity DESC, r.seq ASC
    LIMIT ?4
"#;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn source_from_row(row: &SqliteRow) -> Result<SourceRecord, PersistenceError> {
    let embedding: Option<String> = row.try_get("embedding")?;
    let embedding = match embedding {
        Some(json) => Some(serde_json::from_str::<Vec<f32>>(&json)?),
        None => None,
    };
    Ok(SourceRecord {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        summary: row.try_get("summary")?,
        source_code: row.try_get("source_code")?,
        content_hash: row.try_get("content_hash")?,
        embedding,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn question_from_row(row: &SqliteRow) -> Result<QuestionRecord, PersistenceError> {
    let refs: String = row.try_get("file_references")?;
    Ok(QuestionRecord {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        question: row.try_get("question")?,
        answer: row.try_get("answer")?,
        file_references: serde_json::from_str(&refs)?,
        created_at: row.try_get("created_at")?,
    })
}

fn commit_from_row(row: &SqliteRow) -> Result<CommitRecord, PersistenceError> {
    Ok(CommitRecord {
        project_id: row.try_get("project_id")?,
        commit_hash: row.try_get("commit_hash")?,
        commit_message: row.try_get("commit_message")?,
        commit_author_name: row.try_get("commit_author_name")?,
        commit_author_avatar: row.try_get("commit_author_avatar")?,
        commit_date: row.try_get("commit_date")?,
        summary: row.try_get("summary")?,
    })
}

fn project_from_row(row: &SqliteRow) -> Result<Project, PersistenceError> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        repo_url: row.try_get("repo_url")?,
        branch: row.try_get("branch")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_source(&self, source: &SourceUpsert<'_>) -> Result<String, PersistenceError> {
        let ts = now();
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO source_code_embeddings
                (id, project_id, file_name, file_path, summary, source_code,
                 content_hash, embedding, embedding_norm, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)
            ON CONFLICT(project_id, file_path) DO UPDATE SET
                file_name = excluded.file_name,
                summary = excluded.summary,
                source_code = excluded.source_code,
                content_hash = excluded.content_hash,
                embedding = NULL,
                embedding_norm = NULL,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(source.project_id)
        .bind(source.file_name)
        .bind(source.file_path)
        .bind(source.summary)
        .bind(source.source_code)
        .bind(source.content_hash)
        .bind(ts)
        .bind(ts)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn set_embedding(&self, row_id: &str, vector: &[f32]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(vector)?;
        let result = sqlx::query(
            "UPDATE source_code_embeddings SET embedding = ?, embedding_norm = ?, updated_at = ? WHERE id = ?",
        )
        .bind(json)
        .bind(vector_norm(vector))
        .bind(now())
        .bind(row_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("source record {row_id}")));
        }
        Ok(())
    }

    async fn find_source(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<Option<SourceRecord>, PersistenceError> {
        let row = sqlx::query(
            "SELECT * FROM source_code_embeddings WHERE project_id = ? AND file_path = ?",
        )
        .bind(project_id)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(source_from_row).transpose()
    }

    async fn top_k(
        &self,
        project_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<FileReference>, PersistenceError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_json = serde_json::to_string(query)?;

        let rows = sqlx::query(TOP_K_SQL)
            .bind(query_json)
            .bind(vector_norm(query))
            .bind(project_id)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<FileReference, PersistenceError> {
                Ok(FileReference {
                    file_name: row.try_get("file_name")?,
                    summary: row.try_get("summary")?,
                    source_code: row.try_get("source_code")?,
                    similarity: row.try_get("similarity")?,
                })
            })
            .collect()
    }

    async fn clear_project(&self, project_id: &str) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM source_code_embeddings WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn source_counts(&self, project_id: &str) -> Result<(u64, u64), PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN embedding IS NOT NULL THEN 1 ELSE 0 END), 0) AS embedded
            FROM source_code_embeddings WHERE project_id = ?
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let embedded: i64 = row.try_get("embedded")?;
        Ok((total as u64, embedded as u64))
    }

    async fn save_question(&self, record: &QuestionRecord) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, project_id, question, answer, file_references, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.project_id)
        .bind(&record.question)
        .bind(&record.answer)
        .bind(serde_json::to_string(&record.file_references)?)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_questions(&self, project_id: &str) -> Result<Vec<QuestionRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM questions WHERE project_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(question_from_row).collect()
    }

    async fn delete_question(&self, id: &str) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_questions(&self, project_id: &str) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM questions WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit_hashes(&self, project_id: &str) -> Result<HashSet<String>, PersistenceError> {
        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT commit_hash FROM commits WHERE project_id = ?")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(hashes.into_iter().collect())
    }

    async fn upsert_commits(&self, commits: &[CommitRecord]) -> Result<usize, PersistenceError> {
        let ts = now();
        let mut tx = self.pool.begin().await?;

        for c in commits {
            sqlx::query(
                r#"
                INSERT INTO commits (id, project_id, commit_hash, commit_message,
                                     commit_author_name, commit_author_avatar,
                                     commit_date, summary, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(project_id, commit_hash) DO UPDATE SET
                    commit_message = excluded.commit_message,
                    commit_author_name = excluded.commit_author_name,
                    commit_author_avatar = excluded.commit_author_avatar,
                    commit_date = excluded.commit_date,
                    summary = COALESCE(excluded.summary, commits.summary)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&c.project_id)
            .bind(&c.commit_hash)
            .bind(&c.commit_message)
            .bind(&c.commit_author_name)
            .bind(&c.commit_author_avatar)
            .bind(&c.commit_date)
            .bind(&c.summary)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(commits.len())
    }

    async fn list_commits(&self, project_id: &str) -> Result<Vec<CommitRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM commits WHERE project_id = ? ORDER BY commit_date DESC, rowid DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(commit_from_row).collect()
    }

    async fn insert_project(&self, project: &Project) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO projects (id, name, repo_url, branch, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.repo_url)
        .bind(&project.branch)
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_project(&self, id_or_name: &str) -> Result<Option<Project>, PersistenceError> {
        let row = sqlx::query(
            "SELECT * FROM projects WHERE id = ?1 OR name = ?1 ORDER BY (id = ?1) DESC LIMIT 1",
        )
        .bind(id_or_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(project_from_row).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at ASC, name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn delete_project(&self, id: &str) -> Result<bool, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        for table in ["source_code_embeddings", "questions", "commits"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE project_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
