use anyhow::Result;
use sqlx::SqlitePool;

/// Create every table and index. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            repo_url TEXT NOT NULL,
            branch TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `seq` records insertion order and breaks similarity ties.
    // `embedding` is a JSON array of floats; NULL until the second write.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_code_embeddings (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            project_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            summary TEXT NOT NULL,
            source_code TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding TEXT,
            embedding_norm REAL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(project_id, file_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            file_references TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commits (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            commit_message TEXT NOT NULL,
            commit_author_name TEXT NOT NULL,
            commit_author_avatar TEXT,
            commit_date TEXT NOT NULL,
            summary TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(project_id, commit_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sources_project ON source_code_embeddings(project_id, seq)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_questions_project ON questions(project_id, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_commits_project_date ON commits(project_id, commit_date DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
