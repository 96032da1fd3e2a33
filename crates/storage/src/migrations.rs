//! Database migrations, keyed on `PRAGMA user_version`.

use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 2;

pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        "Database schema version: {} (target: {})",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        tracing::info!("Running migration v1: initial schema");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                fingerprint TEXT NOT NULL UNIQUE,
                category TEXT,
                description TEXT,
                model TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                current_version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                quality_score REAL,
                efficiency_score REAL,
                input_tokens INTEGER,
                output_tokens INTEGER,
                execution_time_ms INTEGER,
                estimated_cost REAL,
                usage_count INTEGER NOT NULL DEFAULT 1,
                last_used_at TEXT
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS prompt_tags (
                prompt_id TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (prompt_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS prompt_versions (
                prompt_id TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
                version_number INTEGER NOT NULL,
                content TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (prompt_id, version_number)
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt_id TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                note TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metrics_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt_id TEXT NOT NULL REFERENCES prompts(id) ON DELETE CASCADE,
                recorded_at TEXT NOT NULL,
                quality REAL,
                efficiency REAL,
                total_tokens INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_prompts_fingerprint ON prompts(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_prompts_category ON prompts(category);
            CREATE INDEX IF NOT EXISTS idx_prompts_status ON prompts(status);
            CREATE INDEX IF NOT EXISTS idx_prompts_created ON prompts(created_at);
            CREATE INDEX IF NOT EXISTS idx_versions_prompt ON prompt_versions(prompt_id);
            CREATE INDEX IF NOT EXISTS idx_feedback_prompt ON feedback(prompt_id);
            CREATE INDEX IF NOT EXISTS idx_history_prompt ON metrics_history(prompt_id);
            CREATE INDEX IF NOT EXISTS idx_history_recorded ON metrics_history(recorded_at);
            "#,
        )?;
    }

    if current_version < 2 {
        tracing::info!("Running migration v2: FTS5 content index");
        conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS prompts_fts;

            CREATE VIRTUAL TABLE prompts_fts USING fts5(
                content, category,
                content='prompts',
                content_rowid='rowid'
            );

            DROP TRIGGER IF EXISTS prompts_fts_insert;
            CREATE TRIGGER prompts_fts_insert AFTER INSERT ON prompts BEGIN
                INSERT INTO prompts_fts(rowid, content, category)
                VALUES (new.rowid, new.content, COALESCE(new.category, ''));
            END;

            DROP TRIGGER IF EXISTS prompts_fts_delete;
            CREATE TRIGGER prompts_fts_delete AFTER DELETE ON prompts BEGIN
                INSERT INTO prompts_fts(prompts_fts, rowid, content, category)
                VALUES ('delete', old.rowid, old.content, COALESCE(old.category, ''));
            END;

            DROP TRIGGER IF EXISTS prompts_fts_update;
            CREATE TRIGGER prompts_fts_update AFTER UPDATE ON prompts BEGIN
                INSERT INTO prompts_fts(prompts_fts, rowid, content, category)
                VALUES ('delete', old.rowid, old.content, COALESCE(old.category, ''));
                INSERT INTO prompts_fts(rowid, content, category)
                VALUES (new.rowid, new.content, COALESCE(new.category, ''));
            END;

            INSERT INTO prompts_fts(rowid, content, category)
            SELECT rowid, content, COALESCE(category, '') FROM prompts;
            "#,
        )?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tracing::info!("Database schema up to date (version {})", SCHEMA_VERSION);

    Ok(())
}
