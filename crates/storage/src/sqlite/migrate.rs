use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            business_segment TEXT,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS template_categories (
            template_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            name TEXT NOT NULL,
            PRIMARY KEY (template_id, position),
            UNIQUE (template_id, name),
            FOREIGN KEY (template_id) REFERENCES templates(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            template_id INTEGER NOT NULL,
            category TEXT NOT NULL,
            order_seq INTEGER NOT NULL CHECK (order_seq >= 0),
            text TEXT NOT NULL,
            audio_ref TEXT,
            FOREIGN KEY (template_id, category)
                REFERENCES template_categories(template_id, name) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS interviews (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            template_id INTEGER NOT NULL,
            title TEXT,
            selected_wiki_id INTEGER,
            state TEXT NOT NULL,
            tracker_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (template_id) REFERENCES templates(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS responses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            interview_id INTEGER NOT NULL,
            question_id INTEGER,
            additional_question_id INTEGER,
            text TEXT NOT NULL,
            audio_ref TEXT,
            transcript TEXT NOT NULL,
            skipped INTEGER NOT NULL CHECK (skipped IN (0, 1)),
            by_user INTEGER NOT NULL CHECK (by_user IN (0, 1)),
            analysis_output TEXT,
            created_at TEXT NOT NULL,
            CHECK ((question_id IS NULL) <> (additional_question_id IS NULL)),
            FOREIGN KEY (interview_id) REFERENCES interviews(id) ON DELETE CASCADE,
            FOREIGN KEY (question_id) REFERENCES questions(id),
            FOREIGN KEY (additional_question_id) REFERENCES additional_questions(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS additional_questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            interview_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            category TEXT NOT NULL,
            order_seq INTEGER NOT NULL,
            triggering_response_id INTEGER NOT NULL,
            audio_ref TEXT,
            UNIQUE (interview_id, order_seq),
            FOREIGN KEY (interview_id) REFERENCES interviews(id) ON DELETE CASCADE,
            FOREIGN KEY (triggering_response_id) REFERENCES responses(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS wikis (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            interview_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            version INTEGER NOT NULL CHECK (version >= 1),
            prompt_id TEXT NOT NULL,
            selected INTEGER NOT NULL CHECK (selected IN (0, 1)),
            created_at TEXT NOT NULL,
            FOREIGN KEY (interview_id) REFERENCES interviews(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS ratings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            interview_id INTEGER NOT NULL,
            score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
            feedback TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (interview_id) REFERENCES interviews(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS ai_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            interview_id INTEGER,
            purpose TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            status TEXT NOT NULL,
            prompt_tokens INTEGER,
            completion_tokens INTEGER,
            total_tokens INTEGER,
            cost_micro_usd INTEGER,
            raw_output TEXT,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS ai_price_book (
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            input_micro_usd_per_million INTEGER NOT NULL CHECK (input_micro_usd_per_million >= 0),
            output_micro_usd_per_million INTEGER NOT NULL CHECK (output_micro_usd_per_million >= 0),
            PRIMARY KEY (provider, model)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS prompt_usage (
            pool TEXT NOT NULL,
            prompt_id TEXT NOT NULL,
            use_count INTEGER NOT NULL CHECK (use_count >= 0),
            PRIMARY KEY (pool, prompt_id)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_template_order
            ON questions (template_id, order_seq);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_additional_questions_response
            ON additional_questions (triggering_response_id, order_seq);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_responses_interview
            ON responses (interview_id, id);
    ",
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_responses_one_answer_per_question
            ON responses (interview_id, question_id)
            WHERE skipped = 0 AND question_id IS NOT NULL;
    ",
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_responses_one_answer_per_additional
            ON responses (interview_id, additional_question_id)
            WHERE skipped = 0 AND additional_question_id IS NOT NULL;
    ",
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_wikis_one_selected
            ON wikis (interview_id)
            WHERE selected = 1;
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_ratings_interview
            ON ratings (interview_id, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_ai_usage_interview
            ON ai_usage (interview_id, created_at);
    ",
];

/// Runs versioned migrations, each inside its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
