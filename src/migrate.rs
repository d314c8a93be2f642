use anyhow::Result;
use sqlx::SqlitePool;

/// Creates the catalog schema. Idempotent; `init` and the test harness call
/// this on fresh databases, re-running it on an existing one is a no-op.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Base tables, one per catalog, keyed by their natural business keys.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catmat_item (
            id INTEGER PRIMARY KEY,
            group_code INTEGER NOT NULL,
            group_name TEXT NOT NULL,
            class_code INTEGER NOT NULL,
            class_name TEXT NOT NULL,
            pdm_code INTEGER NOT NULL,
            pdm_name TEXT NOT NULL,
            item_code INTEGER NOT NULL,
            item_description TEXT NOT NULL,
            ncm_code TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(group_code, class_code, pdm_code, item_code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catser_item (
            id INTEGER PRIMARY KEY,
            material_service_type TEXT NOT NULL,
            group_code INTEGER NOT NULL,
            group_name TEXT NOT NULL,
            class_code INTEGER NOT NULL,
            class_name TEXT NOT NULL,
            service_code INTEGER NOT NULL,
            service_description TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(group_code, class_code, service_code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 virtual tables over the searchable text columns.
    // remove_diacritics 2 makes accented Portuguese match unaccented queries.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let catmat_fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='catmat_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !catmat_fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE catmat_fts USING fts5(
                item_id UNINDEXED,
                group_name,
                class_name,
                pdm_name,
                item_description,
                tokenize = 'unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    let catser_fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='catser_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !catser_fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE catser_fts USING fts5(
                item_id UNINDEXED,
                group_name,
                class_name,
                service_description,
                tokenize = 'unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Indexes backing the optional search filters.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catmat_group ON catmat_item(group_code)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catmat_class ON catmat_item(class_code)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catmat_pdm ON catmat_item(pdm_code)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catmat_ncm ON catmat_item(ncm_code)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catser_group ON catser_item(group_code)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catser_class ON catser_item(class_code)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catser_service ON catser_item(service_code)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catser_status ON catser_item(status)")
        .execute(pool)
        .await?;

    Ok(())
}
