//! SQLite-backed catalog store.
//!
//! Owns every SQL statement in the crate: natural-key upserts that keep the
//! FTS index in step with the base tables, the ranked search and count
//! queries behind the search gateways, and the aggregate stats queries.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::error;

use crate::models::{
    CatalogStats, CatmatItem, CatmatUpsert, CatserItem, CatserUpsert, GroupCount, StatusCount,
};

/// Query surface the search gateway depends on. [`CatalogStore`] is the real
/// implementation; tests substitute doubles to exercise gateway policy
/// without a database.
#[async_trait]
pub trait CatalogSearcher: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn catmat_page(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        pdm_code: Option<i32>,
        ncm_code: Option<&str>,
        limit: i32,
        offset: i32,
    ) -> Result<Vec<CatmatItem>>;

    async fn catmat_count(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        pdm_code: Option<i32>,
        ncm_code: Option<&str>,
    ) -> Result<i64>;

    #[allow(clippy::too_many_arguments)]
    async fn catser_page(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        service_code: Option<i32>,
        status: Option<&str>,
        limit: i32,
        offset: i32,
    ) -> Result<Vec<CatserItem>>;

    async fn catser_count(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        service_code: Option<i32>,
        status: Option<&str>,
    ) -> Result<i64>;
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Upserts ============

    /// Inserts or updates one CATMAT item by its natural key
    /// (group, class, PDM, item) and refreshes its FTS row in the same
    /// transaction.
    pub async fn upsert_catmat(&self, row: &CatmatUpsert) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO catmat_item (
                group_code, group_name, class_code, class_name,
                pdm_code, pdm_name, item_code, item_description, ncm_code,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(group_code, class_code, pdm_code, item_code) DO UPDATE SET
                group_name = excluded.group_name,
                class_name = excluded.class_name,
                pdm_name = excluded.pdm_name,
                item_description = excluded.item_description,
                ncm_code = excluded.ncm_code,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(row.group_code)
        .bind(&row.group_name)
        .bind(row.class_code)
        .bind(&row.class_name)
        .bind(row.pdm_code)
        .bind(&row.pdm_name)
        .bind(row.item_code)
        .bind(&row.item_description)
        .bind(&row.ncm_code)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM catmat_fts WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO catmat_fts (item_id, group_name, class_name, pdm_name, item_description)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&row.group_name)
        .bind(&row.class_name)
        .bind(&row.pdm_name)
        .bind(&row.item_description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Inserts or updates one CATSER item by its natural key
    /// (group, class, service) and refreshes its FTS row in the same
    /// transaction.
    pub async fn upsert_catser(&self, row: &CatserUpsert) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO catser_item (
                material_service_type, group_code, group_name, class_code, class_name,
                service_code, service_description, status,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(group_code, class_code, service_code) DO UPDATE SET
                material_service_type = excluded.material_service_type,
                group_name = excluded.group_name,
                class_name = excluded.class_name,
                service_description = excluded.service_description,
                status = excluded.status,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&row.material_service_type)
        .bind(row.group_code)
        .bind(&row.group_name)
        .bind(row.class_code)
        .bind(&row.class_name)
        .bind(row.service_code)
        .bind(&row.service_description)
        .bind(&row.status)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM catser_fts WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO catser_fts (item_id, group_name, class_name, service_description)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&row.group_name)
        .bind(&row.class_name)
        .bind(&row.service_description)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    // ============ Stats ============

    /// Aggregate counts over both catalogs. Each underlying query degrades
    /// to zero/empty on failure instead of failing the whole call.
    pub async fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats::default();

        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM catmat_item")
            .fetch_one(&self.pool)
            .await
        {
            Ok(total) => stats.catmat_total = total,
            Err(err) => error!(error = %err, "failed to count catmat items"),
        }

        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM catser_item")
            .fetch_one(&self.pool)
            .await
        {
            Ok(total) => stats.catser_total = total,
            Err(err) => error!(error = %err, "failed to count catser items"),
        }

        match self.group_counts("catmat_item").await {
            Ok(groups) => stats.catmat_by_group = groups,
            Err(err) => error!(error = %err, "failed to group catmat items"),
        }

        match self.group_counts("catser_item").await {
            Ok(groups) => stats.catser_by_group = groups,
            Err(err) => error!(error = %err, "failed to group catser items"),
        }

        match sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM catser_item
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => {
                stats.catser_by_status = rows
                    .iter()
                    .map(|row| StatusCount {
                        status: row.get("status"),
                        count: row.get("count"),
                    })
                    .collect();
            }
            Err(err) => error!(error = %err, "failed to group catser items by status"),
        }

        stats
    }

    /// Top 10 groups by item count for one catalog table.
    async fn group_counts(&self, table: &str) -> Result<Vec<GroupCount>> {
        let sql = format!(
            r#"
            SELECT group_code, group_name, COUNT(*) AS count
            FROM {table}
            GROUP BY group_code, group_name
            ORDER BY count DESC
            LIMIT 10
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| GroupCount {
                group_code: row.get("group_code"),
                group_name: row.get("group_name"),
                count: row.get("count"),
            })
            .collect())
    }
}

// ============ Search queries ============

#[async_trait]
impl CatalogSearcher for CatalogStore {
    async fn catmat_page(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        pdm_code: Option<i32>,
        ncm_code: Option<&str>,
        limit: i32,
        offset: i32,
    ) -> Result<Vec<CatmatItem>> {
        let rows = match match_expr(query) {
            Some(expr) => {
                sqlx::query(
                    r#"
                    SELECT i.id, i.group_code, i.group_name, i.class_code, i.class_name,
                           i.pdm_code, i.pdm_name, i.item_code, i.item_description, i.ncm_code,
                           -catmat_fts.rank AS rank
                    FROM catmat_fts
                    JOIN catmat_item i ON i.id = catmat_fts.item_id
                    WHERE catmat_fts MATCH ?1
                      AND (?2 IS NULL OR i.group_code = ?2)
                      AND (?3 IS NULL OR i.class_code = ?3)
                      AND (?4 IS NULL OR i.pdm_code = ?4)
                      AND (?5 IS NULL OR i.ncm_code = ?5)
                    ORDER BY catmat_fts.rank
                    LIMIT ?6 OFFSET ?7
                    "#,
                )
                .bind(expr)
                .bind(group_code)
                .bind(class_code)
                .bind(pdm_code)
                .bind(ncm_code)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT i.id, i.group_code, i.group_name, i.class_code, i.class_name,
                           i.pdm_code, i.pdm_name, i.item_code, i.item_description, i.ncm_code,
                           0.0 AS rank
                    FROM catmat_item i
                    WHERE (?1 IS NULL OR i.group_code = ?1)
                      AND (?2 IS NULL OR i.class_code = ?2)
                      AND (?3 IS NULL OR i.pdm_code = ?3)
                      AND (?4 IS NULL OR i.ncm_code = ?4)
                    ORDER BY i.id
                    LIMIT ?5 OFFSET ?6
                    "#,
                )
                .bind(group_code)
                .bind(class_code)
                .bind(pdm_code)
                .bind(ncm_code)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| CatmatItem {
                id: row.get("id"),
                group_code: row.get("group_code"),
                group_name: row.get("group_name"),
                class_code: row.get("class_code"),
                class_name: row.get("class_name"),
                pdm_code: row.get("pdm_code"),
                pdm_name: row.get("pdm_name"),
                item_code: row.get("item_code"),
                item_description: row.get("item_description"),
                ncm_code: row.get("ncm_code"),
                rank: row.get("rank"),
            })
            .collect())
    }

    async fn catmat_count(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        pdm_code: Option<i32>,
        ncm_code: Option<&str>,
    ) -> Result<i64> {
        let total = match match_expr(query) {
            Some(expr) => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*)
                    FROM catmat_fts
                    JOIN catmat_item i ON i.id = catmat_fts.item_id
                    WHERE catmat_fts MATCH ?1
                      AND (?2 IS NULL OR i.group_code = ?2)
                      AND (?3 IS NULL OR i.class_code = ?3)
                      AND (?4 IS NULL OR i.pdm_code = ?4)
                      AND (?5 IS NULL OR i.ncm_code = ?5)
                    "#,
                )
                .bind(expr)
                .bind(group_code)
                .bind(class_code)
                .bind(pdm_code)
                .bind(ncm_code)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*)
                    FROM catmat_item i
                    WHERE (?1 IS NULL OR i.group_code = ?1)
                      AND (?2 IS NULL OR i.class_code = ?2)
                      AND (?3 IS NULL OR i.pdm_code = ?3)
                      AND (?4 IS NULL OR i.ncm_code = ?4)
                    "#,
                )
                .bind(group_code)
                .bind(class_code)
                .bind(pdm_code)
                .bind(ncm_code)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(total)
    }

    async fn catser_page(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        service_code: Option<i32>,
        status: Option<&str>,
        limit: i32,
        offset: i32,
    ) -> Result<Vec<CatserItem>> {
        let rows = match match_expr(query) {
            Some(expr) => {
                sqlx::query(
                    r#"
                    SELECT i.id, i.material_service_type, i.group_code, i.group_name,
                           i.class_code, i.class_name, i.service_code, i.service_description,
                           i.status, -catser_fts.rank AS rank
                    FROM catser_fts
                    JOIN catser_item i ON i.id = catser_fts.item_id
                    WHERE catser_fts MATCH ?1
                      AND (?2 IS NULL OR i.group_code = ?2)
                      AND (?3 IS NULL OR i.class_code = ?3)
                      AND (?4 IS NULL OR i.service_code = ?4)
                      AND (?5 IS NULL OR i.status = ?5)
                    ORDER BY catser_fts.rank
                    LIMIT ?6 OFFSET ?7
                    "#,
                )
                .bind(expr)
                .bind(group_code)
                .bind(class_code)
                .bind(service_code)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT i.id, i.material_service_type, i.group_code, i.group_name,
                           i.class_code, i.class_name, i.service_code, i.service_description,
                           i.status, 0.0 AS rank
                    FROM catser_item i
                    WHERE (?1 IS NULL OR i.group_code = ?1)
                      AND (?2 IS NULL OR i.class_code = ?2)
                      AND (?3 IS NULL OR i.service_code = ?3)
                      AND (?4 IS NULL OR i.status = ?4)
                    ORDER BY i.id
                    LIMIT ?5 OFFSET ?6
                    "#,
                )
                .bind(group_code)
                .bind(class_code)
                .bind(service_code)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| CatserItem {
                id: row.get("id"),
                material_service_type: row.get("material_service_type"),
                group_code: row.get("group_code"),
                group_name: row.get("group_name"),
                class_code: row.get("class_code"),
                class_name: row.get("class_name"),
                service_code: row.get("service_code"),
                service_description: row.get("service_description"),
                status: row.get("status"),
                rank: row.get("rank"),
            })
            .collect())
    }

    async fn catser_count(
        &self,
        query: Option<&str>,
        group_code: Option<i16>,
        class_code: Option<i32>,
        service_code: Option<i32>,
        status: Option<&str>,
    ) -> Result<i64> {
        let total = match match_expr(query) {
            Some(expr) => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*)
                    FROM catser_fts
                    JOIN catser_item i ON i.id = catser_fts.item_id
                    WHERE catser_fts MATCH ?1
                      AND (?2 IS NULL OR i.group_code = ?2)
                      AND (?3 IS NULL OR i.class_code = ?3)
                      AND (?4 IS NULL OR i.service_code = ?4)
                      AND (?5 IS NULL OR i.status = ?5)
                    "#,
                )
                .bind(expr)
                .bind(group_code)
                .bind(class_code)
                .bind(service_code)
                .bind(status)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*)
                    FROM catser_item i
                    WHERE (?1 IS NULL OR i.group_code = ?1)
                      AND (?2 IS NULL OR i.class_code = ?2)
                      AND (?3 IS NULL OR i.service_code = ?3)
                      AND (?4 IS NULL OR i.status = ?4)
                    "#,
                )
                .bind(group_code)
                .bind(class_code)
                .bind(service_code)
                .bind(status)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(total)
    }
}

/// Builds the FTS5 MATCH expression for free text, or `None` when there is
/// no usable text and the plain filtered query should run instead.
fn match_expr(query: Option<&str>) -> Option<String> {
    let expr = fts_match_expr(query?);
    if expr.is_empty() {
        None
    } else {
        Some(expr)
    }
}

/// Quotes each whitespace-separated term so user text cannot inject FTS5
/// query syntax (boolean operators, column filters, parentheses). Terms
/// combine with FTS5's implicit AND.
pub fn fts_match_expr(text: &str) -> String {
    text.split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_expr_quotes_each_term() {
        assert_eq!(fts_match_expr("caneta azul"), r#""caneta" "azul""#);
    }

    #[test]
    fn fts_expr_neutralizes_query_syntax() {
        assert_eq!(fts_match_expr("caneta OR azul"), r#""caneta" "OR" "azul""#);
        assert_eq!(fts_match_expr("col:value"), r#""col:value""#);
        assert_eq!(fts_match_expr("(caneta)"), r#""(caneta)""#);
    }

    #[test]
    fn fts_expr_escapes_embedded_quotes() {
        assert_eq!(fts_match_expr(r#"ca"neta"#), r#""ca""neta""#);
    }

    #[test]
    fn blank_query_yields_no_match_expression() {
        assert_eq!(match_expr(None), None);
        assert_eq!(match_expr(Some("   ")), None);
        assert_eq!(match_expr(Some("caneta")).as_deref(), Some(r#""caneta""#));
    }
}
