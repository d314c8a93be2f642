//! Database statistics overview.
//!
//! Summarizes what the catalogs hold: item totals, the largest groups, and
//! the CATSER status distribution. Used by `catsearch stats` to sanity-check
//! imports.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store::CatalogStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = CatalogStore::new(pool);

    let stats = store.stats().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Catalog Search — Database Stats");
    println!("===============================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  CATMAT items:  {}", stats.catmat_total);
    println!("  CATSER items:  {}", stats.catser_total);

    if !stats.catmat_by_group.is_empty() {
        println!();
        println!("  CATMAT groups (top {}):", stats.catmat_by_group.len());
        println!("  {:>6} {:<48} {:>8}", "CODE", "NAME", "ITEMS");
        println!("  {}", "-".repeat(64));
        for g in &stats.catmat_by_group {
            println!("  {:>6} {:<48} {:>8}", g.group_code, g.group_name, g.count);
        }
    }

    if !stats.catser_by_group.is_empty() {
        println!();
        println!("  CATSER groups (top {}):", stats.catser_by_group.len());
        println!("  {:>6} {:<48} {:>8}", "CODE", "NAME", "ITEMS");
        println!("  {}", "-".repeat(64));
        for g in &stats.catser_by_group {
            println!("  {:>6} {:<48} {:>8}", g.group_code, g.group_name, g.count);
        }
    }

    if !stats.catser_by_status.is_empty() {
        println!();
        println!("  CATSER by status:");
        for s in &stats.catser_by_status {
            println!("  {:<16} {:>8}", s.status, s.count);
        }
    }

    println!();

    store.pool().close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
