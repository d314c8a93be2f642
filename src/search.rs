//! Search gateways over the catalog store.
//!
//! A gateway call is: normalize paging, consult the cache, run the ranked
//! page query, run the independent count query, assemble the page, write it
//! back to the cache. Cache trouble never fails a search (the store is
//! queried instead), and a failed count degrades to the page length rather
//! than failing the call.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::cache::TieredCache;
use crate::config::Config;
use crate::db;
use crate::models::{CatmatItem, CatmatSearchParams, CatserItem, CatserSearchParams, SearchResult};
use crate::store::{CatalogSearcher, CatalogStore};

const DEFAULT_LIMIT: i32 = 50;
const MAX_LIMIT: i32 = 100;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("falha na pesquisa: {0}")]
    Query(#[source] anyhow::Error),
}

/// Front door for catalog searches, generic over the query backend so
/// gateway policy is testable without a database.
pub struct SearchGateway<S = CatalogStore> {
    backend: S,
    cache: TieredCache,
}

impl<S: CatalogSearcher> SearchGateway<S> {
    pub fn new(backend: S, cache: TieredCache) -> Self {
        Self { backend, cache }
    }

    pub async fn search_catmat(
        &self,
        params: &CatmatSearchParams,
    ) -> Result<SearchResult<CatmatItem>, SearchError> {
        let params = normalize_catmat(params);
        let key = cache_key("catmat", &params);

        if let Some(key) = &key {
            match self.cache.get::<SearchResult<CatmatItem>>(key).await {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {}
                Err(err) => warn!(key, error = %err, "cache get failed, querying store"),
            }
        }

        let data = self
            .backend
            .catmat_page(
                params.query.as_deref(),
                params.group_code,
                params.class_code,
                params.pdm_code,
                params.ncm_code.as_deref(),
                params.limit,
                params.offset,
            )
            .await
            .map_err(SearchError::Query)?;

        let total = match self
            .backend
            .catmat_count(
                params.query.as_deref(),
                params.group_code,
                params.class_code,
                params.pdm_code,
                params.ncm_code.as_deref(),
            )
            .await
        {
            Ok(total) => total,
            Err(err) => {
                warn!(error = %err, "count query failed, falling back to page length");
                data.len() as i64
            }
        };

        let result = SearchResult {
            data,
            total,
            limit: params.limit,
            offset: params.offset,
        };
        if let Some(key) = &key {
            self.cache.set(key, &result).await;
        }
        Ok(result)
    }

    pub async fn search_catser(
        &self,
        params: &CatserSearchParams,
    ) -> Result<SearchResult<CatserItem>, SearchError> {
        let params = normalize_catser(params);
        let key = cache_key("catser", &params);

        if let Some(key) = &key {
            match self.cache.get::<SearchResult<CatserItem>>(key).await {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {}
                Err(err) => warn!(key, error = %err, "cache get failed, querying store"),
            }
        }

        let data = self
            .backend
            .catser_page(
                params.query.as_deref(),
                params.group_code,
                params.class_code,
                params.service_code,
                params.status.as_deref(),
                params.limit,
                params.offset,
            )
            .await
            .map_err(SearchError::Query)?;

        let total = match self
            .backend
            .catser_count(
                params.query.as_deref(),
                params.group_code,
                params.class_code,
                params.service_code,
                params.status.as_deref(),
            )
            .await
        {
            Ok(total) => total,
            Err(err) => {
                warn!(error = %err, "count query failed, falling back to page length");
                data.len() as i64
            }
        };

        let result = SearchResult {
            data,
            total,
            limit: params.limit,
            offset: params.offset,
        };
        if let Some(key) = &key {
            self.cache.set(key, &result).await;
        }
        Ok(result)
    }
}

// ============ Normalization ============

/// limit ≤ 0 falls back to 50 and is capped at 100; a page can never
/// exceed 100 rows.
pub fn normalize_limit(limit: i32) -> i32 {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

/// Negative offsets clamp to 0.
pub fn normalize_offset(offset: i32) -> i32 {
    offset.max(0)
}

fn clean_query(query: Option<&str>) -> Option<String> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
}

/// Empty optional strings behave like absent filters.
fn clean_filter(filter: &Option<String>) -> Option<String> {
    filter.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}

fn normalize_catmat(params: &CatmatSearchParams) -> CatmatSearchParams {
    CatmatSearchParams {
        query: clean_query(params.query.as_deref()),
        group_code: params.group_code,
        class_code: params.class_code,
        pdm_code: params.pdm_code,
        ncm_code: clean_filter(&params.ncm_code),
        limit: normalize_limit(params.limit),
        offset: normalize_offset(params.offset),
    }
}

fn normalize_catser(params: &CatserSearchParams) -> CatserSearchParams {
    CatserSearchParams {
        query: clean_query(params.query.as_deref()),
        group_code: params.group_code,
        class_code: params.class_code,
        service_code: params.service_code,
        status: clean_filter(&params.status),
        limit: normalize_limit(params.limit),
        offset: normalize_offset(params.offset),
    }
}

/// Cache key for one normalized request. `None` (serialization failure)
/// means the request is served uncached.
fn cache_key<P: Serialize>(catalog: &str, params: &P) -> Option<String> {
    serde_json::to_string(params)
        .ok()
        .map(|q| format!("{catalog}:search:{q}"))
}

// ============ CLI entry points ============

/// CLI entry point for `catsearch search catmat`.
pub async fn run_search_catmat(
    config: &Config,
    params: CatmatSearchParams,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store = CatalogStore::new(pool);
    let cache = match &config.cache {
        Some(cache_config) => TieredCache::connect(cache_config).await?,
        None => TieredCache::disabled(),
    };
    let gateway = SearchGateway::new(store.clone(), cache);

    let result = gateway.search_catmat(&params).await?;

    if result.data.is_empty() {
        println!("No results.");
    } else {
        println!(
            "{} CATMAT items (showing {} from offset {}):",
            result.total,
            result.data.len(),
            result.offset
        );
        println!();
        for (i, item) in result.data.iter().enumerate() {
            println!("{}. [{:.2}] {}", i + 1, item.rank, item.item_description);
            println!("    code: {}", item.item_code);
            println!(
                "    group {} / class {} / pdm {}",
                item.group_code, item.class_code, item.pdm_code
            );
            if let Some(ref ncm) = item.ncm_code {
                println!("    ncm: {}", ncm);
            }
            println!();
        }
    }

    store.pool().close().await;
    Ok(())
}

/// CLI entry point for `catsearch search catser`.
pub async fn run_search_catser(
    config: &Config,
    params: CatserSearchParams,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store = CatalogStore::new(pool);
    let cache = match &config.cache {
        Some(cache_config) => TieredCache::connect(cache_config).await?,
        None => TieredCache::disabled(),
    };
    let gateway = SearchGateway::new(store.clone(), cache);

    let result = gateway.search_catser(&params).await?;

    if result.data.is_empty() {
        println!("No results.");
    } else {
        println!(
            "{} CATSER items (showing {} from offset {}):",
            result.total,
            result.data.len(),
            result.offset
        );
        println!();
        for (i, item) in result.data.iter().enumerate() {
            println!("{}. [{:.2}] {}", i + 1, item.rank, item.service_description);
            println!("    code: {}", item.service_code);
            println!(
                "    group {} / class {}",
                item.group_code, item.class_code
            );
            println!("    status: {}", item.status);
            println!();
        }
    }

    store.pool().close().await;
    Ok(())
}
