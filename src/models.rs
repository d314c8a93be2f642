//! Core data models for catalog ingestion and search.
//!
//! These types cross the HTTP boundary and the cache, so they all carry
//! serde derives with the wire field names the API exposes.

use serde::{Deserialize, Serialize};

/// Which procurement catalog a row or query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Catmat,
    Catser,
}

impl CatalogKind {
    /// Uppercase catalog name as used in user-facing messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Catmat => "CATMAT",
            CatalogKind::Catser => "CATSER",
        }
    }

    /// Lowercase catalog name as used in cache keys and log fields.
    pub fn slug(&self) -> &'static str {
        match self {
            CatalogKind::Catmat => "catmat",
            CatalogKind::Catser => "catser",
        }
    }
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one import call, accumulated row by row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub rows_read: u32,
    pub rows_saved: u32,
    pub rows_skipped: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,
}

/// A single discarded row: 1-based sheet line number plus the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row: u32,
    pub reason: String,
}

/// A CATMAT (materials catalog) item. `rank` is only populated by search
/// results; it is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatmatItem {
    pub id: i64,
    pub group_code: i16,
    pub group_name: String,
    pub class_code: i32,
    pub class_name: String,
    pub pdm_code: i32,
    pub pdm_name: String,
    pub item_code: i32,
    pub item_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ncm_code: Option<String>,
    pub rank: f32,
}

/// A CATSER (services catalog) item. Same `rank` convention as [`CatmatItem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatserItem {
    pub id: i64,
    pub material_service_type: String,
    pub group_code: i16,
    pub group_name: String,
    pub class_code: i32,
    pub class_name: String,
    pub service_code: i32,
    pub service_description: String,
    pub status: String,
    pub rank: f32,
}

/// Typed upsert parameters for one CATMAT row. Natural key:
/// (group_code, class_code, pdm_code, item_code).
#[derive(Debug, Clone)]
pub struct CatmatUpsert {
    pub group_code: i16,
    pub group_name: String,
    pub class_code: i32,
    pub class_name: String,
    pub pdm_code: i32,
    pub pdm_name: String,
    pub item_code: i32,
    pub item_description: String,
    pub ncm_code: Option<String>,
}

/// Typed upsert parameters for one CATSER row. Natural key:
/// (group_code, class_code, service_code).
#[derive(Debug, Clone)]
pub struct CatserUpsert {
    pub material_service_type: String,
    pub group_code: i16,
    pub group_name: String,
    pub class_code: i32,
    pub class_name: String,
    pub service_code: i32,
    pub service_description: String,
    pub status: String,
}

/// Search request for the CATMAT catalog. Absent filters do not constrain
/// the result; `limit`/`offset` are normalized by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatmatSearchParams {
    #[serde(rename = "q", default)]
    pub query: Option<String>,
    #[serde(default)]
    pub group_code: Option<i16>,
    #[serde(default)]
    pub class_code: Option<i32>,
    #[serde(default)]
    pub pdm_code: Option<i32>,
    #[serde(default)]
    pub ncm_code: Option<String>,
    #[serde(default)]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

/// Search request for the CATSER catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatserSearchParams {
    #[serde(rename = "q", default)]
    pub query: Option<String>,
    #[serde(default)]
    pub group_code: Option<i16>,
    #[serde(default)]
    pub class_code: Option<i32>,
    #[serde(default)]
    pub service_code: Option<i32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: i32,
    #[serde(default)]
    pub offset: i32,
}

/// One page of search results. `total` is the match count for the whole
/// predicate, independent of pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i32,
    pub offset: i32,
}

/// Count of items in one catalog group (stats breakdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCount {
    pub group_code: i16,
    pub group_name: String,
    pub count: i64,
}

/// Count of CATSER items per status value (stats breakdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// Aggregate catalog statistics. Individual queries behind each field may
/// degrade to zero/empty on failure; the stats call itself does not fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogStats {
    pub catmat_total: i64,
    pub catser_total: i64,
    pub catmat_by_group: Vec<GroupCount>,
    pub catser_by_group: Vec<GroupCount>,
    pub catser_by_status: Vec<StatusCount>,
}
