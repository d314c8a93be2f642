//! Catalog import pipeline.
//!
//! One import call walks the first sheet of an uploaded workbook top to
//! bottom: rows before the header are scanned for the header signature,
//! rows after it are mapped to typed upsert parameters and written one by
//! one. Bad rows are skipped and reported in the [`ImportResult`]; only a
//! dead row stream or a missing header fails the call as a whole, and even
//! then the partial result travels with the error.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::Config;
use crate::db;
use crate::models::{CatalogKind, CatmatUpsert, CatserUpsert, ImportResult, RowError};
use crate::store::CatalogStore;
use crate::xlsx::{RawRow, SheetError, Workbook};

/// Why a single row was rejected. Display strings are user-visible in the
/// import report, so they stay in the catalog's language.
#[derive(Debug, Error)]
pub enum RowRejection {
    #[error("{field} vazio")]
    EmptyField { field: &'static str },
    #[error("{field} inválido: {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("campos obrigatórios ausentes na linha")]
    MissingRequired,
}

/// Import-level failure. Per-row problems never raise this; they land in
/// the result's error list instead.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The upload is not a readable workbook, or it has no sheets.
    #[error(transparent)]
    InvalidWorkbook(#[from] SheetError),
    /// No row matched the catalog's header signature.
    #[error("cabeçalho {catalog} não encontrado")]
    HeaderNotFound {
        catalog: CatalogKind,
        partial: ImportResult,
    },
    /// The row stream died mid-sheet.
    #[error("{source}")]
    Stream {
        source: SheetError,
        partial: ImportResult,
    },
}

impl ImportError {
    /// Rows accumulated before the failure, when any were processed.
    pub fn partial(&self) -> Option<&ImportResult> {
        match self {
            ImportError::InvalidWorkbook(_) => None,
            ImportError::HeaderNotFound { partial, .. }
            | ImportError::Stream { partial, .. } => Some(partial),
        }
    }
}

/// Per-catalog sheet handling: header detection, cell mapping, persistence.
/// The import driver is identical for every catalog; this trait carries the
/// parts that differ.
#[async_trait]
pub trait CatalogMapper: Send + Sync {
    type Upsert: Send;

    fn kind(&self) -> CatalogKind;
    fn is_header(&self, cells: &[String]) -> bool;
    fn map_row(&self, cells: &[String]) -> Result<Self::Upsert, RowRejection>;
    async fn save(&self, store: &CatalogStore, row: Self::Upsert) -> anyhow::Result<()>;
}

/// Imports a CATMAT workbook.
pub async fn import_catmat(
    store: &CatalogStore,
    bytes: Vec<u8>,
) -> Result<ImportResult, ImportError> {
    import_catalog(&CatmatMapper, store, bytes).await
}

/// Imports a CATSER workbook.
pub async fn import_catser(
    store: &CatalogStore,
    bytes: Vec<u8>,
) -> Result<ImportResult, ImportError> {
    import_catalog(&CatserMapper, store, bytes).await
}

/// Single-pass import driver. Row numbers are 1-based over the physical
/// sheet, header and pre-header rows included, so reported errors point at
/// the line the user sees in a spreadsheet editor.
pub async fn import_catalog<M: CatalogMapper>(
    mapper: &M,
    store: &CatalogStore,
    bytes: Vec<u8>,
) -> Result<ImportResult, ImportError> {
    let catalog = mapper.kind().slug();
    let mut rows = Workbook::open(bytes)?.into_first_sheet()?;

    let mut result = ImportResult::default();
    let mut header_found = false;
    let mut row_number: u32 = 0;

    loop {
        let row = match rows.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(source) => {
                error!(catalog, row = row_number, error = %source, "fluxo de linhas interrompido");
                return Err(ImportError::Stream {
                    source,
                    partial: result,
                });
            }
        };
        row_number += 1;

        let cells = match row {
            RawRow::Cells(cells) => cells,
            RawRow::Invalid(detail) => {
                result.rows_skipped += 1;
                result.errors.push(RowError {
                    row: row_number,
                    reason: format!("erro lendo linha: {detail}"),
                });
                warn!(catalog, row = row_number, %detail, "erro lendo linha");
                continue;
            }
        };

        if !header_found {
            if mapper.is_header(&cells) {
                header_found = true;
            }
            continue;
        }

        if is_blank_row(&cells) {
            continue;
        }

        result.rows_read += 1;

        let upsert = match mapper.map_row(&cells) {
            Ok(upsert) => upsert,
            Err(rejection) => {
                result.rows_skipped += 1;
                result.errors.push(RowError {
                    row: row_number,
                    reason: rejection.to_string(),
                });
                warn!(catalog, row = row_number, reason = %rejection, "linha ignorada");
                continue;
            }
        };

        if let Err(err) = mapper.save(store, upsert).await {
            result.rows_skipped += 1;
            result.errors.push(RowError {
                row: row_number,
                reason: format!("erro ao salvar: {err:#}"),
            });
            error!(catalog, row = row_number, error = %err, "erro ao salvar");
            continue;
        }

        result.rows_saved += 1;
    }

    if !header_found {
        error!(catalog, "cabeçalho não encontrado");
        return Err(ImportError::HeaderNotFound {
            catalog: mapper.kind(),
            partial: result,
        });
    }

    Ok(result)
}

// ============ CATMAT ============

/// CATMAT sheet layout: grupo, classe, PDM and item codes with their names,
/// plus an optional NCM code in the last column.
pub struct CatmatMapper;

#[async_trait]
impl CatalogMapper for CatmatMapper {
    type Upsert = CatmatUpsert;

    fn kind(&self) -> CatalogKind {
        CatalogKind::Catmat
    }

    fn is_header(&self, cells: &[String]) -> bool {
        is_catmat_header(cells)
    }

    fn map_row(&self, cells: &[String]) -> Result<CatmatUpsert, RowRejection> {
        let group_code = parse_code_i16(cell(cells, 0), "código do grupo")?;
        let class_code = parse_code_i32(cell(cells, 2), "código da classe")?;
        let pdm_code = parse_code_i32(cell(cells, 4), "código do pdm")?;
        let item_code = parse_code_i32(cell(cells, 6), "código do item")?;

        let group_name = cell(cells, 1).trim();
        let class_name = cell(cells, 3).trim();
        let pdm_name = cell(cells, 5).trim();
        let item_description = cell(cells, 7).trim();
        if group_name.is_empty()
            || class_name.is_empty()
            || pdm_name.is_empty()
            || item_description.is_empty()
        {
            return Err(RowRejection::MissingRequired);
        }

        let ncm = cell(cells, 8).trim();
        let ncm_code = (!ncm.is_empty() && ncm != "-").then(|| ncm.to_string());

        Ok(CatmatUpsert {
            group_code,
            group_name: group_name.to_string(),
            class_code,
            class_name: class_name.to_string(),
            pdm_code,
            pdm_name: pdm_name.to_string(),
            item_code,
            item_description: item_description.to_string(),
            ncm_code,
        })
    }

    async fn save(&self, store: &CatalogStore, row: CatmatUpsert) -> anyhow::Result<()> {
        store.upsert_catmat(&row).await?;
        Ok(())
    }
}

const CATMAT_HEADER: [&str; 9] = [
    "código do grupo",
    "nome do grupo",
    "código da classe",
    "nome da classe",
    "código do pdm",
    "nome do pdm",
    "código do item",
    "descrição do item",
    "código ncm",
];

fn is_catmat_header(cells: &[String]) -> bool {
    if cells.len() < CATMAT_HEADER.len() {
        return false;
    }
    CATMAT_HEADER
        .iter()
        .zip(cells)
        .all(|(expected, cell)| normalize_header(cell) == *expected)
}

// ============ CATSER ============

/// CATSER sheet layout: material/service type, grupo and classe pairs,
/// service code and description, situation flag.
pub struct CatserMapper;

#[async_trait]
impl CatalogMapper for CatserMapper {
    type Upsert = CatserUpsert;

    fn kind(&self) -> CatalogKind {
        CatalogKind::Catser
    }

    fn is_header(&self, cells: &[String]) -> bool {
        is_catser_header(cells)
    }

    fn map_row(&self, cells: &[String]) -> Result<CatserUpsert, RowRejection> {
        let group_code = parse_code_i16(cell(cells, 1), "grupo serviço")?;
        let class_code = parse_code_i32(cell(cells, 3), "classe material")?;
        let service_code = parse_code_i32(cell(cells, 5), "código material serviço")?;

        let material_service_type = cell(cells, 0).trim();
        let group_name = cell(cells, 2).trim();
        let class_name = cell(cells, 4).trim();
        let service_description = cell(cells, 6).trim();
        let status = cell(cells, 7).trim();
        if material_service_type.is_empty()
            || group_name.is_empty()
            || class_name.is_empty()
            || service_description.is_empty()
            || status.is_empty()
        {
            return Err(RowRejection::MissingRequired);
        }

        Ok(CatserUpsert {
            material_service_type: material_service_type.to_string(),
            group_code,
            group_name: group_name.to_string(),
            class_code,
            class_name: class_name.to_string(),
            service_code,
            service_description: service_description.to_string(),
            status: status.to_string(),
        })
    }

    async fn save(&self, store: &CatalogStore, row: CatserUpsert) -> anyhow::Result<()> {
        store.upsert_catser(&row).await?;
        Ok(())
    }
}

/// CATSER exports vary their header wording between releases, so matching is
/// by fragment containment at fixed positions instead of whole captions.
fn is_catser_header(cells: &[String]) -> bool {
    if cells.len() < 8 {
        return false;
    }
    let has = |idx: usize, needle: &str| normalize_header(&cells[idx]).contains(needle);
    has(0, "tipo material")
        && has(1, "grupo serviço")
        && has(3, "classe material")
        && has(5, "codigo material")
        && has(7, "sit atual")
}

// ============ Cell helpers ============

fn cell(cells: &[String], idx: usize) -> &str {
    cells.get(idx).map(String::as_str).unwrap_or("")
}

fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

fn normalize_header(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Strips the noise spreadsheet exports put around numeric codes: outer
/// whitespace, one leading quote, and any plain or non-breaking space.
fn clean_code(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('\'').unwrap_or(trimmed);
    trimmed
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{00a0}')
        .collect()
}

fn parse_code_i16(raw: &str, field: &'static str) -> Result<i16, RowRejection> {
    Ok(parse_code(raw, field, i16::MIN as i64, i16::MAX as i64)? as i16)
}

fn parse_code_i32(raw: &str, field: &'static str) -> Result<i32, RowRejection> {
    Ok(parse_code(raw, field, i32::MIN as i64, i32::MAX as i64)? as i32)
}

/// Parses one numeric code cell. Exports render some codes as floats
/// ("75.0"). Those parse through `f64` and truncate; everything else goes
/// through a plain integer parse. Both paths range-check against the
/// target width.
fn parse_code(raw: &str, field: &'static str, min: i64, max: i64) -> Result<i64, RowRejection> {
    let clean = clean_code(raw);
    if clean.is_empty() || clean == "-" {
        return Err(RowRejection::EmptyField { field });
    }

    let invalid = |value: String| RowRejection::InvalidNumber { field, value };
    let value = if clean.contains('.') {
        match clean.parse::<f64>() {
            Ok(f) => f.trunc() as i64,
            Err(_) => return Err(invalid(clean)),
        }
    } else {
        match clean.parse::<i64>() {
            Ok(v) => v,
            Err(_) => return Err(invalid(clean)),
        }
    };

    if value < min || value > max {
        return Err(invalid(clean));
    }
    Ok(value)
}

// ============ CLI entry point ============

/// CLI entry point for `catsearch import`. Reads the workbook, runs the
/// import, prints the accumulated counts and every per-row error. A failed
/// import still prints whatever partial result it accumulated before the
/// error is returned.
pub async fn run_import(config: &Config, kind: CatalogKind, file: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read workbook: {}", file.display()))?;

    let pool = db::connect(config).await?;
    let store = CatalogStore::new(pool);

    println!("import {} ({})", kind, file.display());
    let outcome = match kind {
        CatalogKind::Catmat => import_catmat(&store, bytes).await,
        CatalogKind::Catser => import_catser(&store, bytes).await,
    };

    let partial = match &outcome {
        Ok(result) => Some(result),
        Err(err) => err.partial(),
    };
    if let Some(result) = partial {
        println!("  rows read: {}", result.rows_read);
        println!("  rows saved: {}", result.rows_saved);
        println!("  rows skipped: {}", result.rows_skipped);
        for row_error in &result.errors {
            println!("    row {}: {}", row_error.row, row_error.reason);
        }
    }

    store.pool().close().await;

    match outcome {
        Ok(_) => {
            println!("ok");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn catmat_header_matches_exact_captions_case_insensitively() {
        let header = row(&[
            "Código do Grupo",
            "Nome do Grupo",
            "CÓDIGO DA CLASSE",
            "Nome da Classe",
            "Código do PDM",
            "Nome do PDM",
            "Código do Item",
            "Descrição do Item",
            "Código NCM",
        ]);
        assert!(is_catmat_header(&header));
    }

    #[test]
    fn catmat_header_rejects_short_or_reordered_rows() {
        assert!(!is_catmat_header(&row(&["código do grupo"])));
        let mut reordered = row(&[
            "nome do grupo",
            "código do grupo",
            "código da classe",
            "nome da classe",
            "código do pdm",
            "nome do pdm",
            "código do item",
            "descrição do item",
            "código ncm",
        ]);
        assert!(!is_catmat_header(&reordered));
        reordered.swap(0, 1);
        assert!(is_catmat_header(&reordered));
    }

    #[test]
    fn catser_header_matches_by_fragment() {
        let header = row(&[
            "Tipo Material/Serviço",
            "Grupo Serviço",
            "Descrição Grupo",
            "Classe Material",
            "Descrição Classe",
            "Codigo Material Serviço",
            "Descrição",
            "Sit Atual do Material",
        ]);
        assert!(is_catser_header(&header));
        assert!(!is_catser_header(&header[..7].to_vec()));
    }

    #[test]
    fn code_cleaning_strips_quote_and_spaces() {
        assert_eq!(clean_code("  '75 "), "75");
        assert_eq!(clean_code("1\u{a0}234"), "1234");
        assert_eq!(clean_code("12 34"), "1234");
    }

    #[test]
    fn parse_code_accepts_plain_and_float_renderings() {
        assert_eq!(parse_code_i16("75", "campo").unwrap(), 75);
        assert_eq!(parse_code_i16("75.0", "campo").unwrap(), 75);
        assert_eq!(parse_code_i32("7510.9", "campo").unwrap(), 7510);
        assert_eq!(parse_code_i32("'7510", "campo").unwrap(), 7510);
    }

    #[test]
    fn parse_code_reports_empty_and_dash_as_empty_field() {
        let err = parse_code_i16("  ", "código do grupo").unwrap_err();
        assert_eq!(err.to_string(), "código do grupo vazio");
        let err = parse_code_i16("-", "código do grupo").unwrap_err();
        assert_eq!(err.to_string(), "código do grupo vazio");
    }

    #[test]
    fn parse_code_rejects_garbage_and_out_of_range_values() {
        let err = parse_code_i16("abc", "código do grupo").unwrap_err();
        assert_eq!(err.to_string(), "código do grupo inválido: abc");
        // Fits in i32 but not i16.
        assert!(parse_code_i16("40000", "código do grupo").is_err());
        assert!(parse_code_i32("40000", "código da classe").is_ok());
        // The float path is range-checked too.
        assert!(parse_code_i16("40000.0", "código do grupo").is_err());
    }

    #[test]
    fn catmat_row_maps_with_optional_ncm() {
        let cells = row(&[
            "75",
            "MATERIAL DE ESCRITÓRIO",
            "7510",
            "ARTIGOS PARA ESCRITÓRIO",
            "1234",
            "CANETA ESFEROGRÁFICA",
            "987654",
            "CANETA ESFEROGRÁFICA AZUL",
            "-",
        ]);
        let upsert = CatmatMapper.map_row(&cells).unwrap();
        assert_eq!(upsert.group_code, 75);
        assert_eq!(upsert.item_code, 987654);
        assert_eq!(upsert.ncm_code, None);

        let mut with_ncm = cells.clone();
        with_ncm[8] = "9608.10.00".to_string();
        let upsert = CatmatMapper.map_row(&with_ncm).unwrap();
        assert_eq!(upsert.ncm_code.as_deref(), Some("9608.10.00"));
    }

    #[test]
    fn catmat_row_missing_name_is_rejected_with_the_exact_reason() {
        let cells = row(&[
            "75",
            "MATERIAL",
            "7510",
            "   ",
            "1234",
            "CANETA",
            "987654",
            "CANETA AZUL",
            "",
        ]);
        let err = CatmatMapper.map_row(&cells).unwrap_err();
        assert_eq!(err.to_string(), "campos obrigatórios ausentes na linha");
    }

    #[test]
    fn catmat_short_row_is_rejected_not_panicking() {
        let err = CatmatMapper.map_row(&row(&["75", "MATERIAL"])).unwrap_err();
        assert_eq!(err.to_string(), "código da classe vazio");
    }

    #[test]
    fn catser_row_maps_all_fields() {
        let cells = row(&[
            "SERVIÇO",
            "110",
            "SERVIÇOS DE ENGENHARIA",
            "1105",
            "MANUTENÇÃO PREDIAL",
            "24910",
            "MANUTENÇÃO DE ELEVADORES",
            "ATIVO",
        ]);
        let upsert = CatserMapper.map_row(&cells).unwrap();
        assert_eq!(upsert.group_code, 110);
        assert_eq!(upsert.class_code, 1105);
        assert_eq!(upsert.service_code, 24910);
        assert_eq!(upsert.status, "ATIVO");
    }

    #[test]
    fn catser_invalid_code_names_the_sheet_field() {
        let cells = row(&[
            "SERVIÇO",
            "x",
            "GRUPO",
            "1105",
            "CLASSE",
            "24910",
            "DESCRIÇÃO",
            "ATIVO",
        ]);
        let err = CatserMapper.map_row(&cells).unwrap_err();
        assert_eq!(err.to_string(), "grupo serviço inválido: x");
    }

    #[test]
    fn blank_rows_are_detected_across_whitespace_kinds() {
        assert!(is_blank_row(&row(&["", "  ", "\u{a0}"])));
        assert!(!is_blank_row(&row(&["", "x"])));
        assert!(is_blank_row(&Vec::new()));
    }
}
