//! End-to-end CLI tests: spawn the compiled `catsearch` binary against a
//! temp config and database, drive init/import/search/stats, and assert on
//! the printed output and exit codes.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn catsearch_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("catsearch");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/catsearch.sqlite"

[server]
bind = "127.0.0.1:8080"

[cache]
max_cost = 1048576
ttl_secs = 60
"#,
        root.display()
    );

    let config_path = config_dir.join("catsearch.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_catsearch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = catsearch_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run catsearch binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

// ─── Workbook fixtures ──────────────────────────────────────────────

fn cell_ref(col: usize, row: usize) -> String {
    format!("{}{}", (b'A' + col as u8) as char, row)
}

fn shared_cell(col: usize, row: usize, idx: usize) -> String {
    format!("<c r=\"{}\" t=\"s\"><v>{}</v></c>", cell_ref(col, row), idx)
}

fn number_cell(col: usize, row: usize, value: i64) -> String {
    format!("<c r=\"{}\"><v>{}</v></c>", cell_ref(col, row), value)
}

/// CATMAT workbook in the shape the published sheets actually use: captions
/// and names in the shared-string table, codes as plain number cells. Two
/// pen items in group 75.
fn catmat_workbook(with_header: bool) -> Vec<u8> {
    let shared = [
        "Código do Grupo",
        "Nome do Grupo",
        "Código da Classe",
        "Nome da Classe",
        "Código do PDM",
        "Nome do PDM",
        "Código do Item",
        "Descrição do Item",
        "Código NCM",
        "MATERIAL DE ESCRITÓRIO",
        "ARTIGOS PARA ESCRITÓRIO",
        "CANETA ESFEROGRÁFICA",
        "CANETA ESFEROGRÁFICA AZUL",
        "CANETA ESFEROGRÁFICA PRETA",
        "-",
    ];

    let mut sheet = String::from("<?xml version=\"1.0\"?><worksheet><sheetData>");
    let mut row = 0;
    if with_header {
        row += 1;
        sheet.push_str(&format!("<row r=\"{}\">", row));
        for col in 0..9 {
            sheet.push_str(&shared_cell(col, row, col));
        }
        sheet.push_str("</row>");
    }
    for (item_code, desc_idx) in [(987654, 12), (987655, 13)] {
        row += 1;
        sheet.push_str(&format!("<row r=\"{}\">", row));
        sheet.push_str(&number_cell(0, row, 75));
        sheet.push_str(&shared_cell(1, row, 9));
        sheet.push_str(&number_cell(2, row, 7510));
        sheet.push_str(&shared_cell(3, row, 10));
        sheet.push_str(&number_cell(4, row, 1234));
        sheet.push_str(&shared_cell(5, row, 11));
        sheet.push_str(&number_cell(6, row, item_code));
        sheet.push_str(&shared_cell(7, row, desc_idx));
        sheet.push_str(&shared_cell(8, row, 14));
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut sst = String::from("<?xml version=\"1.0\"?><sst>");
    for entry in shared {
        sst.push_str(&format!("<si><t>{}</t></si>", entry));
    }
    sst.push_str("</sst>");

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.start_file("xl/sharedStrings.xml", opts).unwrap();
        zip.write_all(sst.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Minimal CATSER workbook with inline-string cells: one active service.
fn catser_workbook() -> Vec<u8> {
    let rows: [&[&str]; 2] = [
        &[
            "Tipo Material/Serviço",
            "Grupo Serviço",
            "Descrição Grupo",
            "Classe Material Serviço",
            "Descrição Classe",
            "Codigo Material Serviço",
            "Descrição Material Serviço",
            "Sit Atual do Material Serviço",
        ],
        &[
            "SERVIÇO",
            "110",
            "SERVIÇOS PROFISSIONAIS",
            "1105",
            "MANUTENÇÃO PREDIAL",
            "24910",
            "MANUTENÇÃO DE ELEVADORES",
            "ATIVO",
        ],
    ];

    let mut sheet = String::from("<?xml version=\"1.0\"?><worksheet><sheetData>");
    for (r, cells) in rows.iter().enumerate() {
        let row = r + 1;
        sheet.push_str(&format!("<row r=\"{}\">", row));
        for (col, value) in cells.iter().enumerate() {
            sheet.push_str(&format!(
                "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                cell_ref(col, row),
                value
            ));
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        zip.start_file(
            "xl/worksheets/sheet1.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn write_fixture(tmp: &TempDir, name: &str, bytes: Vec<u8>) -> PathBuf {
    let path = tmp.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

// ─── init ───────────────────────────────────────────────────────────

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_catsearch(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/catsearch.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_catsearch(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_catsearch(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_catsearch(&missing, &["init"]);
    assert!(!success);
    assert!(
        stderr.contains("Failed to read config file"),
        "got: {}",
        stderr
    );
}

// ─── import ─────────────────────────────────────────────────────────

#[test]
fn test_import_catmat_reports_counts() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "catmat.xlsx", catmat_workbook(true));

    run_catsearch(&config_path, &["init"]);
    let (stdout, stderr, success) = run_catsearch(
        &config_path,
        &["import", "catmat", fixture.to_str().unwrap()],
    );

    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("import CATMAT"));
    assert!(stdout.contains("rows read: 2"), "got: {}", stdout);
    assert!(stdout.contains("rows saved: 2"), "got: {}", stdout);
    assert!(stdout.contains("rows skipped: 0"), "got: {}", stdout);
    assert!(stdout.contains("\nok\n"), "got: {}", stdout);
}

#[test]
fn test_import_twice_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "catmat.xlsx", catmat_workbook(true));
    let file = fixture.to_str().unwrap();

    run_catsearch(&config_path, &["init"]);
    let (stdout1, _, _) = run_catsearch(&config_path, &["import", "catmat", file]);
    assert!(stdout1.contains("rows saved: 2"));

    let (stdout2, _, _) = run_catsearch(&config_path, &["import", "catmat", file]);
    assert!(stdout2.contains("rows saved: 2"));

    // Totals do not grow on reimport.
    let (stats, _, _) = run_catsearch(&config_path, &["stats"]);
    assert!(stats.contains("CATMAT items:  2"), "got: {}", stats);
}

#[test]
fn test_import_headerless_sheet_fails_but_prints_partial() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "headerless.xlsx", catmat_workbook(false));

    run_catsearch(&config_path, &["init"]);
    let (stdout, stderr, success) = run_catsearch(
        &config_path,
        &["import", "catmat", fixture.to_str().unwrap()],
    );

    assert!(!success, "headerless import must fail");
    assert!(
        stderr.contains("cabeçalho CATMAT não encontrado"),
        "got: {}",
        stderr
    );
    // The partial accumulation is still printed before the error.
    assert!(stdout.contains("rows read: 0"), "got: {}", stdout);
    assert!(stdout.contains("rows saved: 0"), "got: {}", stdout);
}

#[test]
fn test_import_missing_file_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_catsearch(&config_path, &["init"]);
    let (_, stderr, success) =
        run_catsearch(&config_path, &["import", "catmat", "/nonexistent/cat.xlsx"]);

    assert!(!success);
    assert!(
        stderr.contains("Failed to read workbook"),
        "got: {}",
        stderr
    );
}

#[test]
fn test_import_without_init_reports_save_errors_per_row() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "catmat.xlsx", catmat_workbook(true));

    // No `init`: the tables are missing, so every row fails to save. That is
    // a per-row problem, not an import-level failure.
    let (stdout, _, success) = run_catsearch(
        &config_path,
        &["import", "catmat", fixture.to_str().unwrap()],
    );

    assert!(success, "import should still complete: {}", stdout);
    assert!(stdout.contains("rows saved: 0"), "got: {}", stdout);
    assert!(stdout.contains("rows skipped: 2"), "got: {}", stdout);
    assert!(stdout.contains("erro ao salvar"), "got: {}", stdout);
}

// ─── search ─────────────────────────────────────────────────────────

#[test]
fn test_search_matches_accented_text_from_plain_query() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "catmat.xlsx", catmat_workbook(true));

    run_catsearch(&config_path, &["init"]);
    run_catsearch(
        &config_path,
        &["import", "catmat", fixture.to_str().unwrap()],
    );

    let (stdout, stderr, success) =
        run_catsearch(&config_path, &["search", "catmat", "esferografica"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("2 CATMAT items"), "got: {}", stdout);
    assert!(stdout.contains("CANETA ESFEROGRÁFICA AZUL"), "got: {}", stdout);
    assert!(stdout.contains("CANETA ESFEROGRÁFICA PRETA"), "got: {}", stdout);
}

#[test]
fn test_search_respects_code_filters() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "catmat.xlsx", catmat_workbook(true));

    run_catsearch(&config_path, &["init"]);
    run_catsearch(
        &config_path,
        &["import", "catmat", fixture.to_str().unwrap()],
    );

    let (stdout, _, _) = run_catsearch(
        &config_path,
        &["search", "catmat", "caneta", "--group-code", "99"],
    );
    assert!(stdout.contains("No results."), "got: {}", stdout);

    let (stdout, _, _) = run_catsearch(
        &config_path,
        &["search", "catmat", "caneta", "--group-code", "75"],
    );
    assert!(stdout.contains("2 CATMAT items"), "got: {}", stdout);
}

#[test]
fn test_search_empty_database_prints_no_results() {
    let (_tmp, config_path) = setup_test_env();

    run_catsearch(&config_path, &["init"]);
    let (stdout, _, success) = run_catsearch(&config_path, &["search", "catmat", "caneta"]);

    assert!(success);
    assert!(stdout.contains("No results."), "got: {}", stdout);
}

#[test]
fn test_catser_import_and_search() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "catser.xlsx", catser_workbook());

    run_catsearch(&config_path, &["init"]);
    let (stdout, stderr, success) = run_catsearch(
        &config_path,
        &["import", "catser", fixture.to_str().unwrap()],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rows saved: 1"), "got: {}", stdout);

    let (stdout, _, _) = run_catsearch(&config_path, &["search", "catser", "elevadores"]);
    assert!(stdout.contains("MANUTENÇÃO DE ELEVADORES"), "got: {}", stdout);
    assert!(stdout.contains("status: ATIVO"), "got: {}", stdout);

    // Status filter applies on top of the text query.
    let (stdout, _, _) = run_catsearch(
        &config_path,
        &["search", "catser", "elevadores", "--status", "INATIVO"],
    );
    assert!(stdout.contains("No results."), "got: {}", stdout);
}

// ─── stats ──────────────────────────────────────────────────────────

#[test]
fn test_stats_lists_totals_and_groups() {
    let (tmp, config_path) = setup_test_env();
    let fixture = write_fixture(&tmp, "catmat.xlsx", catmat_workbook(true));

    run_catsearch(&config_path, &["init"]);
    run_catsearch(
        &config_path,
        &["import", "catmat", fixture.to_str().unwrap()],
    );

    let (stdout, stderr, success) = run_catsearch(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("CATMAT items:  2"), "got: {}", stdout);
    assert!(stdout.contains("CATSER items:  0"), "got: {}", stdout);
    assert!(stdout.contains("MATERIAL DE ESCRITÓRIO"), "got: {}", stdout);
}
