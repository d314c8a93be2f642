//! XLSX workbook decoding for catalog imports.
//!
//! Opens an uploaded workbook (ZIP + SpreadsheetML) and exposes the first
//! sheet as a forward-only sequence of string-cell rows. The reader is
//! single-pass: iterating consumes it, and a re-import needs a fresh
//! workbook. Cell positions are realigned from the `r` cell reference so a
//! sheet with omitted blank cells still yields stable column indices.

use std::io::{Cursor, Read};

use thiserror::Error;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Hard cap on cells per row; Excel itself stops at column XFD.
const MAX_ROW_CELLS: usize = 16_384;

/// Workbook-level failure. XML corruption mid-sheet ends the row stream;
/// everything else is reported when the workbook is opened.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("arquivo XLSX inválido: {0}")]
    InvalidArchive(String),
    #[error("planilha vazia ou sem abas")]
    NoSheets,
    #[error("entrada {name} excede o limite de {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },
    #[error("XML da planilha inválido: {0}")]
    Xml(String),
}

/// One sheet row: decoded cells, or a per-row decode failure the caller can
/// skip without losing the rest of the stream.
#[derive(Debug)]
pub enum RawRow {
    Cells(Vec<String>),
    Invalid(String),
}

/// An opened workbook, validated to contain at least one worksheet.
#[derive(Debug)]
pub struct Workbook {
    archive: zip::ZipArchive<Cursor<Vec<u8>>>,
    sheet_names: Vec<String>,
}

impl Workbook {
    /// Opens workbook bytes. Fails if the stream is not a readable ZIP
    /// archive or contains no worksheets.
    pub fn open(bytes: Vec<u8>) -> Result<Self, SheetError> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| SheetError::InvalidArchive(e.to_string()))?;
        let sheet_names = list_worksheet_names(&archive);
        if sheet_names.is_empty() {
            return Err(SheetError::NoSheets);
        }
        Ok(Self {
            archive,
            sheet_names,
        })
    }

    /// Consumes the workbook and returns a row reader over the first sheet.
    pub fn into_first_sheet(mut self) -> Result<RowReader, SheetError> {
        let shared = read_shared_strings(&mut self.archive)?;
        let name = self.sheet_names[0].clone();
        let xml = read_zip_entry_bounded(&mut self.archive, &name, MAX_XML_ENTRY_BYTES)?;
        Ok(RowReader::new(xml, shared))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    /// Index into the shared-string table (`t="s"`).
    Shared,
    /// Inline string (`t="inlineStr"`, text under `<is><t>`).
    Inline,
    /// Number, formula string, boolean, error: the raw `<v>` text.
    Raw,
}

/// Forward-only reader over one sheet's `<row>` elements.
pub struct RowReader {
    reader: quick_xml::Reader<Cursor<Vec<u8>>>,
    shared: Vec<String>,
    buf: Vec<u8>,
}

impl RowReader {
    fn new(sheet_xml: Vec<u8>, shared: Vec<String>) -> Self {
        // Cell text must come back verbatim; only `<v>`/`<t>` content is
        // captured, so the reader does not trim text events.
        let reader = quick_xml::Reader::from_reader(Cursor::new(sheet_xml));
        Self {
            reader,
            shared,
            buf: Vec::new(),
        }
    }

    /// Returns the next row, `Ok(None)` at end of sheet, or a stream-level
    /// error on corrupt XML. A row whose cell values cannot be resolved
    /// (bad shared-string reference) comes back as [`RawRow::Invalid`] and
    /// does not stop iteration.
    pub fn next_row(&mut self) -> Result<Option<RawRow>, SheetError> {
        use quick_xml::events::Event;

        let mut in_row = false;
        let mut cells: Vec<String> = Vec::new();
        let mut bad: Option<String> = None;

        let mut next_col = 0usize;
        let mut cur_col = 0usize;
        let mut kind = CellKind::Raw;
        let mut pending: Option<String> = None;
        let mut in_v = false;
        let mut in_inline_t = false;

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"row" => {
                        in_row = true;
                        cells.clear();
                        bad = None;
                        next_col = 0;
                    }
                    b"c" if in_row => {
                        let (col, k) = cell_meta(&e, next_col);
                        cur_col = col;
                        kind = k;
                        pending = None;
                    }
                    b"v" if in_row => in_v = true,
                    b"t" if in_row && kind == CellKind::Inline => in_inline_t = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"row" => return Ok(Some(RawRow::Cells(Vec::new()))),
                    b"c" if in_row => {
                        let (col, _) = cell_meta(&e, next_col);
                        place_cell(&mut cells, col, String::new());
                        next_col = col + 1;
                    }
                    _ => {}
                },
                Ok(Event::Text(te)) if in_row && (in_v || in_inline_t) => {
                    let text = te.unescape().unwrap_or_default();
                    if in_v && kind == CellKind::Shared {
                        let idx = text.trim().parse::<usize>().ok();
                        match idx.and_then(|i| self.shared.get(i)) {
                            Some(s) => pending.get_or_insert_with(String::new).push_str(s),
                            None => {
                                bad.get_or_insert_with(|| {
                                    format!(
                                        "referência de texto compartilhado inválida: {}",
                                        text.trim()
                                    )
                                });
                            }
                        }
                    } else {
                        pending.get_or_insert_with(String::new).push_str(&text);
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"v" => in_v = false,
                    b"t" => in_inline_t = false,
                    b"c" if in_row => {
                        place_cell(&mut cells, cur_col, pending.take().unwrap_or_default());
                        next_col = cur_col + 1;
                        kind = CellKind::Raw;
                    }
                    b"row" if in_row => {
                        return Ok(Some(match bad.take() {
                            Some(reason) => RawRow::Invalid(reason),
                            None => RawRow::Cells(std::mem::take(&mut cells)),
                        }));
                    }
                    _ => {}
                },
                Ok(Event::Eof) => return Ok(None),
                Err(e) => return Err(SheetError::Xml(e.to_string())),
                _ => {}
            }
        }
    }
}

/// Writes a cell value at its column index, padding skipped columns with
/// empty strings.
fn place_cell(cells: &mut Vec<String>, col: usize, value: String) {
    if col < cells.len() {
        cells[col] = value;
    } else {
        while cells.len() < col {
            cells.push(String::new());
        }
        cells.push(value);
    }
}

/// Reads the `r` (cell reference) and `t` (cell type) attributes of a `<c>`
/// element. An absent or unusable reference falls back to the next
/// sequential column.
fn cell_meta(e: &quick_xml::events::BytesStart<'_>, fallback_col: usize) -> (usize, CellKind) {
    let mut col = None;
    let mut kind = CellKind::Raw;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r" => col = column_index(&String::from_utf8_lossy(attr.value.as_ref())),
            b"t" => {
                kind = match attr.value.as_ref() {
                    b"s" => CellKind::Shared,
                    b"inlineStr" => CellKind::Inline,
                    _ => CellKind::Raw,
                }
            }
            _ => {}
        }
    }
    (
        col.filter(|c| *c < MAX_ROW_CELLS).unwrap_or(fallback_col),
        kind,
    )
}

/// Converts the letter prefix of a cell reference ("C12" → 2) to a 0-based
/// column index.
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: String = cell_ref
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut idx = 0usize;
    for ch in letters.chars() {
        idx = idx * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(idx - 1)
}

fn list_worksheet_names(archive: &zip::ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, SheetError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| SheetError::InvalidArchive(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| SheetError::InvalidArchive(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(SheetError::EntryTooLarge {
            name: name.to_string(),
            limit: max_bytes,
        });
    }
    Ok(out)
}

/// Loads `xl/sharedStrings.xml` if present. Rich-text runs inside one `si`
/// entry concatenate into a single string so indices stay aligned.
fn read_shared_strings(
    archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>,
) -> Result<Vec<String>, SheetError> {
    use quick_xml::events::Event;

    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;

    let mut strings = Vec::new();
    // No text trimming: leading/trailing spaces inside a `<t>` run are
    // significant, and a caption split across runs must keep its spacing.
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SheetError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}
