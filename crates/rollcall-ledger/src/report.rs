//! PDF attendance reports.
//!
//! Layout is computed in points up front by [`paginate`] and only then drawn,
//! so page breaks are decided without touching the PDF backend.

use crate::record::AttendanceRecord;
use chrono::NaiveDateTime;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PAGE_WIDTH_PT: f32 = 595.28;
pub const PAGE_HEIGHT_PT: f32 = 841.89;
pub const ROW_HEIGHT_PT: f32 = 28.0;
pub const BOTTOM_MARGIN_PT: f32 = 50.0;

const TITLE: &str = "Attendance Report";
const STATUS_PRESENT: &str = "Present";
const GENERATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const COLUMN_NAME_X: f32 = 50.0;
const COLUMN_ID_X: f32 = 250.0;
const COLUMN_STATUS_X: f32 = 450.0;
const HEADERS: [(&str, f32); 3] = [
    ("Name", COLUMN_NAME_X),
    ("Enrollment No", COLUMN_ID_X),
    ("Status", COLUMN_STATUS_X),
];

const TITLE_Y: f32 = PAGE_HEIGHT_PT - 50.0;
const GENERATED_Y: f32 = PAGE_HEIGHT_PT - 70.0;
const FIRST_HEADER_Y: f32 = PAGE_HEIGHT_PT - 100.0;
const CONTINUED_HEADER_Y: f32 = PAGE_HEIGHT_PT - 50.0;
/// Gap between a column header and the first row under it.
const HEADER_GAP: f32 = 20.0;

const TITLE_SIZE: f32 = 18.0;
const HEADER_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 11.0;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF rendering failed: {0}")]
    Render(String),
    #[error("cannot write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub name: String,
    pub identifier: String,
    pub status: String,
}

impl From<&AttendanceRecord> for ReportRow {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            name: record.name.clone(),
            identifier: record.identifier.clone(),
            status: STATUS_PRESENT.to_string(),
        }
    }
}

/// Rows assigned to one page, with baselines in points from the page bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub header_y: f32,
    /// `(row index, baseline)` pairs.
    pub rows: Vec<(usize, f32)>,
}

/// Assign `row_count` rows to pages. Always yields at least one page so an
/// empty report still carries its title and header.
pub fn paginate(row_count: usize) -> Vec<PageLayout> {
    let mut pages = vec![PageLayout { header_y: FIRST_HEADER_Y, rows: Vec::new() }];
    let mut y = FIRST_HEADER_Y - HEADER_GAP;

    for index in 0..row_count {
        if y < BOTTOM_MARGIN_PT {
            pages.push(PageLayout { header_y: CONTINUED_HEADER_Y, rows: Vec::new() });
            y = CONTINUED_HEADER_Y - HEADER_GAP;
        }
        if let Some(page) = pages.last_mut() {
            page.rows.push((index, y));
        }
        y -= ROW_HEIGHT_PT;
    }
    pages
}

fn render_err(err: impl std::fmt::Display) -> ReportError {
    ReportError::Render(err.to_string())
}

fn mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

/// Render `rows` as an A4 PDF.
pub fn render_pdf(rows: &[ReportRow], generated_at: NaiveDateTime) -> Result<Vec<u8>, ReportError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(TITLE, mm(PAGE_WIDTH_PT), mm(PAGE_HEIGHT_PT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(render_err)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(render_err)?;

    let pages = paginate(rows.len());
    for (page_no, page) in pages.iter().enumerate() {
        let layer = if page_no == 0 {
            let layer = doc.get_page(first_page).get_layer(first_layer);
            layer.use_text(TITLE, TITLE_SIZE, mm(COLUMN_NAME_X), mm(TITLE_Y), &bold);
            layer.use_text(
                format!("Generated: {}", generated_at.format(GENERATED_FORMAT)),
                BODY_SIZE,
                mm(COLUMN_NAME_X),
                mm(GENERATED_Y),
                &regular,
            );
            layer
        } else {
            let (page_idx, layer_idx) =
                doc.add_page(mm(PAGE_WIDTH_PT), mm(PAGE_HEIGHT_PT), format!("Layer {}", page_no + 1));
            doc.get_page(page_idx).get_layer(layer_idx)
        };
        draw_page(&layer, page, rows, &regular, &bold);
    }

    let bytes = doc.save_to_bytes().map_err(render_err)?;
    tracing::debug!(rows = rows.len(), pages = pages.len(), bytes = bytes.len(), "report rendered");
    Ok(bytes)
}

fn draw_page(
    layer: &PdfLayerReference,
    page: &PageLayout,
    rows: &[ReportRow],
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
) {
    for (label, x) in HEADERS {
        layer.use_text(label, HEADER_SIZE, mm(x), mm(page.header_y), bold);
    }
    for &(index, y) in &page.rows {
        let Some(row) = rows.get(index) else {
            continue;
        };
        layer.use_text(row.name.as_str(), BODY_SIZE, mm(COLUMN_NAME_X), mm(y), regular);
        layer.use_text(row.identifier.as_str(), BODY_SIZE, mm(COLUMN_ID_X), mm(y), regular);
        layer.use_text(row.status.as_str(), BODY_SIZE, mm(COLUMN_STATUS_X), mm(y), regular);
    }
}

/// Render and write a report for `records` to `path`, creating parent
/// directories.
pub fn write_report(
    path: &Path,
    records: &[AttendanceRecord],
    generated_at: NaiveDateTime,
) -> Result<(), ReportError> {
    let rows: Vec<ReportRow> = records.iter().map(ReportRow::from).collect();
    let bytes = render_pdf(&rows, generated_at)?;

    let io_err = |source| ReportError::Io { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, &bytes).map_err(io_err)?;

    tracing::info!(path = %path.display(), rows = rows.len(), "report written");
    Ok(())
}
