//! Pulls the per-region case table out of the dashboard markup

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::types::{Field, RegionRecord, Snapshot, TOTAL_KEY};

/// Class of the containers wrapping each table on the page
const TABLE_CONTAINER: &str = "div.table-responsive";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector}: {reason}")]
    Selector {
        selector: &'static str,
        reason: String,
    },

    #[error("no table-responsive container found")]
    NoTable,

    #[error("table has no body")]
    NoBody,

    #[error("table body has no rows")]
    EmptyBody,

    #[error("row {row} has no cell at column {column}")]
    MissingCell { row: usize, column: usize },

    #[error("row {row} column {column}: {text:?} is not a count")]
    BadCount {
        row: usize,
        column: usize,
        text: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("row {row} uses the reserved region name \"Total\"")]
    ReservedName { row: usize },
}

impl ExtractError {
    /// True when the page has no usable table at all, as opposed to a row that failed to parse
    pub fn is_missing_table(&self) -> bool {
        matches!(
            self,
            ExtractError::NoTable | ExtractError::NoBody | ExtractError::EmptyBody
        )
    }
}

/// How a cell's text becomes a count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellParse {
    /// The whole cell is the number
    Whole,
    /// Only the first whitespace-separated token is the number; the rest is annotation
    FirstToken,
}

/// Column positions for one kind of table row
#[derive(Debug, Clone, Copy)]
pub struct RowLayout {
    pub name_column: Option<usize>,
    /// Column of each count, in [`Field::ALL`] order
    pub count_columns: [usize; 4],
    pub parse: CellParse,
}

pub const REGION_ROW: RowLayout = RowLayout {
    name_column: Some(1),
    count_columns: [2, 3, 4, 5],
    parse: CellParse::Whole,
};

pub const AGGREGATE_ROW: RowLayout = RowLayout {
    name_column: None,
    count_columns: [1, 2, 3, 4],
    parse: CellParse::FirstToken,
};

/// A decoded table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    pub name: Option<String>,
    pub record: RegionRecord,
}

fn selector(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css,
        reason: e.to_string(),
    })
}

/// All text below an element, trimmed
fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Direct children of `parent` with the given tag name
fn child_elements<'a>(parent: ElementRef<'a>, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

fn parse_count(text: &str, parse: CellParse, row: usize, column: usize) -> Result<u64, ExtractError> {
    let token = match parse {
        CellParse::Whole => text,
        CellParse::FirstToken => text.split_whitespace().next().unwrap_or(""),
    };
    token.parse().map_err(|source| ExtractError::BadCount {
        row,
        column,
        text: text.to_string(),
        source,
    })
}

/// Decode one row's cell texts with the given layout
pub fn decode_row(cells: &[String], layout: &RowLayout, row: usize) -> Result<DecodedRow, ExtractError> {
    let cell = |column: usize| {
        cells
            .get(column)
            .ok_or(ExtractError::MissingCell { row, column })
    };

    let name = match layout.name_column {
        Some(column) => Some(cell(column)?.clone()),
        None => None,
    };

    let mut counts = [0u64; 4];
    for (field, column) in Field::ALL.iter().zip(layout.count_columns) {
        counts[field.index()] = parse_count(cell(column)?, layout.parse, row, column)?;
    }

    Ok(DecodedRow {
        name,
        record: RegionRecord(counts),
    })
}

/// Parse the page into a snapshot.
///
/// The last `table-responsive` container holds the case table. Every body
/// row but the last is a region; the last row is the nationwide total.
#[instrument(skip_all)]
pub fn extract_snapshot(html: &str) -> Result<Snapshot, ExtractError> {
    let document = Html::parse_document(html);
    let containers = selector(TABLE_CONTAINER)?;
    let tbody = selector("tbody")?;

    let table = document
        .select(&containers)
        .last()
        .ok_or(ExtractError::NoTable)?;
    let body = table.select(&tbody).next().ok_or(ExtractError::NoBody)?;

    let rows: Vec<Vec<String>> = child_elements(body, "tr")
        .map(|tr| child_elements(tr, "td").map(|td| cell_text(&td)).collect())
        .collect();

    let (aggregate, region_rows) = rows.split_last().ok_or(ExtractError::EmptyBody)?;

    let total = decode_row(aggregate, &AGGREGATE_ROW, region_rows.len())?.record;
    let mut snapshot = Snapshot::new(total);

    for (index, cells) in region_rows.iter().enumerate() {
        let decoded = decode_row(cells, &REGION_ROW, index)?;
        let name = decoded.name.unwrap_or_default();
        if name == TOTAL_KEY {
            return Err(ExtractError::ReservedName { row: index });
        }
        snapshot.insert(name, decoded.record);
    }

    debug!(regions = snapshot.len(), total = %snapshot.total, "Extracted case table");
    Ok(snapshot)
}
