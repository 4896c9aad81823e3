use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use enum_dispatch::enum_dispatch;
use log::debug;
use rust_xlsxwriter::{ExcelDateTime, Format};
use serde::Serialize;
use thiserror::Error;

use crate::reconciliation::reconciler::Reconciliation;
use crate::reconciliation::RowReader;

const MAX_COLUMNS: usize = 16_384;
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("{0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("workbook has no sheets")]
    NoSheet,
    #[error("unsupported file format {0:?}, expected .csv, .xlsx, .xlsm, .xlsb, .xls or .ods")]
    UnsupportedFormat(String),
    #[error("invalid column letter {0:?}")]
    InvalidColumn(String),
    #[error("row numbers start at 1, got {0}")]
    InvalidRow(usize),
    #[error("cell at row {row}, column {column} is outside the sheet limits")]
    OutOfRange { row: usize, column: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Int(i64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(text) => f.write_str(text),
            Cell::Number(number) => write!(f, "{}", number),
            Cell::Int(number) => write!(f, "{}", number),
            Cell::Bool(value) => write!(f, "{}", value),
            Cell::Date(datetime) if datetime.time() == NaiveTime::MIN => write!(f, "{}", datetime.format(DATE_FORMAT)),
            Cell::Date(datetime) => write!(f, "{}", datetime.format(DATETIME_FORMAT)),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Cell {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(text) => Cell::Text(text.clone()),
            Data::Float(number) => Cell::Number(*number),
            Data::Int(number) => Cell::Int(*number),
            Data::Bool(value) => Cell::Bool(*value),
            Data::DateTime(_) | Data::DateTimeIso(_) => match data.as_datetime() {
                Some(datetime) => Cell::Date(datetime),
                None => Cell::Text(data.to_string()),
            },
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Cells of a single sheet, addressed from A1.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Grid {
        Grid { rows }
    }

    /// Places a calamine range at its absolute position; ranges start at the first used cell,
    /// not at A1.
    pub fn from_range(range: &Range<Data>) -> Grid {
        let mut rows = Vec::new();
        if let Some((first_row, first_column)) = range.start() {
            rows.resize_with(first_row as usize, Vec::new);
            for cells in range.rows() {
                let mut row = vec![Cell::Empty; first_column as usize];
                row.extend(cells.iter().map(Cell::from));
                rows.push(row);
            }
        }

        Grid { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn set(&mut self, row: usize, column: usize, cell: Cell) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }

        let cells = &mut self.rows[row];
        if cells.len() <= column {
            cells.resize(column + 1, Cell::Empty);
        }
        cells[column] = cell;
    }

    /// Rows rendered as text, without their trailing blank cells.
    pub fn text_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|cells| {
                let width = cells.iter().rposition(|cell| !cell.is_blank()).map_or(0, |last| last + 1);
                cells[..width].iter().map(Cell::to_string).collect()
            })
            .collect()
    }
}

/// Converts a column letter (`A`, `e`, `AA`) to its zero-based index.
pub fn column_index(letter: &str) -> Result<usize, SheetError> {
    if letter.is_empty() || !letter.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SheetError::InvalidColumn(letter.to_string()));
    }

    let mut index = 0usize;
    for c in letter.chars() {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index * 26 + digit;
        if index > MAX_COLUMNS {
            return Err(SheetError::InvalidColumn(letter.to_string()));
        }
    }

    Ok(index - 1)
}

/// Zero-based grid position as the row/column types the xlsx writer takes.
pub fn cell_position(row: usize, column: usize) -> Result<(u32, u16), SheetError> {
    match (u32::try_from(row), u16::try_from(column)) {
        (Ok(row), Ok(column)) => Ok((row, column)),
        _ => Err(SheetError::OutOfRange { row, column }),
    }
}

fn excel_datetime(datetime: &NaiveDateTime) -> Option<ExcelDateTime> {
    ExcelDateTime::parse_from_str(&datetime.format(DATETIME_FORMAT).to_string()).ok()
}

#[enum_dispatch]
pub trait Sheet {
    /// Name of the sheet annotations go to.
    fn sheet_name(&self) -> &str;

    fn grid(&self) -> &Grid;

    /// Writes `value` at `column` (a letter) of the 1-based `row`.
    fn set_cell(&mut self, column: &str, row: usize, value: &str) -> Result<(), SheetError>;

    fn save_as(&self, path: &Path) -> Result<(), SheetError>;

    /// Extension of the files `save_as` produces.
    fn extension(&self) -> &'static str;
}

#[enum_dispatch(Sheet)]
#[derive(Debug, Clone, PartialEq)]
pub enum Workbook {
    XlsxWorkbook,
    CsvWorkbook,
}

impl Workbook {
    /// Loads a workbook, picking the format from the file extension. Rows are read from and
    /// annotations written to its first sheet.
    pub fn open(path: &Path) -> Result<Workbook, SheetError> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => Ok(Workbook::CsvWorkbook(CsvWorkbook::open(path)?)),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Workbook::XlsxWorkbook(XlsxWorkbook::open(path)?)),
            _ => Err(SheetError::UnsupportedFormat(extension)),
        }
    }
}

fn set_cell_in(grid: &mut Grid, column: &str, row: usize, value: &str) -> Result<(), SheetError> {
    let column = column_index(column)?;
    if row == 0 {
        return Err(SheetError::InvalidRow(row));
    }

    grid.set(row - 1, column, Cell::Text(value.to_string()));

    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedSheet {
    pub name: String,
    pub grid: Grid,
}

impl NamedSheet {
    pub fn new(name: &str, grid: Grid) -> NamedSheet {
        NamedSheet {
            name: name.to_string(),
            grid,
        }
    }
}

/// Every sheet of a spreadsheet, in workbook order. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct XlsxWorkbook {
    sheets: Vec<NamedSheet>,
}

impl XlsxWorkbook {
    pub fn new(sheets: Vec<NamedSheet>) -> Result<XlsxWorkbook, SheetError> {
        if sheets.is_empty() {
            return Err(SheetError::NoSheet);
        }

        Ok(XlsxWorkbook { sheets })
    }

    pub fn open(path: &Path) -> Result<XlsxWorkbook, SheetError> {
        let mut workbook = open_workbook_auto(path)?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name)?;
            let sheet = NamedSheet::new(&name, Grid::from_range(&range));
            debug!("loaded sheet {:?} from {}, rows={}", name, path.display(), sheet.grid.rows().len());
            sheets.push(sheet);
        }

        XlsxWorkbook::new(sheets)
    }

    pub fn sheets(&self) -> &[NamedSheet] {
        &self.sheets
    }

    fn write_sheet(worksheet: &mut rust_xlsxwriter::Worksheet, grid: &Grid) -> Result<(), SheetError> {
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

        for (row, cells) in grid.rows().iter().enumerate() {
            for (column, cell) in cells.iter().enumerate() {
                if let Cell::Empty = cell {
                    continue;
                }

                let (row, column) = cell_position(row, column)?;
                match cell {
                    Cell::Empty => {},
                    Cell::Text(text) => {
                        worksheet.write_string(row, column, text)?;
                    },
                    Cell::Number(number) => {
                        worksheet.write_number(row, column, *number)?;
                    },
                    Cell::Int(number) => {
                        worksheet.write_number(row, column, *number as f64)?;
                    },
                    Cell::Bool(value) => {
                        worksheet.write_boolean(row, column, *value)?;
                    },
                    Cell::Date(datetime) => match excel_datetime(datetime) {
                        Some(excel) => {
                            let format = if datetime.time() == NaiveTime::MIN { &date_format } else { &datetime_format };
                            worksheet.write_datetime_with_format(row, column, &excel, format)?;
                        },
                        None => {
                            worksheet.write_string(row, column, cell.to_string())?;
                        },
                    },
                }
            }
        }

        Ok(())
    }
}

impl Sheet for XlsxWorkbook {
    fn sheet_name(&self) -> &str {
        &self.sheets[0].name
    }

    fn grid(&self) -> &Grid {
        &self.sheets[0].grid
    }

    fn set_cell(&mut self, column: &str, row: usize, value: &str) -> Result<(), SheetError> {
        set_cell_in(&mut self.sheets[0].grid, column, row, value)
    }

    fn save_as(&self, path: &Path) -> Result<(), SheetError> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            XlsxWorkbook::write_sheet(worksheet, &sheet.grid)?;
        }

        workbook.save(path)?;

        Ok(())
    }

    fn extension(&self) -> &'static str {
        "xlsx"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvWorkbook {
    sheet_name: String,
    grid: Grid,
}

impl CsvWorkbook {
    pub fn new(sheet_name: &str, grid: Grid) -> CsvWorkbook {
        CsvWorkbook {
            sheet_name: sheet_name.to_string(),
            grid,
        }
    }

    pub fn open(path: &Path) -> Result<CsvWorkbook, SheetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(|field| Cell::Text(field.to_string())).collect());
        }

        let sheet_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();

        Ok(CsvWorkbook::new(sheet_name, Grid::new(rows)))
    }
}

impl Sheet for CsvWorkbook {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn set_cell(&mut self, column: &str, row: usize, value: &str) -> Result<(), SheetError> {
        set_cell_in(&mut self.grid, column, row, value)
    }

    fn save_as(&self, path: &Path) -> Result<(), SheetError> {
        let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
        for cells in self.grid.rows() {
            csv_writer.write_record(cells.iter().map(Cell::to_string))?;
        }

        csv_writer.flush()?;

        Ok(())
    }

    fn extension(&self) -> &'static str {
        "csv"
    }
}

/// Reads the first sheet of csv and spreadsheet files as text rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkbookReader;

impl RowReader for WorkbookReader {
    fn read_rows(&self, path: &Path) -> Result<Vec<Vec<String>>, SheetError> {
        let workbook = Workbook::open(path)?;
        Ok(workbook.grid().text_rows())
    }
}

/// `result_YYYYMMDD_HHMMSS.<extension>` inside `dir`, stamped with the local time.
pub fn timestamped_path(dir: &Path, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("result_{}.{}", stamp, extension))
}

#[derive(Debug, Serialize)]
pub struct AnnotationRecord<'a> {
    pub key: &'a str,
    pub row: usize,
    pub remark: &'a str,
}

/// Writes one csv line per annotated cell, in annotation order.
pub fn export_annotations<W: Write>(writer: W, reconciliation: &Reconciliation) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    for annotation in reconciliation.annotations() {
        for row in annotation.cell_rows() {
            let record = AnnotationRecord {
                key: annotation.key().as_str(),
                row,
                remark: annotation.text(),
            };
            csv_writer.serialize(record)?;
        }
    }

    csv_writer.flush()?;

    Ok(())
}
