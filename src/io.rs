//! CSV input and output of panels and score tables.
//!
//! Panels use the header `id,date[,cutoff_date],<value columns...>` with
//! ISO dates. Empty cells read as `NaN` and `NaN` writes as an empty cell.

use crate::core::Panel;
use crate::error::{ForecastError, Result};
use crate::scoring::ScoreTable;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

const ID: &str = "id";
const DATE: &str = "date";
const CUTOFF: &str = "cutoff_date";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(s: &str, line: u64) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| ForecastError::DateError(format!("line {line}: '{s}': {e}")))
}

fn parse_value(s: &str, line: u64) -> Result<f64> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null") {
        return Ok(f64::NAN);
    }
    s.parse()
        .map_err(|_| ForecastError::Csv(format!("line {line}: '{s}' is not a number")))
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Read a panel from any CSV source.
pub fn read_panel<R: Read>(reader: R) -> Result<Panel> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let id_col = position(ID).ok_or_else(|| ForecastError::MissingColumn(ID.into()))?;
    let date_col = position(DATE).ok_or_else(|| ForecastError::MissingColumn(DATE.into()))?;
    let cutoff_col = position(CUTOFF);
    let value_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_col && *i != date_col && Some(*i) != cutoff_col)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut ids = Vec::new();
    let mut dates = Vec::new();
    let mut cutoffs = cutoff_col.map(|_| Vec::new());
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); value_cols.len()];
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let field = |i: usize| record.get(i).unwrap_or("");
        ids.push(field(id_col).to_string());
        dates.push(parse_date(field(date_col), line)?);
        if let (Some(c), Some(col)) = (cutoffs.as_mut(), cutoff_col) {
            c.push(parse_date(field(col), line)?);
        }
        for ((i, _), column) in value_cols.iter().zip(values.iter_mut()) {
            column.push(parse_value(field(*i), line)?);
        }
    }

    let columns = value_cols
        .into_iter()
        .map(|(_, name)| name)
        .zip(values)
        .collect();
    Panel::new(ids, dates, cutoffs, columns)
}

/// Read a panel from a CSV file.
pub fn read_panel_csv(path: impl AsRef<Path>) -> Result<Panel> {
    let path = path.as_ref();
    let panel = read_panel(File::open(path)?)?;
    debug!(path = %path.display(), rows = panel.len(), "read panel");
    Ok(panel)
}

/// Write a panel as CSV to any sink.
pub fn write_panel<W: Write>(panel: &Panel, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let names = panel.column_names();
    let columns = names
        .iter()
        .map(|n| panel.column(n))
        .collect::<Result<Vec<_>>>()?;

    let mut header = vec![ID, DATE];
    if panel.has_cutoff() {
        header.push(CUTOFF);
    }
    header.extend(names.iter().copied());
    wtr.write_record(&header)?;

    for i in 0..panel.len() {
        let mut row = vec![panel.ids()[i].clone(), panel.dates()[i].format(DATE_FORMAT).to_string()];
        if let Some(c) = panel.cutoff(i) {
            row.push(c.format(DATE_FORMAT).to_string());
        }
        row.extend(columns.iter().map(|c| format_value(c[i])));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a panel to a CSV file.
pub fn write_panel_csv(panel: &Panel, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    write_panel(panel, File::create(path)?)?;
    debug!(path = %path.display(), rows = panel.len(), "wrote panel");
    Ok(())
}

#[derive(Serialize)]
struct ScoreRow<'a> {
    id: Option<&'a str>,
    cutoff_date: Option<String>,
    horizon: Option<i64>,
    class: Option<&'static str>,
    model: &'a str,
    mae: Option<f64>,
    bias: Option<f64>,
    score: Option<f64>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Write a score table as CSV; key columns the granularity does not use
/// stay empty, as do undefined scores.
pub fn write_score_table<W: Write>(table: &ScoreTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for r in table.records() {
        wtr.serialize(ScoreRow {
            id: r.key.id.as_deref(),
            cutoff_date: r.key.cutoff.map(|c| c.format(DATE_FORMAT).to_string()),
            horizon: r.key.horizon,
            class: r.key.class.map(|c| c.as_str()),
            model: &r.model,
            mae: finite(r.metrics.mae),
            bias: finite(r.metrics.bias),
            score: finite(r.metrics.score),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a score table to a CSV file.
pub fn write_score_table_csv(table: &ScoreTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    write_score_table(table, File::create(path)?)?;
    debug!(path = %path.display(), records = table.len(), "wrote score table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frequency;
    use crate::scoring::{Granularity, Scorer};

    const SALES_CSV: &str = "\
id,date,sales,price
b,2024-01-08,3,1.5
a,2024-01-01,1,
a,2024-01-08,,2.0
b,2024-01-01,4,1.5
";

    #[test]
    fn reads_and_sorts_with_missing_cells() {
        let panel = read_panel(SALES_CSV.as_bytes()).unwrap();
        assert_eq!(panel.len(), 4);
        assert_eq!(panel.ids(), &["a", "a", "b", "b"]);
        assert!(!panel.has_cutoff());
        let sales = panel.column("sales").unwrap();
        assert_eq!(sales[0], 1.0);
        assert!(sales[1].is_nan());
        assert!(panel.column("price").unwrap()[0].is_nan());
    }

    #[test]
    fn panel_survives_a_file_round_trip() {
        let csv = "id,date,cutoff_date,pred_A\nx,2024-02-05,2024-02-05,1.25\nx,2024-02-12,2024-02-05,\n";
        let panel = read_panel(csv.as_bytes()).unwrap();
        assert!(panel.has_cutoff());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.csv");
        write_panel_csv(&panel, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("id,date,cutoff_date,pred_A\n"));
        assert!(text.contains("x,2024-02-12,2024-02-05,\n"));
        let back = read_panel_csv(&path).unwrap();
        assert_eq!(back.column("pred_A").unwrap()[0], 1.25);
        assert!(back.column("pred_A").unwrap()[1].is_nan());
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(matches!(
            read_panel("date,sales\n2024-01-01,1\n".as_bytes()),
            Err(ForecastError::MissingColumn(_))
        ));
        assert!(matches!(
            read_panel("id,date,sales\na,01/02/2024,1\n".as_bytes()),
            Err(ForecastError::DateError(_))
        ));
        assert!(matches!(
            read_panel("id,date,sales\na,2024-01-01,lots\n".as_bytes()),
            Err(ForecastError::Csv(_))
        ));
        assert!(matches!(
            read_panel("id,date,sales\na,2024-01-01,1\na,2024-01-01,2\n".as_bytes()),
            Err(ForecastError::DuplicateKey(_))
        ));
    }

    #[test]
    fn score_table_has_one_row_per_record() {
        let sales = read_panel(SALES_CSV.as_bytes()).unwrap();
        let forecast = read_panel(
            "id,date,cutoff_date,pred_A\na,2024-01-01,2024-01-01,2\nb,2024-01-01,2024-01-01,4\n"
                .as_bytes(),
        )
        .unwrap();
        let table = Scorer::new(Frequency::Week)
            .score(&forecast, &sales, Granularity::IdCutoff)
            .unwrap();
        let mut out = Vec::new();
        write_score_table(&table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,cutoff_date,horizon,class,model,mae,bias,score");
        assert_eq!(lines[1], "a,2024-01-01,,,A,1.0,1.0,2.0");
        assert_eq!(lines[2], "b,2024-01-01,,,A,0.0,0.0,0.0");
    }
}
