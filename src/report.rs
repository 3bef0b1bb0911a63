//! Tab-separated area tables.
//!
//! One row per simulated event:
//!
//! ```text
//! simulation_id	p_value	searched_area	area(50)	area(75)	area(90)
//! ```
//!
//! Areas are written as given; use [`square_degrees`] to convert from
//! steradians first.

use std::io::{BufRead, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const FIXED_COLUMNS: [&str; 3] = ["simulation_id", "p_value", "searched_area"];

/// Areas and p-value of one simulated event.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AreaRecord {
    /// Identifier of the simulated event.
    pub simulation_id: String,
    /// Credible level of the contour through the true position.
    pub p_value: f64,
    /// Area denser than the true position.
    pub searched_area: f64,
    /// Area of each credible region, in the order of the table's levels.
    pub credible_areas: Vec<f64>,
}

/// Converts an area in steradians to square degrees.
#[must_use]
pub fn square_degrees(steradians: f64) -> f64 {
    steradians * (180.0 / core::f64::consts::PI).powi(2)
}

/// Column name for a credible level, e.g. `area(90)` for 0.9.
fn area_column(level: f64) -> String {
    format!("area({})", (100.0 * level).round())
}

/// Writes `records` as a table with one area column per credible level.
///
/// # Errors
///
/// Returns `Error::Report` if a record has the wrong number of areas or the
/// writer fails.
///
/// # Examples
///
/// ```
/// use sky_area::report::{AreaRecord, write_areas};
///
/// let record = AreaRecord {
///     simulation_id: "sim_0".into(),
///     p_value: 0.25,
///     searched_area: 12.5,
///     credible_areas: vec![10.0, 40.0],
/// };
/// let mut out = Vec::new();
/// write_areas(&mut out, &[0.5, 0.9], &[record]).unwrap();
/// assert_eq!(
///     String::from_utf8(out).unwrap(),
///     "simulation_id\tp_value\tsearched_area\tarea(50)\tarea(90)\nsim_0\t0.25\t12.5\t10\t40\n"
/// );
/// ```
pub fn write_areas<W: Write>(
    mut writer: W,
    credible_levels: &[f64],
    records: &[AreaRecord],
) -> Result<()> {
    let header: Vec<String> = FIXED_COLUMNS
        .iter()
        .map(|&c| c.to_owned())
        .chain(credible_levels.iter().map(|&l| area_column(l)))
        .collect();
    writeln!(writer, "{}", header.join("\t")).map_err(|e| Error::Report(e.to_string()))?;

    for record in records {
        if record.credible_areas.len() != credible_levels.len() {
            return Err(Error::Report(format!(
                "record {} has {} areas for {} credible levels",
                record.simulation_id,
                record.credible_areas.len(),
                credible_levels.len()
            )));
        }
        let mut row = vec![
            record.simulation_id.clone(),
            record.p_value.to_string(),
            record.searched_area.to_string(),
        ];
        row.extend(record.credible_areas.iter().map(ToString::to_string));
        writeln!(writer, "{}", row.join("\t")).map_err(|e| Error::Report(e.to_string()))?;
    }
    writer.flush().map_err(|e| Error::Report(e.to_string()))
}

/// Reads a table written by [`write_areas`], returning the credible levels
/// named in its header and the records.
///
/// # Errors
///
/// Returns `Error::Report` if the reader fails, the header is missing or
/// malformed, or a row does not parse.
pub fn read_areas<R: BufRead>(reader: R) -> Result<(Vec<f64>, Vec<AreaRecord>)> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| Error::Report("missing header".to_owned()))?
        .map_err(|e| Error::Report(e.to_string()))?;
    let levels = parse_header(&header)?;

    let mut records = Vec::new();
    for (row, line) in lines.enumerate() {
        let line = line.map_err(|e| Error::Report(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != FIXED_COLUMNS.len() + levels.len() {
            return Err(Error::Report(format!(
                "row {} has {} columns, expected {}",
                row + 1,
                fields.len(),
                FIXED_COLUMNS.len() + levels.len()
            )));
        }
        let numbers = fields[1..]
            .iter()
            .map(|f| parse_number(f, row + 1))
            .collect::<Result<Vec<f64>>>()?;
        records.push(AreaRecord {
            simulation_id: fields[0].to_owned(),
            p_value: numbers[0],
            searched_area: numbers[1],
            credible_areas: numbers[2..].to_vec(),
        });
    }
    Ok((levels, records))
}

fn parse_header(header: &str) -> Result<Vec<f64>> {
    let columns: Vec<&str> = header.split('\t').collect();
    if columns.len() < FIXED_COLUMNS.len() || columns[..FIXED_COLUMNS.len()] != FIXED_COLUMNS {
        return Err(Error::Report(format!("unexpected header: {header}")));
    }
    columns[FIXED_COLUMNS.len()..]
        .iter()
        .map(|column| {
            column
                .strip_prefix("area(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|percent| percent.parse::<f64>().ok())
                .map(|percent| percent / 100.0)
                .ok_or_else(|| Error::Report(format!("unexpected column: {column}")))
        })
        .collect()
}

fn parse_number(field: &str, row: usize) -> Result<f64> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::Report(format!("row {row}: cannot parse {field:?}")))
}
