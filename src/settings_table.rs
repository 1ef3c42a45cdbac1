//! Channel settings table - CSV export and import of display settings
//!
//! One row per channel with the columns `name`, `description`, `color`,
//! `alpha`, `range` and `gamma`. Colors are written in [0, 255]; a color table
//! goes to a `.pal` side file next to the CSV holding one RGB triple per line,
//! and the cell holds the side file's base name.

use crate::container::Container;
use crate::error::{ImsError, Result};
use crate::metadata::{read_metadata, ImsMetadata};
use crate::settings::{ChannelColor, ChannelSettings};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Column headings in export order
pub const SETTINGS_COLUMNS: [&str; 6] = ["name", "description", "color", "alpha", "range", "gamma"];

/// Side file name of the color table of channel `index`.
fn color_table_path(csv_path: &Path, index: usize) -> PathBuf {
    let stem = csv_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    csv_path.with_file_name(format!("{stem}_color_table_channel{index}.pal"))
}

fn write_palette(path: &Path, table: &[[f64; 3]]) -> Result<()> {
    let text: String = table
        .iter()
        .map(|[r, g, b]| format!("{:.3} {:.3} {:.3}\n", r * 255.0, g * 255.0, b * 255.0))
        .collect();
    fs::write(path, text)?;
    Ok(())
}

fn join_scaled(values: &[f64], scale: f64) -> String {
    values
        .iter()
        .map(|v| (v * scale).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Export the display settings of every channel of a container to a CSV file.
///
/// The `gamma` column is written only when the first channel carries a gamma.
pub fn export_channel_settings(container_path: impl AsRef<Path>, csv_path: impl AsRef<Path>) -> Result<()> {
    let csv_path = csv_path.as_ref();
    let metadata = ImsMetadata::from_container(&Container::open(container_path)?)?;
    let with_gamma = metadata
        .channels
        .first()
        .map(|(_, s)| s.gamma.is_some())
        .unwrap_or(false);
    let columns = if with_gamma { &SETTINGS_COLUMNS[..] } else { &SETTINGS_COLUMNS[..5] };

    let mut writer = csv::Writer::from_path(csv_path)?;
    writer.write_record(columns)?;
    for (index, settings) in &metadata.channels {
        let color = match &settings.color {
            Some(ChannelColor::Base(rgb)) => join_scaled(rgb, 255.0),
            Some(ChannelColor::Table(table)) => {
                let side = color_table_path(csv_path, *index);
                write_palette(&side, table)?;
                debug!("wrote color table of channel {} to {}", index, side.display());
                side.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            }
            None => String::new(),
        };
        let mut record = vec![
            settings.name.clone().unwrap_or_default(),
            settings.description.clone().unwrap_or_default(),
            color,
            settings.alpha.map(|a| a.to_string()).unwrap_or_default(),
            settings.range.map(|r| join_scaled(&r, 1.0)).unwrap_or_default(),
        ];
        if with_gamma {
            record.push(settings.gamma.map(|g| g.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!(
        "exported settings of {} channels to {}",
        metadata.channel_count(),
        csv_path.display()
    );
    Ok(())
}

fn parse_numbers(text: &str) -> Option<Vec<f64>> {
    text.replace(',', " ")
        .split_whitespace()
        .map(|v| v.parse().ok())
        .collect()
}

/// A color cell is an RGB triple or the name of a palette file relative to
/// the CSV directory. All values must be in [0, 255].
fn parse_color(cell: &str, base_dir: &Path) -> Option<ChannelColor> {
    let values = match parse_numbers(cell) {
        Some(values) if values.len() == 3 => values,
        Some(_) => return None,
        None => {
            let text = fs::read_to_string(base_dir.join(cell.trim())).ok()?;
            parse_numbers(&text)?
        }
    };
    if values.iter().any(|v| !(0.0..=255.0).contains(v)) {
        return None;
    }
    let scaled: Vec<f64> = values.iter().map(|v| v / 255.0).collect();
    ChannelColor::from_components(&scaled)
}

fn parse_column<T>(
    column: &str,
    cells: &[String],
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>> {
    let parsed: Vec<Option<T>> = cells.iter().map(|c| parse(c)).collect();
    let bad: Vec<String> = parsed
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_none())
        .map(|(i, _)| i.to_string())
        .collect();
    if !bad.is_empty() {
        return Err(ImsError::InvalidValue(format!(
            "invalid {column} value in row(s): {}",
            bad.join(",")
        )));
    }
    Ok(parsed.into_iter().flatten().collect())
}

/// Load channel display settings from a CSV file.
///
/// Any subset of the known columns may be present; rows are matched to
/// channels by position. Color table files are resolved relative to the CSV.
pub fn load_channel_settings(csv_path: impl AsRef<Path>) -> Result<Vec<(usize, ChannelSettings)>> {
    let csv_path = csv_path.as_ref();
    let base_dir = csv_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(csv_path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let rows = reader
        .records()
        .map(|r| Ok(r?.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<Result<Vec<Vec<String>>>>()?;

    let empty: Vec<String> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.len() < headers.len() || row.iter().any(|c| c.trim().is_empty()))
        .map(|(i, _)| i.to_string())
        .collect();
    if !empty.is_empty() {
        return Err(ImsError::InvalidValue(format!(
            "missing values in row(s): {}",
            empty.join(",")
        )));
    }

    let column = |name: &str| -> Option<Vec<String>> {
        let at = headers.iter().position(|h| h == name)?;
        Some(rows.iter().map(|row| row[at].clone()).collect())
    };
    if !SETTINGS_COLUMNS.iter().any(|name| headers.iter().any(|h| h == name)) {
        return Err(ImsError::InvalidValue(format!(
            "{} has none of the columns {}",
            csv_path.display(),
            SETTINGS_COLUMNS.join(", ")
        )));
    }

    let mut settings = vec![ChannelSettings::default(); rows.len()];
    if let Some(cells) = column("name") {
        for (entry, name) in settings.iter_mut().zip(cells) {
            entry.name = Some(name);
        }
    }
    if let Some(cells) = column("description") {
        for (entry, description) in settings.iter_mut().zip(cells) {
            entry.description = Some(description);
        }
    }
    if let Some(cells) = column("color") {
        let colors = parse_column("color", &cells, |c| parse_color(c, &base_dir))?;
        for (entry, color) in settings.iter_mut().zip(colors) {
            entry.color = Some(color);
        }
    }
    if let Some(cells) = column("alpha") {
        let alphas = parse_column("alpha", &cells, |c| c.trim().parse().ok())?;
        for (entry, alpha) in settings.iter_mut().zip(alphas) {
            entry.alpha = Some(alpha);
        }
    }
    if let Some(cells) = column("range") {
        let ranges = parse_column("range", &cells, |c| match parse_numbers(c)?.as_slice() {
            [min, max] => Some([*min, *max]),
            _ => None,
        })?;
        for (entry, range) in settings.iter_mut().zip(ranges) {
            entry.range = Some(range);
        }
    }
    if let Some(cells) = column("gamma") {
        let gammas = parse_column("gamma", &cells, |c| c.trim().parse().ok())?;
        for (entry, gamma) in settings.iter_mut().zip(gammas) {
            entry.gamma = Some(gamma);
        }
    }

    debug!("loaded settings of {} channels from {}", settings.len(), csv_path.display());
    Ok(settings.into_iter().enumerate().collect())
}

/// Load channel display settings from a CSV file or from another container.
pub fn load_settings_source(path: impl AsRef<Path>) -> Result<Vec<(usize, ChannelSettings)>> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        load_channel_settings(path)
    } else {
        Ok(read_metadata(path)?.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("settings.csv");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_full_table() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("glow.pal"), "0 0 0\n127.5 127.5 127.5\n255 255 255\n").unwrap();
        let path = write_csv(
            dir.path(),
            "name,description,color,alpha,range,gamma\n\
             Cy5,first,\"255, 0, 0\",1.0,\"0, 255\",1.0\n\
             Nucleus,second,glow.pal,0.5,\"72.272, 158.038\",2.0\n",
        );
        let settings = load_channel_settings(&path).unwrap();
        assert_eq!(settings.len(), 2);
        let (index, first) = &settings[0];
        assert_eq!(*index, 0);
        assert_eq!(first.name.as_deref(), Some("Cy5"));
        assert_eq!(first.color, Some(ChannelColor::Base([1.0, 0.0, 0.0])));
        let second = &settings[1].1;
        assert_eq!(second.alpha, Some(0.5));
        assert_eq!(second.range, Some([72.272, 158.038]));
        assert_eq!(second.gamma, Some(2.0));
        match &second.color {
            Some(ChannelColor::Table(table)) => {
                assert_eq!(table.len(), 3);
                assert_eq!(table[1], [0.5, 0.5, 0.5]);
            }
            other => panic!("expected a color table, got {other:?}"),
        }
    }

    #[test]
    fn test_load_subset_of_columns() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(dir.path(), "alpha,comment\n0.25,x\n0.75,y\n");
        let settings = load_channel_settings(&path).unwrap();
        assert_eq!(settings[1].1.alpha, Some(0.75));
        assert!(settings[1].1.name.is_none());
        assert!(settings[1].1.color.is_none());
    }

    #[test]
    fn test_missing_cells_reported_by_row() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(dir.path(), "name,alpha\na,1\nb,\nc,1\n,1\n");
        match load_channel_settings(&path) {
            Err(ImsError::InvalidValue(message)) => assert!(message.ends_with("1,3")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_unknown_columns_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(dir.path(), "foo,bar\n1,2\n");
        assert!(matches!(
            load_channel_settings(&path),
            Err(ImsError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_color_out_of_range_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_csv(dir.path(), "color\n\"0 0 0\"\n\"300 0 0\"\n\"1 2\"\n");
        match load_channel_settings(&path) {
            Err(ImsError::InvalidValue(message)) => assert!(message.ends_with("1,2")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_palette_side_file_name() {
        assert_eq!(
            color_table_path(Path::new("/tmp/out/run.csv"), 2),
            PathBuf::from("/tmp/out/run_color_table_channel2.pal")
        );
    }
}
