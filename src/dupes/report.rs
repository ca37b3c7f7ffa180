use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::Writer;
use serde::Serialize;

use super::cluster::DuplicateGroup;
use crate::error::Error;

#[derive(Serialize)]
struct CsvRow<'a> {
    group: usize,
    hash: &'a str,
    max_distance: u32,
    file: String,
    thumbnail: String,
}

/// One row per group member. Groups are numbered from 1.
pub fn write_csv<W: Write>(groups: &[DuplicateGroup], out: W) -> Result<(), Error> {
    let mut writer = Writer::from_writer(out);
    for (index, group) in groups.iter().enumerate() {
        for (i, file) in group.files.iter().enumerate() {
            let thumbnail = group
                .thumbnails
                .get(i)
                .and_then(Option::as_ref)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            writer.serialize(CsvRow {
                group: index + 1,
                hash: &group.hash,
                max_distance: group.max_distance,
                file: file.display().to_string(),
                thumbnail,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv_file(groups: &[DuplicateGroup], path: &Path) -> Result<(), Error> {
    write_csv(groups, File::create(path)?)
}

pub fn write_json<W: Write>(groups: &[DuplicateGroup], out: W) -> Result<(), Error> {
    serde_json::to_writer_pretty(out, groups)?;
    Ok(())
}

pub fn write_json_file(groups: &[DuplicateGroup], path: &Path) -> Result<(), Error> {
    let mut out = BufWriter::new(File::create(path)?);
    write_json(groups, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Plain listing for terminals and logs.
pub fn format_text(groups: &[DuplicateGroup]) -> String {
    let mut text = String::new();
    for (index, group) in groups.iter().enumerate() {
        let _ = writeln!(
            text,
            "Group {} (hash {}, max distance {}):",
            index + 1,
            group.hash,
            group.max_distance
        );
        for file in &group.files {
            let _ = writeln!(text, "  {}", file.display());
        }
        if let Some(comparison) = &group.comparison {
            let _ = writeln!(text, "  comparison: {}", comparison.display());
        }
    }
    text
}
