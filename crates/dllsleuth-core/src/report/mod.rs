/// CSV export of a duplicate map.
///
/// One row per physical file, ordered by file name, then fingerprint, then
/// crawl order. `Count` and `TotalSizeBytes` describe the row's fingerprint
/// subgroup; `FilePath` is the containing directory.
use crate::analysis::duplicates::DuplicateMap;
use crate::error::Result;
use crate::model::IdentityArena;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportRow {
    pub file_name: String,
    pub assembly_name: String,
    pub count: usize,
    pub total_size_bytes: u64,
    pub is_managed: bool,
    pub file_path: String,
    pub size: u64,
}

/// Flatten `map` into report rows.
pub fn rows(map: &DuplicateMap, arena: &IdentityArena) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    for (file_name, groups) in map {
        for members in groups.values() {
            let total_size_bytes = members.iter().map(|&i| arena.get(i).size()).sum();
            for &index in members {
                let id = arena.get(index);
                rows.push(ReportRow {
                    file_name: file_name.to_string(),
                    assembly_name: id.declared_name(),
                    count: members.len(),
                    total_size_bytes,
                    is_managed: id.is_managed(),
                    file_path: id.directory().display().to_string(),
                    size: id.size(),
                });
            }
        }
    }
    rows
}

/// Write the header and every row of `map` to `out`; returns the row count.
pub fn write_csv<W: Write>(map: &DuplicateMap, arena: &IdentityArena, out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    let rows = rows(map, arena);
    if rows.is_empty() {
        writer.write_record([
            "FileName",
            "AssemblyName",
            "Count",
            "TotalSizeBytes",
            "IsManaged",
            "FilePath",
            "Size",
        ])?;
    }
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(rows.len())
}
