/// `RT_VERSION` resource reader.
///
/// Walks the resource directory (type 16, first name, first language) to the
/// `VS_VERSIONINFO` block, then prefers the `StringFileInfo` `FileVersion`
/// string over the binary `VS_FIXEDFILEINFO` numbers.
use super::reader::ByteReader;
use super::{PeImage, DIR_RESOURCE};
use crate::error::{Result, SleuthError};
use crate::model::FourPartVersion;

const RT_VERSION: u32 = 16;
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;
const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
/// Resource nesting is type / name / language; anything deeper is hostile.
const MAX_DIRECTORY_DEPTH: usize = 3;

/// Version facts found in the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionResource {
    /// Raw `FileVersion` string value, if present.
    pub file_version_text: Option<String>,
    /// `dwFileVersionMS/LS` from `VS_FIXEDFILEINFO`, if present.
    pub fixed_file_version: Option<FourPartVersion>,
}

impl VersionResource {
    /// The effective file version: parsed string, then fixed info.
    pub fn file_version(&self) -> Option<FourPartVersion> {
        self.file_version_text
            .as_deref()
            .and_then(|text| text.split(' ').next())
            .and_then(|token| token.parse().ok())
            .or(self.fixed_file_version)
    }
}

/// Locate and parse the version resource of an image.
pub fn read_version_resource(image: &PeImage<'_>) -> Result<VersionResource> {
    let dir = image
        .directory(DIR_RESOURCE)
        .ok_or_else(|| SleuthError::malformed("no resource directory"))?;
    let base = image.rva_to_offset(dir.rva)?;
    let rsrc = &image.data()[base..];

    let mut offset = find_entry(rsrc, 0, Some(RT_VERSION))?;
    let mut depth = 1;
    while offset & SUBDIRECTORY_FLAG != 0 {
        if depth >= MAX_DIRECTORY_DEPTH {
            return Err(SleuthError::malformed("resource directory nested too deep"));
        }
        offset = find_entry(rsrc, (offset & !SUBDIRECTORY_FLAG) as usize, None)?;
        depth += 1;
    }

    let mut entry = ByteReader::at(rsrc, offset as usize)?;
    let data_rva = entry.u32()?;
    let data_len = entry.u32()? as usize;
    let block = image.slice_at_rva(data_rva, data_len)?;
    parse_version_info(block)
}

/// Return the `OffsetToData` of the entry with `id`, or of the first entry.
fn find_entry(rsrc: &[u8], dir_offset: usize, id: Option<u32>) -> Result<u32> {
    let mut r = ByteReader::at(rsrc, dir_offset)?;
    r.skip(12)?; // characteristics, timestamp, major/minor version
    let named = r.u16()? as usize;
    let ids = r.u16()? as usize;
    for _ in 0..named + ids {
        let name = r.u32()?;
        let target = r.u32()?;
        match id {
            None => return Ok(target),
            Some(wanted) if name == wanted => return Ok(target),
            Some(_) => {}
        }
    }
    Err(SleuthError::malformed("resource entry not found"))
}

/// One node of the `VS_VERSIONINFO` tree.
struct Block<'a> {
    key: String,
    value: &'a [u8],
    is_text: bool,
    children: &'a [u8],
}

/// Parse the block at the start of `data`; return it and its padded length.
fn parse_block(data: &[u8]) -> Result<(Block<'_>, usize)> {
    let mut r = ByteReader::new(data);
    let length = r.u16()? as usize;
    let value_len = r.u16()? as usize;
    let is_text = r.u16()? == 1;
    if length < 6 || length > data.len() {
        return Err(SleuthError::malformed("version block length out of range"));
    }
    let key = r.utf16z()?;
    r.align(4)?;

    let value_bytes = if is_text { value_len * 2 } else { value_len };
    let value_start = r.pos().min(length);
    let value_end = (value_start + value_bytes).min(length);
    let value = &data[value_start..value_end];

    let children_start = (value_end.div_ceil(4) * 4).min(length);
    let children = &data[children_start..length];
    let padded = (length.div_ceil(4) * 4).min(data.len());

    Ok((
        Block {
            key,
            value,
            is_text,
            children,
        },
        padded,
    ))
}

fn for_each_child<'a>(mut data: &'a [u8], mut visit: impl FnMut(Block<'a>)) {
    while data.len() >= 6 {
        let Ok((block, consumed)) = parse_block(data) else {
            return;
        };
        visit(block);
        if consumed == 0 {
            return;
        }
        data = &data[consumed..];
    }
}

fn parse_version_info(data: &[u8]) -> Result<VersionResource> {
    let (root, _) = parse_block(data)?;
    if root.key != "VS_VERSION_INFO" {
        return Err(SleuthError::malformed(format!(
            "unexpected version root key '{}'",
            root.key
        )));
    }

    let mut resource = VersionResource {
        fixed_file_version: parse_fixed_info(root.value),
        file_version_text: None,
    };

    for_each_child(root.children, |child| {
        if child.key != "StringFileInfo" || resource.file_version_text.is_some() {
            return;
        }
        for_each_child(child.children, |table| {
            for_each_child(table.children, |entry| {
                if entry.key == "FileVersion"
                    && entry.is_text
                    && resource.file_version_text.is_none()
                {
                    resource.file_version_text = decode_text(entry.value);
                }
            });
        });
    });

    Ok(resource)
}

fn parse_fixed_info(value: &[u8]) -> Option<FourPartVersion> {
    let mut r = ByteReader::new(value);
    if r.u32().ok()? != FIXED_FILE_INFO_SIGNATURE {
        return None;
    }
    r.skip(4).ok()?; // dwStrucVersion
    let ms = r.u32().ok()?;
    let ls = r.u32().ok()?;
    Some(FourPartVersion::new(ms >> 16, ms & 0xFFFF, ls >> 16, ls & 0xFFFF))
}

fn decode_text(value: &[u8]) -> Option<String> {
    let units: Vec<u16> = value
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    let text = String::from_utf16_lossy(&units).trim().to_string();
    (!text.is_empty()).then_some(text)
}
