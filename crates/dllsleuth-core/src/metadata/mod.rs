/// ECMA-335 metadata access over raw image bytes.
///
/// The CLI header (data directory 14) points at the metadata root; the root
/// lists the streams, of which we use `#~` (tables), `#Strings` and `#Blob`.
/// [`MetadataView`] borrows all three from one mapped image and hands out
/// row readers; the submodules decode the two things this crate needs:
///
/// - [`attribute`] — the `TargetFrameworkAttribute` moniker.
/// - [`assembly`] — the assembly manifest (name, version, culture, key token).
pub mod assembly;
pub mod attribute;
pub mod tables;

pub use assembly::{read_manifest, AssemblyManifest};
pub use attribute::{decode_target_framework, FrameworkMoniker};

use crate::error::{Result, SleuthError};
use crate::pe::reader::{utf8z_at, ByteReader};
use crate::pe::{PeImage, DIR_CLI_HEADER};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tables::{TableId, TableLayout};

/// `BSJB`.
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// Offset of the metadata directory inside the CLI header.
const COR20_METADATA_OFFSET: usize = 8;

/// Read-only mapping of a candidate file.
///
/// The handle is held only as long as the mapping value lives; callers keep
/// it scoped to a single decode.
pub struct MappedImage {
    map: Mmap,
}

impl MappedImage {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SleuthError::io(path, e))?;
        let len = file.metadata().map_err(|e| SleuthError::io(path, e))?.len();
        if len < crate::pe::MIN_IMAGE_LEN {
            return Err(SleuthError::malformed("file too small to be an image"));
        }
        // SAFETY: the map is read-only and dropped before this call returns to
        // the crawl; concurrent external truncation is an accepted limitation.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| SleuthError::io(path, e))?;
        Ok(Self { map })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }
}

/// Borrowed views of the metadata streams.
pub struct MetadataView<'a> {
    pub layout: TableLayout,
    tables: &'a [u8],
    strings: &'a [u8],
    blobs: &'a [u8],
}

impl<'a> MetadataView<'a> {
    /// Locate the metadata of a managed image.
    pub fn from_image(image: &PeImage<'a>) -> Result<Self> {
        let cli = image.directory_bytes(DIR_CLI_HEADER)?;
        let mut r = ByteReader::at(cli, COR20_METADATA_OFFSET)?;
        let md_rva = r.u32()?;
        let md_size = r.u32()? as usize;
        let root = image.slice_at_rva(md_rva, md_size)?;
        Self::from_root(root)
    }

    /// Parse the metadata root (`BSJB` header plus stream directory).
    pub fn from_root(root: &'a [u8]) -> Result<Self> {
        let mut r = ByteReader::new(root);
        if r.u32()? != METADATA_SIGNATURE {
            return Err(SleuthError::malformed("metadata signature mismatch"));
        }
        r.skip(8)?; // major, minor, reserved
        let version_len = r.u32()? as usize;
        r.skip(version_len)?;
        r.skip(2)?; // flags
        let stream_count = r.u16()?;

        let mut tables = None;
        let mut strings = None;
        let mut blobs = None;
        for _ in 0..stream_count {
            let offset = r.u32()? as usize;
            let size = r.u32()? as usize;
            let name_start = r.pos();
            let name = utf8z_at(root, name_start)?.to_string();
            r.seek(name_start + name.len() + 1)?;
            r.align(4)?;

            let data = offset
                .checked_add(size)
                .and_then(|end| root.get(offset..end))
                .ok_or_else(|| SleuthError::malformed(format!("stream {name} out of range")))?;
            match name.as_str() {
                "#~" | "#-" => tables = Some(data),
                "#Strings" => strings = Some(data),
                "#Blob" => blobs = Some(data),
                _ => {}
            }
        }

        let tables = tables.ok_or_else(|| SleuthError::malformed("no #~ stream"))?;
        Ok(Self {
            layout: TableLayout::parse(tables)?,
            tables,
            strings: strings.unwrap_or(&[]),
            blobs: blobs.unwrap_or(&[]),
        })
    }

    /// Reader positioned at the start of 1-based row `rid` of `table`.
    pub fn row(&self, table: TableId, rid: u32) -> Result<ByteReader<'a>> {
        ByteReader::at(self.tables, self.layout.row_offset(table, rid)?)
    }

    pub fn string(&self, index: u32) -> Result<&'a str> {
        utf8z_at(self.strings, index as usize)
    }

    /// Blob contents at `index` (the compressed length prefix is consumed).
    pub fn blob(&self, index: u32) -> Result<&'a [u8]> {
        let mut r = ByteReader::at(self.blobs, index as usize)?;
        let len = r.compressed_u32()? as usize;
        r.take(len)
    }

    pub fn read_str_index(&self, r: &mut ByteReader<'_>) -> Result<u32> {
        r.index(self.layout.str_width)
    }

    pub fn read_blob_index(&self, r: &mut ByteReader<'_>) -> Result<u32> {
        r.index(self.layout.blob_width)
    }
}
