/// PE/COFF image inspection straight from file bytes.
///
/// Nothing here loads, maps for execution, or otherwise trusts the image:
/// the managed/native decision reads a handful of fixed offsets, and the
/// section view only translates RVAs into file offsets so the metadata and
/// resource readers can find their data.
///
/// - [`is_managed`] / [`inspect_header`] — fail-closed CLI-header probe.
/// - [`PeImage`] — data directories and section table over a byte slice.
/// - [`version`] — `RT_VERSION` resource reader.
pub mod reader;
pub mod version;

use crate::error::{Result, SleuthError};
use reader::ByteReader;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Smallest file that can hold a DOS header with its `e_lfanew` field.
pub const MIN_IMAGE_LEN: u64 = 64;

/// Offset of `e_lfanew` in the DOS header.
const PE_POINTER_OFFSET: u64 = 0x3C;

/// Used when `e_lfanew` is zero.
const DEFAULT_PE_POINTER: u32 = 0x80;

/// Room required after the PE pointer: signature, file header, optional
/// header fields and the data-directory table.
const HEADER_HEADROOM: u64 = 256;

/// `PE\0\0`.
pub const PE_SIGNATURE: u32 = 0x0000_4550;

const FILE_HEADER_LEN: u64 = 20;

pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32_PLUS_MAGIC: u16 = 0x20B;

/// Data-directory slots used by this crate.
pub const DIR_RESOURCE: usize = 2;
pub const DIR_CLI_HEADER: usize = 14;

/// Optional-header flavour, which decides where the data directories start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeaderMagic {
    Pe32,
    Pe32Plus,
}

impl OptionalHeaderMagic {
    pub fn from_raw(magic: u16) -> Option<Self> {
        match magic {
            PE32_MAGIC => Some(Self::Pe32),
            PE32_PLUS_MAGIC => Some(Self::Pe32Plus),
            _ => None,
        }
    }

    /// Distance from the PE signature to the CLI-header directory entry.
    ///
    /// Signature (4) + file header (20) + standard/NT fields (96 or 112)
    /// + 14 preceding directory entries of 8 bytes.
    pub fn cli_directory_offset(self) -> u64 {
        match self {
            Self::Pe32 => 232,
            Self::Pe32Plus => 248,
        }
    }

    /// Offset of `NumberOfRvaAndSizes` inside the optional header.
    fn rva_count_offset(self) -> usize {
        match self {
            Self::Pe32 => 92,
            Self::Pe32Plus => 108,
        }
    }
}

/// The three header facts the managed probe needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeHeaderInfo {
    pub pe_header_offset: u32,
    pub magic: OptionalHeaderMagic,
    pub cli_header_rva: u32,
}

impl PeHeaderInfo {
    /// A non-zero CLI header RVA marks a managed image.
    pub fn is_managed(&self) -> bool {
        self.cli_header_rva != 0
    }
}

/// Open `path` once and read its header facts.
///
/// `Err` means the file could not be read at all; `Ok(None)` means it was
/// read but is not a PE image.
pub fn probe(path: &Path) -> std::io::Result<Option<PeHeaderInfo>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    inspect_header(&mut file, len)
}

/// Decide whether the file at `path` is a managed (CLI) image.
///
/// Fails closed: unreadable, truncated or non-PE files all yield `false`.
/// The file handle lives only for the duration of this call.
pub fn is_managed(path: &Path) -> bool {
    match probe(path) {
        Ok(Some(info)) => info.is_managed(),
        Ok(None) => false,
        Err(e) => {
            debug!("Managed probe failed for {}: {e}", path.display());
            false
        }
    }
}

/// Probe the PE headers of a seekable source of length `len`.
///
/// Returns `Ok(None)` when the bytes are not a recognisable PE image.
pub fn inspect_header<R: Read + Seek>(
    source: &mut R,
    len: u64,
) -> std::io::Result<Option<PeHeaderInfo>> {
    if len < MIN_IMAGE_LEN {
        return Ok(None);
    }

    source.seek(SeekFrom::Start(PE_POINTER_OFFSET))?;
    let mut pe_pointer = read_u32(source)?;
    if pe_pointer == 0 {
        pe_pointer = DEFAULT_PE_POINTER;
    }

    if u64::from(pe_pointer) + HEADER_HEADROOM > len {
        return Ok(None);
    }

    source.seek(SeekFrom::Start(u64::from(pe_pointer)))?;
    if read_u32(source)? != PE_SIGNATURE {
        return Ok(None);
    }

    source.seek(SeekFrom::Current(FILE_HEADER_LEN as i64))?;
    let Some(magic) = OptionalHeaderMagic::from_raw(read_u16(source)?) else {
        return Ok(None);
    };

    source.seek(SeekFrom::Start(
        u64::from(pe_pointer) + magic.cli_directory_offset(),
    ))?;
    let cli_header_rva = read_u32(source)?;

    Ok(Some(PeHeaderInfo {
        pe_header_offset: pe_pointer,
        magic,
        cli_header_rva,
    }))
}

/// Convenience wrapper for in-memory images.
pub fn inspect_bytes(data: &[u8]) -> Option<PeHeaderInfo> {
    let mut cursor = std::io::Cursor::new(data);
    inspect_header(&mut cursor, data.len() as u64).ok().flatten()
}

fn read_u32<R: Read>(source: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u16<R: Read>(source: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// An `(rva, size)` pair from the optional header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub raw_offset: u32,
    pub raw_size: u32,
}

impl Section {
    fn contains(&self, rva: u32) -> bool {
        let span = self.virtual_size.max(self.raw_size);
        rva >= self.virtual_address && u64::from(rva) < u64::from(self.virtual_address) + u64::from(span)
    }
}

/// Section-table view over an in-memory image.
#[derive(Debug)]
pub struct PeImage<'a> {
    data: &'a [u8],
    pub magic: OptionalHeaderMagic,
    pub directories: Vec<DataDirectory>,
    pub sections: Vec<Section>,
}

impl<'a> PeImage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if (data.len() as u64) < MIN_IMAGE_LEN {
            return Err(SleuthError::malformed("image shorter than DOS header"));
        }
        let mut r = ByteReader::at(data, PE_POINTER_OFFSET as usize)?;
        let mut pe_pointer = r.u32()? as usize;
        if pe_pointer == 0 {
            pe_pointer = DEFAULT_PE_POINTER as usize;
        }

        r.seek(pe_pointer)?;
        if r.u32()? != PE_SIGNATURE {
            return Err(SleuthError::malformed("missing PE signature"));
        }
        r.skip(2)?; // machine
        let section_count = r.u16()? as usize;
        r.skip(12)?; // timestamp, symbol table, symbol count
        let optional_len = r.u16()? as usize;
        r.skip(2)?; // characteristics

        let optional_start = r.pos();
        let magic = OptionalHeaderMagic::from_raw(r.u16()?)
            .ok_or_else(|| SleuthError::malformed("unknown optional header magic"))?;

        r.seek(optional_start + magic.rva_count_offset())?;
        // Directories beyond 16 are never defined; clamp hostile counts.
        let dir_count = (r.u32()? as usize).min(16);
        let mut directories = Vec::with_capacity(dir_count);
        for _ in 0..dir_count {
            directories.push(DataDirectory {
                rva: r.u32()?,
                size: r.u32()?,
            });
        }

        r.seek(optional_start + optional_len)?;
        let mut sections = Vec::with_capacity(section_count);
        for _ in 0..section_count {
            let raw_name = r.take(8)?;
            let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(8);
            let name = String::from_utf8_lossy(&raw_name[..name_len]).into_owned();
            let virtual_size = r.u32()?;
            let virtual_address = r.u32()?;
            let raw_size = r.u32()?;
            let raw_offset = r.u32()?;
            r.skip(16)?; // relocations, line numbers, characteristics
            sections.push(Section {
                name,
                virtual_address,
                virtual_size,
                raw_offset,
                raw_size,
            });
        }

        Ok(Self {
            data,
            magic,
            directories,
            sections,
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.directories
            .get(index)
            .copied()
            .filter(|dir| dir.rva != 0)
    }

    /// Translate an RVA to a file offset via the section table.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        let section = self
            .sections
            .iter()
            .find(|s| s.contains(rva))
            .ok_or_else(|| SleuthError::malformed(format!("RVA {rva:#x} not in any section")))?;
        let delta = rva - section.virtual_address;
        if delta >= section.raw_size {
            return Err(SleuthError::malformed(format!(
                "RVA {rva:#x} falls in uninitialised data of '{}'",
                section.name
            )));
        }
        let offset = section.raw_offset as usize + delta as usize;
        if offset >= self.data.len() {
            return Err(SleuthError::malformed(format!(
                "RVA {rva:#x} maps past end of file"
            )));
        }
        Ok(offset)
    }

    /// The bytes of a data directory, clamped to the end of the file.
    pub fn directory_bytes(&self, index: usize) -> Result<&'a [u8]> {
        let dir = self
            .directory(index)
            .ok_or_else(|| SleuthError::malformed(format!("data directory {index} absent")))?;
        self.slice_at_rva(dir.rva, dir.size as usize)
    }

    /// `len` bytes starting at `rva`.
    pub fn slice_at_rva(&self, rva: u32, len: usize) -> Result<&'a [u8]> {
        let start = self.rva_to_offset(rva)?;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| SleuthError::malformed(format!("{len} bytes at RVA {rva:#x} overrun file")))?;
        Ok(&self.data[start..end])
    }
}
