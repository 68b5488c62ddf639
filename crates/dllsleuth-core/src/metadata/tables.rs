/// ECMA-335 II.22 table schema and physical layout of the `#~` stream.
///
/// Only the row *sizes* of every table matter to us: tables are stored
/// back-to-back, so reaching `CustomAttribute` (0x0C) or `Assembly` (0x20)
/// means sizing every present table before it. Column widths depend on row
/// counts (2- vs 4-byte table and coded indexes) and on the heap-size flags.
use crate::error::{Result, SleuthError};
use crate::pe::reader::ByteReader;
use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// Tables defined for type-system metadata, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[repr(u8)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

/// Highest table number this reader can size.
pub const MAX_KNOWN_TABLE: u8 = TableId::GenericParamConstraint as u8;

/// Coded index families (ECMA-335 II.24.2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedIndex {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndex {
    /// Tables addressable by the tag, in tag order. `None` marks unused tags.
    pub fn tables(self) -> &'static [Option<TableId>] {
        use TableId::*;
        match self {
            Self::TypeDefOrRef => &[Some(TypeDef), Some(TypeRef), Some(TypeSpec)],
            Self::HasConstant => &[Some(Field), Some(Param), Some(Property)],
            Self::HasCustomAttribute => &[
                Some(MethodDef),
                Some(Field),
                Some(TypeRef),
                Some(TypeDef),
                Some(Param),
                Some(InterfaceImpl),
                Some(MemberRef),
                Some(Module),
                Some(DeclSecurity),
                Some(Property),
                Some(Event),
                Some(StandAloneSig),
                Some(ModuleRef),
                Some(TypeSpec),
                Some(Assembly),
                Some(AssemblyRef),
                Some(File),
                Some(ExportedType),
                Some(ManifestResource),
                Some(GenericParam),
                Some(GenericParamConstraint),
                Some(MethodSpec),
            ],
            Self::HasFieldMarshal => &[Some(Field), Some(Param)],
            Self::HasDeclSecurity => &[Some(TypeDef), Some(MethodDef), Some(Assembly)],
            Self::MemberRefParent => &[
                Some(TypeDef),
                Some(TypeRef),
                Some(ModuleRef),
                Some(MethodDef),
                Some(TypeSpec),
            ],
            Self::HasSemantics => &[Some(Event), Some(Property)],
            Self::MethodDefOrRef => &[Some(MethodDef), Some(MemberRef)],
            Self::MemberForwarded => &[Some(Field), Some(MethodDef)],
            Self::Implementation => &[Some(File), Some(AssemblyRef), Some(ExportedType)],
            Self::CustomAttributeType => &[None, None, Some(MethodDef), Some(MemberRef), None],
            Self::ResolutionScope => &[
                Some(Module),
                Some(ModuleRef),
                Some(AssemblyRef),
                Some(TypeRef),
            ],
            Self::TypeOrMethodDef => &[Some(TypeDef), Some(MethodDef)],
        }
    }

    /// Number of low bits holding the tag.
    pub fn tag_bits(self) -> u32 {
        let n = self.tables().len() as u32;
        u32::BITS - (n - 1).leading_zeros()
    }

    /// Split a raw coded index into `(tag, row)`.
    pub fn decode(self, raw: u32) -> (u32, u32) {
        let bits = self.tag_bits();
        (raw & ((1 << bits) - 1), raw >> bits)
    }
}

/// Column kinds; widths are resolved against a concrete [`TableLayout`].
#[derive(Debug, Clone, Copy)]
enum Column {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Table(TableId),
    Coded(CodedIndex),
}

impl TableId {
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::iter().find(|t| *t as u8 == value)
    }

    fn columns(self) -> &'static [Column] {
        use CodedIndex as C;
        use Column::*;
        match self {
            Self::Module => &[U16, Str, Guid, Guid, Guid],
            Self::TypeRef => &[Coded(C::ResolutionScope), Str, Str],
            Self::TypeDef => &[
                U32,
                Str,
                Str,
                Coded(C::TypeDefOrRef),
                Table(TableId::Field),
                Table(TableId::MethodDef),
            ],
            Self::FieldPtr => &[Table(TableId::Field)],
            Self::Field => &[U16, Str, Blob],
            Self::MethodPtr => &[Table(TableId::MethodDef)],
            Self::MethodDef => &[U32, U16, U16, Str, Blob, Table(TableId::Param)],
            Self::ParamPtr => &[Table(TableId::Param)],
            Self::Param => &[U16, U16, Str],
            Self::InterfaceImpl => &[Table(TableId::TypeDef), Coded(C::TypeDefOrRef)],
            Self::MemberRef => &[Coded(C::MemberRefParent), Str, Blob],
            Self::Constant => &[U16, Coded(C::HasConstant), Blob],
            Self::CustomAttribute => &[
                Coded(C::HasCustomAttribute),
                Coded(C::CustomAttributeType),
                Blob,
            ],
            Self::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
            Self::DeclSecurity => &[U16, Coded(C::HasDeclSecurity), Blob],
            Self::ClassLayout => &[U16, U32, Table(TableId::TypeDef)],
            Self::FieldLayout => &[U32, Table(TableId::Field)],
            Self::StandAloneSig => &[Blob],
            Self::EventMap => &[Table(TableId::TypeDef), Table(TableId::Event)],
            Self::EventPtr => &[Table(TableId::Event)],
            Self::Event => &[U16, Str, Coded(C::TypeDefOrRef)],
            Self::PropertyMap => &[Table(TableId::TypeDef), Table(TableId::Property)],
            Self::PropertyPtr => &[Table(TableId::Property)],
            Self::Property => &[U16, Str, Blob],
            Self::MethodSemantics => &[U16, Table(TableId::MethodDef), Coded(C::HasSemantics)],
            Self::MethodImpl => &[
                Table(TableId::TypeDef),
                Coded(C::MethodDefOrRef),
                Coded(C::MethodDefOrRef),
            ],
            Self::ModuleRef => &[Str],
            Self::TypeSpec => &[Blob],
            Self::ImplMap => &[U16, Coded(C::MemberForwarded), Str, Table(TableId::ModuleRef)],
            Self::FieldRva => &[U32, Table(TableId::Field)],
            Self::EncLog => &[U32, U32],
            Self::EncMap => &[U32],
            Self::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
            Self::AssemblyProcessor => &[U32],
            Self::AssemblyOs => &[U32, U32, U32],
            Self::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
            Self::AssemblyRefProcessor => &[U32, Table(TableId::AssemblyRef)],
            Self::AssemblyRefOs => &[U32, U32, U32, Table(TableId::AssemblyRef)],
            Self::File => &[U32, Str, Blob],
            Self::ExportedType => &[U32, U32, Str, Str, Coded(C::Implementation)],
            Self::ManifestResource => &[U32, U32, Str, Coded(C::Implementation)],
            Self::NestedClass => &[Table(TableId::TypeDef), Table(TableId::TypeDef)],
            Self::GenericParam => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
            Self::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
            Self::GenericParamConstraint => {
                &[Table(TableId::GenericParam), Coded(C::TypeDefOrRef)]
            }
        }
    }
}

const HEAP_LARGE_STRINGS: u8 = 0x01;
const HEAP_LARGE_GUIDS: u8 = 0x02;
const HEAP_LARGE_BLOBS: u8 = 0x04;
/// An extra 4-byte field follows the row counts (uncompressed `#-` streams).
const HEAP_EXTRA_DATA: u8 = 0x40;

/// Row counts, index widths and table offsets for one `#~` stream.
#[derive(Debug, Clone)]
pub struct TableLayout {
    rows: [u32; TableId::COUNT],
    offsets: [usize; TableId::COUNT],
    row_sizes: [usize; TableId::COUNT],
    pub str_width: u8,
    pub guid_width: u8,
    pub blob_width: u8,
}

impl TableLayout {
    /// Parse the stream header and compute where every table lives.
    ///
    /// Offsets are relative to the start of `stream`.
    pub fn parse(stream: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(stream);
        r.skip(6)?; // reserved, major, minor
        let heap_sizes = r.u8()?;
        r.skip(1)?; // reserved
        let valid = r.u64()?;
        r.skip(8)?; // sorted

        let mut rows = [0u32; TableId::COUNT];
        for bit in 0..64u8 {
            if valid & (1u64 << bit) == 0 {
                continue;
            }
            let count = r.u32()?;
            match TableId::from_u8(bit) {
                Some(table) => rows[table as usize] = count,
                // Tables past GenericParamConstraint (portable PDB) come
                // after every table we need, so they only cost a row count.
                None if bit > MAX_KNOWN_TABLE => {}
                None => {
                    return Err(SleuthError::malformed(format!(
                        "valid mask names undefined table {bit:#04x}"
                    )))
                }
            }
        }
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            r.skip(4)?;
        }

        let mut layout = Self {
            rows,
            offsets: [0; TableId::COUNT],
            row_sizes: [0; TableId::COUNT],
            str_width: width(heap_sizes & HEAP_LARGE_STRINGS != 0),
            guid_width: width(heap_sizes & HEAP_LARGE_GUIDS != 0),
            blob_width: width(heap_sizes & HEAP_LARGE_BLOBS != 0),
        };

        let mut offset = r.pos();
        for table in TableId::iter() {
            let row_size = layout.compute_row_size(table);
            layout.row_sizes[table as usize] = row_size;
            layout.offsets[table as usize] = offset;
            let table_len = row_size
                .checked_mul(layout.rows[table as usize] as usize)
                .ok_or_else(|| SleuthError::malformed("table size overflow"))?;
            offset = offset
                .checked_add(table_len)
                .ok_or_else(|| SleuthError::malformed("table offset overflow"))?;
        }
        if offset > stream.len() {
            return Err(SleuthError::malformed(format!(
                "tables need {offset} bytes, stream has {}",
                stream.len()
            )));
        }

        Ok(layout)
    }

    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    pub fn row_size(&self, table: TableId) -> usize {
        self.row_sizes[table as usize]
    }

    /// Offset (within the stream) of 1-based row `rid`.
    pub fn row_offset(&self, table: TableId, rid: u32) -> Result<usize> {
        if rid == 0 || rid > self.row_count(table) {
            return Err(SleuthError::malformed(format!(
                "row {rid} out of range for {table:?}"
            )));
        }
        Ok(self.offsets[table as usize] + (rid as usize - 1) * self.row_size(table))
    }

    pub fn table_index_width(&self, table: TableId) -> u8 {
        width(self.row_count(table) > u32::from(u16::MAX))
    }

    pub fn coded_index_width(&self, coded: CodedIndex) -> u8 {
        let max_rows = coded
            .tables()
            .iter()
            .flatten()
            .map(|t| self.row_count(*t))
            .max()
            .unwrap_or(0);
        width(u64::from(max_rows) >= 1u64 << (16 - coded.tag_bits()))
    }

    fn compute_row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| match *column {
                Column::U16 => 2,
                Column::U32 => 4,
                Column::Str => self.str_width as usize,
                Column::Guid => self.guid_width as usize,
                Column::Blob => self.blob_width as usize,
                Column::Table(t) => self.table_index_width(t) as usize,
                Column::Coded(c) => self.coded_index_width(c) as usize,
            })
            .sum()
    }
}

fn width(large: bool) -> u8 {
    if large {
        4
    } else {
        2
    }
}
