/// `TargetFrameworkAttribute` decoding.
///
/// Walks the `CustomAttribute` table looking for a constructor that is a
/// `MemberRef` whose parent `TypeRef` is
/// `System.Runtime.Versioning.TargetFrameworkAttribute`, then decodes the
/// argument blob. The first match wins.
use super::tables::{CodedIndex, TableId};
use super::{MappedImage, MetadataView};
use crate::error::{Result, SleuthError};
use crate::pe::reader::ByteReader;
use crate::pe::PeImage;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

const ATTRIBUTE_NAMESPACE: &str = "System.Runtime.Versioning";
const ATTRIBUTE_NAME: &str = "TargetFrameworkAttribute";

/// `CustomAttributeType` tag of a `MemberRef` constructor.
const CTOR_MEMBER_REF: u32 = 3;
/// `MemberRefParent` tag of a `TypeRef` parent.
const PARENT_TYPE_REF: u32 = 1;

/// Custom-attribute blob prolog.
const BLOB_PROLOG_LEN: usize = 2;
/// NumNamed (2), FIELD_OR_PROP tag (1) and the element type (1).
const NAMED_ARG_HEADER_LEN: usize = 4;

/// The decoded target framework, or `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum FrameworkMoniker {
    Known(String),
    Unknown,
}

impl FrameworkMoniker {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(text) => text,
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for FrameworkMoniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FrameworkMoniker> for String {
    fn from(moniker: FrameworkMoniker) -> Self {
        moniker.as_str().to_string()
    }
}

/// Decode the target framework of the managed image at `path`.
///
/// Never fails outward: unreadable files, missing metadata, a missing
/// attribute or a malformed blob all yield [`FrameworkMoniker::Unknown`].
pub fn decode_target_framework(path: &Path) -> FrameworkMoniker {
    let result = MappedImage::open(path).and_then(|mapped| decode_bytes(mapped.bytes()));
    match result {
        Ok(Some(moniker)) => FrameworkMoniker::Known(moniker),
        Ok(None) => FrameworkMoniker::Unknown,
        Err(e) => {
            debug!("Target framework decode failed for {}: {e}", path.display());
            FrameworkMoniker::Unknown
        }
    }
}

/// Decode from an in-memory image; `Ok(None)` when no attribute matches.
pub fn decode_bytes(data: &[u8]) -> Result<Option<String>> {
    let image = PeImage::parse(data)?;
    let view = MetadataView::from_image(&image)?;
    find_target_framework(&view)
}

/// Scan `CustomAttribute` rows for the first matching attribute.
pub fn find_target_framework(view: &MetadataView<'_>) -> Result<Option<String>> {
    let layout = &view.layout;
    let parent_width = layout.coded_index_width(CodedIndex::HasCustomAttribute);
    let ctor_width = layout.coded_index_width(CodedIndex::CustomAttributeType);

    for rid in 1..=layout.row_count(TableId::CustomAttribute) {
        let mut row = view.row(TableId::CustomAttribute, rid)?;
        row.index(parent_width)?;
        let (tag, member_rid) = CodedIndex::CustomAttributeType.decode(row.index(ctor_width)?);
        let value = view.read_blob_index(&mut row)?;

        // Constructors defined in this module cannot be the framework attribute.
        if tag != CTOR_MEMBER_REF {
            continue;
        }
        match is_target_framework_ctor(view, member_rid) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                debug!("Skipping custom attribute {rid}: {e}");
                continue;
            }
        }

        let blob = view.blob(value)?;
        return decode_blob(blob).map(Some);
    }
    Ok(None)
}

fn is_target_framework_ctor(view: &MetadataView<'_>, member_rid: u32) -> Result<bool> {
    let layout = &view.layout;
    let mut member = view.row(TableId::MemberRef, member_rid)?;
    let class = member.index(layout.coded_index_width(CodedIndex::MemberRefParent))?;
    let (tag, type_rid) = CodedIndex::MemberRefParent.decode(class);
    if tag != PARENT_TYPE_REF {
        return Ok(false);
    }

    let mut type_ref = view.row(TableId::TypeRef, type_rid)?;
    type_ref.index(layout.coded_index_width(CodedIndex::ResolutionScope))?;
    let name = view.string(view.read_str_index(&mut type_ref)?)?;
    let namespace = view.string(view.read_str_index(&mut type_ref)?)?;
    Ok(name == ATTRIBUTE_NAME && namespace == ATTRIBUTE_NAMESPACE)
}

/// Decode the argument blob: the display name when present, else the moniker.
pub fn decode_blob(blob: &[u8]) -> Result<String> {
    let mut r = ByteReader::new(blob);
    let moniker = decode_moniker(&mut r)?;
    Ok(decode_display_name(r)
        .filter(|name| !name.is_empty())
        .unwrap_or(moniker))
}

/// The mandatory positional argument.
fn decode_moniker(r: &mut ByteReader<'_>) -> Result<String> {
    r.skip(BLOB_PROLOG_LEN)
        .map_err(|_| SleuthError::malformed("attribute blob shorter than its prolog"))?;
    r.compressed_str()
}

/// The optional `FrameworkDisplayName` named argument.
///
/// Assumes exactly one named argument at a fixed offset after the moniker;
/// attributes carrying several named arguments may decode the wrong one.
fn decode_display_name(mut r: ByteReader<'_>) -> Option<String> {
    r.skip(NAMED_ARG_HEADER_LEN).ok()?;
    let _label = r.compressed_str().ok()?;
    r.compressed_str().ok()
}
