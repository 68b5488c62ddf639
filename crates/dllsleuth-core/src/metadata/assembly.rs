/// Assembly manifest (`Assembly` table, 0x20) reader.
///
/// The public key token is the last eight bytes of the SHA-1 of the public
/// key blob, reversed.
use super::tables::TableId;
use super::{MappedImage, MetadataView};
use crate::error::{Result, SleuthError};
use crate::model::FourPartVersion;
use crate::pe::PeImage;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::path::Path;

/// Identity facts declared by a managed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyManifest {
    pub name: String,
    pub version: FourPartVersion,
    /// Empty for culture-neutral assemblies.
    pub culture: String,
    /// Lowercase hex, empty when the assembly is not strong-named.
    pub public_key_token: String,
}

impl AssemblyManifest {
    /// `Name, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null`.
    pub fn display_name(&self) -> String {
        let culture = if self.culture.is_empty() {
            "neutral"
        } else {
            &self.culture
        };
        let token = if self.public_key_token.is_empty() {
            "null"
        } else {
            &self.public_key_token
        };
        format!(
            "{}, Version={}, Culture={culture}, PublicKeyToken={token}",
            self.name, self.version
        )
    }
}

pub fn read_manifest(path: &Path) -> Result<AssemblyManifest> {
    let mapped = MappedImage::open(path)?;
    read_manifest_bytes(mapped.bytes())
}

pub fn read_manifest_bytes(data: &[u8]) -> Result<AssemblyManifest> {
    let image = PeImage::parse(data)?;
    let view = MetadataView::from_image(&image)?;
    manifest_from_view(&view)
}

pub fn manifest_from_view(view: &MetadataView<'_>) -> Result<AssemblyManifest> {
    if view.layout.row_count(TableId::Assembly) == 0 {
        return Err(SleuthError::malformed("module has no Assembly row"));
    }
    let mut row = view.row(TableId::Assembly, 1)?;
    row.skip(4)?; // HashAlgId
    let version = FourPartVersion::new(
        u32::from(row.u16()?),
        u32::from(row.u16()?),
        u32::from(row.u16()?),
        u32::from(row.u16()?),
    );
    row.skip(4)?; // Flags
    let public_key = view.blob(view.read_blob_index(&mut row)?)?;
    let name = view.string(view.read_str_index(&mut row)?)?;
    let culture = view.string(view.read_str_index(&mut row)?)?;

    Ok(AssemblyManifest {
        name: name.to_string(),
        version,
        culture: culture.to_string(),
        public_key_token: public_key_token(public_key),
    })
}

/// Token of a full public key; empty input yields an empty token.
pub fn public_key_token(public_key: &[u8]) -> String {
    if public_key.is_empty() {
        return String::new();
    }
    let digest = Sha1::digest(public_key);
    digest[digest.len() - 8..]
        .iter()
        .rev()
        .map(|b| format!("{b:02x}"))
        .collect()
}
