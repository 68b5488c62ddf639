//! Synthetic PE image writer shared by the unit and integration tests.
//!
//! Produces small but structurally valid images: a DOS header, PE32 or PE32+
//! headers, a `.text` section holding the CLI header and metadata root, and
//! an optional `.rsrc` section holding an `RT_VERSION` resource. Only the
//! fields the readers look at are populated.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

const PE_OFFSET: usize = 0x80;
const FILE_ALIGN: usize = 0x200;
const TEXT_RVA: u32 = 0x2000;
const RSRC_RVA: u32 = 0x4000;
const CLI_HEADER_LEN: usize = 72;

/// Description of one custom attribute on the assembly.
#[derive(Debug, Clone)]
pub struct AttrSpec {
    pub namespace: String,
    pub name: String,
    pub blob: Vec<u8>,
    pub ctor: CtorRef,
}

/// How the attribute's constructor column is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtorRef {
    /// A `MemberRef` row on a `TypeRef` carrying the attribute's name.
    MemberRef,
    /// A `MethodDef` in this module.
    MethodDef,
    /// A `MemberRef` index past the end of the table.
    Dangling,
}

impl AttrSpec {
    pub fn target_framework(moniker: &str, display: Option<&str>) -> Self {
        Self {
            namespace: "System.Runtime.Versioning".into(),
            name: "TargetFrameworkAttribute".into(),
            blob: target_framework_blob(moniker, display),
            ctor: CtorRef::MemberRef,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagedSpec {
    pub name: String,
    pub version: [u16; 4],
    pub culture: String,
    pub public_key: Vec<u8>,
    pub attributes: Vec<AttrSpec>,
}

impl ManagedSpec {
    pub fn new(name: &str, version: [u16; 4]) -> Self {
        Self {
            name: name.into(),
            version,
            culture: String::new(),
            public_key: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionSpec {
    pub fixed: Option<[u16; 4]>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageSpec {
    pub pe32_plus: bool,
    pub managed: Option<ManagedSpec>,
    pub version: Option<VersionSpec>,
    /// Zero bytes appended after the last section, to vary the file size.
    pub padding: usize,
}

impl ImageSpec {
    pub fn native() -> Self {
        Self::default()
    }

    pub fn managed(name: &str, version: [u16; 4]) -> Self {
        Self {
            managed: Some(ManagedSpec::new(name, version)),
            ..Self::default()
        }
    }

    pub fn with_file_version(mut self, fixed: [u16; 4]) -> Self {
        self.version = Some(VersionSpec {
            fixed: Some(fixed),
            text: None,
        });
        self
    }

    pub fn with_attribute(mut self, attr: AttrSpec) -> Self {
        if let Some(m) = self.managed.as_mut() {
            m.attributes.push(attr);
        }
        self
    }

    pub fn with_public_key(mut self, key: &[u8]) -> Self {
        if let Some(m) = self.managed.as_mut() {
            m.public_key = key.to_vec();
        }
        self
    }

    pub fn padded(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        build_image(self)
    }

    pub fn write_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, self.build()).unwrap();
    }
}

// ── Byte helpers ─────────────────────────────────────────────────────────────

fn pad_to(buf: &mut Vec<u8>, align: usize) {
    while buf.len() % align != 0 {
        buf.push(0);
    }
}

fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn compressed_len(len: usize) -> Vec<u8> {
    match len {
        0..=0x7F => vec![len as u8],
        0x80..=0x3FFF => vec![0x80 | (len >> 8) as u8, len as u8],
        _ => vec![
            0xC0 | (len >> 24) as u8,
            (len >> 16) as u8,
            (len >> 8) as u8,
            len as u8,
        ],
    }
}

fn ser_string(s: &str) -> Vec<u8> {
    let mut v = compressed_len(s.len());
    v.extend_from_slice(s.as_bytes());
    v
}

/// Custom-attribute blob for `TargetFrameworkAttribute(moniker)` with an
/// optional `FrameworkDisplayName` named property.
pub fn target_framework_blob(moniker: &str, display: Option<&str>) -> Vec<u8> {
    let mut blob = vec![0x01, 0x00];
    blob.extend(ser_string(moniker));
    match display {
        Some(display) => {
            blob.extend(1u16.to_le_bytes());
            blob.push(0x54); // PROPERTY
            blob.push(0x0E); // ELEMENT_TYPE_STRING
            blob.extend(ser_string("FrameworkDisplayName"));
            blob.extend(ser_string(display));
        }
        None => blob.extend(0u16.to_le_bytes()),
    }
    blob
}

// ── Metadata ─────────────────────────────────────────────────────────────────

/// `#Strings` and `#Blob` heaps with 2-byte indexes.
struct Heaps {
    strings: Vec<u8>,
    blobs: Vec<u8>,
}

impl Heaps {
    fn new() -> Self {
        Self {
            strings: vec![0],
            blobs: vec![0],
        }
    }

    fn string(&mut self, s: &str) -> u16 {
        if s.is_empty() {
            return 0;
        }
        let index = self.strings.len() as u16;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        index
    }

    fn blob(&mut self, data: &[u8]) -> u16 {
        if data.is_empty() {
            return 0;
        }
        let index = self.blobs.len() as u16;
        self.blobs.extend(compressed_len(data.len()));
        self.blobs.extend_from_slice(data);
        index
    }
}

/// Build the `#~` stream: Module, TypeRef, MemberRef, CustomAttribute and
/// Assembly tables, all with 2-byte indexes.
fn tables_stream(spec: &ManagedSpec, heaps: &mut Heaps) -> Vec<u8> {
    const MODULE: u64 = 0x00;
    const TYPE_REF: u64 = 0x01;
    const MEMBER_REF: u64 = 0x0A;
    const CUSTOM_ATTRIBUTE: u64 = 0x0C;
    const ASSEMBLY: u64 = 0x20;

    let attr_count = spec.attributes.len() as u32;
    let ref_count = spec
        .attributes
        .iter()
        .filter(|a| a.ctor == CtorRef::MemberRef)
        .count() as u32;

    let mut present = vec![(MODULE, 1u32)];
    if ref_count > 0 {
        present.push((TYPE_REF, ref_count));
        present.push((MEMBER_REF, ref_count));
    }
    if attr_count > 0 {
        present.push((CUSTOM_ATTRIBUTE, attr_count));
    }
    present.push((ASSEMBLY, 1));

    let mut valid = 0u64;
    for (table, _) in &present {
        valid |= 1 << table;
    }
    let mut buf = vec![0u8, 0, 0, 0, 2, 0, 0, 1];
    buf.extend(valid.to_le_bytes());
    buf.extend(0u64.to_le_bytes());
    for (_, rows) in &present {
        buf.extend(rows.to_le_bytes());
    }

    // Module
    buf.extend(0u16.to_le_bytes());
    buf.extend(heaps.string(&format!("{}.dll", spec.name)).to_le_bytes());
    buf.extend([0u8; 6]);

    let refs: Vec<&AttrSpec> = spec
        .attributes
        .iter()
        .filter(|a| a.ctor == CtorRef::MemberRef)
        .collect();

    // TypeRef: ResolutionScope, name, namespace
    for attr in &refs {
        buf.extend(0u16.to_le_bytes());
        buf.extend(heaps.string(&attr.name).to_le_bytes());
        buf.extend(heaps.string(&attr.namespace).to_le_bytes());
    }

    // MemberRef: MemberRefParent (TypeRef = tag 1), name, signature
    let ctor_sig = heaps.blob(&[0x20, 0x01, 0x01, 0x0E]);
    for rid in 1..=refs.len() as u16 {
        buf.extend(((rid << 3) | 1).to_le_bytes());
        buf.extend(heaps.string(".ctor").to_le_bytes());
        buf.extend(ctor_sig.to_le_bytes());
    }

    // CustomAttribute: parent = Assembly row 1 (tag 14), type, value
    let parent: u16 = (1 << 5) | 14;
    let mut member_rid = 0u16;
    for attr in &spec.attributes {
        let ctor = match attr.ctor {
            CtorRef::MethodDef => (1u16 << 3) | 2,
            CtorRef::Dangling => (0x1FFF << 3) | 3,
            CtorRef::MemberRef => {
                member_rid += 1;
                (member_rid << 3) | 3
            }
        };
        buf.extend(parent.to_le_bytes());
        buf.extend(ctor.to_le_bytes());
        buf.extend(heaps.blob(&attr.blob).to_le_bytes());
    }

    // Assembly
    buf.extend(0x8004u32.to_le_bytes());
    for part in spec.version {
        buf.extend(part.to_le_bytes());
    }
    let flags: u32 = if spec.public_key.is_empty() { 0 } else { 1 };
    buf.extend(flags.to_le_bytes());
    buf.extend(heaps.blob(&spec.public_key).to_le_bytes());
    buf.extend(heaps.string(&spec.name).to_le_bytes());
    buf.extend(heaps.string(&spec.culture).to_le_bytes());

    buf
}

/// Metadata root (`BSJB`) with `#~`, `#Strings` and `#Blob` streams.
pub fn metadata_root(spec: &ManagedSpec) -> Vec<u8> {
    let mut heaps = Heaps::new();
    let mut tables = tables_stream(spec, &mut heaps);
    pad_to(&mut tables, 4);
    pad_to(&mut heaps.strings, 4);
    pad_to(&mut heaps.blobs, 4);

    let version = b"v4.0.30319\0\0";
    let mut header = Vec::new();
    header.extend(0x424A_5342u32.to_le_bytes());
    header.extend(1u16.to_le_bytes());
    header.extend(1u16.to_le_bytes());
    header.extend(0u32.to_le_bytes());
    header.extend((version.len() as u32).to_le_bytes());
    header.extend_from_slice(version);
    header.extend(0u16.to_le_bytes());
    header.extend(3u16.to_le_bytes());

    let streams: [(&str, &[u8]); 3] = [
        ("#~", &tables),
        ("#Strings", &heaps.strings),
        ("#Blob", &heaps.blobs),
    ];
    let dir_len: usize = streams
        .iter()
        .map(|(name, _)| 8 + (name.len() + 1).div_ceil(4) * 4)
        .sum();
    let base = header.len() + dir_len;

    let mut body = Vec::new();
    for (name, data) in streams {
        header.extend(((base + body.len()) as u32).to_le_bytes());
        header.extend((data.len() as u32).to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        header.push(0);
        pad_to(&mut header, 4);
        body.extend_from_slice(data);
        pad_to(&mut body, 4);
    }
    header.extend(body);
    header
}

// ── Version resource ─────────────────────────────────────────────────────────

fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|u| u.to_le_bytes())
        .collect()
}

fn version_block(key: &str, value: &[u8], is_text: bool, children: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 6];
    buf.extend(utf16z(key));
    pad_to(&mut buf, 4);
    buf.extend_from_slice(value);
    pad_to(&mut buf, 4);
    buf.extend_from_slice(children);
    let len = buf.len() as u16;
    let value_len = (if is_text { value.len() / 2 } else { value.len() }) as u16;
    put_u16(&mut buf, 0, len);
    put_u16(&mut buf, 2, value_len);
    put_u16(&mut buf, 4, u16::from(is_text));
    pad_to(&mut buf, 4);
    buf
}

fn version_info(spec: &VersionSpec) -> Vec<u8> {
    let fixed = match spec.fixed {
        Some([a, b, c, d]) => {
            let mut v = Vec::new();
            v.extend(0xFEEF_04BDu32.to_le_bytes());
            v.extend(0x0001_0000u32.to_le_bytes());
            v.extend(((u32::from(a) << 16) | u32::from(b)).to_le_bytes());
            v.extend(((u32::from(c) << 16) | u32::from(d)).to_le_bytes());
            v.resize(52, 0);
            v
        }
        None => Vec::new(),
    };
    let mut children = Vec::new();
    if let Some(text) = &spec.text {
        let entry = version_block("FileVersion", &utf16z(text), true, &[]);
        let table = version_block("040904b0", &[], true, &entry);
        children = version_block("StringFileInfo", &[], true, &table);
    }
    version_block("VS_VERSION_INFO", &fixed, false, &children)
}

/// `.rsrc` section body: type 16 / name 1 / language 0x409 / data entry.
fn resource_section(spec: &VersionSpec) -> Vec<u8> {
    fn directory(buf: &mut Vec<u8>, id: u32, target: u32) {
        buf.extend([0u8; 12]);
        buf.extend(0u16.to_le_bytes());
        buf.extend(1u16.to_le_bytes());
        buf.extend(id.to_le_bytes());
        buf.extend(target.to_le_bytes());
    }
    let mut buf = Vec::new();
    directory(&mut buf, 16, 0x8000_0000 | 24);
    directory(&mut buf, 1, 0x8000_0000 | 48);
    directory(&mut buf, 0x409, 72);
    let info = version_info(spec);
    buf.extend((RSRC_RVA + 88).to_le_bytes());
    buf.extend((info.len() as u32).to_le_bytes());
    buf.extend(0u32.to_le_bytes());
    buf.extend(0u32.to_le_bytes());
    buf.extend(info);
    buf
}

// ── Image ────────────────────────────────────────────────────────────────────

pub fn build_image(spec: &ImageSpec) -> Vec<u8> {
    let optional_len: usize = if spec.pe32_plus { 240 } else { 224 };
    let optional_start = PE_OFFSET + 24;
    let dirs_start = optional_start + if spec.pe32_plus { 112 } else { 96 };
    let sections_start = optional_start + optional_len;

    // .text: CLI header followed by the metadata root.
    let mut text = vec![0u8; CLI_HEADER_LEN];
    if let Some(managed) = &spec.managed {
        let root = metadata_root(managed);
        put_u32(&mut text, 0, CLI_HEADER_LEN as u32);
        put_u16(&mut text, 4, 2);
        put_u16(&mut text, 6, 5);
        put_u32(&mut text, 8, TEXT_RVA + CLI_HEADER_LEN as u32);
        put_u32(&mut text, 12, root.len() as u32);
        text.extend(root);
    }
    let text_len = text.len();
    pad_to(&mut text, FILE_ALIGN);

    let mut rsrc = spec.version.as_ref().map(resource_section).unwrap_or_default();
    let rsrc_len = rsrc.len();
    pad_to(&mut rsrc, FILE_ALIGN);

    let section_count: u16 = if spec.version.is_some() { 2 } else { 1 };
    let mut image = vec![0u8; FILE_ALIGN];
    image[0] = b'M';
    image[1] = b'Z';
    put_u32(&mut image, 0x3C, PE_OFFSET as u32);
    put_u32(&mut image, PE_OFFSET, 0x0000_4550);
    put_u16(&mut image, PE_OFFSET + 4, if spec.pe32_plus { 0x8664 } else { 0x014C });
    put_u16(&mut image, PE_OFFSET + 6, section_count);
    put_u16(&mut image, PE_OFFSET + 20, optional_len as u16);
    put_u16(&mut image, PE_OFFSET + 22, 0x2102);
    put_u16(
        &mut image,
        optional_start,
        if spec.pe32_plus { 0x20B } else { 0x10B },
    );
    put_u32(&mut image, dirs_start - 4, 16);
    if spec.version.is_some() {
        put_u32(&mut image, dirs_start + 2 * 8, RSRC_RVA);
        put_u32(&mut image, dirs_start + 2 * 8 + 4, rsrc_len as u32);
    }
    if spec.managed.is_some() {
        put_u32(&mut image, dirs_start + 14 * 8, TEXT_RVA);
        put_u32(&mut image, dirs_start + 14 * 8 + 4, CLI_HEADER_LEN as u32);
    }

    let text_offset = FILE_ALIGN;
    let rsrc_offset = text_offset + text.len();
    let mut section = |index: usize, name: &[u8], rva: u32, vsize: usize, raw: usize, offset: usize| {
        let at = sections_start + index * 40;
        image[at..at + name.len()].copy_from_slice(name);
        put_u32(&mut image, at + 8, vsize as u32);
        put_u32(&mut image, at + 12, rva);
        put_u32(&mut image, at + 16, raw as u32);
        put_u32(&mut image, at + 20, offset as u32);
    };
    section(0, b".text", TEXT_RVA, text_len, text.len(), text_offset);
    if spec.version.is_some() {
        section(1, b".rsrc", RSRC_RVA, rsrc_len, rsrc.len(), rsrc_offset);
    }

    image.extend(text);
    image.extend(rsrc);
    image.resize(image.len() + spec.padding, 0);
    image
}
