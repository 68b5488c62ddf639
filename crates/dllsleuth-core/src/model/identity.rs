/// Per-file assembly identity with compute-once fields.
///
/// Every field is computed on first access and cached in a [`OnceCell`] for
/// the lifetime of the identity, so repeated reads within one run always
/// observe the same value. Identities live in an [`IdentityArena`] and are
/// referenced by [`IdentityIndex`], the same way the crawl arena hands out
/// indices instead of references.
use super::{Fingerprint, FourPartVersion};
use crate::metadata::{self, AssemblyManifest, FrameworkMoniker};
use crate::pe::{self, version, PeImage};
use compact_str::CompactString;
use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Index into an [`IdentityArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityIndex(pub u32);

impl IdentityIndex {
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "IdentityIndex overflow");
        Self(index as u32)
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// What the bytes of a candidate turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// The file could not be opened, or claims a CLI header but has no
    /// readable assembly manifest.
    Unreadable,
    Native,
    Managed(AssemblyManifest),
}

impl ModuleKind {
    pub fn manifest(&self) -> Option<&AssemblyManifest> {
        match self {
            Self::Managed(manifest) => Some(manifest),
            _ => None,
        }
    }
}

/// Outcome of the one header read each identity makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderProbe {
    Unreadable,
    Native,
    Managed,
}

/// Identity of one candidate file.
#[derive(Debug)]
pub struct AssemblyIdentity {
    path: PathBuf,
    file_name_lower: OnceCell<CompactString>,
    size: OnceCell<u64>,
    header: OnceCell<HeaderProbe>,
    kind: OnceCell<ModuleKind>,
    file_version: OnceCell<FourPartVersion>,
    framework: OnceCell<FrameworkMoniker>,
    fingerprint: OnceCell<Fingerprint>,
}

impl AssemblyIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_name_lower: OnceCell::new(),
            size: OnceCell::new(),
            header: OnceCell::new(),
            kind: OnceCell::new(),
            file_version: OnceCell::new(),
            framework: OnceCell::new(),
            fingerprint: OnceCell::new(),
        }
    }

    /// Identity whose size is already known from the directory walk.
    pub fn with_size(path: impl Into<PathBuf>, size: u64) -> Self {
        let identity = Self::new(path);
        let _ = identity.size.set(size);
        identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Containing directory.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    pub fn file_name_lower(&self) -> &str {
        self.file_name_lower.get_or_init(|| {
            let name = self
                .path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            CompactString::from(name.to_lowercase())
        })
    }

    /// File length in bytes; 0 when the file cannot be stat'ed.
    pub fn size(&self) -> u64 {
        *self.size.get_or_init(|| match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                debug!("Cannot stat {}: {e}", self.path.display());
                0
            }
        })
    }

    pub fn is_managed(&self) -> bool {
        self.header() == HeaderProbe::Managed
    }

    fn header(&self) -> HeaderProbe {
        *self.header.get_or_init(|| match pe::probe(&self.path) {
            Ok(Some(info)) if info.is_managed() => HeaderProbe::Managed,
            Ok(_) => HeaderProbe::Native,
            Err(e) => {
                debug!("Cannot read {}: {e}", self.path.display());
                HeaderProbe::Unreadable
            }
        })
    }

    pub fn kind(&self) -> &ModuleKind {
        self.kind.get_or_init(|| match self.header() {
            HeaderProbe::Unreadable => ModuleKind::Unreadable,
            HeaderProbe::Native => ModuleKind::Native,
            HeaderProbe::Managed => match metadata::read_manifest(&self.path) {
                Ok(manifest) => ModuleKind::Managed(manifest),
                Err(e) => {
                    debug!("No manifest for {}: {e}", self.path.display());
                    ModuleKind::Unreadable
                }
            },
        })
    }

    /// Assembly display name; empty unless the module is managed.
    pub fn declared_name(&self) -> String {
        self.kind()
            .manifest()
            .map(AssemblyManifest::display_name)
            .unwrap_or_default()
    }

    /// Declared assembly version; `0.0.0.0` unless the module is managed.
    pub fn declared_version(&self) -> FourPartVersion {
        self.kind()
            .manifest()
            .map(|m| m.version)
            .unwrap_or_default()
    }

    pub fn public_key_token(&self) -> &str {
        self.kind()
            .manifest()
            .map(|m| m.public_key_token.as_str())
            .unwrap_or("")
    }

    /// File version from the version resource, or the placeholder.
    pub fn file_version(&self) -> FourPartVersion {
        *self.file_version.get_or_init(|| {
            read_file_version(&self.path).unwrap_or_else(|| {
                debug!(
                    "No usable file version in {}, using {}",
                    self.path.display(),
                    FourPartVersion::PLACEHOLDER
                );
                FourPartVersion::PLACEHOLDER
            })
        })
    }

    /// Target framework; `Unknown` for native modules.
    pub fn framework(&self) -> &FrameworkMoniker {
        self.framework.get_or_init(|| {
            if self.is_managed() {
                metadata::decode_target_framework(&self.path)
            } else {
                FrameworkMoniker::Unknown
            }
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        *self.fingerprint.get_or_init(|| {
            Fingerprint::compute(
                self.file_name_lower(),
                &self.declared_version().to_string(),
                &self.file_version().to_string(),
                self.size(),
                self.public_key_token(),
            )
        })
    }
}

fn read_file_version(path: &Path) -> Option<FourPartVersion> {
    let mapped = metadata::MappedImage::open(path).ok()?;
    let image = PeImage::parse(mapped.bytes()).ok()?;
    match version::read_version_resource(&image) {
        Ok(resource) => resource.file_version(),
        Err(e) => {
            debug!("Version resource unreadable in {}: {e}", path.display());
            None
        }
    }
}

/// Flat storage for every identity of one crawl.
#[derive(Debug, Default)]
pub struct IdentityArena {
    identities: Vec<AssemblyIdentity>,
}

impl IdentityArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            identities: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, identity: AssemblyIdentity) -> IdentityIndex {
        let index = IdentityIndex::new(self.identities.len());
        self.identities.push(identity);
        index
    }

    pub fn get(&self, index: IdentityIndex) -> &AssemblyIdentity {
        &self.identities[index.idx()]
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdentityIndex, &AssemblyIdentity)> {
        self.identities
            .iter()
            .enumerate()
            .map(|(i, identity)| (IdentityIndex::new(i), identity))
    }
}

impl FromIterator<AssemblyIdentity> for IdentityArena {
    fn from_iter<I: IntoIterator<Item = AssemblyIdentity>>(iter: I) -> Self {
        Self {
            identities: iter.into_iter().collect(),
        }
    }
}
