/// Data model for candidate assemblies.
///
/// Re-exports the identity arena and the value types it is built from.
pub mod fingerprint;
pub mod identity;
pub mod version;

pub use crate::metadata::FrameworkMoniker;
pub use fingerprint::Fingerprint;
pub use identity::{AssemblyIdentity, IdentityArena, IdentityIndex, ModuleKind};
pub use version::FourPartVersion;
