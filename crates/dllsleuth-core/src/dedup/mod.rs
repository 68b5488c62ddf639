/// Transactional symlink consolidation.
///
/// For one file name of the managed view, every fingerprint subgroup goes
/// through:
///
/// ```text
/// Pending -> CacheEnsured -> ManifestAppended -> CanonicalMaterialized
///         -> (Linking -> Linked)* -> Done
///                Linking -> RolledBack -> Failed
/// ```
///
/// There is no atomic "replace file with link" primitive, so each member is
/// deleted and then linked; when the link fails the canonical copy is put
/// back at the original path. Members of the same subgroup linked before
/// the failure are restored as regular files too, so a failed subgroup ends
/// with every member as a plain file. The other subgroups still run, and
/// every failure is returned together.
pub mod cache;

use crate::analysis::duplicates::DuplicateMap;
use crate::config::SleuthConfig;
use crate::error::{Result, SleuthError, SubgroupFailure};
use crate::model::{Fingerprint, IdentityArena, IdentityIndex};
use crate::platform;
use cache::{CacheEntry, CacheLayout};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Filesystem mutations used by consolidation.
pub trait LinkOps {
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn symlink_file(&self, target: &Path, link: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLinkOps;

impl LinkOps for OsLinkOps {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn symlink_file(&self, target: &Path, link: &Path) -> io::Result<()> {
        platform::symlink_file(target, link)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }
}

/// Result of one fingerprint subgroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubgroupOutcome {
    pub fingerprint: String,
    pub canonical: PathBuf,
    /// The canonical copy was created by this run.
    pub materialized: bool,
    /// Members replaced by links.
    pub linked: Vec<PathBuf>,
    /// Members already inside the cache entry.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    pub file_name: String,
    pub subgroups: Vec<SubgroupOutcome>,
}

impl ConsolidationReport {
    pub fn linked_count(&self) -> usize {
        self.subgroups.iter().map(|s| s.linked.len()).sum()
    }
}

pub struct Deduplicator<'a, O: LinkOps = OsLinkOps> {
    arena: &'a IdentityArena,
    managed: &'a DuplicateMap,
    layout: CacheLayout,
    ops: O,
}

impl<'a> Deduplicator<'a, OsLinkOps> {
    pub fn new(
        arena: &'a IdentityArena,
        managed: &'a DuplicateMap,
        base: &Path,
        config: &SleuthConfig,
    ) -> Self {
        Self::with_ops(arena, managed, base, config, OsLinkOps)
    }
}

impl<'a, O: LinkOps> Deduplicator<'a, O> {
    pub fn with_ops(
        arena: &'a IdentityArena,
        managed: &'a DuplicateMap,
        base: &Path,
        config: &SleuthConfig,
        ops: O,
    ) -> Self {
        Self {
            arena,
            managed,
            layout: CacheLayout::new(base, config),
            ops,
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Consolidate every fingerprint subgroup of `file_name`.
    pub fn consolidate(&self, file_name: &str) -> Result<ConsolidationReport> {
        let file_name_lower = file_name.trim().to_lowercase();
        let groups = self
            .managed
            .get(file_name_lower.as_str())
            .filter(|groups| !groups.is_empty())
            .ok_or_else(|| SleuthError::UnknownFileName(file_name.to_string()))?;

        info!(
            "Consolidating {} subgroup(s) of '{file_name_lower}' under {}",
            groups.len(),
            self.layout.root().display()
        );

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for (&fingerprint, members) in groups {
            match self.consolidate_subgroup(&file_name_lower, fingerprint, members) {
                Ok(outcome) => outcomes.push(outcome),
                Err(failure) => {
                    error!("Consolidation of '{file_name_lower}' failed: {failure}");
                    failures.push(failure);
                }
            }
        }

        if failures.is_empty() {
            Ok(ConsolidationReport {
                file_name: file_name_lower,
                subgroups: outcomes,
            })
        } else {
            Err(SleuthError::Consolidation {
                file_name: file_name_lower,
                failures,
            })
        }
    }

    fn consolidate_subgroup(
        &self,
        file_name_lower: &str,
        fingerprint: Fingerprint,
        members: &[IdentityIndex],
    ) -> std::result::Result<SubgroupOutcome, SubgroupFailure> {
        let fail = |path: &Path, cause: SleuthError| SubgroupFailure {
            fingerprint: fingerprint.hex(),
            path: path.to_path_buf(),
            cause: Box::new(cause),
        };

        // CacheEnsured
        let entry = self
            .layout
            .ensure_entry(file_name_lower, fingerprint)
            .map_err(|e| fail(&self.layout.entry_dir(file_name_lower, fingerprint), e))?;

        let (inside, pending): (Vec<&Path>, Vec<&Path>) = members
            .iter()
            .map(|&index| self.arena.get(index).path())
            .partition(|path| entry.contains(path));

        let mut outcome = SubgroupOutcome {
            fingerprint: fingerprint.hex(),
            canonical: entry.canonical.clone(),
            materialized: false,
            linked: Vec::new(),
            skipped: inside.len(),
        };
        if pending.is_empty() {
            debug!("[{}] every member already cached", outcome.fingerprint);
            return Ok(outcome);
        }

        // ManifestAppended
        entry
            .append_manifest(&pending)
            .map_err(|e| fail(&entry.manifest, e))?;

        // CanonicalMaterialized
        if !entry.has_canonical() {
            let source = pending[0];
            self.ops
                .copy(source, &entry.canonical)
                .map_err(|e| fail(source, SleuthError::io(source, e)))?;
            outcome.materialized = true;
            debug!(
                "[{}] canonical copy {} from {}",
                outcome.fingerprint,
                entry.canonical.display(),
                source.display()
            );
        }

        for path in pending {
            if let Err(e) = self.replace_with_link(&entry, path) {
                self.roll_back(&entry, &outcome.linked);
                return Err(fail(path, e));
            }
            outcome.linked.push(path.to_path_buf());
        }

        info!(
            "[{}] linked {} file(s) to {}",
            outcome.fingerprint,
            outcome.linked.len(),
            entry.canonical.display()
        );
        Ok(outcome)
    }

    /// RolledBack: turn members linked earlier in the subgroup back into
    /// regular copies of the canonical file. Best effort; failures are logged.
    fn roll_back(&self, entry: &CacheEntry, linked: &[PathBuf]) {
        for path in linked {
            let restored = self
                .ops
                .remove_file(path)
                .and_then(|()| self.ops.copy(&entry.canonical, path));
            match restored {
                Ok(_) => debug!("Restored {}", path.display()),
                Err(e) => error!(
                    "Could not restore {} from {}: {e}",
                    path.display(),
                    entry.canonical.display()
                ),
            }
        }
    }

    /// Linking: delete `path`, link it to the canonical copy, roll back on failure.
    fn replace_with_link(&self, entry: &CacheEntry, path: &Path) -> Result<()> {
        if let Err(e) = self.ops.remove_file(path) {
            let err = SleuthError::io(path, e);
            if matches!(err, SleuthError::AccessDenied { .. }) {
                error!("Access denied deleting {}", path.display());
            }
            return Err(err);
        }

        let Err(link_err) = self.ops.symlink_file(&entry.canonical, path) else {
            return Ok(());
        };

        // RolledBack
        warn!(
            "Link {} -> {} failed, restoring: {link_err}",
            path.display(),
            entry.canonical.display()
        );
        if fs::symlink_metadata(path).is_err() {
            if let Err(restore_err) = self.ops.copy(&entry.canonical, path) {
                error!(
                    "Could not restore {} from {}: {restore_err}",
                    path.display(),
                    entry.canonical.display()
                );
            }
        }
        let err = SleuthError::io(path, link_err);
        if matches!(err, SleuthError::AccessDenied { .. }) {
            error!("Access denied linking {}", path.display());
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::duplicates::DuplicateSet;
    use crate::fixtures::ImageSpec;
    use crate::model::AssemblyIdentity;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Delegates to the real filesystem but refuses chosen links or deletions.
    #[derive(Default)]
    struct FailingLinks {
        refuse_link: Vec<PathBuf>,
        deny_remove: Vec<PathBuf>,
        calls: RefCell<Vec<String>>,
    }

    impl FailingLinks {
        fn refusing(paths: &[&Path]) -> Self {
            Self {
                refuse_link: paths.iter().map(|p| p.to_path_buf()).collect(),
                ..Self::default()
            }
        }

        fn denying_removal(paths: &[&Path]) -> Self {
            Self {
                deny_remove: paths.iter().map(|p| p.to_path_buf()).collect(),
                ..Self::default()
            }
        }

        fn touched(&self, path: &Path) -> bool {
            let needle = path.display().to_string();
            self.calls.borrow().iter().any(|c| c.ends_with(&needle))
        }
    }

    impl LinkOps for FailingLinks {
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.calls.borrow_mut().push(format!("rm {}", path.display()));
            if self.deny_remove.iter().any(|p| p == path) {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            OsLinkOps.remove_file(path)
        }

        fn symlink_file(&self, target: &Path, link: &Path) -> io::Result<()> {
            self.calls.borrow_mut().push(format!("ln {}", link.display()));
            if self.refuse_link.iter().any(|p| p == link) {
                return Err(io::Error::other("simulated link failure"));
            }
            OsLinkOps.symlink_file(target, link)
        }

        fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
            self.calls.borrow_mut().push(format!("cp {}", to.display()));
            OsLinkOps.copy(from, to)
        }
    }

    fn write_foo(root: &Path, rel: &str, version: u16) -> AssemblyIdentity {
        let path = root.join(rel);
        ImageSpec::managed("Foo", [version, 0, 0, 0])
            .with_file_version([version, 0, 0, 0])
            .write_to(&path);
        AssemblyIdentity::new(path)
    }

    fn arena_of(root: &Path, rels: &[&str]) -> IdentityArena {
        rels.iter().map(|rel| write_foo(root, rel, 1)).collect()
    }

    fn is_regular_file(path: &Path) -> bool {
        fs::symlink_metadata(path).unwrap().file_type().is_file()
    }

    fn failures_of(err: SleuthError) -> Vec<SubgroupFailure> {
        match err {
            SleuthError::Consolidation { failures, .. } => failures,
            other => panic!("expected a consolidation error, got {other}"),
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let arena = arena_of(tmp.path(), &["a/foo.dll", "b/foo.dll"]);
        let set = DuplicateSet::build(&arena);
        let dedup = Deduplicator::new(&arena, &set.managed, tmp.path(), &SleuthConfig::default());
        assert!(matches!(
            dedup.consolidate("bar.dll"),
            Err(SleuthError::UnknownFileName(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failed_link_rolls_back_whole_subgroup() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tree");
        let arena = arena_of(&root, &["a/foo.dll", "b/foo.dll", "c/foo.dll"]);
        let set = DuplicateSet::build(&arena);
        let original = fs::read(root.join("b/foo.dll")).unwrap();

        let a = root.join("a/foo.dll");
        let b = root.join("b/foo.dll");
        let c = root.join("c/foo.dll");
        let ops = FailingLinks::refusing(&[&b]);
        let dedup =
            Deduplicator::with_ops(&arena, &set.managed, tmp.path(), &SleuthConfig::default(), ops);

        let err = dedup.consolidate("FOO.DLL").unwrap_err();
        let SleuthError::Consolidation { file_name, failures } = err else {
            panic!("expected a consolidation error");
        };
        assert_eq!(file_name, "foo.dll");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, b);

        // a was linked first, then restored when b failed.
        assert!(is_regular_file(&a));
        assert_eq!(fs::read(&a).unwrap(), original);
        // b was deleted, link refused, canonical copied back.
        assert!(is_regular_file(&b));
        assert_eq!(fs::read(&b).unwrap(), original);
        // c was never touched.
        assert!(is_regular_file(&c));
        assert!(!dedup.ops.touched(&c));
    }

    #[cfg(unix)]
    #[test]
    fn other_subgroups_proceed_after_a_failure() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tree");
        let arena: IdentityArena = [
            write_foo(&root, "a/foo.dll", 1),
            write_foo(&root, "b/foo.dll", 1),
            write_foo(&root, "c/foo.dll", 2),
            write_foo(&root, "d/foo.dll", 2),
        ]
        .into_iter()
        .collect();
        let set = DuplicateSet::build(&arena);
        assert_eq!(set.managed["foo.dll"].len(), 2);

        let b = root.join("b/foo.dll");
        let ops = FailingLinks::refusing(&[&b]);
        let dedup =
            Deduplicator::with_ops(&arena, &set.managed, tmp.path(), &SleuthConfig::default(), ops);

        let failures = failures_of(dedup.consolidate("foo.dll").unwrap_err());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, b);

        let v2 = arena.get(IdentityIndex(2)).fingerprint();
        let canonical = fs::canonicalize(dedup.layout().entry_dir("foo.dll", v2))
            .unwrap()
            .join("foo.dll");
        for rel in ["c/foo.dll", "d/foo.dll"] {
            let member = root.join(rel);
            assert!(fs::symlink_metadata(&member).unwrap().file_type().is_symlink());
            assert_eq!(fs::read_link(&member).unwrap(), canonical);
        }
        for rel in ["a/foo.dll", "b/foo.dll"] {
            assert!(is_regular_file(&root.join(rel)));
        }
    }

    #[test]
    fn denied_removal_is_reported_as_access_denied() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tree");
        let arena = arena_of(&root, &["a/foo.dll", "b/foo.dll"]);
        let set = DuplicateSet::build(&arena);

        let a = root.join("a/foo.dll");
        let ops = FailingLinks::denying_removal(&[&a]);
        let dedup =
            Deduplicator::with_ops(&arena, &set.managed, tmp.path(), &SleuthConfig::default(), ops);

        let failures = failures_of(dedup.consolidate("foo.dll").unwrap_err());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, a);
        assert!(matches!(
            *failures[0].cause,
            SleuthError::AccessDenied { ref path } if *path == a
        ));
        // Nothing was linked: a kept its file and b was never reached.
        assert!(is_regular_file(&a));
        assert!(is_regular_file(&root.join("b/foo.dll")));
        assert!(!dedup.ops.touched(&root.join("b/foo.dll")));
    }
}
