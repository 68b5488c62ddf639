/// Instance-count statistics and per-name detail.
///
/// These work over the ungrouped [`NameBuckets`] so names found once are
/// reportable too.
use super::duplicates::NameBuckets;
use crate::error::{Result, SleuthError};
use crate::model::{Fingerprint, FourPartVersion, IdentityArena, IdentityIndex};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// How many names occur exactly `n` times, for `n` in `1..=max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceCounts {
    /// `(instances, names)` for every `instances` with at least one name.
    pub exact: Vec<(usize, usize)>,
    pub max: usize,
    /// Names occurring more than `max` times.
    pub more_than_max: usize,
}

pub fn counts(buckets: &NameBuckets, max: usize) -> InstanceCounts {
    let mut histogram: HashMap<usize, usize> = HashMap::new();
    for members in buckets.values() {
        *histogram.entry(members.len()).or_default() += 1;
    }
    let exact = (1..=max)
        .filter_map(|n| histogram.get(&n).map(|&names| (n, names)))
        .collect();
    let more_than_max = histogram
        .iter()
        .filter(|(&n, _)| n > max)
        .map(|(_, &names)| names)
        .sum();
    InstanceCounts {
        exact,
        max,
        more_than_max,
    }
}

/// Names occurring exactly `n` times, in name order.
pub fn names_with_count(buckets: &NameBuckets, n: usize) -> Vec<&str> {
    buckets
        .iter()
        .filter(|(_, members)| members.len() == n)
        .map(|(name, _)| name.as_str())
        .collect()
}

/// One fingerprint subgroup of a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubgroupDetail {
    pub fingerprint: String,
    pub declared_version: FourPartVersion,
    pub file_version: FourPartVersion,
    pub size: u64,
    /// Containing directories.
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameDetail {
    pub file_name: String,
    pub instances: usize,
    pub subgroups: Vec<SubgroupDetail>,
}

/// Subgroups of `file_name_lower`, newest `declared ++ file` version string first.
pub fn detail(
    buckets: &NameBuckets,
    arena: &IdentityArena,
    file_name_lower: &str,
) -> Result<NameDetail> {
    let members = buckets
        .get(file_name_lower)
        .ok_or_else(|| SleuthError::UnknownFileName(file_name_lower.to_string()))?;

    let mut ordered: Vec<(String, IdentityIndex)> = members
        .iter()
        .map(|&index| {
            let id = arena.get(index);
            (
                format!("{}{}", id.declared_version(), id.file_version()),
                index,
            )
        })
        .collect();
    // Stable sort keeps crawl order among equal keys.
    ordered.sort_by(|a, b| b.0.cmp(&a.0));

    let mut subgroups: Vec<(Fingerprint, SubgroupDetail)> = Vec::new();
    for (_, index) in ordered {
        let id = arena.get(index);
        let fingerprint = id.fingerprint();
        let directory = id.directory().to_path_buf();
        match subgroups.iter_mut().find(|(fp, _)| *fp == fingerprint) {
            Some((_, group)) => group.paths.push(directory),
            None => subgroups.push((
                fingerprint,
                SubgroupDetail {
                    fingerprint: fingerprint.hex(),
                    declared_version: id.declared_version(),
                    file_version: id.file_version(),
                    size: id.size(),
                    paths: vec![directory],
                },
            )),
        }
    }

    Ok(NameDetail {
        file_name: file_name_lower.to_string(),
        instances: members.len(),
        subgroups: subgroups.into_iter().map(|(_, group)| group).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::duplicates::bucket_by_name;
    use crate::fixtures::ImageSpec;
    use crate::model::AssemblyIdentity;
    use compact_str::CompactString;
    use tempfile::TempDir;

    fn buckets_of(sizes: &[(&str, usize)]) -> NameBuckets {
        let mut next = 0u32;
        sizes
            .iter()
            .map(|&(name, n)| {
                let members = (0..n)
                    .map(|_| {
                        next += 1;
                        IdentityIndex(next)
                    })
                    .collect();
                (CompactString::from(name), members)
            })
            .collect()
    }

    #[test]
    fn histogram_counts_names() {
        let buckets = buckets_of(&[("a.dll", 1), ("b.dll", 2), ("c.dll", 2), ("d.dll", 5)]);
        let c = counts(&buckets, 3);
        assert_eq!(c.exact, vec![(1, 1), (2, 2)]);
        assert_eq!(c.more_than_max, 1);
        assert_eq!(c.max, 3);
    }

    #[test]
    fn names_with_exact_count() {
        let buckets = buckets_of(&[("a.dll", 1), ("b.dll", 2), ("c.dll", 2)]);
        assert_eq!(names_with_count(&buckets, 2), vec!["b.dll", "c.dll"]);
        assert!(names_with_count(&buckets, 9).is_empty());
    }

    #[test]
    fn detail_orders_newest_first() {
        let tmp = TempDir::new().unwrap();
        let write = |rel: &str, fv: [u16; 4]| {
            let path = tmp.path().join(rel);
            ImageSpec::managed("Foo", [1, 0, 0, 0])
                .with_file_version(fv)
                .write_to(&path);
            AssemblyIdentity::new(path)
        };
        let arena: IdentityArena = [
            write("old/foo.dll", [1, 0, 0, 0]),
            write("new/foo.dll", [2, 0, 0, 0]),
            write("old2/foo.dll", [1, 0, 0, 0]),
        ]
        .into_iter()
        .collect();

        let d = detail(&bucket_by_name(&arena), &arena, "foo.dll").unwrap();
        assert_eq!(d.instances, 3);
        assert_eq!(d.subgroups.len(), 2);
        assert_eq!(d.subgroups[0].file_version, FourPartVersion::new(2, 0, 0, 0));
        assert_eq!(d.subgroups[0].paths, vec![tmp.path().join("new")]);
        assert_eq!(
            d.subgroups[1].paths,
            vec![tmp.path().join("old"), tmp.path().join("old2")]
        );
    }

    #[test]
    fn detail_of_unknown_name_fails() {
        let arena = IdentityArena::default();
        let err = detail(&NameBuckets::new(), &arena, "nope.dll").unwrap_err();
        assert!(matches!(err, SleuthError::UnknownFileName(name) if name == "nope.dll"));
    }
}
