/// Two-level duplicate grouping: file name, then fingerprint.
///
/// Pass 1 buckets identities by lowercase file name and drops every bucket
/// with a single member. Pass 2 (the managed view) additionally drops every
/// bucket whose first member, in crawl order, is not managed.
///
/// Both levels are `BTreeMap`s, so iteration order is stable across runs;
/// member lists keep crawl order.
use crate::model::{Fingerprint, IdentityArena, IdentityIndex};
use compact_str::CompactString;
use std::collections::BTreeMap;

/// Members of one file name, split by fingerprint.
pub type FingerprintGroups = BTreeMap<Fingerprint, Vec<IdentityIndex>>;

/// `fileNameLower -> fingerprint -> members`.
pub type DuplicateMap = BTreeMap<CompactString, FingerprintGroups>;

/// Identities bucketed by lowercase file name, singletons included.
pub type NameBuckets = BTreeMap<CompactString, Vec<IdentityIndex>>;

/// Both views of one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateSet {
    pub all: DuplicateMap,
    pub managed: DuplicateMap,
}

impl DuplicateSet {
    pub fn build(arena: &IdentityArena) -> Self {
        let all = group(arena);
        let managed = managed_view(&all, arena);
        Self { all, managed }
    }

    pub fn view(&self, managed_only: bool) -> &DuplicateMap {
        if managed_only {
            &self.managed
        } else {
            &self.all
        }
    }
}

pub fn bucket_by_name(arena: &IdentityArena) -> NameBuckets {
    let mut buckets = NameBuckets::new();
    for (index, identity) in arena.iter() {
        buckets
            .entry(CompactString::from(identity.file_name_lower()))
            .or_default()
            .push(index);
    }
    buckets
}

/// Pass 1: every file name seen more than once, split by fingerprint.
pub fn group(arena: &IdentityArena) -> DuplicateMap {
    bucket_by_name(arena)
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(name, members)| {
            let mut groups = FingerprintGroups::new();
            for index in members {
                groups
                    .entry(arena.get(index).fingerprint())
                    .or_default()
                    .push(index);
            }
            (name, groups)
        })
        .collect()
}

/// Pass 2: keep only names whose first-crawled member is managed.
pub fn managed_view(all: &DuplicateMap, arena: &IdentityArena) -> DuplicateMap {
    all.iter()
        .filter(|(_, groups)| {
            first_member(groups).is_some_and(|index| arena.get(index).is_managed())
        })
        .map(|(name, groups)| (name.clone(), groups.clone()))
        .collect()
}

/// Earliest-crawled member across every fingerprint subgroup.
pub fn first_member(groups: &FingerprintGroups) -> Option<IdentityIndex> {
    groups.values().flatten().min().copied()
}

/// Total members across every fingerprint subgroup.
pub fn member_count(groups: &FingerprintGroups) -> usize {
    groups.values().map(Vec::len).sum()
}
