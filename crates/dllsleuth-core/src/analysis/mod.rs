/// Analysis modules: post-crawl grouping and statistics.
pub mod counts;
pub mod duplicates;

pub use counts::{counts, detail, names_with_count, InstanceCounts, NameDetail, SubgroupDetail};
pub use duplicates::{
    bucket_by_name, group, managed_view, DuplicateMap, DuplicateSet, FingerprintGroups,
    NameBuckets,
};
