/// Stable, process-independent fingerprint of an assembly identity.
///
/// The hash is the seeded, two-accumulator string hash over UTF-16 code
/// units: accumulators start at 5381 and alternate characters, each step is
/// `h = ((h << 5) + h) ^ c`, and the result is `h1 + h2 * 1566083941`, all in
/// wrapping 32-bit arithmetic. It never depends on a per-process seed, so
/// fingerprints (and therefore cache directory names) agree across runs.
use std::fmt;

const SEED: i32 = 5381;
const MIX: i32 = 1_566_083_941;

/// 32-bit fingerprint; displays as 8 uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u32);

impl Fingerprint {
    /// Combine identity fields into a fingerprint.
    ///
    /// `size` is folded in as uppercase hex; a non-empty public key token is
    /// hashed separately and XOR-combined.
    pub fn compute(
        file_name_lower: &str,
        declared_version: &str,
        file_version: &str,
        size: u64,
        public_key_token: &str,
    ) -> Self {
        let joined = format!("{file_name_lower}{declared_version}{file_version}{size:X}");
        let mut hash = string_hash(&joined);
        if !public_key_token.trim().is_empty() {
            hash ^= string_hash(public_key_token);
        }
        Self(hash as u32)
    }

    /// Cache-directory form: 8 uppercase hex digits.
    pub fn hex(self) -> String {
        format!("{:08X}", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Interleaved multiplicative string hash over UTF-16 code units.
pub fn string_hash(s: &str) -> i32 {
    let mut hash1 = SEED;
    let mut hash2 = SEED;
    let mut units = s.encode_utf16();
    loop {
        let Some(c) = units.next() else { break };
        hash1 = (hash1 << 5).wrapping_add(hash1) ^ i32::from(c);
        let Some(c) = units.next() else { break };
        hash2 = (hash2 << 5).wrapping_add(hash2) ^ i32::from(c);
    }
    hash1.wrapping_add(hash2.wrapping_mul(MIX))
}
