use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Cap on each fingerprint FIFO; eviction is oldest-first.
pub const MAX_CACHE_ENTRIES: usize = 200_000;
/// Two pages are near-duplicates when their simhashes differ in at most
/// this many bits.
pub const SIMHASH_THRESHOLD: u32 = 3;
/// Near-duplicate comparison only scans this many most-recent entries.
pub const SIMHASH_RECENT_WINDOW: usize = 1000;

/// A 16-byte exact-content fingerprint.
pub type Checksum = [u8; 16];

#[derive(Default)]
struct DedupState {
    checksum_order: VecDeque<Checksum>,
    checksums: HashSet<Checksum>,
    simhash_order: VecDeque<u64>,
    simhashes: HashSet<u64>,
}

/// Bounded caches of exact (MD5) and near-duplicate (simhash)
/// fingerprints for already-accepted pages. Each FIFO carries a set
/// mirror so membership stays O(1); insert and evict keep the two views
/// consistent under one lock.
pub struct DedupCache {
    state: Mutex<DedupState>,
    capacity: usize,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHE_ENTRIES)
    }

    /// Reduced-capacity constructor for tests exercising eviction.
    pub fn with_capacity(capacity: usize) -> Self {
        DedupCache {
            state: Mutex::new(DedupState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Returns true (and records both fingerprints) when the page is new;
    /// false when it is an exact or near duplicate of something already
    /// seen. The check and the insert happen under the same lock so two
    /// workers cannot both claim the same content.
    pub fn check_and_insert(&self, checksum: Checksum, simhash: u64) -> bool {
        let mut state = self.state.lock().expect("dedup lock poisoned");

        if state.checksums.contains(&checksum) || state.simhashes.contains(&simhash) {
            return false;
        }
        let near_duplicate = state
            .simhash_order
            .iter()
            .rev()
            .take(SIMHASH_RECENT_WINDOW)
            .any(|&seen| hamming_distance(seen, simhash) <= SIMHASH_THRESHOLD);
        if near_duplicate {
            return false;
        }

        if state.checksum_order.len() == self.capacity {
            if let Some(oldest) = state.checksum_order.pop_front() {
                state.checksums.remove(&oldest);
            }
        }
        state.checksum_order.push_back(checksum);
        state.checksums.insert(checksum);

        if state.simhash_order.len() == self.capacity {
            if let Some(oldest) = state.simhash_order.pop_front() {
                state.simhashes.remove(&oldest);
            }
        }
        state.simhash_order.push_back(simhash);
        state.simhashes.insert(simhash);

        true
    }

    #[cfg(test)]
    fn len(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.checksum_order.len(), state.simhash_order.len())
    }
}

/// Number of differing bits between two simhashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// MD5 over the lowercased, whitespace-normalized page text.
pub fn content_checksum(text: &str) -> Checksum {
    let normalized = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    md5::compute(normalized.as_bytes()).0
}

/// 64-bit simhash over the token multiset.
///
/// Each distinct token hashes (SHA-256, first 8 bytes as a big-endian
/// u64) to a bit pattern; every bit position accumulates +count where the
/// pattern has a 1 and -count where it has a 0. The final hash sets bit i
/// exactly when the accumulator at i is positive.
pub fn simhash64(tokens: &[String]) -> u64 {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }

    let mut accumulator = [0i64; 64];
    for (token, count) in counts {
        let digest = Sha256::digest(token.as_bytes());
        let hv = u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
        for (i, slot) in accumulator.iter_mut().enumerate() {
            if hv >> i & 1 == 1 {
                *slot += count;
            } else {
                *slot -= count;
            }
        }
    }

    let mut hash = 0u64;
    for (i, &slot) in accumulator.iter().enumerate() {
        if slot > 0 {
            hash |= 1 << i;
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_hamming_distance_properties() {
        assert_eq!(hamming_distance(0xDEAD_BEEF, 0xDEAD_BEEF), 0);
        assert_eq!(hamming_distance(0b1010, 0b0101), hamming_distance(0b0101, 0b1010));
        assert_eq!(hamming_distance(0, u64::MAX), 64);
    }

    #[test]
    fn test_simhash_deterministic() {
        let a = simhash64(&tokens(&["machine", "learning", "research"]));
        let b = simhash64(&tokens(&["machine", "learning", "research"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_simhash_order_independent() {
        let a = simhash64(&tokens(&["alpha", "beta", "gamma"]));
        let b = simhash64(&tokens(&["gamma", "alpha", "beta"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_simhash_near_duplicates_are_close() {
        let base: Vec<&str> = (0..200).map(|_| "common").collect();
        let mut doc_a: Vec<String> = tokens(&base);
        doc_a.extend(tokens(&["unique", "words", "here", "faculty", "page"]));
        let mut doc_b: Vec<String> = tokens(&base);
        doc_b.extend(tokens(&["unique", "words", "here", "faculty", "staff"]));

        let distance = hamming_distance(simhash64(&doc_a), simhash64(&doc_b));
        assert!(distance < 16, "near-duplicates should be close, got {distance}");

        let unrelated = simhash64(&tokens(&["entirely", "different", "vocabulary", "set"]));
        let far = hamming_distance(simhash64(&doc_a), unrelated);
        assert!(far > distance);
    }

    #[test]
    fn test_exact_duplicate_rejected() {
        let cache = DedupCache::new();
        let checksum = content_checksum("Hello World");
        assert!(cache.check_and_insert(checksum, 42));
        assert!(!cache.check_and_insert(checksum, 43));
    }

    #[test]
    fn test_near_duplicate_rejected() {
        let cache = DedupCache::new();
        assert!(cache.check_and_insert([1; 16], 0b1111_0000));
        // One bit flipped: Hamming distance 1 <= threshold.
        assert!(!cache.check_and_insert([2; 16], 0b1111_0001));
        // Far away: accepted.
        assert!(cache.check_and_insert([3; 16], !0b1111_0000));
    }

    #[test]
    fn test_checksum_normalizes_whitespace_and_case() {
        assert_eq!(
            content_checksum("Hello   World"),
            content_checksum("hello\n\tworld")
        );
        assert_ne!(content_checksum("hello world"), content_checksum("goodbye world"));
    }

    #[test]
    fn test_eviction_keeps_cache_at_cap() {
        let cache = DedupCache::with_capacity(8);
        for i in 0..32u64 {
            let mut checksum = [0u8; 16];
            checksum[..8].copy_from_slice(&i.to_be_bytes());
            // Pairwise Hamming distance is exactly 4, past the threshold.
            cache.check_and_insert(checksum, 0b11u64 << (2 * i));
        }
        assert_eq!(cache.len(), (8, 8));
    }

    #[test]
    fn test_membership_monotone_until_eviction() {
        let cache = DedupCache::with_capacity(4);
        let mut first = [0u8; 16];
        first[0] = 0xAA;
        assert!(cache.check_and_insert(first, 1 << 20));
        // Still present while the cache has room: re-insert rejected.
        assert!(!cache.check_and_insert(first, 1 << 40));

        for i in 1..=4u64 {
            let mut checksum = [0u8; 16];
            checksum[..8].copy_from_slice(&i.to_be_bytes());
            cache.check_and_insert(checksum, 0xFFFFu64 << (8 * i));
        }
        // The first checksum has been evicted; simhash must differ from
        // everything still in the window to get past the near check.
        assert!(cache.check_and_insert(first, u64::MAX));
    }
}
