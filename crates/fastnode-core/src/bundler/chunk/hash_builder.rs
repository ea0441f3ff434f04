//! Incremental content hashing for chunk filenames.
//!
//! Wraps the same BLAKE3 streaming hasher `fastnode_util::hash` uses for
//! build-cache fingerprints, absorbing byte fragments in a fixed order so
//! the digest is a pure function of (format, addons, rendered source,
//! export shape, transitively reachable chunk hashes/ids).

use blake3::Hasher;

/// Streaming content hash. Absorbs ordered byte fragments and truncates to
/// the first 8 hex digits, matching the `[hash]` filename placeholder.
pub struct HashBuilder {
    hasher: Hasher,
}

impl HashBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(bytes);
        self
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update(s.as_bytes())
    }

    /// Absorb a `:`-separated sequence of fragments, used for the
    /// `intro`/`outro`/`banner`/`footer` addon concatenation.
    pub fn update_joined(&mut self, fragments: &[&str], sep: &str) -> &mut Self {
        self.update_str(&fragments.join(sep))
    }

    /// Full hex digest (used internally; callers generally want `digest8`).
    #[must_use]
    pub fn digest_hex(&self) -> String {
        self.hasher.finalize().to_hex().to_string()
    }

    /// The 8-hex-digit prefix used as the `[hash]` filename placeholder.
    #[must_use]
    pub fn digest8(&self) -> String {
        self.digest_hex()[..8].to_string()
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot convenience matching `fastnode_util::hash::blake3_bytes`, but
/// truncated to 8 hex digits as chunk filenames require.
#[must_use]
pub fn hash8(data: &[u8]) -> String {
    let mut b = HashBuilder::new();
    b.update(data);
    b.digest8()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest8_is_stable_for_same_input() {
        let mut a = HashBuilder::new();
        a.update_str("hello world");
        let mut b = HashBuilder::new();
        b.update_str("hello world");
        assert_eq!(a.digest8(), b.digest8());
        assert_eq!(a.digest8().len(), 8);
    }

    #[test]
    fn digest8_changes_with_input() {
        let mut a = HashBuilder::new();
        a.update_str("a");
        let mut b = HashBuilder::new();
        b.update_str("b");
        assert_ne!(a.digest8(), b.digest8());
    }

    #[test]
    fn update_is_order_sensitive() {
        let mut a = HashBuilder::new();
        a.update_str("a");
        a.update_str("b");
        let mut b = HashBuilder::new();
        b.update_str("b");
        b.update_str("a");
        assert_ne!(a.digest8(), b.digest8());
    }
}
