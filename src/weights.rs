//! Byte-layout arithmetic for the packed weight stream the micro-kernel
//! consumes.
//!
//! Weight packing itself happens outside this crate (§1 scope), but packers
//! and the micro-kernel must agree exactly on how many bytes each NR=8
//! output-channel group occupies for a given `(kc, ks)`; this is that single
//! source of truth, kept independently testable from the kernel itself
//! (mirroring how packing is its own small sibling module next to `rten`'s
//! GEMM kernels rather than folded into them).

/// Output-channel group width the micro-kernel and packed weight stream both
/// fix at 8.
pub const NR: usize = 8;

/// Describes the byte layout of one packed NR=8 output-channel group's
/// weight stream, for `kc` input channels per kernel site and `ks` kernel
/// sites.
#[derive(Clone, Copy, Debug)]
pub struct PackedWeightsLayout {
    pub kc: usize,
    pub ks: usize,
}

impl PackedWeightsLayout {
    pub fn new(kc: usize, ks: usize) -> Self {
        debug_assert!(kc > 0, "kc must be positive");
        debug_assert!(ks > 0, "ks must be positive");
        PackedWeightsLayout { kc, ks }
    }

    /// Bytes occupied by the leading bias vector: `NR` little-endian `i32`s.
    #[inline]
    pub fn bias_bytes(&self) -> usize {
        NR * 4
    }

    /// Bytes occupied by one kernel site's weight rows: one byte per output
    /// channel (`NR`) for each full 8-channel input chunk, plus a
    /// unpadded tail chunk of exactly `8 * (kc % 8)` bytes when `kc` isn't a
    /// multiple of 8 (no padding out to a full chunk).
    #[inline]
    pub fn per_site_bytes(&self) -> usize {
        let full_chunks = self.kc / 8;
        let tail = self.kc % 8;
        full_chunks * 8 * NR + tail * NR
    }

    /// Total bytes for one NR=8 group: bias plus `ks` kernel sites' weights.
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.bias_bytes() + self.ks * self.per_site_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_is_32_bytes() {
        let layout = PackedWeightsLayout::new(1, 1);
        assert_eq!(layout.bias_bytes(), 32);
    }

    #[test]
    fn per_site_bytes_scales_with_full_chunks() {
        let layout = PackedWeightsLayout::new(16, 1);
        assert_eq!(layout.per_site_bytes(), 16 * NR);
    }

    #[test]
    fn per_site_bytes_has_unpadded_tail() {
        // kc=9: one full 8-channel chunk (64 bytes) plus a 1-channel tail
        // chunk of exactly 8 bytes, not padded out to 64.
        let layout = PackedWeightsLayout::new(9, 1);
        assert_eq!(layout.per_site_bytes(), 8 * NR + 1 * NR);
    }

    #[test]
    fn per_site_bytes_handles_sub_chunk_kc() {
        let layout = PackedWeightsLayout::new(3, 1);
        assert_eq!(layout.per_site_bytes(), 3 * NR);
    }

    #[test]
    fn total_bytes_sums_bias_and_all_sites() {
        let layout = PackedWeightsLayout::new(9, 4);
        let expected = 32 + 4 * (8 * NR + 1 * NR);
        assert_eq!(layout.total_bytes(), expected);
    }
}
