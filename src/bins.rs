//! UCSC genomic binning.
//!
//! Bins form a fixed hierarchy over a chromosome: one bin covering the whole
//! chromosome, 8 bins of 64 Mbp, and so on down to 128 kbp bins. Every
//! feature is assigned the smallest bin that fully contains it, which makes
//! "all features that could overlap this region" an index lookup over a small
//! set of bins instead of a scan over all start/end pairs.
//!
//! See Fig 7 of Kent et al., "The Human Genome Browser at UCSC" (2002).

use std::collections::BTreeSet;

//-----------------------------------------------------------------------------

// How much to shift to get to the finest bin level. The smallest bins cover
// 2^17 = 128 kbp.
const FIRST_SHIFT: u32 = 17;

// How much to shift to get to the next larger bin level.
const NEXT_SHIFT: u32 = 3;

// Bin numbers at the start of each level, from the finest to the coarsest.
const OFFSETS: [u64; 5] = [
    4096 + 512 + 64 + 8 + 1,
    512 + 64 + 8 + 1,
    64 + 8 + 1,
    8 + 1,
    1,
];

// Coordinates at or beyond this cannot be binned and fall back to bin 1.
const MAX_CHROM_SIZE: u64 = 1 << 29;

//-----------------------------------------------------------------------------

/// Returns the smallest bin that completely contains the given interval.
///
/// The interval is 1-based and inclusive, as in GFF coordinates. Intervals
/// extending past position 2^29 are assigned bin 1, which covers the whole
/// chromosome.
pub fn containing_bin(start: u64, end: u64) -> u64 {
    if start >= MAX_CHROM_SIZE || end >= MAX_CHROM_SIZE {
        return 1;
    }
    let mut low = start.saturating_sub(1) >> FIRST_SHIFT;
    let mut high = end >> FIRST_SHIFT;

    for offset in OFFSETS.iter() {
        if low == high {
            // After the shifts, `low` is an index within the current level.
            return offset + low;
        }
        low >>= NEXT_SHIFT;
        high >>= NEXT_SHIFT;
    }

    1
}

/// Returns all bins that overlap the given interval, in increasing order.
///
/// A feature can only overlap the interval if its bin is in this set, which
/// is what makes bin-constrained region queries possible.
pub fn overlapping_bins(start: u64, end: u64) -> Vec<u64> {
    if start >= MAX_CHROM_SIZE || end >= MAX_CHROM_SIZE {
        return vec![1];
    }
    let mut low = start.saturating_sub(1) >> FIRST_SHIFT;
    let mut high = end >> FIRST_SHIFT;

    let mut result: BTreeSet<u64> = BTreeSet::new();
    result.insert(1);
    for offset in OFFSETS.iter() {
        for bin in low..=high {
            result.insert(offset + bin);
        }
        low >>= NEXT_SHIFT;
        high >>= NEXT_SHIFT;
    }

    result.into_iter().collect()
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_bins() {
        // A tiny interval at the start of the chromosome is in the first
        // bin of the finest level.
        assert_eq!(containing_bin(1, 1), 4681, "Wrong bin at the chromosome start");

        // The finest bins cover 128 kbp, so this still fits in the first one.
        assert_eq!(containing_bin(1, 131071), 4681, "Wrong bin for a full 128 kbp interval");

        // One base further and the interval spans two bins at the finest
        // level, which bumps it up a level.
        assert_eq!(containing_bin(1, 131072), 585, "Wrong bin for an interval spanning two bins");

        // The second bin of the finest level.
        assert_eq!(containing_bin(131073, 131073), 4682, "Wrong bin for the second 128 kbp window");
    }

    #[test]
    fn coarser_bins() {
        // As large as an interval can get within the second level.
        assert_eq!(containing_bin(1, (1 << 20) - 1), 585, "Wrong bin for a 1 Mbp interval");

        // Past the second level.
        assert_eq!(containing_bin(1, 1 << 20), 73, "Wrong bin past the 1 Mbp boundary");

        // Just within the largest binnable coordinate.
        assert_eq!(containing_bin(536870911, 536870911), 8776, "Wrong bin near the coordinate limit");

        // Out of range falls back to the whole-chromosome bin.
        assert_eq!(containing_bin(536870911, 536870912), 1, "Out-of-range interval should get bin 1");
    }

    #[test]
    fn overlap_sets() {
        let bins = overlapping_bins(1, 1);
        assert_eq!(bins, vec![1, 9, 73, 585, 4681], "Wrong overlap set for a small interval");

        // The containing bin of any subinterval must be in the overlap set.
        let bins = overlapping_bins(100_000, 300_000);
        for (start, end) in [(100_000, 100_100), (150_000, 250_000), (299_000, 300_000)] {
            let bin = containing_bin(start, end);
            assert!(bins.contains(&bin), "Overlap set is missing bin {} for {}..{}", bin, start, end);
        }

        // An interval far away should use a different finest-level bin.
        let far = containing_bin(10_000_000, 10_000_100);
        assert!(!bins.contains(&far), "Overlap set contains an unrelated bin");
    }
}

//-----------------------------------------------------------------------------
