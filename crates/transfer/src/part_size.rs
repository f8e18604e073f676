use crate::{DEFAULT_PART_SIZE, GIB};

/// Picks a multipart part size for a file of `file_size` bytes.
///
/// Files up to 2 GiB use [`DEFAULT_PART_SIZE`]. Larger files divide their
/// size by a per-band part budget (2000, 4000, 8000, 10000 parts) and round
/// up, so the total part count stays bounded. Files above 30 GiB fall back
/// to the default and leave part-count limits to the transfer client.
pub fn part_size(file_size: u64) -> u64 {
    if file_size <= 2 * GIB {
        DEFAULT_PART_SIZE
    } else if file_size <= 5 * GIB {
        file_size.div_ceil(2000)
    } else if file_size <= 10 * GIB {
        file_size.div_ceil(4000)
    } else if file_size <= 20 * GIB {
        file_size.div_ceil(8000)
    } else if file_size <= 30 * GIB {
        file_size.div_ceil(10000)
    } else {
        DEFAULT_PART_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIB;

    #[test]
    fn small_files_use_default() {
        assert_eq!(part_size(0), 2 * MIB);
        assert_eq!(part_size(1), 2 * MIB);
        assert_eq!(part_size(GIB), 2 * MIB);
        assert_eq!(part_size(2 * GIB), 2 * MIB);
    }

    #[test]
    fn band_boundaries_round_up() {
        // 2 GiB + 1 byte enters the 2000-part band.
        assert_eq!(part_size(2 * GIB + 1), 1_073_742);
        assert_eq!(part_size(3 * GIB), 1_610_613);
        // Exactly 5 GiB still belongs to the 2000-part band.
        assert_eq!(part_size(5 * GIB), (5 * GIB).div_ceil(2000));
        assert_eq!(part_size(5 * GIB), 2_684_355);
        assert_eq!(part_size(5 * GIB + 1), 1_342_178);
        assert_eq!(part_size(10 * GIB), 2_684_355);
        assert_eq!(part_size(20 * GIB), 2_684_355);
        assert_eq!(part_size(30 * GIB), 3_221_226);
    }

    #[test]
    fn oversized_files_fall_back_to_default() {
        assert_eq!(part_size(30 * GIB + 1), 2 * MIB);
        assert_eq!(part_size(100 * GIB), 2 * MIB);
    }

    #[test]
    fn non_decreasing_within_each_band() {
        let bands = [
            (2 * GIB + 1, 5 * GIB),
            (5 * GIB + 1, 10 * GIB),
            (10 * GIB + 1, 20 * GIB),
            (20 * GIB + 1, 30 * GIB),
        ];
        for (lo, hi) in bands {
            let step = (hi - lo) / 16;
            let mut last = 0;
            let mut size = lo;
            while size <= hi {
                let p = part_size(size);
                assert!(p >= last, "part size dropped inside band at {size}");
                last = p;
                size += step;
            }
        }
    }

    #[test]
    fn part_count_bounded_per_band() {
        for size in [3 * GIB, 5 * GIB, 7 * GIB, 10 * GIB, 15 * GIB, 25 * GIB, 30 * GIB] {
            let parts = size.div_ceil(part_size(size));
            assert!(parts <= 10_000, "{size} bytes -> {parts} parts");
        }
    }

    #[test]
    fn deterministic() {
        for size in [0, 5 * GIB, 17 * GIB + 12345, 40 * GIB] {
            assert_eq!(part_size(size), part_size(size));
        }
    }
}
