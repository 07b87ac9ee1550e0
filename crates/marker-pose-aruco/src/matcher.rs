//! Dictionary matching and rotation helpers.

use crate::Dictionary;

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id in the dictionary.
    pub id: u32,
    /// Rotation `0..=3` such that `observed_code == rotate(dict_code, rotation)`.
    ///
    /// Equivalently, the marker's own top-left corner sits at index
    /// `rotation` of the sampled corner order.
    pub rotation: u8,
    /// Hamming distance between observed and dictionary code (after rotation).
    pub hamming: u8,
}

/// Brute-force matcher over all ids and the four rotations of each code.
///
/// Dictionaries used for tracking are small (tens of ids), so the 4·N scan
/// per candidate quad is cheap and needs no index.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    /// Build a matcher; `max_hamming` is clamped to the dictionary's
    /// correction capability.
    ///
    /// Returns `None` when the dictionary does not fit in 64 bits.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Option<Self> {
        if dict.bit_count() > 64 || dict.marker_size == 0 {
            return None;
        }
        let rotated = dict
            .codes
            .iter()
            .map(|&base| [0u8, 1, 2, 3].map(|rot| rotate_code_u64(base, dict.marker_size, rot)))
            .collect();

        Some(Self {
            dict,
            max_hamming: max_hamming.min(dict.max_correction_bits),
            rotated,
        })
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Best match within `max_hamming`; ties keep the lowest id and rotation.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;

        for (id, rots) in self.rotated.iter().enumerate() {
            for (rot, &cand) in rots.iter().enumerate() {
                let hamming = (observed ^ cand).count_ones() as u8;
                if hamming > self.max_hamming {
                    continue;
                }
                if best.is_some_and(|b| b.hamming <= hamming) {
                    continue;
                }
                best = Some(Match {
                    id: id as u32,
                    rotation: rot as u8,
                    hamming,
                });
                if hamming == 0 {
                    return best;
                }
            }
        }

        best
    }
}

/// Rotate a code stored in row-major bits (`idx = y * n + x`) by `rot`
/// quarter turns.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            let bit = (code >> (sy * n + sx)) & 1;
            out |= bit << (y * n + x);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::DICT_4X4_50;

    #[test]
    fn rotate_four_times_is_identity() {
        let code = 0x0123_4567_89ab_cdef_u64;
        let r = (0..4).fold(code, |c, _| rotate_code_u64(c, 8, 1));
        assert_eq!(code, r);
    }

    #[test]
    fn matcher_finds_rotated_code() {
        let matcher = Matcher::new(DICT_4X4_50, 0).expect("4x4 fits");
        let observed = rotate_code_u64(DICT_4X4_50.codes[5], 4, 3);
        let m = matcher.match_code(observed).expect("match");
        assert_eq!(m.id, 5);
        assert_eq!(m.rotation, 3);
        assert_eq!(m.hamming, 0);
    }

    #[test]
    fn single_bit_error_is_corrected_within_budget() {
        let matcher = Matcher::new(DICT_4X4_50, 1).expect("4x4 fits");
        let observed = DICT_4X4_50.codes[3] ^ (1 << 6);
        let m = matcher.match_code(observed).expect("corrected");
        assert_eq!(m.id, 3);
        assert_eq!(m.hamming, 1);

        let strict = Matcher::new(DICT_4X4_50, 0).expect("4x4 fits");
        assert!(strict.match_code(observed).is_none());
    }

    #[test]
    fn hamming_budget_is_clamped_to_dictionary() {
        let matcher = Matcher::new(DICT_4X4_50, 5).expect("4x4 fits");
        assert_eq!(matcher.max_hamming(), DICT_4X4_50.max_correction_bits);
    }

    #[test]
    fn dictionary_codes_are_rotation_distinct() {
        let matcher = Matcher::new(DICT_4X4_50, 0).expect("4x4 fits");
        for (id, &code) in DICT_4X4_50.codes.iter().enumerate() {
            let m = matcher.match_code(code).expect("own code matches");
            assert_eq!(m.id as usize, id);
            assert_eq!(m.rotation, 0);
        }
    }
}
