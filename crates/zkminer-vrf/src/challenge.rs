use crate::error::{Result, VrfError};

/// Number of heights a challenge may land on within one coinbase interval.
///
/// The last `submit_advance` heights of the interval are reserved so that a
/// ticket proven on the latest challenge still reaches the chain in time.
pub fn challenge_range(coinbase_interval: u64, submit_advance: u64) -> Result<u64> {
    match coinbase_interval.checked_sub(submit_advance) {
        Some(range) if range > 0 => Ok(range),
        _ => Err(VrfError::EmptyChallengeRange {
            interval: coinbase_interval,
            advance: submit_advance,
        }),
    }
}

/// Maps a VRF output to an offset in `[0, range)`.
///
/// The first eight bytes are read as a big-endian integer and reduced mod
/// `range`. Shorter outputs are zero-padded on the right.
pub fn select_challenge_index(vrf_output: &[u8], range: u64) -> Result<u64> {
    if range == 0 {
        return Err(VrfError::EmptyChallengeRange {
            interval: 0,
            advance: 0,
        });
    }
    let mut prefix = [0u8; 8];
    let take = vrf_output.len().min(8);
    prefix[..take].copy_from_slice(&vrf_output[..take]);
    Ok(u64::from_be_bytes(prefix) % range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_range_reserves_submit_advance() {
        assert_eq!(challenge_range(5, 2).unwrap(), 3);
        assert!(challenge_range(5, 5).is_err());
        assert!(challenge_range(2, 5).is_err());
    }

    #[test]
    fn test_index_reads_big_endian_prefix() {
        let mut output = [0u8; 32];
        output[7] = 7;
        assert_eq!(select_challenge_index(&output, 3).unwrap(), 1);
        assert_eq!(select_challenge_index(&output, 100).unwrap(), 7);
    }

    #[test]
    fn test_zero_range_rejected() {
        assert!(select_challenge_index(&[1u8; 32], 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_index_within_range(output in proptest::collection::vec(any::<u8>(), 0..40), range in 1u64..10_000) {
            let idx = select_challenge_index(&output, range).unwrap();
            prop_assert!(idx < range);
        }
    }
}
