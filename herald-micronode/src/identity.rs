// Node UID generation for a peer with no OS entropy pool of its own.
//
// Grounded on `pyboard/herald.py`'s `gen_node_uid`: one hex nibble at a
// time off the hardware RNG (`pyb.rng()`), assembled into the same
// 8-4-4-4-12 dash-grouped form every other peer uses. Unlike a desktop
// peer's `uuid` v4 generation, no version/variant bits are fixed here —
// the source draws all 32 nibbles uniformly.

use rand::Rng;

const GROUP_LENGTHS: [usize; 5] = [8, 4, 4, 4, 12];

/// Draws a fresh UID from `rng`, one hex nibble at a time.
pub fn gen_uid(rng: &mut impl Rng) -> String {
    let mut out = String::with_capacity(36);
    for (i, len) in GROUP_LENGTHS.iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        for _ in 0..*len {
            let nibble = rng.gen_range(0..16u8);
            out.push(std::char::from_digit(nibble as u32, 16).unwrap());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn uid_has_dash_grouped_hex_shape() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let uid = gen_uid(&mut rng);
        let groups: Vec<&str> = uid.split('-').collect();
        assert_eq!(groups.len(), 5);
        for (group, expected_len) in groups.iter().zip(GROUP_LENGTHS) {
            assert_eq!(group.len(), expected_len);
            assert!(group.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn distinct_seeds_yield_distinct_uids() {
        let mut a = rand::rngs::StdRng::seed_from_u64(1);
        let mut b = rand::rngs::StdRng::seed_from_u64(2);
        assert_ne!(gen_uid(&mut a), gen_uid(&mut b));
    }
}
