use crate::hash::{sha256, Hash, HashError};

/// Computes the merkle root of a list of transaction hashes
///
/// The tree is built bottom-up: consecutive hashes are paired (an odd
/// hash at the end is paired with itself) and each pair is reduced to
/// `reverse(sha256(reverse(a), reverse(b)))`. The reversal is applied
/// symmetrically on every level's input and output, so interoperating
/// implementations must reproduce it exactly.
///
/// An empty list yields the hash of the empty byte sequence; a single
/// hash is its own root.
pub fn merkle_root(hashes: &[Hash]) -> Result<Hash, HashError> {
    if hashes.is_empty() {
        return sha256(&[b""]);
    }

    let mut level: Vec<Hash> = hashes.to_vec();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));

        for chunk in level.chunks(2) {
            let left = chunk[0].reversed();
            // Odd count: the last hash pairs with itself
            let right = chunk.get(1).unwrap_or(&chunk[0]).reversed();

            let parent = sha256(&[left.as_ref(), right.as_ref()])?;
            next.push(parent.reversed());
        }

        level = next;
    }

    Ok(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hashes(n: usize) -> Vec<Hash> {
        (0..n)
            .map(|i| sha256(&[&[i as u8]]).unwrap())
            .collect()
    }

    #[test]
    fn test_empty_is_hash_of_nothing() {
        let root = merkle_root(&[]).unwrap();
        assert_eq!(root, sha256(&[b""]).unwrap());
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        let hashes = make_hashes(1);
        let root = merkle_root(&hashes).unwrap();
        assert_eq!(root, hashes[0]);
    }

    #[test]
    fn test_two_leaves() {
        let hashes = make_hashes(2);
        let root = merkle_root(&hashes).unwrap();

        let expected = sha256(&[
            hashes[0].reversed().as_ref(),
            hashes[1].reversed().as_ref(),
        ])
        .unwrap()
        .reversed();
        assert_eq!(root, expected);
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let hashes = make_hashes(3);
        let mut padded = hashes.clone();
        padded.push(hashes[2]);

        assert_eq!(
            merkle_root(&hashes).unwrap(),
            merkle_root(&padded).unwrap()
        );
    }

    #[test]
    fn test_deterministic() {
        let hashes = make_hashes(10);
        assert_eq!(merkle_root(&hashes).unwrap(), merkle_root(&hashes).unwrap());
    }

    #[test]
    fn test_order_matters() {
        let hashes = make_hashes(4);
        let mut reversed = hashes.clone();
        reversed.reverse();

        assert_ne!(
            merkle_root(&hashes).unwrap(),
            merkle_root(&reversed).unwrap()
        );
    }
}
