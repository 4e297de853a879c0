//! Commit-open coin flip between two parties: an unbiased public 128-bit
//! seed neither side can steer. The committing side hashes its share with a
//! salt before seeing the peer's share; a mismatching opening aborts the
//! session.

use crate::channel_utils::PartyChannel;
use crate::crypt_utils::block::{random_block_from_entropy, Block};
use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

const DIGEST_LENGTH: usize = 32;

fn commit(share: Block, salt: Block) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(share.to_le_bytes());
    hasher.update(salt.to_le_bytes());
    hasher.finalize().to_vec()
}

/// Jointly samples a public seed. Exactly one side runs with
/// `am_i_sending_first = true`; both sides output the same block.
pub fn secure_sample_public_seed(
    am_i_sending_first: bool,
    channel: &mut dyn PartyChannel,
) -> Result<Block> {
    if am_i_sending_first {
        let my_share = random_block_from_entropy();
        let salt = random_block_from_entropy();

        channel
            .send(&commit(my_share, salt))
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        let peer_share = channel
            .receive_block()
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        channel
            .send_blocks(&[my_share, salt])
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        Ok(my_share ^ peer_share)
    } else {
        let my_share = random_block_from_entropy();

        let claimed_digest = channel
            .receive(DIGEST_LENGTH)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        channel
            .send_block(my_share)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        let opening = channel
            .receive_blocks(2)
            .with_context(|| format!("@{}:{}", file!(), line!()))?;

        if commit(opening[0], opening[1]) != claimed_digest {
            bail!("peer's seed share does not match their commitment");
        }
        Ok(my_share ^ opening[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::sync_channel::create_unix_channel_pair;

    #[test]
    fn test_both_sides_agree() {
        let (mut left, mut right) = create_unix_channel_pair().unwrap();

        let handle =
            std::thread::spawn(move || secure_sample_public_seed(true, &mut left).unwrap());

        let mine = secure_sample_public_seed(false, &mut right).unwrap();
        let theirs = handle.join().unwrap();

        assert_eq!(mine, theirs);
    }

    #[test]
    fn test_fresh_seed_every_run() {
        let (mut left, mut right) = create_unix_channel_pair().unwrap();

        let handle = std::thread::spawn(move || {
            let a = secure_sample_public_seed(true, &mut left).unwrap();
            let b = secure_sample_public_seed(true, &mut left).unwrap();
            (a, b)
        });

        let a = secure_sample_public_seed(false, &mut right).unwrap();
        let b = secure_sample_public_seed(false, &mut right).unwrap();
        let (peer_a, peer_b) = handle.join().unwrap();

        assert_eq!(a, peer_a);
        assert_eq!(b, peer_b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_opening_aborts() {
        let (mut left, mut right) = create_unix_channel_pair().unwrap();

        // A cheating first sender: commits to one share, opens another.
        let handle = std::thread::spawn(move || {
            let share = random_block_from_entropy();
            let salt = random_block_from_entropy();
            left.send(&commit(share, salt)).unwrap();
            let _peer_share = left.receive_block().unwrap();
            let tampered = share ^ Block::from(1u128);
            left.send_blocks(&[tampered, salt]).unwrap();
        });

        let rst = secure_sample_public_seed(false, &mut right);
        handle.join().unwrap();

        assert!(rst.is_err());
    }
}
