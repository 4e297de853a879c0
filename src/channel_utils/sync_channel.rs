//! Unix domain socket channels. See [UnixStream]. Mostly used by tests and
//! single-host deployments; the mesh helper wires a full pairwise topology
//! for `n` parties.

use crate::channel_utils::StreamChannel;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;

/// A channel over a Unix domain socket.
pub type UnixChannel = StreamChannel<BufReader<UnixStream>, BufWriter<UnixStream>>;

/// Creates one connected channel pair over a socketpair.
pub fn create_unix_channel_pair() -> Result<(UnixChannel, UnixChannel)> {
    let (left, right) = UnixStream::pair().with_context(|| format!("@{}:{}", file!(), line!()))?;
    let left_clone = left
        .try_clone()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    let right_clone = right
        .try_clone()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok((
        StreamChannel::new(BufReader::new(left_clone), BufWriter::new(left)),
        StreamChannel::new(BufReader::new(right_clone), BufWriter::new(right)),
    ))
}

/// Creates a full pairwise mesh for `nparties`. Entry `i` of the result maps
/// every peer id to party `i`'s channel towards that peer.
pub fn create_unix_channel_mesh(nparties: usize) -> Result<Vec<BTreeMap<usize, UnixChannel>>> {
    let mut mesh: Vec<BTreeMap<usize, UnixChannel>> =
        (0..nparties).map(|_| BTreeMap::new()).collect();

    for i in 0..nparties {
        for j in i + 1..nparties {
            let (left, right) = create_unix_channel_pair()?;
            mesh[i].insert(j, left);
            mesh[j].insert(i, right);
        }
    }

    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::PartyChannel;

    #[test]
    fn test_pair_round_trip() {
        let (mut left, mut right) = create_unix_channel_pair().unwrap();

        let handle = std::thread::spawn(move || {
            left.send(b"hello").unwrap();
            let reply = left.receive(2).unwrap();
            assert_eq!(reply, b"ok");
        });

        let data = right.receive(5).unwrap();
        assert_eq!(data, b"hello");
        right.send(b"ok").unwrap();

        handle.join().unwrap();
    }

    #[test]
    fn test_mesh_all_pairs_connected() {
        let nparties = 4;
        let mesh = create_unix_channel_mesh(nparties).unwrap();

        let handles = mesh
            .into_iter()
            .enumerate()
            .map(|(me, mut channels)| {
                std::thread::spawn(move || {
                    for (&peer, channel) in channels.iter_mut() {
                        if me < peer {
                            channel.send(&[me as u8]).unwrap();
                            assert_eq!(channel.receive(1).unwrap(), vec![peer as u8]);
                        } else {
                            assert_eq!(channel.receive(1).unwrap(), vec![peer as u8]);
                            channel.send(&[me as u8]).unwrap();
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
