//! TCP channels. See [TcpStream]. Each party listens on `base_port + id`;
//! parties dial everyone with a lower id and accept everyone above,
//! identifying themselves with an 8-byte id handshake. Transport security
//! on top of the socket is a collaborator's concern.

use crate::channel_utils::StreamChannel;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::sleep;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A channel over a TCP stream.
pub type TcpChannel = StreamChannel<BufReader<TcpStream>, BufWriter<TcpStream>>;

/// Creates party `me`'s channels towards every peer, keyed by peer id.
pub fn create_tcp_channels_for_party(
    nparties: usize,
    base_port: u16,
    me: usize,
) -> Result<BTreeMap<usize, TcpChannel>> {
    let addr = SocketAddr::from(([127, 0, 0, 1], base_port + me as u16));
    let listener = TcpListener::bind(addr)
        .with_context(|| format!("me={} addr={} @{}:{}", me, addr, file!(), line!()))?;

    // Let lower-id parties bind their listeners before we dial them.
    sleep(Duration::from_millis(100 * me as u64));

    let mut streams = (0..me)
        .map(|peer| {
            let addr = SocketAddr::from(([127, 0, 0, 1], base_port + peer as u16));
            let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
                .with_context(|| format!("me={} addr={} @{}:{}", me, addr, file!(), line!()))?;
            stream
                .write_all(&(me as u64).to_le_bytes())
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            let mut buf = [0u8; 8];
            stream
                .read_exact(&mut buf)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            Ok((u64::from_le_bytes(buf) as usize, stream))
        })
        .collect::<Result<Vec<(usize, TcpStream)>>>()?;

    let accepted = listener
        .incoming()
        .take(nparties - 1 - me)
        .map(|stream| {
            let mut stream = stream.with_context(|| format!("@{}:{}", file!(), line!()))?;
            let mut buf = [0u8; 8];
            stream
                .read_exact(&mut buf)
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            stream
                .write_all(&(me as u64).to_le_bytes())
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            Ok((u64::from_le_bytes(buf) as usize, stream))
        })
        .collect::<Result<Vec<_>>>()?;

    streams.extend(accepted);

    streams
        .into_iter()
        .map(|(peer, stream)| {
            let clone = stream
                .try_clone()
                .with_context(|| format!("@{}:{}", file!(), line!()))?;
            Ok((
                peer,
                StreamChannel::new(BufReader::new(clone), BufWriter::new(stream)),
            ))
        })
        .collect()
}
