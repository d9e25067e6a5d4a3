pub mod framer;

use std::io;

use async_stream::stream;
use futures_util::stream::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::info;

use framer::Framer;

const CHUNK_SIZE: usize = 4096;

/// Iterate the records framed out of any byte source.
///
/// The stream ends when the source is exhausted, after flushing what the
/// framer still holds; a read error is yielded once and ends the stream.
pub fn records<R>(
    mut reader: R,
    mut framer: Box<dyn Framer>,
) -> impl Stream<Item = io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    stream! {
        let mut buffer = [0u8; CHUNK_SIZE];
        loop {
            let bytes_read = match reader.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };
            for record in framer.push(&buffer[..bytes_read]) {
                yield Ok(record);
            }
        }
        if let Some(record) = framer.finish() {
            yield Ok(record);
        }
    }
}

/// Connect to a TCP feed of JSON records (e.g. dumpvdl2 or acarsdec with
/// `--output decoded:json:tcp:...`).
pub async fn tcp(address: &str) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(address).await?;
    info!("Connected to TCP stream: {}", address);
    Ok(stream)
}
