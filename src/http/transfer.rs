//! File body transmission.
//!
//! # Design Decisions
//! - Plaintext sockets hand the file to the kernel (`sendfile`) on Linux
//! - Encrypted streams need the bytes in user space, so they are moved in
//!   [`CHUNK_SIZE`](crate::http::response::CHUNK_SIZE) pieces, each written
//!   before the next is read
//! - Both strategies return the number of bytes transferred; a short file is
//!   an error, the connection is closed and the handle dropped

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

use crate::http::response::StreamedFile;

/// A byte stream able to carry a file body.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Transmit the rest of `file`.
    fn send_file(&mut self, file: &mut StreamedFile) -> impl Future<Output = io::Result<u64>> + Send;
}

impl Transport for TcpStream {
    fn send_file(&mut self, file: &mut StreamedFile) -> impl Future<Output = io::Result<u64>> + Send {
        async move {
            #[cfg(target_os = "linux")]
            {
                zero_copy(self, file).await
            }
            #[cfg(not(target_os = "linux"))]
            {
                copy_chunked(self, file).await
            }
        }
    }
}

impl Transport for TlsStream<TcpStream> {
    fn send_file(&mut self, file: &mut StreamedFile) -> impl Future<Output = io::Result<u64>> + Send {
        copy_chunked(self, file)
    }
}

/// Read one chunk, write it fully, repeat. At most one chunk is held.
pub async fn copy_chunked<W>(writer: &mut W, file: &mut StreamedFile) -> io::Result<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut total = 0u64;
    while let Some(chunk) = file.read_chunk().await? {
        writer.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Upper bound for one `sendfile` call.
#[cfg(target_os = "linux")]
const SENDFILE_MAX: u64 = 1 << 20;

#[cfg(target_os = "linux")]
async fn zero_copy(socket: &TcpStream, file: &mut StreamedFile) -> io::Result<u64> {
    use std::os::fd::AsRawFd;
    use tokio::io::Interest;

    let out_fd = socket.as_raw_fd();
    let in_fd = file.file().as_raw_fd();
    let mut total = 0u64;

    while file.remaining() > 0 {
        let offset = (file.length() - file.remaining()) as libc::off_t;
        let count = file.remaining().min(SENDFILE_MAX) as usize;

        let sent = socket
            .async_io(Interest::WRITABLE, || {
                let mut off = offset;
                // SAFETY: both descriptors stay open for the duration of the
                // call and `off` is a valid, exclusively borrowed offset.
                let rc = unsafe { libc::sendfile(out_fd, in_fd, &mut off, count) };
                if rc < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(rc as u64)
                }
            })
            .await?;

        if sent == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank during transfer",
            ));
        }
        file.advance(sent);
        total += sent;
    }

    Ok(total)
}
