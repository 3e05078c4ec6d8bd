//! Sink side of the scp protocol, enough to push one file.
//!
//! The remote end runs [`SINK_COMMAND`]; we write a `C` record, the file
//! bytes and a terminating NUL to its stdin.

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Remote command that receives files into the login directory.
pub const SINK_COMMAND: &str = "/usr/bin/scp -tr .";

/// `C<mode> <len> <dest>\n`, with the mode as four octal digits.
pub fn file_header(mode: u32, len: usize, dest: &str) -> String {
    format!("C{:04o} {len} {dest}\n", mode & 0o7777)
}

/// Writes one file record to an scp sink.
///
/// # Errors
///
/// Fails with [`io::ErrorKind::InvalidInput`] if `dest` is not a plain file
/// name, or with whatever error the writer returns.
pub async fn write_file<W>(w: &mut W, mode: u32, dest: &str, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if dest.is_empty() || dest.contains(['/', '\n']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid scp destination {dest:?}"),
        ));
    }

    w.write_all(file_header(mode, data.len(), dest).as_bytes())
        .await?;
    w.write_all(data).await?;
    w.write_all(&[0]).await?;
    w.flush().await
}
