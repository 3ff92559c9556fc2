//! Low-level length-prefixed framing primitives shared by the token codec
//! and the conversation layer. Every integer on the wire is little-endian.

use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub async fn write_u8<W: AsyncWrite + Unpin>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_u8(v).await
}

pub async fn read_u8<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<u8> {
    r.read_u8().await
}

pub async fn write_u32<W: AsyncWrite + Unpin>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_u32_le(v).await
}

pub async fn read_u32<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<u32> {
    r.read_u32_le().await
}

pub async fn write_u64<W: AsyncWrite + Unpin>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_u64_le(v).await
}

pub async fn read_u64<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<u64> {
    r.read_u64_le().await
}

pub async fn write_i64<W: AsyncWrite + Unpin>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_i64_le(v).await
}

pub async fn read_i64<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<i64> {
    r.read_i64_le().await
}

/// Writes a length-prefixed (u32 length) byte blob.
pub async fn write_blob<W: AsyncWrite + Unpin>(w: &mut W, data: &[u8]) -> io::Result<()> {
    write_u32(w, data.len() as u32).await?;
    w.write_all(data).await
}

/// Reads a length-prefixed (u32 length) byte blob.
pub async fn read_blob<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(r).await? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}
