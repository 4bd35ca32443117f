//! Length-prefixed postcard framing.

use std::io::{self, ErrorKind};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted in either direction.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes `frame` and writes it with its length prefix, then flushes.
///
/// # Errors
///
/// Fails if encoding fails, the frame exceeds [`MAX_FRAME_LEN`], or the
/// writer fails.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> io::Result<()>
where
	W: AsyncWrite + Unpin + ?Sized,
	T: Serialize + ?Sized,
{
	let buf = postcard::to_allocvec(frame)
		.map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?;
	if buf.len() > MAX_FRAME_LEN {
		return Err(io::Error::new(
			ErrorKind::InvalidInput,
			format!("frame of {} bytes exceeds limit", buf.len()),
		));
	}
	writer.write_u32_le(buf.len() as u32).await?;
	writer.write_all(&buf).await?;
	writer.flush().await
}

/// Reads one frame. Returns `None` when the stream ends between frames.
///
/// # Errors
///
/// Fails on a truncated frame, an oversized length, or undecodable bytes.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
	R: AsyncRead + Unpin + ?Sized,
	T: DeserializeOwned,
{
	let len = match reader.read_u32_le().await {
		Ok(len) => len as usize,
		Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(e),
	};
	if len > MAX_FRAME_LEN {
		return Err(io::Error::new(
			ErrorKind::InvalidData,
			format!("frame of {len} bytes exceeds limit"),
		));
	}
	let mut buf = vec![0u8; len];
	reader.read_exact(&mut buf).await?;
	postcard::from_bytes(&buf)
		.map(Some)
		.map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{BrokerId, MuxFrame};

	#[tokio::test(flavor = "current_thread")]
	async fn frames_survive_the_pipe() {
		let (mut a, mut b) = tokio::io::duplex(1024);
		let sent = MuxFrame::Data {
			id: BrokerId(3),
			bytes: b"payload".to_vec(),
		};
		write_frame(&mut a, &sent).await.expect("write");
		write_frame(&mut a, &MuxFrame::Close { id: BrokerId(3) })
			.await
			.expect("write");
		drop(a);

		let first: MuxFrame = read_frame(&mut b).await.expect("read").expect("frame");
		assert_eq!(first, sent);
		let second: MuxFrame = read_frame(&mut b).await.expect("read").expect("frame");
		assert_eq!(second, MuxFrame::Close { id: BrokerId(3) });
		let end: Option<MuxFrame> = read_frame(&mut b).await.expect("read");
		assert!(end.is_none());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn length_prefix_is_little_endian() {
		let mut out = Vec::new();
		write_frame(&mut out, &7u8).await.expect("write");
		assert_eq!(out, [1, 0, 0, 0, 7]);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn oversized_length_is_rejected() {
		let header = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
		let mut input = &header[..];
		let err = read_frame::<_, MuxFrame>(&mut input).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidData);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn truncated_body_is_an_error() {
		let bytes = [10u8, 0, 0, 0, 1, 2];
		let mut input = &bytes[..];
		let err = read_frame::<_, MuxFrame>(&mut input).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
	}

	#[tokio::test(flavor = "current_thread")]
	async fn garbage_body_is_invalid_data() {
		let bytes = [2u8, 0, 0, 0, 0xff, 0xff];
		let mut input = &bytes[..];
		let err = read_frame::<_, MuxFrame>(&mut input).await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidData);
	}
}
