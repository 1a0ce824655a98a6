// Copyright (c) 2026 Convergent Ledger
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! VLC length-prefixed framing over a byte stream (§6): `VLC(length) ||
//! payload`. Framing is agnostic to what the payload means; [`super::message`]
//! layers the multi-cell message semantics on top.

use super::error::WireError;
use crate::core::cell::vlc::{decode_vlc_count, encode_vlc_count};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum total message length, framing prefix excluded (§6).
pub const MAX_MESSAGE_LEN: u64 = 20_000_000;

/// Write `payload` as one length-prefixed frame, then flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), WireError> {
    let len = payload.len() as u64;
    if len > MAX_MESSAGE_LEN {
        return Err(WireError::TooLarge(len));
    }
    let mut prefix = Vec::with_capacity(9);
    encode_vlc_count(&mut prefix, len);
    writer.write_all(&prefix).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame, enforcing [`MAX_MESSAGE_LEN`] before
/// allocating the payload buffer.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, WireError> {
    let mut prefix = Vec::with_capacity(9);
    loop {
        let mut byte = [0u8; 1];
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            if prefix.is_empty() {
                return Err(WireError::Truncated);
            }
            return Err(WireError::BadLengthPrefix);
        }
        let more = byte[0] & 0x80 != 0;
        prefix.push(byte[0]);
        if !more {
            break;
        }
        if prefix.len() > 9 {
            return Err(WireError::BadLengthPrefix);
        }
    }
    let (len, used) = decode_vlc_count(&prefix, 0).map_err(|_| WireError::BadLengthPrefix)?;
    if used != prefix.len() {
        return Err(WireError::BadLengthPrefix);
    }
    if len > MAX_MESSAGE_LEN {
        return Err(WireError::TooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Truncated
        } else {
            WireError::Io(e)
        }
    })?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let payload = vec![1u8, 2, 3, 4, 5];
        write_frame(&mut client, &payload).await.unwrap();
        let read_back = read_frame(&mut server).await.unwrap();
        assert_eq!(read_back, payload);
    }

    #[tokio::test]
    async fn empty_payload_roundtrips() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, &[]).await.unwrap();
        let read_back = read_frame(&mut server).await.unwrap();
        assert!(read_back.is_empty());
    }

    #[tokio::test]
    async fn oversize_length_prefix_is_rejected_without_allocating() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let mut prefix = Vec::new();
        encode_vlc_count(&mut prefix, MAX_MESSAGE_LEN + 1);
        client.write_all(&prefix).await.unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::TooLarge(n) if n == MAX_MESSAGE_LEN + 1));
    }

    #[tokio::test]
    async fn closed_connection_mid_frame_is_truncated() {
        let (mut client, mut server) = tokio::io::duplex(64);
        // Write a length prefix promising 10 bytes, then only send 2 and close.
        let mut prefix = Vec::new();
        encode_vlc_count(&mut prefix, 10);
        client.write_all(&prefix).await.unwrap();
        client.write_all(&[1, 2]).await.unwrap();
        drop(client);
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, WireError::Truncated));
    }
}
