//! Suggested wire format.
//!
//! The codec itself never touches the network; this module only frames what
//! a transport needs to carry so the receiver can rebuild [`Params`] and the
//! block indices.
//!
//! # Wire Format
//!
//! ```text
//! once per session:   ┌────────────────┬────────────────┐
//!                     │ original_count │ recovery_count │
//!                     │ (1B)           │ (1B)           │
//!                     └────────────────┴────────────────┘
//! per block:          ┌────────────────┬──────────────────────────┐
//!                     │ index (1B)     │ data (block_bytes)       │
//!                     └────────────────┴──────────────────────────┘
//! ```
//!
//! Payloads shorter than `block_bytes` can be carried with [`pad_payload`],
//! which stores the true length (2 bytes, little endian) inside the block so
//! it survives recovery.

use crate::{Block, Error, Params};

/// Session header: the block counts of one coding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHeader {
    pub original_count: u8,
    pub recovery_count: u8,
}

impl SessionHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 2;

    /// Header for `params`.
    ///
    /// # Errors
    /// Returns [`Error::TooManyBlocks`] if a count does not fit in one byte.
    pub fn from_params(params: &Params) -> Result<Self, Error> {
        let original_count = u8::try_from(params.original_count()).map_err(|_| Error::TooManyBlocks)?;
        let recovery_count = u8::try_from(params.recovery_count()).map_err(|_| Error::TooManyBlocks)?;
        Ok(Self {
            original_count,
            recovery_count,
        })
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.original_count, self.recovery_count]
    }

    /// Deserialize a header from the front of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Self::SIZE {
            return Err(Error::Truncated {
                needed: Self::SIZE,
                got: buf.len(),
            });
        }
        Ok(Self {
            original_count: buf[0],
            recovery_count: buf[1],
        })
    }

    /// Codec parameters for this session.
    pub fn params(&self, block_bytes: usize) -> Result<Params, Error> {
        Params::new(
            self.original_count as usize,
            self.recovery_count as usize,
            block_bytes,
        )
    }
}

/// One transmitted block: index byte followed by the block data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFrame<'a> {
    pub index: u8,
    pub data: &'a [u8],
}

impl<'a> BlockFrame<'a> {
    #[inline]
    pub fn new(index: u8, data: &'a [u8]) -> Self {
        Self { index, data }
    }

    /// Frame size in bytes.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        1 + self.data.len()
    }

    /// Append the frame to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.push(self.index);
        out.extend_from_slice(self.data);
    }

    /// Parse one frame from the front of `buf`.
    ///
    /// Returns the frame and the remaining bytes.
    pub fn parse(buf: &'a [u8], block_bytes: usize) -> Result<(Self, &'a [u8]), Error> {
        let needed = 1 + block_bytes;
        if buf.len() < needed {
            return Err(Error::Truncated {
                needed,
                got: buf.len(),
            });
        }
        let (frame, rest) = buf.split_at(needed);
        Ok((Self::new(frame[0], &frame[1..]), rest))
    }

    /// View as a codec input block.
    #[inline]
    pub fn block(&self) -> Block<'a> {
        Block::new(self.index, self.data)
    }
}

impl<'a> From<&Block<'a>> for BlockFrame<'a> {
    fn from(block: &Block<'a>) -> Self {
        Self::new(block.index, block.data)
    }
}

/// Bytes used by the length prefix of [`pad_payload`].
pub const LENGTH_PREFIX_BYTES: usize = 2;

/// Largest payload [`pad_payload`] accepts for a block size.
pub fn max_payload(block_bytes: usize) -> usize {
    block_bytes
        .saturating_sub(LENGTH_PREFIX_BYTES)
        .min(u16::MAX as usize)
}

/// Store `payload` in a zero-padded block of `block_bytes`, prefixed with its
/// length.
///
/// # Errors
/// Returns [`Error::PayloadTooLarge`] if the payload does not fit.
pub fn pad_payload(payload: &[u8], block_bytes: usize) -> Result<Vec<u8>, Error> {
    let max = max_payload(block_bytes);
    if payload.len() > max || block_bytes < LENGTH_PREFIX_BYTES {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max,
        });
    }

    let mut block = vec![0u8; block_bytes];
    block[..LENGTH_PREFIX_BYTES].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    block[LENGTH_PREFIX_BYTES..LENGTH_PREFIX_BYTES + payload.len()].copy_from_slice(payload);
    Ok(block)
}

/// Extract the payload stored by [`pad_payload`].
///
/// # Errors
/// Returns [`Error::Truncated`] if the block is shorter than its prefix claims.
pub fn unpad_payload(block: &[u8]) -> Result<&[u8], Error> {
    if block.len() < LENGTH_PREFIX_BYTES {
        return Err(Error::Truncated {
            needed: LENGTH_PREFIX_BYTES,
            got: block.len(),
        });
    }
    let len = u16::from_le_bytes([block[0], block[1]]) as usize;
    let end = LENGTH_PREFIX_BYTES + len;
    if block.len() < end {
        return Err(Error::Truncated {
            needed: end,
            got: block.len(),
        });
    }
    Ok(&block[LENGTH_PREFIX_BYTES..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let params = Params::new(10, 4, 1200).unwrap();
        let header = SessionHeader::from_params(&params).unwrap();
        assert_eq!(header.to_bytes(), [10, 4]);

        let parsed = SessionHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);

        let restored = parsed.params(1200).unwrap();
        assert_eq!(restored.original_count(), 10);
        assert_eq!(restored.recovery_count(), 4);
    }

    #[test]
    fn test_header_rejects_wide_counts() {
        let params = Params::new(256, 0, 8).unwrap();
        assert_eq!(SessionHeader::from_params(&params), Err(Error::TooManyBlocks));
    }

    #[test]
    fn test_header_truncated() {
        assert_eq!(
            SessionHeader::from_bytes(&[7]),
            Err(Error::Truncated { needed: 2, got: 1 })
        );
    }

    #[test]
    fn test_header_invalid_counts() {
        let header = SessionHeader::from_bytes(&[200, 100]).unwrap();
        assert_eq!(header.params(16).unwrap_err(), Error::TooManyBlocks);

        let header = SessionHeader::from_bytes(&[0, 1]).unwrap();
        assert_eq!(header.params(16).unwrap_err(), Error::InvalidParams);
    }

    #[test]
    fn test_frame_stream() {
        let a = [1u8, 2, 3, 4];
        let b = [5u8, 6, 7, 8];

        let mut buf = Vec::new();
        BlockFrame::new(0, &a).write_to(&mut buf);
        BlockFrame::from(&Block::new(9, &b)).write_to(&mut buf);
        assert_eq!(buf.len(), 10);

        let (first, rest) = BlockFrame::parse(&buf, 4).unwrap();
        assert_eq!(first, BlockFrame::new(0, &a));
        let (second, rest) = BlockFrame::parse(rest, 4).unwrap();
        assert_eq!(second.block().index, 9);
        assert_eq!(second.data, &b);
        assert!(rest.is_empty());

        assert_eq!(
            BlockFrame::parse(&buf[..4], 4),
            Err(Error::Truncated { needed: 5, got: 4 })
        );
    }

    #[test]
    fn test_payload_padding() {
        let block = pad_payload(b"hello", 16).unwrap();
        assert_eq!(block.len(), 16);
        assert_eq!(&block[..2], &[5, 0]);
        assert!(block[7..].iter().all(|&b| b == 0));
        assert_eq!(unpad_payload(&block).unwrap(), b"hello");

        let empty = pad_payload(&[], 2).unwrap();
        assert_eq!(unpad_payload(&empty).unwrap(), b"");
    }

    #[test]
    fn test_payload_limits() {
        assert_eq!(max_payload(16), 14);
        assert_eq!(max_payload(1), 0);
        assert_eq!(max_payload(100_000), u16::MAX as usize);

        assert_eq!(
            pad_payload(&[0u8; 15], 16),
            Err(Error::PayloadTooLarge { len: 15, max: 14 })
        );
        assert_eq!(
            pad_payload(&[], 1),
            Err(Error::PayloadTooLarge { len: 0, max: 0 })
        );

        assert_eq!(unpad_payload(&[1]), Err(Error::Truncated { needed: 2, got: 1 }));
        assert_eq!(
            unpad_payload(&[10, 0, 1, 2]),
            Err(Error::Truncated { needed: 12, got: 4 })
        );
    }
}
