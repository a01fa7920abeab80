//! Cauchy Reed-Solomon Erasure Coding over GF(256)
//!
//! This library encodes `original_count` equal-size data blocks into
//! `recovery_count` recovery blocks using a Cauchy matrix over GF(256). Any
//! `original_count` of the `original_count + recovery_count` blocks are
//! enough to rebuild every original block.
//!
//! - [`gf256`] holds the field engine: lookup tables, scalar operations and
//!   vectorized bulk operations over byte buffers.
//! - [`encode`] / [`encode_with`] produce recovery blocks.
//! - [`decode`] / [`Decoder`] rebuild lost originals in place.
//! - [`wire`] frames blocks for transmission.
//!
//! # Example
//!
//! ```rust
//! use cauchy256::{Params, Block, BlockMut, encode, decode};
//!
//! // Create encoder parameters
//! let params = Params::new(3, 2, 1024).unwrap(); // 3 original, 2 recovery, 1024 bytes each
//!
//! // Original data blocks
//! let original_data: Vec<Vec<u8>> = vec![
//!     vec![1u8; 1024],
//!     vec![2u8; 1024],
//!     vec![3u8; 1024],
//! ];
//!
//! // Encode
//! let mut recovery_blocks = vec![0u8; params.recovery_count() * params.block_bytes()];
//! let blocks: Vec<Block> = original_data.iter()
//!     .enumerate()
//!     .map(|(i, data)| Block::new(i as u8, data))
//!     .collect();
//! encode(&params, &blocks, &mut recovery_blocks).unwrap();
//!
//! // Lose original 1, decode with the first recovery block in its place
//! let mut b0 = original_data[0].clone();
//! let mut b2 = original_data[2].clone();
//! let mut r0 = recovery_blocks[..1024].to_vec();
//! let mut received = vec![
//!     BlockMut::new(0, &mut b0),
//!     BlockMut::new(params.recovery_block_index(0), &mut r0),
//!     BlockMut::new(2, &mut b2),
//! ];
//! let recovered = decode(&params, &mut received).unwrap();
//! assert_eq!(recovered, vec![1]);
//! assert_eq!(received[1].index, 1);
//! assert_eq!(&*received[1].data, &original_data[1][..]);
//! ```

pub mod decoder;
pub mod encoder;
pub mod gf256;
pub mod wire;

pub use decoder::Decoder;
pub use encoder::{encode_block, encode_with};
pub use gf256::{FieldConfig, FieldContext, Strategy};

/// Maximum number of distinct block indices (one byte).
pub const MAX_BLOCKS: usize = 256;

/// Error type for codec operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Zero original count or zero block size
    #[error("invalid encoder parameters")]
    InvalidParams,
    /// Too many total blocks (original + recovery > 256)
    #[error("original_count + recovery_count > 256")]
    TooManyBlocks,
    /// Wrong number of blocks supplied
    #[error("expected {expected} blocks, got {got}")]
    BlockCount { expected: usize, got: usize },
    /// A block or output buffer has the wrong length
    #[error("expected a buffer of {expected} bytes, got {got}")]
    BufferSize { expected: usize, got: usize },
    /// Block index outside the original/recovery range
    #[error("block index {0} out of range")]
    IndexOutOfRange(u8),
    /// Duplicate block indices found
    #[error("duplicate block index {0}")]
    DuplicateIndex(u8),
    /// More originals are missing than recovery blocks were supplied
    #[error("cannot recover {erasures} erased blocks from {recovery} recovery blocks")]
    InsufficientBlocks { erasures: usize, recovery: usize },
    /// A Cauchy submatrix was not invertible. Indicates a library defect.
    #[error("internal error: singular Cauchy submatrix")]
    SingularMatrix,
    /// The GF(256) tables failed validation
    #[error("GF(256) self-test failed for polynomial {polynomial:#x}")]
    SelfTest { polynomial: u16 },
    /// A forced execution strategy is not available on this CPU
    #[error("execution strategy {0:?} is not available")]
    UnsupportedStrategy(Strategy),
    /// Not enough bytes to parse a wire structure
    #[error("truncated input: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    /// Payload does not fit in a block
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}

impl Error {
    /// Non-zero status code for this error. Success is 0.
    pub fn status(&self) -> i32 {
        match self {
            Error::InvalidParams => -1,
            Error::TooManyBlocks => -2,
            Error::BlockCount { .. } => -3,
            Error::BufferSize { .. } => -4,
            Error::IndexOutOfRange(_) => -5,
            Error::DuplicateIndex(_) => -6,
            Error::InsufficientBlocks { .. } => -7,
            Error::SingularMatrix => -8,
            Error::SelfTest { .. } => -9,
            Error::UnsupportedStrategy(_) => -10,
            Error::Truncated { .. } => -11,
            Error::PayloadTooLarge { .. } => -12,
        }
    }

    /// Whether the error points at a library defect rather than caller input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::SingularMatrix | Error::SelfTest { .. })
    }
}

/// Encoder/decoder parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// Number of original data blocks (1..=256)
    original_count: usize,
    /// Number of recovery blocks (0..256)
    recovery_count: usize,
    /// Size of each block in bytes
    block_bytes: usize,
}

impl Params {
    /// Create new encoder parameters
    ///
    /// # Arguments
    /// * `original_count` - Number of original data blocks (>= 1)
    /// * `recovery_count` - Number of recovery blocks (may be 0)
    /// * `block_bytes` - Size of each block in bytes (> 0)
    ///
    /// # Errors
    /// Returns `Error::InvalidParams` if `original_count` or `block_bytes` is zero.
    /// Returns `Error::TooManyBlocks` if original_count + recovery_count > 256.
    pub fn new(original_count: usize, recovery_count: usize, block_bytes: usize) -> Result<Self, Error> {
        if original_count == 0 || block_bytes == 0 {
            return Err(Error::InvalidParams);
        }
        if original_count.saturating_add(recovery_count) > MAX_BLOCKS {
            return Err(Error::TooManyBlocks);
        }
        Ok(Self {
            original_count,
            recovery_count,
            block_bytes,
        })
    }

    #[inline]
    pub fn original_count(&self) -> usize {
        self.original_count
    }

    #[inline]
    pub fn recovery_count(&self) -> usize {
        self.recovery_count
    }

    #[inline]
    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// original_count + recovery_count
    #[inline]
    pub fn total_count(&self) -> usize {
        self.original_count + self.recovery_count
    }

    /// Get the block index for a recovery block
    #[inline]
    pub fn recovery_block_index(&self, recovery_index: usize) -> u8 {
        debug_assert!(recovery_index < self.recovery_count);
        (self.original_count + recovery_index) as u8
    }

    /// Get the block index for an original block
    #[inline]
    pub fn original_block_index(&self, original_index: usize) -> u8 {
        debug_assert!(original_index < self.original_count);
        original_index as u8
    }
}

/// A data block with its index
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    /// Block data
    pub data: &'a [u8],
    /// Block index (0..original_count for original, original_count.. for recovery)
    pub index: u8,
}

impl<'a> Block<'a> {
    /// Create a new block
    #[inline]
    pub fn new(index: u8, data: &'a [u8]) -> Self {
        Self { data, index }
    }

    /// Check if this is an original block
    #[inline]
    pub fn is_original(&self, params: &Params) -> bool {
        (self.index as usize) < params.original_count
    }
}

/// Mutable block for decoding (recovery blocks are overwritten in place)
#[derive(Debug)]
pub struct BlockMut<'a> {
    /// Block data
    pub data: &'a mut [u8],
    /// Block index, rewritten to the original index once recovered
    pub index: u8,
}

impl<'a> BlockMut<'a> {
    #[inline]
    pub fn new(index: u8, data: &'a mut [u8]) -> Self {
        Self { data, index }
    }

    /// Check if this is an original block
    #[inline]
    pub fn is_original(&self, params: &Params) -> bool {
        (self.index as usize) < params.original_count
    }
}

/// Encode all recovery blocks with the process-wide field context
///
/// # Arguments
/// * `params` - Encoder parameters
/// * `originals` - Original blocks (exactly original_count, any order)
/// * `recovery_output` - Output buffer for all recovery blocks (recovery_count * block_bytes)
///
/// # Errors
/// Returns an error if inputs are invalid; the output is left untouched.
pub fn encode(params: &Params, originals: &[Block], recovery_output: &mut [u8]) -> Result<(), Error> {
    encode_with(FieldContext::global()?, params, originals, recovery_output)
}

/// Decode lost blocks from available original and recovery blocks
///
/// Recovery blocks are overwritten in place with the recovered original data
/// and their `index` is set to the original index they now hold. Original
/// blocks are left untouched.
///
/// # Arguments
/// * `params` - Encoder parameters (same as used for encoding)
/// * `blocks` - Exactly original_count blocks, any mix of original and recovery
///
/// # Returns
/// The recovered original indices, in the order of the recovery blocks that
/// now hold them
///
/// # Errors
/// Returns an error if the blocks are malformed or too few to recover from
pub fn decode(params: &Params, blocks: &mut [BlockMut]) -> Result<Vec<u8>, Error> {
    Decoder::new(FieldContext::global()?, *params, blocks)?.decode()
}
