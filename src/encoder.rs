//! Cauchy matrix encoder.
//!
//! Recovery block `r` is the GF(256) linear combination of every original
//! block weighted by row `r` of a Cauchy matrix. The matrix is normalized so
//! that row 0 is all ones, which makes the first recovery block plain XOR
//! parity.

use tracing::trace;

use crate::gf256::FieldContext;
use crate::{Block, Error, Params};

/// Cauchy matrix element for recovery row `x_i` and original column `y_j`.
///
/// The matrix is normalized so the first row is all 1s:
///   a_ij = (y_j + x_0) / (x_i + y_j)
///
/// Where:
/// - x_i is the recovery block index
/// - x_0 = original_count (first recovery block index)
/// - y_j is the original block index
///
/// Scaling columns by the non-zero `y_j + x_0` keeps every square submatrix
/// invertible.
#[inline]
pub(crate) fn matrix_element(gf: &FieldContext, x_i: u8, x_0: u8, y_j: u8) -> u8 {
    gf.divide(gf.add(y_j, x_0), gf.add(x_i, y_j))
}

/// Validate original blocks and return their data ordered by index.
pub(crate) fn order_originals<'b>(params: &Params, originals: &[Block<'b>]) -> Result<Vec<&'b [u8]>, Error> {
    let count = params.original_count();
    if originals.len() != count {
        return Err(Error::BlockCount {
            expected: count,
            got: originals.len(),
        });
    }

    let mut slots: Vec<Option<&'b [u8]>> = vec![None; count];
    for block in originals {
        let idx = block.index as usize;
        if idx >= count {
            return Err(Error::IndexOutOfRange(block.index));
        }
        if block.data.len() != params.block_bytes() {
            return Err(Error::BufferSize {
                expected: params.block_bytes(),
                got: block.data.len(),
            });
        }
        if slots[idx].replace(block.data).is_some() {
            return Err(Error::DuplicateIndex(block.index));
        }
    }

    // Count matches and nothing is duplicated, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

/// Produce one recovery row from originals already ordered by index.
fn encode_row(gf: &FieldContext, params: &Params, originals: &[&[u8]], recovery_index: usize, output: &mut [u8]) {
    // Single original: every recovery block is a copy
    if originals.len() == 1 {
        output.copy_from_slice(originals[0]);
        return;
    }

    // First recovery row is all 1s (simple XOR parity)
    if recovery_index == 0 {
        gf.bulk_combine(output, originals[0], originals[1]);
        let mut rest = originals[2..].chunks_exact(2);
        for pair in &mut rest {
            gf.bulk_xor2(output, pair[0], pair[1]);
        }
        if let [last] = rest.remainder() {
            gf.bulk_xor(output, last);
        }
        return;
    }

    let x_0 = params.original_count() as u8;
    let x_i = params.recovery_block_index(recovery_index);

    // First column seeds the output, the rest accumulate
    gf.bulk_scale(output, originals[0], matrix_element(gf, x_i, x_0, 0));
    for (j, block) in originals.iter().enumerate().skip(1) {
        gf.bulk_scale_accumulate(output, matrix_element(gf, x_i, x_0, j as u8), block);
    }
}

/// Encode a single recovery block.
///
/// # Arguments
/// * `gf` - Field context
/// * `params` - Encoder parameters
/// * `originals` - All original blocks, in any order
/// * `recovery_index` - Which recovery block to generate (0..recovery_count)
/// * `output` - Output buffer for the recovery block (block_bytes long)
///
/// # Errors
/// Returns an error if the originals or the output buffer do not match `params`.
/// An out-of-range `recovery_index` reports [`Error::IndexOutOfRange`], or
/// [`Error::TooManyBlocks`] when its block index would pass 255.
pub fn encode_block(
    gf: &FieldContext,
    params: &Params,
    originals: &[Block],
    recovery_index: usize,
    output: &mut [u8],
) -> Result<(), Error> {
    if recovery_index >= params.recovery_count() {
        // A block index past 255 cannot exist in any valid code
        let index = params
            .original_count()
            .checked_add(recovery_index)
            .and_then(|i| u8::try_from(i).ok());
        return Err(index.map_or(Error::TooManyBlocks, Error::IndexOutOfRange));
    }
    if output.len() != params.block_bytes() {
        return Err(Error::BufferSize {
            expected: params.block_bytes(),
            got: output.len(),
        });
    }

    let ordered = order_originals(params, originals)?;
    encode_row(gf, params, &ordered, recovery_index, output);
    Ok(())
}

/// Encode all recovery blocks with an explicit field context.
///
/// `recovery_output` receives the recovery blocks end-to-end, ordered by
/// recovery index. Nothing is written unless validation succeeds.
///
/// # Errors
/// Returns an error if the originals or the output buffer do not match `params`.
pub fn encode_with(
    gf: &FieldContext,
    params: &Params,
    originals: &[Block],
    recovery_output: &mut [u8],
) -> Result<(), Error> {
    let expected = params.recovery_count() * params.block_bytes();
    if recovery_output.len() != expected {
        return Err(Error::BufferSize {
            expected,
            got: recovery_output.len(),
        });
    }

    let ordered = order_originals(params, originals)?;

    trace!(
        original_count = params.original_count(),
        recovery_count = params.recovery_count(),
        block_bytes = params.block_bytes(),
        "encoding"
    );

    for (recovery_idx, output) in recovery_output
        .chunks_exact_mut(params.block_bytes())
        .enumerate()
    {
        encode_row(gf, params, &ordered, recovery_idx, output);
    }

    Ok(())
}
