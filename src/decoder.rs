//! Cauchy matrix decoder.
//!
//! Missing originals are solved from the surviving recovery blocks:
//!
//! 1. Subtract (XOR) the contribution of every received original from every
//!    recovery block, leaving `r = M * e` where `e` are the erased originals
//!    and `M` is the `m x m` Cauchy submatrix of the used recovery rows and
//!    erased columns.
//! 2. Factor `M = L * D * U` with unit triangular `L`, `U`.
//! 3. Forward substitution through `L`, divide by `D`, back substitution
//!    through `U`. Each scalar operation of the solve is a bulk operation over
//!    a whole block.
//!
//! A single erasure skips the factorization and divides directly by the one
//! matrix element (or just XORs, if the recovery block is the parity row).

use tracing::{error, trace};

use crate::encoder::matrix_element;
use crate::gf256::FieldContext;
use crate::{BlockMut, Error, Params};

/// Decoder for one set of received blocks.
///
/// Created by [`Decoder::new`], which classifies and validates the blocks, and
/// consumed by [`Decoder::decode`]. Recovery blocks are overwritten in place
/// with the recovered original data and relabeled with the original index.
pub struct Decoder<'a, 'd> {
    gf: &'a FieldContext,
    params: Params,
    /// Received originals as (index, data)
    original: Vec<(u8, &'a [u8])>,
    /// Received recovery blocks, overwritten during decode
    recovery: Vec<&'a mut BlockMut<'d>>,
    /// Indices of erased original blocks, ascending
    erasures: Vec<u8>,
}

impl<'a, 'd> Decoder<'a, 'd> {
    /// Classify `blocks` into originals and recovery blocks.
    ///
    /// # Errors
    /// - [`Error::IndexOutOfRange`] / [`Error::DuplicateIndex`] /
    ///   [`Error::BufferSize`] for malformed blocks
    /// - [`Error::InsufficientBlocks`] if more originals are missing than
    ///   recovery blocks were supplied
    /// - [`Error::BlockCount`] if more than `original_count` blocks are given
    pub fn new(gf: &'a FieldContext, params: Params, blocks: &'a mut [BlockMut<'d>]) -> Result<Self, Error> {
        let original_count = params.original_count();
        let total = params.total_count();
        let supplied = blocks.len();

        let mut received = vec![false; total];
        let mut original = Vec::with_capacity(original_count);
        let mut recovery = Vec::new();

        for block in blocks.iter_mut() {
            let idx = block.index as usize;
            if idx >= total {
                return Err(Error::IndexOutOfRange(block.index));
            }
            if block.data.len() != params.block_bytes() {
                return Err(Error::BufferSize {
                    expected: params.block_bytes(),
                    got: block.data.len(),
                });
            }
            if std::mem::replace(&mut received[idx], true) {
                return Err(Error::DuplicateIndex(block.index));
            }

            if idx < original_count {
                let block: &'a BlockMut<'d> = block;
                original.push((block.index, &*block.data));
            } else {
                recovery.push(block);
            }
        }

        let erasures: Vec<u8> = (0..original_count)
            .filter(|&i| !received[i])
            .map(|i| i as u8)
            .collect();

        if erasures.len() > recovery.len() {
            return Err(Error::InsufficientBlocks {
                erasures: erasures.len(),
                recovery: recovery.len(),
            });
        }
        if supplied != original_count {
            return Err(Error::BlockCount {
                expected: original_count,
                got: supplied,
            });
        }

        Ok(Self {
            gf,
            params,
            original,
            recovery,
            erasures,
        })
    }

    /// Original indices that will be recovered.
    pub fn erasures(&self) -> &[u8] {
        &self.erasures
    }

    /// Recover every erased original.
    ///
    /// Returns the recovered original indices, in the order of the recovery
    /// blocks (as supplied) that now hold them.
    ///
    /// # Errors
    /// Returns [`Error::SingularMatrix`] if the factorization meets a zero
    /// pivot. This cannot happen for a correct Cauchy matrix and signals a
    /// library defect.
    pub fn decode(mut self) -> Result<Vec<u8>, Error> {
        if self.erasures.is_empty() {
            return Ok(Vec::new());
        }

        trace!(
            original_count = self.params.original_count(),
            erasures = self.erasures.len(),
            "decoding"
        );

        match (self.params.original_count(), self.erasures.len()) {
            // Every recovery block is already a copy of the single original
            (1, _) => trace!("single original, recovery block used as is"),
            (_, 1) => self.decode_m1()?,
            _ => self.decode_ldu()?,
        }

        for (block, &index) in self.recovery.iter_mut().zip(&self.erasures) {
            block.index = index;
        }

        Ok(self.erasures)
    }

    /// Decode when only one original is missing (m=1 case)
    fn decode_m1(&mut self) -> Result<(), Error> {
        let gf = self.gf;
        let x_0 = self.params.original_count() as u8;
        let target = &mut self.recovery[0];
        let x_i = target.index;
        let out = &mut *target.data;

        // Parity row: XOR all received originals into the recovery block
        if x_i == x_0 {
            trace!(erased = self.erasures[0], "single erasure via parity row");
            let mut pairs = self.original.chunks_exact(2);
            for pair in &mut pairs {
                gf.bulk_xor2(out, pair[0].1, pair[1].1);
            }
            if let [(_, last)] = pairs.remainder() {
                gf.bulk_xor(out, last);
            }
            return Ok(());
        }

        trace!(erased = self.erasures[0], row = x_i, "single erasure via scaled row");
        for &(index, data) in &self.original {
            gf.bulk_scale_accumulate(out, matrix_element(gf, x_i, x_0, index), data);
        }

        let coeff = matrix_element(gf, x_i, x_0, self.erasures[0]);
        if coeff == 0 {
            error!(row = x_i, column = self.erasures[0], "zero Cauchy element");
            return Err(Error::SingularMatrix);
        }
        gf.bulk_divide_in_place(out, coeff);
        Ok(())
    }

    /// Decode for m>1 case using LDU decomposition
    fn decode_ldu(&mut self) -> Result<(), Error> {
        let gf = self.gf;
        let x_0 = self.params.original_count() as u8;
        let n = self.recovery.len();

        // Step 1: Eliminate known original data from recovery blocks
        for &(index, data) in &self.original {
            for block in self.recovery.iter_mut() {
                let coeff = matrix_element(gf, block.index, x_0, index);
                gf.bulk_scale_accumulate(&mut *block.data, coeff, data);
            }
        }

        // Step 2: Factor the recovery submatrix
        let rows: Vec<u8> = self.recovery.iter().map(|b| b.index).collect();
        let ldu = Ldu::decompose(gf, x_0, &rows, &self.erasures)?;

        // Step 3: Forward substitution (eliminate lower triangle)
        for j in 0..n - 1 {
            let (head, tail) = self.recovery.split_at_mut(j + 1);
            let block_j = &*head[j].data;
            for (offset, block_i) in tail.iter_mut().enumerate() {
                let c_ij = ldu.lower(j + 1 + offset, j);
                gf.bulk_scale_accumulate(&mut *block_i.data, c_ij, block_j);
            }
        }

        // Step 4: Divide by the diagonal
        for (i, block) in self.recovery.iter_mut().enumerate() {
            gf.bulk_divide_in_place(&mut *block.data, ldu.diagonal[i]);
        }

        // Step 5: Back substitution (eliminate upper triangle)
        for j in (1..n).rev() {
            let (head, tail) = self.recovery.split_at_mut(j);
            let block_j = &*tail[0].data;
            for (i, block_i) in head.iter_mut().enumerate() {
                let c_ij = ldu.upper(i, j);
                gf.bulk_scale_accumulate(&mut *block_i.data, c_ij, block_j);
            }
        }

        Ok(())
    }
}

/// LDU factors of the normalized Cauchy submatrix
///
/// `M[i][j] = (y_j + x_0) / (x_i + y_j)` for recovery rows `x_i` and erased
/// columns `y_j`. `L` and `U` have unit diagonals, stored dense row-major.
struct Ldu {
    n: usize,
    lower: Vec<u8>,
    diagonal: Vec<u8>,
    upper: Vec<u8>,
}

impl Ldu {
    /// Schur-type direct Cauchy factorization.
    ///
    /// Boros, Kailath, Olshevsky, "Pivoting and Backward Stability of Fast
    /// Algorithms for Solving Cauchy Linear Equations". The unnormalized
    /// Cauchy matrix `C[i][j] = 1 / (x_i + y_j)` is tracked through generators
    /// `g` (rows) and `b` (columns); the column scaling `y_j + x_0` is folded
    /// into `D` and `U`. No pivoting: every leading submatrix is invertible.
    fn decompose(gf: &FieldContext, x_0: u8, rows: &[u8], cols: &[u8]) -> Result<Self, Error> {
        debug_assert_eq!(rows.len(), cols.len());
        let n = rows.len();

        let mut lower = vec![0u8; n * n];
        let mut diagonal = vec![0u8; n];
        let mut upper = vec![0u8; n * n];

        let mut g = vec![1u8; n];
        let mut b = vec![1u8; n];

        for k in 0..n {
            let x_k = rows[k];
            let y_k = cols[k];

            // D_kk = (x_k + y_k)
            // L_kk = g[k] / (x_k + y_k)
            // U_kk = b[k] * (x_0 + y_k) / (x_k + y_k)
            let d_kk = gf.add(x_k, y_k);
            let l_kk = gf.divide(g[k], d_kk);
            let u_kk = gf.multiply(gf.divide(b[k], d_kk), gf.add(x_0, y_k));

            diagonal[k] = gf.multiply(d_kk, gf.multiply(l_kk, u_kk));
            if diagonal[k] == 0 {
                error!(k, row = x_k, column = y_k, "zero pivot in Cauchy LDU");
                return Err(Error::SingularMatrix);
            }

            for j in (k + 1)..n {
                let x_j = rows[j];
                let y_j = cols[j];

                // L_jk = g[j] / (x_j + y_k)
                // U_kj = b[j] / (x_k + y_j)
                let l_jk = gf.divide(g[j], gf.add(x_j, y_k));
                let u_kj = gf.divide(b[j], gf.add(x_k, y_j));

                lower[j * n + k] = gf.divide(l_jk, l_kk);
                upper[k * n + j] = gf.multiply(gf.divide(u_kj, u_kk), gf.add(x_0, y_j));

                // g[j] = g[j] * (x_j + x_k) / (x_j + y_k)
                // b[j] = b[j] * (y_j + y_k) / (y_j + x_k)
                g[j] = gf.multiply(g[j], gf.divide(gf.add(x_j, x_k), gf.add(x_j, y_k)));
                b[j] = gf.multiply(b[j], gf.divide(gf.add(y_j, y_k), gf.add(y_j, x_k)));
            }
        }

        Ok(Self {
            n,
            lower,
            diagonal,
            upper,
        })
    }

    #[inline]
    fn lower(&self, i: usize, j: usize) -> u8 {
        debug_assert!(i > j);
        self.lower[i * self.n + j]
    }

    #[inline]
    fn upper(&self, i: usize, j: usize) -> u8 {
        debug_assert!(i < j);
        self.upper[i * self.n + j]
    }
}
