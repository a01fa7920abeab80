//! # GF(256) Field Engine
//!
//! Table-driven arithmetic over GF(2^8) with bulk memory operations.
//!
//! Addition is XOR. Multiplication and division go through 64 KiB product
//! and quotient tables built from log/exp tables of the multiplicative group.
//! Bulk multiplication additionally uses split nibble tables so that a single
//! byte shuffle instruction can multiply 16 or 32 bytes at once:
//!
//! ```text
//! x * y = LO[y][x & 0x0f] ^ HI[y][x >> 4]
//! ```
//!
//! A [`FieldContext`] is immutable once built and can be shared freely
//! between threads. [`FieldContext::global`] returns the process-wide context,
//! built on first use.
//!
//! ## Example
//!
//! ```rust
//! use cauchy256::FieldContext;
//!
//! let gf = FieldContext::global().unwrap();
//! let p = gf.multiply(0x53, 0xca);
//! assert_eq!(gf.divide(p, 0xca), 0x53);
//!
//! let src = [1u8, 2, 3, 4];
//! let mut dst = [0u8; 4];
//! gf.bulk_scale_accumulate(&mut dst, 0x1d, &src);
//! assert_eq!(dst[1], gf.multiply(2, 0x1d));
//! ```

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
mod neon;
#[cfg(all(feature = "simd", target_arch = "x86_64"))]
mod x86;

use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::Error;

// =============================================================================
// Configuration
// =============================================================================

/// Candidate generator polynomials, without the implicit x^8 term.
///
/// The field polynomial for index `i` is `(GENERATOR_POLYNOMIALS[i] << 1) | 1`.
pub const GENERATOR_POLYNOMIALS: [u8; 16] = [
    0x8e, 0x95, 0x96, 0xa6, 0xaf, 0xb1, 0xb2, 0xb4, 0xb8, 0xc3, 0xc6, 0xd4, 0xe1, 0xe7, 0xf3, 0xfa,
];

/// Index 3 selects 0x14d = x^8 + x^6 + x^3 + x^2 + 1.
pub const DEFAULT_POLYNOMIAL_INDEX: usize = 3;

/// log(0) sentinel. Any sum involving it lands in the zero tail of the exp table.
const LOG_ZERO: u16 = 512;

const EXP_TABLE_LEN: usize = 512 * 2 + 1;

/// Bulk multiplication backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Byte-wise lookup in the 256-entry product row.
    Table,
    /// 16 bytes per step with `pshufb`.
    Ssse3,
    /// 32 bytes per step with `vpshufb`.
    Avx2,
    /// 16 bytes per step with `tbl`.
    Neon,
}

impl Strategy {
    const ALL: [Strategy; 4] = [Strategy::Table, Strategy::Ssse3, Strategy::Avx2, Strategy::Neon];

    /// Check whether this backend was compiled in and the CPU supports it.
    pub fn is_available(self) -> bool {
        match self {
            Strategy::Table => true,
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            Strategy::Ssse3 => std::is_x86_feature_detected!("ssse3"),
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            Strategy::Avx2 => std::is_x86_feature_detected!("avx2"),
            #[cfg(all(feature = "simd", target_arch = "aarch64"))]
            Strategy::Neon => std::arch::is_aarch64_feature_detected!("neon"),
            _ => false,
        }
    }

    /// Widest backend usable on this machine.
    pub fn detect() -> Strategy {
        [Strategy::Avx2, Strategy::Neon, Strategy::Ssse3]
            .into_iter()
            .find(|s| s.is_available())
            .unwrap_or(Strategy::Table)
    }

    /// All backends usable on this machine, `Table` first.
    pub fn available() -> Vec<Strategy> {
        Self::ALL.into_iter().filter(|s| s.is_available()).collect()
    }

    /// Bytes multiplied per instruction.
    pub fn lanes(self) -> usize {
        match self {
            Strategy::Table => 1,
            Strategy::Ssse3 | Strategy::Neon => 16,
            Strategy::Avx2 => 32,
        }
    }
}

/// Configuration for building a [`FieldContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldConfig {
    /// Index into [`GENERATOR_POLYNOMIALS`]. Out-of-range values select index 0.
    pub polynomial_index: usize,

    /// Forced bulk backend. `None` picks [`Strategy::detect`].
    pub strategy: Option<Strategy>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            polynomial_index: DEFAULT_POLYNOMIAL_INDEX,
            strategy: None,
        }
    }
}

impl FieldConfig {
    /// Default polynomial, byte-wise table lookups only.
    pub fn scalar() -> Self {
        Self {
            strategy: Some(Strategy::Table),
            ..Self::default()
        }
    }

    /// Same configuration with a forced backend.
    pub fn with_strategy(self, strategy: Strategy) -> Self {
        Self {
            strategy: Some(strategy),
            ..self
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Lookup tables for one multiplier, handed to the vector kernels.
pub(crate) struct MulRow<'a> {
    /// `lo[x] = x * y` for x in 0..16
    pub lo: &'a [u8; 16],
    /// `hi[x] = (x << 4) * y` for x in 0..16
    pub hi: &'a [u8; 16],
    /// `full[x] = x * y`
    pub full: &'a [u8],
}

/// Precomputed GF(256) tables and the selected bulk backend.
pub struct FieldContext {
    polynomial: u16,
    strategy: Strategy,

    log: [u16; 256],
    exp: [u8; EXP_TABLE_LEN],

    /// `mul[(y << 8) + x] = x * y`
    mul: Box<[u8]>,
    /// `div[(y << 8) + x] = x / y`
    div: Box<[u8]>,
    inv: [u8; 256],
    sqr: [u8; 256],

    nibble_lo: Box<[[u8; 16]]>,
    nibble_hi: Box<[[u8; 16]]>,
}

static GLOBAL: OnceLock<Result<FieldContext, Error>> = OnceLock::new();

impl FieldContext {
    /// Process-wide context built with [`FieldConfig::default`].
    ///
    /// The first caller builds the tables; concurrent callers block until the
    /// build finishes and then share the same instance.
    ///
    /// # Errors
    /// Returns [`Error::SelfTest`] if the tables failed validation. The failure
    /// is cached, so every later call reports it too.
    pub fn global() -> Result<&'static FieldContext, Error> {
        GLOBAL
            .get_or_init(|| FieldContext::new(FieldConfig::default()))
            .as_ref()
            .map_err(|e| *e)
    }

    /// Build a private context.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedStrategy`] if a forced backend is not
    /// available, or [`Error::SelfTest`] if the tables failed validation.
    pub fn new(config: FieldConfig) -> Result<Self, Error> {
        let strategy = match config.strategy {
            Some(s) if !s.is_available() => return Err(Error::UnsupportedStrategy(s)),
            Some(s) => s,
            None => Strategy::detect(),
        };

        let index = if config.polynomial_index < GENERATOR_POLYNOMIALS.len() {
            config.polynomial_index
        } else {
            0
        };
        let polynomial = ((GENERATOR_POLYNOMIALS[index] as u16) << 1) | 1;

        let (log, exp) = build_explog(polynomial);
        let mut ctx = Self {
            polynomial,
            strategy,
            log,
            exp,
            mul: vec![0u8; 256 * 256].into_boxed_slice(),
            div: vec![0u8; 256 * 256].into_boxed_slice(),
            inv: [0u8; 256],
            sqr: [0u8; 256],
            nibble_lo: vec![[0u8; 16]; 256].into_boxed_slice(),
            nibble_hi: vec![[0u8; 16]; 256].into_boxed_slice(),
        };
        ctx.build_muldiv();
        ctx.build_inv_sqr();
        ctx.build_nibbles();

        if !ctx.self_test() {
            warn!(polynomial, ?strategy, "GF(256) self-test failed");
            return Err(Error::SelfTest { polynomial });
        }

        debug!(polynomial, ?strategy, "GF(256) context ready");
        Ok(ctx)
    }

    fn build_muldiv(&mut self) {
        // Row y = 0 stays zero in both tables.
        for y in 1..256usize {
            let log_y = self.log[y] as usize;
            let log_yn = 255 - log_y;
            let row = y << 8;
            for x in 0..256usize {
                let log_x = self.log[x] as usize;
                self.mul[row + x] = self.exp[log_x + log_y];
                self.div[row + x] = self.exp[log_x + log_yn];
            }
        }
    }

    fn build_inv_sqr(&mut self) {
        for x in 0..=255u8 {
            self.inv[x as usize] = self.divide(1, x);
            self.sqr[x as usize] = self.multiply(x, x);
        }
    }

    fn build_nibbles(&mut self) {
        for y in 0..=255u8 {
            for x in 0..16u8 {
                self.nibble_lo[y as usize][x as usize] = self.multiply(x, y);
                self.nibble_hi[y as usize][x as usize] = self.multiply(x << 4, y);
            }
        }
    }

    fn self_test(&self) -> bool {
        for x in 0..=255u8 {
            for y in 1..=255u8 {
                let product = self.multiply(x, y);
                if self.divide(product, y) != x || self.multiply(y, x) != product {
                    return false;
                }
            }
            if x != 0 && self.multiply(x, self.invert(x)) != 1 {
                return false;
            }
            if self.square(x) != self.multiply(x, x) {
                return false;
            }
        }

        // The selected backend must agree with the byte-wise tables,
        // including the scalar tail after the last full vector.
        let src: [u8; 67] = std::array::from_fn(|i| (i as u8).wrapping_mul(37).wrapping_add(11));
        for y in [2u8, 0x53, 0x8e, 0xff] {
            let mut out = [0u8; 67];
            self.bulk_scale(&mut out, &src, y);
            if out.iter().zip(&src).any(|(&o, &s)| o != self.multiply(s, y)) {
                return false;
            }
        }
        true
    }

    /// Field polynomial including the x^8 term.
    #[inline]
    pub fn polynomial(&self) -> u16 {
        self.polynomial
    }

    /// Backend used by the bulk operations.
    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    // =========================================================================
    // Scalar operations
    // =========================================================================

    /// x + y
    #[inline(always)]
    pub fn add(&self, x: u8, y: u8) -> u8 {
        x ^ y
    }

    /// x * y
    #[inline(always)]
    pub fn multiply(&self, x: u8, y: u8) -> u8 {
        self.mul[((y as usize) << 8) | x as usize]
    }

    /// x / y
    ///
    /// Division by zero is not checked and yields 0.
    #[inline(always)]
    pub fn divide(&self, x: u8, y: u8) -> u8 {
        self.div[((y as usize) << 8) | x as usize]
    }

    /// 1 / x, with `invert(0) == 0`.
    #[inline(always)]
    pub fn invert(&self, x: u8) -> u8 {
        self.inv[x as usize]
    }

    /// x * x
    #[inline(always)]
    pub fn square(&self, x: u8) -> u8 {
        self.sqr[x as usize]
    }

    /// Discrete logarithm of a non-zero element to base 2.
    ///
    /// Returns `None` for zero.
    pub fn log(&self, x: u8) -> Option<u8> {
        match self.log[x as usize] {
            LOG_ZERO => None,
            l => Some((l % 255) as u8),
        }
    }

    /// 2^e
    pub fn exp(&self, e: u8) -> u8 {
        self.exp[e as usize]
    }

    #[inline]
    fn row(&self, y: u8) -> MulRow<'_> {
        let start = (y as usize) << 8;
        MulRow {
            lo: &self.nibble_lo[y as usize],
            hi: &self.nibble_hi[y as usize],
            full: &self.mul[start..start + 256],
        }
    }

    // =========================================================================
    // Bulk operations
    // =========================================================================

    /// `dst[i] ^= src[i]`
    ///
    /// # Panics
    /// Panics if the buffers differ in length.
    pub fn bulk_xor(&self, dst: &mut [u8], src: &[u8]) {
        assert_eq!(dst.len(), src.len(), "bulk_xor length mismatch");

        let mut dst_words = dst.chunks_exact_mut(8);
        let mut src_words = src.chunks_exact(8);
        for (d, s) in (&mut dst_words).zip(&mut src_words) {
            d.copy_from_slice(&(load_word(d) ^ load_word(s)).to_ne_bytes());
        }
        for (d, s) in dst_words.into_remainder().iter_mut().zip(src_words.remainder()) {
            *d ^= s;
        }
    }

    /// `dst[i] ^= a[i] ^ b[i]`
    ///
    /// # Panics
    /// Panics if the buffers differ in length.
    pub fn bulk_xor2(&self, dst: &mut [u8], a: &[u8], b: &[u8]) {
        assert_eq!(dst.len(), a.len(), "bulk_xor2 length mismatch");
        assert_eq!(dst.len(), b.len(), "bulk_xor2 length mismatch");

        let mut dst_words = dst.chunks_exact_mut(8);
        let mut a_words = a.chunks_exact(8);
        let mut b_words = b.chunks_exact(8);
        for ((d, x), y) in (&mut dst_words).zip(&mut a_words).zip(&mut b_words) {
            let v = load_word(d) ^ load_word(x) ^ load_word(y);
            d.copy_from_slice(&v.to_ne_bytes());
        }
        let tail = dst_words.into_remainder();
        for ((d, x), y) in tail.iter_mut().zip(a_words.remainder()).zip(b_words.remainder()) {
            *d ^= x ^ y;
        }
    }

    /// `dst[i] = a[i] ^ b[i]`
    ///
    /// # Panics
    /// Panics if the buffers differ in length.
    pub fn bulk_combine(&self, dst: &mut [u8], a: &[u8], b: &[u8]) {
        assert_eq!(dst.len(), a.len(), "bulk_combine length mismatch");
        assert_eq!(dst.len(), b.len(), "bulk_combine length mismatch");

        let mut dst_words = dst.chunks_exact_mut(8);
        let mut a_words = a.chunks_exact(8);
        let mut b_words = b.chunks_exact(8);
        for ((d, x), y) in (&mut dst_words).zip(&mut a_words).zip(&mut b_words) {
            d.copy_from_slice(&(load_word(x) ^ load_word(y)).to_ne_bytes());
        }
        let tail = dst_words.into_remainder();
        for ((d, x), y) in tail.iter_mut().zip(a_words.remainder()).zip(b_words.remainder()) {
            *d = x ^ y;
        }
    }

    /// `dst[i] = src[i] * scalar`
    ///
    /// # Panics
    /// Panics if the buffers differ in length.
    pub fn bulk_scale(&self, dst: &mut [u8], src: &[u8], scalar: u8) {
        assert_eq!(dst.len(), src.len(), "bulk_scale length mismatch");

        match scalar {
            0 => dst.fill(0),
            1 => dst.copy_from_slice(src),
            _ => {
                // SAFETY: both pointers cover `dst.len()` bytes and do not overlap.
                unsafe { self.mul_region::<false>(dst.as_mut_ptr(), src.as_ptr(), dst.len(), scalar) }
            }
        }
    }

    /// `buf[i] = buf[i] * scalar`
    pub fn bulk_scale_in_place(&self, buf: &mut [u8], scalar: u8) {
        match scalar {
            0 => buf.fill(0),
            1 => {}
            _ => {
                let ptr = buf.as_mut_ptr();
                // SAFETY: source and destination are the same buffer; every
                // kernel loads a chunk before storing it.
                unsafe { self.mul_region::<false>(ptr, ptr, buf.len(), scalar) }
            }
        }
    }

    /// `dst[i] ^= src[i] * scalar`
    ///
    /// # Panics
    /// Panics if the buffers differ in length.
    pub fn bulk_scale_accumulate(&self, dst: &mut [u8], scalar: u8, src: &[u8]) {
        assert_eq!(dst.len(), src.len(), "bulk_scale_accumulate length mismatch");

        match scalar {
            0 => {}
            1 => self.bulk_xor(dst, src),
            _ => {
                // SAFETY: both pointers cover `dst.len()` bytes and do not overlap.
                unsafe { self.mul_region::<true>(dst.as_mut_ptr(), src.as_ptr(), dst.len(), scalar) }
            }
        }
    }

    /// `dst[i] = src[i] / scalar`
    ///
    /// # Panics
    /// Panics if the buffers differ in length.
    pub fn bulk_divide(&self, dst: &mut [u8], src: &[u8], scalar: u8) {
        if scalar == 1 {
            assert_eq!(dst.len(), src.len(), "bulk_divide length mismatch");
            dst.copy_from_slice(src);
            return;
        }
        self.bulk_scale(dst, src, self.invert(scalar));
    }

    /// `buf[i] = buf[i] / scalar`
    pub fn bulk_divide_in_place(&self, buf: &mut [u8], scalar: u8) {
        if scalar == 1 {
            return;
        }
        self.bulk_scale_in_place(buf, self.invert(scalar));
    }

    /// Exchange the contents of two buffers.
    ///
    /// # Panics
    /// Panics if the buffers differ in length.
    pub fn bulk_swap(&self, a: &mut [u8], b: &mut [u8]) {
        assert_eq!(a.len(), b.len(), "bulk_swap length mismatch");
        a.swap_with_slice(b);
    }

    /// Multiply `len` bytes from `src` by `y` into `dst`, XOR-ing into the
    /// existing contents when `ACC` is set.
    ///
    /// # Safety
    /// `src` must be readable and `dst` writable for `len` bytes. The two
    /// regions must either coincide exactly or not overlap.
    unsafe fn mul_region<const ACC: bool>(&self, dst: *mut u8, src: *const u8, len: usize, y: u8) {
        let row = self.row(y);

        // Vector kernels report how many leading bytes they handled.
        let done = match self.strategy {
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            Strategy::Avx2 => x86::mul_avx2::<ACC>(dst, src, len, &row),
            #[cfg(all(feature = "simd", target_arch = "x86_64"))]
            Strategy::Ssse3 => x86::mul_ssse3::<ACC>(dst, src, len, &row),
            #[cfg(all(feature = "simd", target_arch = "aarch64"))]
            Strategy::Neon => neon::mul_neon::<ACC>(dst, src, len, &row),
            _ => 0,
        };

        for i in done..len {
            let product = row.full[*src.add(i) as usize];
            if ACC {
                *dst.add(i) ^= product;
            } else {
                *dst.add(i) = product;
            }
        }
    }
}

impl std::fmt::Debug for FieldContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldContext")
            .field("polynomial", &format_args!("{:#x}", self.polynomial))
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// Walk the multiplicative group generated by 2.
fn build_explog(polynomial: u16) -> ([u16; 256], [u8; EXP_TABLE_LEN]) {
    let mut log = [0u16; 256];
    let mut exp = [0u8; EXP_TABLE_LEN];

    log[0] = LOG_ZERO;
    exp[0] = 1;
    for i in 1..255usize {
        let mut next = (exp[i - 1] as u16) << 1;
        if next >= 256 {
            next ^= polynomial;
        }
        exp[i] = next as u8;
        log[exp[i] as usize] = i as u16;
    }
    exp[255] = exp[0];
    log[exp[255] as usize] = 255;

    // Second period so log(x) + log(y) never needs a modulo.
    for i in 256..2 * 255 {
        exp[i] = exp[i % 255];
    }
    exp[2 * 255] = 1;
    // Everything past 2*255 stays zero for the log(0) sentinel.

    (log, exp)
}

#[inline(always)]
fn load_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(bytes);
    u64::from_ne_bytes(word)
}
