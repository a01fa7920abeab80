//! SSSE3 / AVX2 nibble-table kernels.
//!
//! Each kernel processes whole 16-byte chunks and returns the number of bytes
//! handled; the caller finishes the tail with the byte-wise table.

use std::arch::x86_64::*;

use super::MulRow;

/// Multiply 16 bytes using SSSE3 pshufb
#[inline]
#[target_feature(enable = "ssse3")]
unsafe fn product_16(data: __m128i, table_lo: __m128i, table_hi: __m128i, mask_0f: __m128i) -> __m128i {
    let lo_nibbles = _mm_and_si128(data, mask_0f);
    let lo_result = _mm_shuffle_epi8(table_lo, lo_nibbles);
    let hi_nibbles = _mm_and_si128(_mm_srli_epi64(data, 4), mask_0f);
    let hi_result = _mm_shuffle_epi8(table_hi, hi_nibbles);
    _mm_xor_si128(lo_result, hi_result)
}

/// Multiply 32 bytes using AVX2 vpshufb
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn product_32(data: __m256i, table_lo: __m256i, table_hi: __m256i, mask_0f: __m256i) -> __m256i {
    let lo_nibbles = _mm256_and_si256(data, mask_0f);
    let lo_result = _mm256_shuffle_epi8(table_lo, lo_nibbles);
    let hi_nibbles = _mm256_and_si256(_mm256_srli_epi64(data, 4), mask_0f);
    let hi_result = _mm256_shuffle_epi8(table_hi, hi_nibbles);
    _mm256_xor_si256(lo_result, hi_result)
}

#[inline]
#[target_feature(enable = "ssse3")]
unsafe fn step_16<const ACC: bool>(
    dst: *mut u8,
    src: *const u8,
    table_lo: __m128i,
    table_hi: __m128i,
    mask_0f: __m128i,
) {
    let data = _mm_loadu_si128(src as *const __m128i);
    let mut result = product_16(data, table_lo, table_hi, mask_0f);
    if ACC {
        result = _mm_xor_si128(result, _mm_loadu_si128(dst as *const __m128i));
    }
    _mm_storeu_si128(dst as *mut __m128i, result);
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn step_32<const ACC: bool>(
    dst: *mut u8,
    src: *const u8,
    table_lo: __m256i,
    table_hi: __m256i,
    mask_0f: __m256i,
) {
    let data = _mm256_loadu_si256(src as *const __m256i);
    let mut result = product_32(data, table_lo, table_hi, mask_0f);
    if ACC {
        result = _mm256_xor_si256(result, _mm256_loadu_si256(dst as *const __m256i));
    }
    _mm256_storeu_si256(dst as *mut __m256i, result);
}

/// `dst[i] (^)= src[i] * y` over the leading multiple of 16 bytes.
///
/// # Safety
/// Requires SSSE3. `src`/`dst` must be valid for `len` bytes and either
/// identical or non-overlapping.
#[target_feature(enable = "ssse3")]
pub(super) unsafe fn mul_ssse3<const ACC: bool>(dst: *mut u8, src: *const u8, len: usize, row: &MulRow<'_>) -> usize {
    let table_lo = _mm_loadu_si128(row.lo.as_ptr() as *const __m128i);
    let table_hi = _mm_loadu_si128(row.hi.as_ptr() as *const __m128i);
    let mask_0f = _mm_set1_epi8(0x0f);

    // 64 bytes per iteration (4x unrolled)
    let end_64 = len - len % 64;
    let mut offset = 0;
    while offset < end_64 {
        step_16::<ACC>(dst.add(offset), src.add(offset), table_lo, table_hi, mask_0f);
        step_16::<ACC>(dst.add(offset + 16), src.add(offset + 16), table_lo, table_hi, mask_0f);
        step_16::<ACC>(dst.add(offset + 32), src.add(offset + 32), table_lo, table_hi, mask_0f);
        step_16::<ACC>(dst.add(offset + 48), src.add(offset + 48), table_lo, table_hi, mask_0f);
        offset += 64;
    }

    let end_16 = len - len % 16;
    while offset < end_16 {
        step_16::<ACC>(dst.add(offset), src.add(offset), table_lo, table_hi, mask_0f);
        offset += 16;
    }

    end_16
}

/// `dst[i] (^)= src[i] * y` over the leading multiple of 16 bytes.
///
/// # Safety
/// Requires AVX2. `src`/`dst` must be valid for `len` bytes and either
/// identical or non-overlapping.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn mul_avx2<const ACC: bool>(dst: *mut u8, src: *const u8, len: usize, row: &MulRow<'_>) -> usize {
    // Same 16-entry tables in both 128-bit lanes
    let table_lo_128 = _mm_loadu_si128(row.lo.as_ptr() as *const __m128i);
    let table_hi_128 = _mm_loadu_si128(row.hi.as_ptr() as *const __m128i);
    let table_lo = _mm256_broadcastsi128_si256(table_lo_128);
    let table_hi = _mm256_broadcastsi128_si256(table_hi_128);
    let mask_0f = _mm256_set1_epi8(0x0f);

    // 128 bytes per iteration (4x unrolled)
    let end_128 = len - len % 128;
    let mut offset = 0;
    while offset < end_128 {
        step_32::<ACC>(dst.add(offset), src.add(offset), table_lo, table_hi, mask_0f);
        step_32::<ACC>(dst.add(offset + 32), src.add(offset + 32), table_lo, table_hi, mask_0f);
        step_32::<ACC>(dst.add(offset + 64), src.add(offset + 64), table_lo, table_hi, mask_0f);
        step_32::<ACC>(dst.add(offset + 96), src.add(offset + 96), table_lo, table_hi, mask_0f);
        offset += 128;
    }

    let end_32 = len - len % 32;
    while offset < end_32 {
        step_32::<ACC>(dst.add(offset), src.add(offset), table_lo, table_hi, mask_0f);
        offset += 32;
    }

    // At most one 16-byte chunk left before the scalar tail
    let end_16 = len - len % 16;
    if offset < end_16 {
        step_16::<ACC>(
            dst.add(offset),
            src.add(offset),
            table_lo_128,
            table_hi_128,
            _mm_set1_epi8(0x0f),
        );
    }

    end_16
}
