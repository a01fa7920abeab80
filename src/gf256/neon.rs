//! AArch64 NEON nibble-table kernel.

use std::arch::aarch64::*;

use super::MulRow;

/// Multiply 16 bytes using NEON tbl
#[inline]
#[target_feature(enable = "neon")]
unsafe fn step_16<const ACC: bool>(
    dst: *mut u8,
    src: *const u8,
    table_lo: uint8x16_t,
    table_hi: uint8x16_t,
    mask_0f: uint8x16_t,
) {
    let data = vld1q_u8(src);
    let lo_result = vqtbl1q_u8(table_lo, vandq_u8(data, mask_0f));
    let hi_result = vqtbl1q_u8(table_hi, vshrq_n_u8(data, 4));
    let mut result = veorq_u8(lo_result, hi_result);
    if ACC {
        result = veorq_u8(result, vld1q_u8(dst));
    }
    vst1q_u8(dst, result);
}

/// `dst[i] (^)= src[i] * y` over the leading multiple of 16 bytes.
///
/// # Safety
/// Requires NEON. `src`/`dst` must be valid for `len` bytes and either
/// identical or non-overlapping.
#[target_feature(enable = "neon")]
pub(super) unsafe fn mul_neon<const ACC: bool>(dst: *mut u8, src: *const u8, len: usize, row: &MulRow<'_>) -> usize {
    let table_lo = vld1q_u8(row.lo.as_ptr());
    let table_hi = vld1q_u8(row.hi.as_ptr());
    let mask_0f = vdupq_n_u8(0x0f);

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
