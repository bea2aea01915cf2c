//! Minimal ABI encoding/decoding for the handful of calls the guard issues.

use num_bigint::{BigInt, BigUint};

/// ABI word size in bytes.
pub const WORD: usize = 32;

/// `latestRoundData()`
pub const LATEST_ROUND_DATA: &str = "feaf968c";
/// `decimals()`
pub const DECIMALS: &str = "313ce567";
/// `observe(uint32[])`
pub const OBSERVE: &str = "883bdbfd";
/// `slot0()`
pub const SLOT0: &str = "3850c7bd";
/// `Error(string)` revert selector.
const ERROR_STRING: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Calldata for a zero-argument call.
pub fn encode_call(selector: &str) -> String {
    format!("0x{}", selector)
}

/// Calldata for `observe(uint32[] secondsAgos)`.
pub fn encode_observe(seconds_agos: &[u32]) -> String {
    let mut out = format!("0x{}", OBSERVE);
    // head: offset of the dynamic array
    out.push_str(&format!("{:064x}", WORD));
    out.push_str(&format!("{:064x}", seconds_agos.len()));
    for s in seconds_agos {
        out.push_str(&format!("{:064x}", s));
    }
    out
}

/// Decode a `0x`-prefixed hex return blob into bytes.
pub fn decode_hex(result: &str) -> Result<Vec<u8>, String> {
    hex::decode(result.trim_start_matches("0x")).map_err(|e| format!("invalid hex: {}", e))
}

/// The `index`-th 32-byte word of `data`.
pub fn word(data: &[u8], index: usize) -> Result<&[u8], String> {
    let too_short = || format!("return data too short: {} bytes, need word {}", data.len(), index);
    let start = index.checked_mul(WORD).ok_or_else(too_short)?;
    let end = start.checked_add(WORD).ok_or_else(too_short)?;
    data.get(start..end).ok_or_else(too_short)
}

/// Decode a word as a signed two's-complement integer narrowed to i128.
pub fn word_as_i128(data: &[u8], index: usize) -> Result<i128, String> {
    let w = word(data, index)?;
    let value = BigInt::from_signed_bytes_be(w);
    i128::try_from(&value).map_err(|_| format!("word {} does not fit in i128: {}", index, value))
}

/// Decode a word as an unsigned integer narrowed to u128.
pub fn word_as_u128(data: &[u8], index: usize) -> Result<u128, String> {
    let w = word(data, index)?;
    let value = BigUint::from_bytes_be(w);
    u128::try_from(&value).map_err(|_| format!("word {} does not fit in u128: {}", index, value))
}

/// Decode a word as an unsigned integer narrowed to u64.
pub fn word_as_u64(data: &[u8], index: usize) -> Result<u64, String> {
    let v = word_as_u128(data, index)?;
    u64::try_from(v).map_err(|_| format!("word {} does not fit in u64: {}", index, v))
}

/// Decode a word as a `usize` byte offset or length.
fn word_as_usize(data: &[u8], index: usize) -> Result<usize, String> {
    let v = word_as_u64(data, index)?;
    usize::try_from(v).map_err(|_| format!("word {} does not fit in usize: {}", index, v))
}

/// Decode the signed dynamic array whose head offset sits in word `head_index`.
pub fn signed_array(data: &[u8], head_index: usize) -> Result<Vec<i128>, String> {
    let offset = word_as_usize(data, head_index)?;
    if offset % WORD != 0 {
        return Err(format!("unaligned array offset {}", offset));
    }
    let base = offset / WORD;
    let len = word_as_usize(data, base)?;
    // every element needs a full word after the length word
    let available = (data.len() / WORD).saturating_sub(base + 1);
    if len > available {
        return Err(format!(
            "array length {} exceeds return data ({} words after offset {})",
            len, available, offset
        ));
    }
    (0..len).map(|i| word_as_i128(data, base + 1 + i)).collect()
}

/// Extract the reason string from `Error(string)` revert data, if that is what it is.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING {
        return None;
    }
    let body = &data[4..];
    let offset = word_as_usize(body, 0).ok()?;
    let len = word_as_usize(body, offset / WORD).ok()?;
    let start = offset.checked_add(WORD)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}
