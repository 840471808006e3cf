//! Stream-local interning of type-name fragments (C2).
//!
//! Namespaces and type names repeat heavily inside one stream, so they are
//! written once as a literal and afterwards as a 1-2 byte back-reference.
//! The literal form itself is compressed: five encodings exist and the
//! encoder picks the smallest representation that can carry the fragment.
//!
//! ## Encodings
//!
//! | tag | name | bits/char | charset |
//! |---|---|---|---|
//! | 0 | `Utf8` | 8 | anything |
//! | 1 | `LowerSpecial` | 5 | `a-z . _ $ \|` |
//! | 2 | `LowerUpperDigitSpecial` | 6 | `a-z A-Z 0-9` + two specials |
//! | 3 | `FirstToLowerSpecial` | 5 | as `LowerSpecial`, first char upper |
//! | 4 | `AllToLowerSpecial` | 5 | as `LowerSpecial`, uppers escaped by `\|` |
//!
//! The two specials of `LowerUpperDigitSpecial` are per-encoder: `.` and `_`
//! for namespaces, `$` and `_` for type names. Peer implementations must use
//! the same pairs or the packed bytes (and thus the hashcodes) diverge.
//!
//! Bit-packed payloads reserve the most significant bit of byte 0 as the
//! strip-last-char flag: when the trailing padding is wide enough to decode
//! as one extra character, the flag tells the decoder to drop it.
//!
//! ## Wire form
//!
//! * First occurrence: `varuint32((len << 1) | 0)`, then a single encoding
//!   byte when `len <= 16` or the 8-byte hashcode (low byte = encoding)
//!   otherwise, then `len` payload bytes.
//! * Back-reference: `varuint32(((id + 1) << 1) | 1)` where `id` counts the
//!   fragments already written in this stream.
//!
//! The hashcode is FNV-1a 64 over the packed payload with the low byte
//! replaced by the encoding tag. FNV is pinned by the cross-language
//! contract: both sides of the wire must derive identical hashcodes.

use crate::buffer::ByteBuffer;
use crate::error::{CrosswireError, Result};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Fragments at most this long carry a 1-byte encoding tag instead of the
/// 8-byte hashcode in their first-occurrence record.
pub const SMALL_FRAGMENT_THRESHOLD: usize = 16;

const FNV64_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a64(data: &[u8]) -> u64 {
    let mut hash = FNV64_BASIS;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV64_PRIME);
    }
    hash
}

/// How a fragment's payload bytes are packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetaStringEncoding {
    /// Raw UTF-8, 8 bits per byte.
    Utf8 = 0,
    /// 5-bit charset `a-z . _ $ |`.
    LowerSpecial = 1,
    /// 6-bit charset `a-z A-Z 0-9` plus the encoder's two special chars.
    LowerUpperDigitSpecial = 2,
    /// `LowerSpecial` with the (sole, leading) uppercase char lowered.
    FirstToLowerSpecial = 3,
    /// `LowerSpecial` with every uppercase char escaped by `|`.
    AllToLowerSpecial = 4,
}

impl MetaStringEncoding {
    /// Decodes the wire tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Utf8),
            1 => Ok(Self::LowerSpecial),
            2 => Ok(Self::LowerUpperDigitSpecial),
            3 => Ok(Self::FirstToLowerSpecial),
            4 => Ok(Self::AllToLowerSpecial),
            other => Err(CrosswireError::InvalidUtf8(format!(
                "unknown metastring encoding tag {other}"
            ))),
        }
    }
}

/// The interned form of one fragment: packed payload, its encoding, and the
/// hashcode both sides derive from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaStringBytes {
    /// Packed payload bytes.
    pub data: Vec<u8>,
    /// Packing used for `data`.
    pub encoding: MetaStringEncoding,
    /// FNV-1a 64 of `data` with the low byte replaced by the encoding tag.
    pub hashcode: u64,
}

impl MetaStringBytes {
    fn new(data: Vec<u8>, encoding: MetaStringEncoding) -> Self {
        let hashcode = (fnv1a64(&data) & !0xFF) | encoding as u64;
        Self {
            data,
            encoding,
            hashcode,
        }
    }
}

const LOWER_SPECIAL_BITS: u32 = 5;
const LUDS_BITS: u32 = 6;

fn lower_special_value(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' => Some(ch as u8 - b'a'),
        '.' => Some(26),
        '_' => Some(27),
        '$' => Some(28),
        '|' => Some(29),
        _ => None,
    }
}

fn lower_special_char(value: u8) -> Result<char> {
    match value {
        0..=25 => Ok((b'a' + value) as char),
        26 => Ok('.'),
        27 => Ok('_'),
        28 => Ok('$'),
        29 => Ok('|'),
        other => Err(CrosswireError::InvalidUtf8(format!(
            "5-bit code {other} out of range"
        ))),
    }
}

/// MSB-first bit packer for the 5/6-bit encodings.
fn pack_bits(codes: &[u8], bits_per_char: u32) -> Vec<u8> {
    if codes.is_empty() {
        return Vec::new();
    }
    let total_bits = codes.len() as u32 * bits_per_char + 1;
    let byte_len = total_bits.div_ceil(8) as usize;
    let mut out = vec![0u8; byte_len];
    // Padding wide enough to decode as a phantom char sets the strip flag.
    if byte_len as u32 * 8 - total_bits >= bits_per_char {
        out[0] |= 0x80;
    }
    let mut bit_pos: usize = 1;
    for &code in codes {
        for offset in (0..bits_per_char).rev() {
            if code >> offset & 1 == 1 {
                out[bit_pos / 8] |= 0x80 >> (bit_pos % 8);
            }
            bit_pos += 1;
        }
    }
    out
}

/// Inverse of [`pack_bits`], honoring the strip-last-char flag.
fn unpack_bits(data: &[u8], bits_per_char: u32) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let strip_last = data[0] & 0x80 != 0;
    let mut char_count = ((data.len() as u32 * 8 - 1) / bits_per_char) as usize;
    if strip_last {
        char_count -= 1;
    }
    let mut codes = Vec::with_capacity(char_count);
    let mut bit_pos: usize = 1;
    for _ in 0..char_count {
        let mut code = 0u8;
        for _ in 0..bits_per_char {
            code <<= 1;
            if data[bit_pos / 8] & (0x80 >> (bit_pos % 8)) != 0 {
                code |= 1;
            }
            bit_pos += 1;
        }
        codes.push(code);
    }
    codes
}

/// Chooses and applies the smallest encoding for one fragment kind.
///
/// Two instances exist: namespaces (`.`/`_`) and type names (`$`/`_`).
#[derive(Debug, Clone, Copy)]
pub struct MetaStringEncoder {
    special_char1: char,
    special_char2: char,
}

impl MetaStringEncoder {
    /// Creates an encoder with the given 6-bit special characters.
    pub fn new(special_char1: char, special_char2: char) -> Self {
        Self {
            special_char1,
            special_char2,
        }
    }

    fn luds_value(&self, ch: char) -> Option<u8> {
        match ch {
            'a'..='z' => Some(ch as u8 - b'a'),
            'A'..='Z' => Some(ch as u8 - b'A' + 26),
            '0'..='9' => Some(ch as u8 - b'0' + 52),
            c if c == self.special_char1 => Some(62),
            c if c == self.special_char2 => Some(63),
            _ => None,
        }
    }

    /// Encodes a fragment, picking the minimum-size representation.
    pub fn encode(&self, s: &str) -> MetaStringBytes {
        if s.is_empty() {
            return MetaStringBytes::new(Vec::new(), MetaStringEncoding::LowerSpecial);
        }

        let chars: Vec<char> = s.chars().collect();
        let all_lower_special = chars.iter().all(|&c| lower_special_value(c).is_some());
        if all_lower_special {
            let codes: Vec<u8> = chars
                .iter()
                .filter_map(|&c| lower_special_value(c))
                .collect();
            return MetaStringBytes::new(
                pack_bits(&codes, LOWER_SPECIAL_BITS),
                MetaStringEncoding::LowerSpecial,
            );
        }

        // Letter-only fragments with scattered uppercase can ride the 5-bit
        // encodings by lowering; '|' is the escape so it cannot appear.
        let upper_count = chars.iter().filter(|c| c.is_ascii_uppercase()).count();
        let lowerable = chars.iter().all(|&c| {
            c.is_ascii_uppercase() || (c != '|' && lower_special_value(c).is_some())
        });
        if lowerable && upper_count > 0 {
            if upper_count == 1 && chars[0].is_ascii_uppercase() {
                let codes: Vec<u8> = chars
                    .iter()
                    .filter_map(|&c| lower_special_value(c.to_ascii_lowercase()))
                    .collect();
                return MetaStringBytes::new(
                    pack_bits(&codes, LOWER_SPECIAL_BITS),
                    MetaStringEncoding::FirstToLowerSpecial,
                );
            }
            let escaped_len = (chars.len() + upper_count) as u32 * LOWER_SPECIAL_BITS;
            let luds_ok = chars.iter().all(|&c| self.luds_value(c).is_some());
            if !luds_ok || escaped_len < chars.len() as u32 * LUDS_BITS {
                let mut codes = Vec::with_capacity(chars.len() + upper_count);
                for &c in &chars {
                    if c.is_ascii_uppercase() {
                        codes.push(29); // '|' escape
                        codes.extend(lower_special_value(c.to_ascii_lowercase()));
                    } else {
                        codes.extend(lower_special_value(c));
                    }
                }
                return MetaStringBytes::new(
                    pack_bits(&codes, LOWER_SPECIAL_BITS),
                    MetaStringEncoding::AllToLowerSpecial,
                );
            }
        }

        if chars.iter().all(|&c| self.luds_value(c).is_some()) {
            let codes: Vec<u8> = chars.iter().filter_map(|&c| self.luds_value(c)).collect();
            return MetaStringBytes::new(
                pack_bits(&codes, LUDS_BITS),
                MetaStringEncoding::LowerUpperDigitSpecial,
            );
        }

        MetaStringBytes::new(s.as_bytes().to_vec(), MetaStringEncoding::Utf8)
    }
}

/// Decodes payloads produced by [`MetaStringEncoder`] (this side's or a
/// peer's, as long as the special-character pair matches).
#[derive(Debug, Clone, Copy)]
pub struct MetaStringDecoder {
    special_char1: char,
    special_char2: char,
}

impl MetaStringDecoder {
    /// Creates a decoder with the given 6-bit special characters.
    pub fn new(special_char1: char, special_char2: char) -> Self {
        Self {
            special_char1,
            special_char2,
        }
    }

    fn luds_char(&self, value: u8) -> Result<char> {
        match value {
            0..=25 => Ok((b'a' + value) as char),
            26..=51 => Ok((b'A' + value - 26) as char),
            52..=61 => Ok((b'0' + value - 52) as char),
            62 => Ok(self.special_char1),
            63 => Ok(self.special_char2),
            other => Err(CrosswireError::InvalidUtf8(format!(
                "6-bit code {other} out of range"
            ))),
        }
    }

    /// Decodes a packed payload back into the fragment string.
    pub fn decode(&self, data: &[u8], encoding: MetaStringEncoding) -> Result<String> {
        match encoding {
            MetaStringEncoding::Utf8 => String::from_utf8(data.to_vec())
                .map_err(|e| CrosswireError::InvalidUtf8(e.to_string())),
            MetaStringEncoding::LowerSpecial => unpack_bits(data, LOWER_SPECIAL_BITS)
                .into_iter()
                .map(lower_special_char)
                .collect(),
            MetaStringEncoding::LowerUpperDigitSpecial => unpack_bits(data, LUDS_BITS)
                .into_iter()
                .map(|code| self.luds_char(code))
                .collect(),
            MetaStringEncoding::FirstToLowerSpecial => {
                let mut s: String = unpack_bits(data, LOWER_SPECIAL_BITS)
                    .into_iter()
                    .map(lower_special_char)
                    .collect::<Result<_>>()?;
                if let Some(first) = s.get(0..1) {
                    let upper = first.to_ascii_uppercase();
                    s.replace_range(0..1, &upper);
                }
                Ok(s)
            }
            MetaStringEncoding::AllToLowerSpecial => {
                let codes = unpack_bits(data, LOWER_SPECIAL_BITS);
                let mut s = String::with_capacity(codes.len());
                let mut upper_next = false;
                for code in codes {
                    let ch = lower_special_char(code)?;
                    if ch == '|' {
                        upper_next = true;
                        continue;
                    }
                    if upper_next {
                        s.push(ch.to_ascii_uppercase());
                        upper_next = false;
                    } else {
                        s.push(ch);
                    }
                }
                if upper_next {
                    return Err(CrosswireError::InvalidUtf8(
                        "dangling uppercase escape".into(),
                    ));
                }
                Ok(s)
            }
        }
    }
}

/// Write-side interning state for one serialize call.
///
/// Maps fragment hashcodes to the sequential ids written so far. Cleared (not
/// reallocated) at the session boundary.
#[derive(Debug, Default)]
pub struct MetaStringWriterState {
    written: FxHashMap<u64, u32>,
    next_id: u32,
}

impl MetaStringWriterState {
    /// Writes a fragment: a literal on first use, a back-reference after.
    pub fn write(&mut self, buffer: &mut ByteBuffer, bytes: &MetaStringBytes) {
        if let Some(&id) = self.written.get(&bytes.hashcode) {
            buffer.write_varuint32(((id + 1) << 1) | 1);
            return;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.written.insert(bytes.hashcode, id);

        buffer.write_varuint32((bytes.data.len() as u32) << 1);
        if bytes.data.len() <= SMALL_FRAGMENT_THRESHOLD {
            buffer.write_u8(bytes.encoding as u8);
        } else {
            buffer.write_i64(bytes.hashcode as i64);
        }
        buffer.write_bytes(&bytes.data);
    }

    /// Forgets all interned fragments, keeping the allocation.
    pub fn reset(&mut self) {
        self.written.clear();
        self.next_id = 0;
    }
}

/// Read-side interning state for one deserialize call.
///
/// Holds every fragment decoded so far, indexed by write order.
#[derive(Debug, Default)]
pub struct MetaStringReaderState {
    fragments: Vec<Rc<MetaStringBytes>>,
}

impl MetaStringReaderState {
    /// Reads a fragment record (literal or back-reference).
    pub fn read(&mut self, buffer: &mut ByteBuffer) -> Result<Rc<MetaStringBytes>> {
        let header = buffer.read_varuint32()?;
        if header & 1 == 1 {
            let id = (header >> 1)
                .checked_sub(1)
                .ok_or(CrosswireError::UnknownMetaStringId(0))?;
            return self
                .fragments
                .get(id as usize)
                .cloned()
                .ok_or(CrosswireError::UnknownMetaStringId(id));
        }

        let len = (header >> 1) as usize;
        let (encoding, carried_hash) = if len <= SMALL_FRAGMENT_THRESHOLD {
            (MetaStringEncoding::from_tag(buffer.read_u8()?)?, None)
        } else {
            let hash = buffer.read_i64()? as u64;
            (MetaStringEncoding::from_tag((hash & 0xFF) as u8)?, Some(hash))
        };
        let data = buffer.read_bytes(len)?.to_vec();
        let bytes = match carried_hash {
            // Long form: trust the transmitted hash, it is the lookup key.
            Some(hashcode) => MetaStringBytes {
                data,
                encoding,
                hashcode,
            },
            None => MetaStringBytes::new(data, encoding),
        };
        let bytes = Rc::new(bytes);
        self.fragments.push(bytes.clone());
        Ok(bytes)
    }

    /// Forgets all decoded fragments, keeping the allocation.
    pub fn reset(&mut self) {
        self.fragments.clear();
    }
}
