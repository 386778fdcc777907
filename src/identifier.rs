//! Conversion between internal paste keys and the identifiers shown in URLs.
//!
//! An identifier is the base62 rendering of a keyed, invertible 64-bit
//! mixing function applied to the key, so no identifier table is stored
//! anywhere and decoding needs nothing but the secret.

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const MUL_A: u64 = 0xbf58_476d_1ce4_e5b9;
const MUL_B: u64 = 0x94d0_49bb_1331_11eb;
const INV_A: u64 = mod_inverse(MUL_A);
const INV_B: u64 = mod_inverse(MUL_B);

/// Longest possible identifier: `u64::MAX` in base62.
const MAX_LEN: usize = 11;

#[derive(Debug, Clone, Copy)]
pub struct IdentifierCodec {
    secret: u64,
}

impl IdentifierCodec {
    pub fn new(secret: u64) -> Self {
        IdentifierCodec { secret }
    }

    /// Encode an internal key into its public identifier.
    pub fn encode(&self, key: i64) -> String {
        to_base62(self.permute(key as u64))
    }

    /// Decode a public identifier. Anything that is not the exact output of
    /// [`encode`](Self::encode) for a positive key yields `None`.
    pub fn decode(&self, identifier: &str) -> Option<i64> {
        let value = from_base62(identifier)?;
        let key = i64::try_from(self.unpermute(value)).ok()?;
        if key <= 0 {
            return None;
        }
        // leading zeros would otherwise give a second spelling of the same key
        (self.encode(key) == identifier).then_some(key)
    }

    fn permute(&self, key: u64) -> u64 {
        let mut x = key ^ self.secret;
        x ^= x >> 30;
        x = x.wrapping_mul(MUL_A);
        x ^= x >> 27;
        x = x.wrapping_mul(MUL_B);
        x ^= x >> 31;
        x
    }

    fn unpermute(&self, value: u64) -> u64 {
        let mut x = unshift(value, 31);
        x = x.wrapping_mul(INV_B);
        x = unshift(x, 27);
        x = x.wrapping_mul(INV_A);
        x = unshift(x, 30);
        x ^ self.secret
    }
}

/// Inverse of `x ^ (x >> shift)`.
fn unshift(value: u64, shift: u32) -> u64 {
    let mut x = value;
    for _ in 0..(64 / shift) {
        x = value ^ (x >> shift);
    }
    x
}

/// Multiplicative inverse of an odd number modulo 2^64 (Newton iteration).
const fn mod_inverse(m: u64) -> u64 {
    let mut inv = m;
    let mut i = 0;
    while i < 5 {
        inv = inv.wrapping_mul(2u64.wrapping_sub(m.wrapping_mul(inv)));
        i += 1;
    }
    inv
}

fn to_base62(mut value: u64) -> String {
    let mut buf = Vec::with_capacity(MAX_LEN);
    loop {
        buf.push(ALPHABET[(value % 62) as usize]);
        value /= 62;
        if value == 0 {
            break;
        }
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

fn from_base62(text: &str) -> Option<u64> {
    if text.is_empty() || text.len() > MAX_LEN {
        return None;
    }
    text.bytes().try_fold(0u64, |acc, byte| {
        let digit = ALPHABET.iter().position(|&c| c == byte)? as u64;
        acc.checked_mul(62)?.checked_add(digit)
    })
}
