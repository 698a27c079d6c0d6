use ripemd::Ripemd160;
use sha2::Digest;

use crate::{
    common::{Address, hash, signature},
    error::PrecompileError,
    precompiles::{Cost, Precompile, get_data, words},
};

pub const ECRECOVER: Precompile = Precompile::pure("ecrecover", ecrecover_cost, ecrecover);
pub const SHA256: Precompile = Precompile::pure("sha256", sha256_cost, sha256);
pub const RIPEMD160: Precompile = Precompile::pure("ripemd160", ripemd160_cost, ripemd160);
pub const IDENTITY: Precompile = Precompile::pure("identity", identity_cost, identity);
pub const BLAKE2F: Precompile = Precompile::pure("blake2f", blake2f_cost, blake2f);

const ECRECOVER_GAS: u64 = 3000;
const ECRECOVER_COMPUTATION: u64 = 113_150;

fn ecrecover_cost(_: &[u8]) -> Cost {
    Cost::new(ECRECOVER_GAS, ECRECOVER_COMPUTATION)
}

/// `hash ++ v ++ r ++ s`, each 32 bytes. Any failure yields empty output.
fn ecrecover(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    let input = get_data(input, 0, 128);
    let v = &input[32..64];
    if v[..31].iter().any(|b| *b != 0) || !matches!(v[31], 27 | 28) {
        return Ok(Vec::new());
    }

    let mut digest = [0u8; 32];
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    digest.copy_from_slice(&input[..32]);
    r.copy_from_slice(&input[64..96]);
    s.copy_from_slice(&input[96..128]);

    match signature::recover_address(&digest, v[31] - 27, &r, &s, true) {
        Ok(address) => Ok(address.as_word().into_bytes().to_vec()),
        Err(_) => Ok(Vec::new()),
    }
}

fn sha256_cost(input: &[u8]) -> Cost {
    let words = words(input.len());
    Cost::new(60 + 12 * words, 100 + 100 * words)
}

fn sha256(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    Ok(hash::sha256(input).to_vec())
}

fn ripemd160_cost(input: &[u8]) -> Cost {
    let words = words(input.len());
    Cost::new(600 + 120 * words, 10 + 10 * words)
}

fn ripemd160(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    let mut hasher = Ripemd160::new();
    hasher.update(input);
    let digest = hasher.finalize();

    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    Ok(Address(out).as_word().into_bytes().to_vec())
}

fn identity_cost(input: &[u8]) -> Cost {
    let words = words(input.len());
    Cost::new(15 + 3 * words, 0)
}

fn identity(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    Ok(input.to_vec())
}

const BLAKE2F_INPUT_LENGTH: usize = 213;

fn blake2f_rounds(input: &[u8]) -> Option<u32> {
    if input.len() != BLAKE2F_INPUT_LENGTH {
        return None;
    }
    let mut rounds = [0u8; 4];
    rounds.copy_from_slice(&input[..4]);
    Some(u32::from_be_bytes(rounds))
}

fn blake2f_cost(input: &[u8]) -> Cost {
    let rounds = blake2f_rounds(input).map(u64::from).unwrap_or_default();
    Cost::new(rounds, 1000 + 10 * rounds)
}

/// EIP-152: `rounds(4, BE) ++ h(64) ++ m(128) ++ t(16) ++ f(1)`, words little-endian.
fn blake2f(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    let rounds = blake2f_rounds(input).ok_or(PrecompileError::InvalidInputLength)?;
    let f = match input[212] {
        0 => false,
        1 => true,
        _ => return Err(PrecompileError::InvalidFinalFlag),
    };

    let mut h = [0u64; 8];
    let mut m = [0u64; 16];
    let mut t = [0u64; 2];
    read_words(&input[4..68], &mut h);
    read_words(&input[68..196], &mut m);
    read_words(&input[196..212], &mut t);

    let h = compress(h, m, t, f, rounds);

    let mut out = Vec::with_capacity(64);
    for word in h {
        out.extend_from_slice(&word.to_le_bytes());
    }
    Ok(out)
}

fn read_words(bytes: &[u8], out: &mut [u64]) {
    for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *word = u64::from_le_bytes(buf);
    }
}

const IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

fn compress(mut h: [u64; 8], m: [u64; 16], t: [u64; 2], f: bool, rounds: u32) -> [u64; 8] {
    let mut v = [0u64; 16];
    v[..8].copy_from_slice(&h);
    v[8..].copy_from_slice(&IV);
    v[12] ^= t[0];
    v[13] ^= t[1];
    if f {
        v[14] = !v[14];
    }

    for round in 0..rounds as usize {
        let s = &SIGMA[round % 10];
        mix(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        mix(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        mix(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        mix(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        mix(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        mix(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        mix(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        mix(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
    h
}

fn mix(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}
