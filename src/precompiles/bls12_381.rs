//! EIP-2537 BLS12-381 operations. Field elements are 64 bytes: 16 zero bytes
//! followed by the 48-byte big-endian value.

use ark_bls12_381::{
    Bls12_381, Fq, Fq2, Fr, G1Affine, G1Projective, G2Affine, G2Projective, g1, g2,
};
use ark_ec::{
    AffineRepr, CurveGroup,
    hashing::{curve_maps::wb::WBMap, map_to_curve_hasher::MapToCurve},
    pairing::Pairing,
};
use ark_ff::{BigInteger, One, PrimeField, Zero};

use crate::{
    error::PrecompileError,
    precompiles::{Cost, Precompile, bool_word},
};

pub const G1_ADD: Precompile = Precompile::pure("bls12G1Add", g1_add_cost, g1_add);
pub const G1_MSM: Precompile = Precompile::pure("bls12G1Msm", g1_msm_cost, g1_msm);
pub const G2_ADD: Precompile = Precompile::pure("bls12G2Add", g2_add_cost, g2_add);
pub const G2_MSM: Precompile = Precompile::pure("bls12G2Msm", g2_msm_cost, g2_msm);
pub const PAIRING: Precompile = Precompile::pure("bls12Pairing", pairing_cost, pairing);
pub const MAP_FP_TO_G1: Precompile = Precompile::pure("bls12MapFpToG1", map_fp_cost, map_fp_to_g1);
pub const MAP_FP2_TO_G2: Precompile =
    Precompile::pure("bls12MapFp2ToG2", map_fp2_cost, map_fp2_to_g2);

const FP_LENGTH: usize = 64;
const G1_LENGTH: usize = 2 * FP_LENGTH;
const G2_LENGTH: usize = 4 * FP_LENGTH;
const SCALAR_LENGTH: usize = 32;
const G1_MSM_PAIR_LENGTH: usize = G1_LENGTH + SCALAR_LENGTH;
const G2_MSM_PAIR_LENGTH: usize = G2_LENGTH + SCALAR_LENGTH;
const PAIRING_PAIR_LENGTH: usize = G1_LENGTH + G2_LENGTH;

const G1_MUL_GAS: u64 = 12_000;
const G2_MUL_GAS: u64 = 22_500;
const MSM_MULTIPLIER: u64 = 1000;

const G1_MSM_DISCOUNT: [u64; 128] = [
    1000, 949, 848, 797, 764, 750, 738, 728, 719, 712, 705, 698, 692, 687, 682, 677, 673, 669, 665,
    661, 658, 654, 651, 648, 645, 642, 640, 637, 635, 632, 630, 627, 625, 623, 621, 619, 617, 615,
    613, 611, 609, 608, 606, 604, 603, 601, 599, 598, 596, 595, 593, 592, 591, 589, 588, 586, 585,
    584, 582, 581, 580, 579, 577, 576, 575, 574, 573, 572, 570, 569, 568, 567, 566, 565, 564, 563,
    562, 561, 560, 559, 558, 557, 556, 555, 554, 553, 552, 551, 550, 549, 548, 547, 547, 546, 545,
    544, 543, 542, 541, 540, 540, 539, 538, 537, 536, 536, 535, 534, 533, 532, 532, 531, 530, 529,
    528, 528, 527, 526, 525, 525, 524, 523, 522, 522, 521, 520, 520, 519,
];

const G2_MSM_DISCOUNT: [u64; 128] = [
    1000, 1000, 923, 884, 855, 832, 812, 796, 782, 770, 759, 749, 740, 732, 724, 717, 711, 704,
    699, 693, 688, 683, 679, 674, 670, 666, 663, 659, 655, 652, 649, 646, 643, 640, 637, 634, 632,
    629, 627, 624, 622, 620, 618, 615, 613, 611, 609, 607, 606, 604, 602, 600, 598, 597, 595, 593,
    592, 590, 589, 587, 586, 584, 583, 582, 580, 579, 578, 576, 575, 574, 573, 571, 570, 569, 568,
    567, 566, 565, 563, 562, 561, 560, 559, 558, 557, 556, 555, 554, 553, 552, 552, 551, 550, 549,
    548, 547, 546, 545, 545, 544, 543, 542, 541, 541, 540, 539, 538, 537, 537, 536, 535, 535, 534,
    533, 532, 532, 531, 530, 530, 529, 528, 528, 527, 526, 526, 525, 524, 524,
];

fn g1_add_cost(_: &[u8]) -> Cost {
    Cost::flat(375)
}

fn g2_add_cost(_: &[u8]) -> Cost {
    Cost::flat(600)
}

fn msm_gas(k: usize, mul_gas: u64, discount: &[u64; 128]) -> u64 {
    if k == 0 {
        return 0;
    }
    let discount = discount[k.min(discount.len()) - 1];
    (k as u64)
        .saturating_mul(mul_gas)
        .saturating_mul(discount)
        / MSM_MULTIPLIER
}

fn g1_msm_cost(input: &[u8]) -> Cost {
    Cost::flat(msm_gas(input.len() / G1_MSM_PAIR_LENGTH, G1_MUL_GAS, &G1_MSM_DISCOUNT))
}

fn g2_msm_cost(input: &[u8]) -> Cost {
    Cost::flat(msm_gas(input.len() / G2_MSM_PAIR_LENGTH, G2_MUL_GAS, &G2_MSM_DISCOUNT))
}

fn pairing_cost(input: &[u8]) -> Cost {
    let k = (input.len() / PAIRING_PAIR_LENGTH) as u64;
    Cost::flat(32_600 * k + 37_700)
}

fn map_fp_cost(_: &[u8]) -> Cost {
    Cost::flat(5_500)
}

fn map_fp2_cost(_: &[u8]) -> Cost {
    Cost::flat(23_800)
}

fn read_fp(bytes: &[u8]) -> Result<Fq, PrecompileError> {
    let (padding, value) = bytes.split_at(16);
    if padding.iter().any(|b| *b != 0) {
        return Err(PrecompileError::InvalidFieldElement);
    }
    let fp = Fq::from_be_bytes_mod_order(value);
    if fp.into_bigint().to_bytes_be() != value {
        return Err(PrecompileError::InvalidFieldElement);
    }
    Ok(fp)
}

fn read_fp2(bytes: &[u8]) -> Result<Fq2, PrecompileError> {
    Ok(Fq2::new(
        read_fp(&bytes[..FP_LENGTH])?,
        read_fp(&bytes[FP_LENGTH..2 * FP_LENGTH])?,
    ))
}

fn write_fp(out: &mut Vec<u8>, fp: &Fq) {
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&fp.into_bigint().to_bytes_be());
}

fn read_g1(bytes: &[u8], subgroup: bool) -> Result<G1Affine, PrecompileError> {
    let x = read_fp(&bytes[..FP_LENGTH])?;
    let y = read_fp(&bytes[FP_LENGTH..G1_LENGTH])?;
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::identity());
    }
    let point = G1Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(PrecompileError::PointNotOnCurve);
    }
    if subgroup && !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PrecompileError::PointNotInSubgroup);
    }
    Ok(point)
}

fn read_g2(bytes: &[u8], subgroup: bool) -> Result<G2Affine, PrecompileError> {
    let x = read_fp2(&bytes[..2 * FP_LENGTH])?;
    let y = read_fp2(&bytes[2 * FP_LENGTH..G2_LENGTH])?;
    if x.is_zero() && y.is_zero() {
        return Ok(G2Affine::identity());
    }
    let point = G2Affine::new_unchecked(x, y);
    if !point.is_on_curve() {
        return Err(PrecompileError::PointNotOnCurve);
    }
    if subgroup && !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PrecompileError::PointNotInSubgroup);
    }
    Ok(point)
}

fn encode_g1(point: &G1Affine) -> Vec<u8> {
    if point.infinity {
        return vec![0u8; G1_LENGTH];
    }
    let mut out = Vec::with_capacity(G1_LENGTH);
    write_fp(&mut out, &point.x);
    write_fp(&mut out, &point.y);
    out
}

fn encode_g2(point: &G2Affine) -> Vec<u8> {
    if point.infinity {
        return vec![0u8; G2_LENGTH];
    }
    let mut out = Vec::with_capacity(G2_LENGTH);
    for fp in [&point.x.c0, &point.x.c1, &point.y.c0, &point.y.c1] {
        write_fp(&mut out, fp);
    }
    out
}

fn g1_add(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.len() != 2 * G1_LENGTH {
        return Err(PrecompileError::InvalidInputLength);
    }
    let a = read_g1(&input[..G1_LENGTH], false)?;
    let b = read_g1(&input[G1_LENGTH..], false)?;
    Ok(encode_g1(&(G1Projective::from(a) + G1Projective::from(b)).into_affine()))
}

fn g2_add(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.len() != 2 * G2_LENGTH {
        return Err(PrecompileError::InvalidInputLength);
    }
    let a = read_g2(&input[..G2_LENGTH], false)?;
    let b = read_g2(&input[G2_LENGTH..], false)?;
    Ok(encode_g2(&(G2Projective::from(a) + G2Projective::from(b)).into_affine()))
}

fn g1_msm(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.is_empty() || !input.len().is_multiple_of(G1_MSM_PAIR_LENGTH) {
        return Err(PrecompileError::InvalidInputLength);
    }
    let mut acc = G1Projective::zero();
    for pair in input.chunks_exact(G1_MSM_PAIR_LENGTH) {
        let point = read_g1(&pair[..G1_LENGTH], true)?;
        let scalar = Fr::from_be_bytes_mod_order(&pair[G1_LENGTH..]);
        acc += G1Projective::from(point) * scalar;
    }
    Ok(encode_g1(&acc.into_affine()))
}

fn g2_msm(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.is_empty() || !input.len().is_multiple_of(G2_MSM_PAIR_LENGTH) {
        return Err(PrecompileError::InvalidInputLength);
    }
    let mut acc = G2Projective::zero();
    for pair in input.chunks_exact(G2_MSM_PAIR_LENGTH) {
        let point = read_g2(&pair[..G2_LENGTH], true)?;
        let scalar = Fr::from_be_bytes_mod_order(&pair[G2_LENGTH..]);
        acc += G2Projective::from(point) * scalar;
    }
    Ok(encode_g2(&acc.into_affine()))
}

fn pairing(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.is_empty() || !input.len().is_multiple_of(PAIRING_PAIR_LENGTH) {
        return Err(PrecompileError::InvalidInputLength);
    }
    let mut g1s = Vec::with_capacity(input.len() / PAIRING_PAIR_LENGTH);
    let mut g2s = Vec::with_capacity(input.len() / PAIRING_PAIR_LENGTH);
    for pair in input.chunks_exact(PAIRING_PAIR_LENGTH) {
        g1s.push(read_g1(&pair[..G1_LENGTH], true)?);
        g2s.push(read_g2(&pair[G1_LENGTH..], true)?);
    }
    Ok(bool_word(Bls12_381::multi_pairing(g1s, g2s).0.is_one()))
}

fn map_fp_to_g1(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.len() != FP_LENGTH {
        return Err(PrecompileError::InvalidInputLength);
    }
    let fp = read_fp(input)?;
    let point = WBMap::<g1::Config>::map_to_curve(fp)
        .map_err(|_| PrecompileError::InvalidInput("map to G1 failed"))?
        .clear_cofactor();
    Ok(encode_g1(&point))
}

fn map_fp2_to_g2(input: &[u8]) -> Result<Vec<u8>, PrecompileError> {
    if input.len() != 2 * FP_LENGTH {
        return Err(PrecompileError::InvalidInputLength);
    }
    let fp2 = read_fp2(input)?;
    let point = WBMap::<g2::Config>::map_to_curve(fp2)
        .map_err(|_| PrecompileError::InvalidInput("map to G2 failed"))?
        .clear_cofactor();
    Ok(encode_g2(&point))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g1() -> G1Affine {
        G1Affine::generator()
    }

    fn g2() -> G2Affine {
        G2Affine::generator()
    }

    fn scalar(value: u8) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[31] = value;
        out
    }

    #[test]
    fn test_g1_add() {
        let input = [encode_g1(&g1()), encode_g1(&g1())].concat();
        let double = (G1Projective::from(g1()) * Fr::from(2u64)).into_affine();
        assert_eq!(g1_add(&input).unwrap(), encode_g1(&double));

        let neg = -g1();
        let input = [encode_g1(&g1()), encode_g1(&neg)].concat();
        assert_eq!(g1_add(&input).unwrap(), vec![0u8; G1_LENGTH]);

        assert_eq!(g1_add(&input[1..]), Err(PrecompileError::InvalidInputLength));
    }

    #[test]
    fn test_g1_rejects_bad_encoding() {
        let mut input = [encode_g1(&g1()), encode_g1(&g1())].concat();
        input[0] = 1;
        assert_eq!(g1_add(&input), Err(PrecompileError::InvalidFieldElement));

        let mut input = [encode_g1(&g1()), encode_g1(&g1())].concat();
        input[G1_LENGTH - 1] ^= 1;
        assert_eq!(g1_add(&input), Err(PrecompileError::PointNotOnCurve));
    }

    #[test]
    fn test_msm_matches_repeated_addition() {
        let mut input = encode_g1(&g1());
        input.extend_from_slice(&scalar(2));
        input.extend(encode_g1(&g1()));
        input.extend_from_slice(&scalar(1));
        let triple = (G1Projective::from(g1()) * Fr::from(3u64)).into_affine();
        assert_eq!(g1_msm(&input).unwrap(), encode_g1(&triple));
        assert_eq!(g1_msm(&[]), Err(PrecompileError::InvalidInputLength));

        let mut input = encode_g2(&g2());
        input.extend_from_slice(&scalar(0));
        assert_eq!(g2_msm(&input).unwrap(), vec![0u8; G2_LENGTH]);
    }

    #[test]
    fn test_g2_add() {
        let input = [encode_g2(&g2()), encode_g2(&G2Affine::identity())].concat();
        assert_eq!(g2_add(&input).unwrap(), encode_g2(&g2()));
    }

    #[test]
    fn test_pairing() {
        let input = [
            encode_g1(&g1()),
            encode_g2(&g2()),
            encode_g1(&-g1()),
            encode_g2(&g2()),
        ]
        .concat();
        assert_eq!(pairing(&input).unwrap(), bool_word(true));

        let input = [encode_g1(&g1()), encode_g2(&g2())].concat();
        assert_eq!(pairing(&input).unwrap(), bool_word(false));
        assert_eq!(pairing(&[]), Err(PrecompileError::InvalidInputLength));
    }

    #[test]
    fn test_map_lands_in_subgroup() {
        let mut fp = vec![0u8; FP_LENGTH];
        fp[FP_LENGTH - 1] = 7;
        let out = map_fp_to_g1(&fp).unwrap();
        let point = read_g1(&out, true).unwrap();
        assert!(!point.infinity);

        let fp2 = [fp.clone(), fp].concat();
        let out = map_fp2_to_g2(&fp2).unwrap();
        let point = read_g2(&out, true).unwrap();
        assert!(!point.infinity);
    }

    #[test]
    fn test_pricing() {
        assert_eq!(G1_MSM.required_gas(&[]), 0);
        assert_eq!(G1_MSM.required_gas(&[0u8; G1_MSM_PAIR_LENGTH]), 12_000);
        assert_eq!(G1_MSM.required_gas(&[0u8; 2 * G1_MSM_PAIR_LENGTH]), 2 * 12_000 * 949 / 1000);
        assert_eq!(G2_MSM.required_gas(&[0u8; 2 * G2_MSM_PAIR_LENGTH]), 2 * 22_500);
        assert_eq!(msm_gas(200, G1_MUL_GAS, &G1_MSM_DISCOUNT), 200 * 12_000 * 519 / 1000);
        assert_eq!(PAIRING.required_gas(&[0u8; 2 * PAIRING_PAIR_LENGTH]), 102_900);
        assert_eq!(MAP_FP2_TO_G2.required_gas(&[]), 23_800);
    }
}
