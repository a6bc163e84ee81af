//! 固定小数点 RNG
//!
//! シードから決定的に `[0, max]` の整数列を生成する。
//! 時刻や OS エントロピーは一切使わない。
//!
//! パス k は「シード済みストリームを xoshiro の `jump()` で k 回進めた位置」から
//! 始まるので、パス同士は互いに独立かつ再現可能。

use crate::error::ConfigError;
use crate::fixed::PROB_FRAC_BITS;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// RNG 出力のデフォルトビット幅
pub const DEFAULT_RNG_BITS: u32 = 16;

/// RNG 出力の最小ビット幅（`KeepRate` の小数部ビット数）
///
/// これ以上なら保持確率はちょうど `keep_raw / 2^16` になる。
pub const MIN_RNG_BITS: u32 = PROB_FRAC_BITS;

/// `bits` が `MIN_RNG_BITS..=32` に収まるか検証
pub fn check_rng_bits(bits: u32) -> Result<(), ConfigError> {
    if !(MIN_RNG_BITS..=32).contains(&bits) {
        return Err(ConfigError::RngBits(bits));
    }
    Ok(())
}

/// 固定小数点 RNG
///
/// 1 インスタンスを複数の論理ストリームで共有してはならない。
#[derive(Debug, Clone)]
pub struct FixedPointRng {
    seed: u64,
    bits: u32,
    /// 現在のパスの開始位置
    pass_origin: Xoshiro256PlusPlus,
    /// 現在の位置
    state: Xoshiro256PlusPlus,
    pass_index: u64,
    draws: u64,
}

impl FixedPointRng {
    /// 新しい RNG を作成（パス 0 の先頭に位置する）
    pub fn new(seed: u64, bits: u32) -> Result<Self, ConfigError> {
        check_rng_bits(bits)?;
        let origin = Xoshiro256PlusPlus::seed_from_u64(seed);
        Ok(Self {
            seed,
            bits,
            pass_origin: origin.clone(),
            state: origin,
            pass_index: 0,
            draws: 0,
        })
    }

    /// 次の値 `[0, max]` を取得
    #[inline]
    pub fn draw(&mut self) -> u32 {
        self.draws += 1;
        // 上位 bits ビットを使う
        let x = self.state.next_u32();
        if self.bits == 32 { x } else { x >> (32 - self.bits) }
    }

    /// 出力の上限（包含）
    #[inline]
    pub fn max(&self) -> u32 {
        if self.bits == 32 {
            u32::MAX
        } else {
            (1u32 << self.bits) - 1
        }
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 現在のパスでの draw 回数
    #[inline]
    pub fn draws(&self) -> u64 {
        self.draws
    }

    #[inline]
    pub fn pass_index(&self) -> u64 {
        self.pass_index
    }

    /// パス `index` の先頭に移動
    ///
    /// 現在のパス以降へは `jump()` で前進し、過去のパスへはシードからやり直す。
    pub fn begin_pass(&mut self, index: u64) {
        if index < self.pass_index {
            self.pass_origin = Xoshiro256PlusPlus::seed_from_u64(self.seed);
            self.pass_index = 0;
        }
        while self.pass_index < index {
            self.pass_origin.jump();
            self.pass_index += 1;
        }
        self.state = self.pass_origin.clone();
        self.draws = 0;
    }

    /// パス 0 の先頭に戻す
    pub fn restart(&mut self) {
        self.begin_pass(0);
    }
}
