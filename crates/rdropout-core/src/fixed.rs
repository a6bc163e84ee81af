//! 固定小数点表現
//!
//! ストリーム要素の数値型と、確率・逆スケーリング係数の固定小数点表現を定義する。
//!
//! - `FixedPoint`: 要素型のインターフェース（ビット幅・飽和規則は型側が決める）
//! - `Fixed16<FRAC>` / `Fixed32<FRAC>`: 符号付き固定小数点（小数部 FRAC ビット）
//! - `KeepRate`: Q0.16 の保持確率（`1.0 == 65536`）
//! - `RescaleFactor`: Q16.16 の逆スケーリング係数（`1 / keep_rate`）

use crate::error::ConfigError;
use std::fmt;

/// `KeepRate` / `RescaleFactor` の小数部ビット数
pub const PROB_FRAC_BITS: u32 = 16;

/// `KeepRate` の 1.0 に相当する raw 値
pub const PROB_ONE: u32 = 1 << PROB_FRAC_BITS;

/// ストリーム要素の固定小数点型
///
/// raw 値は二の補数の整数で、実数値は `raw / 2^FRAC_BITS`。
pub trait FixedPoint: Copy + PartialEq + PartialOrd + fmt::Debug + Send + 'static {
    /// 小数部ビット数
    const FRAC_BITS: u32;

    /// 加法単位元
    fn zero() -> Self;

    /// raw 値（i64 に拡張）
    fn to_raw(self) -> i64;

    /// raw 値から構築。表現範囲外なら None
    fn from_raw(raw: i64) -> Option<Self>;

    /// 表現可能な最小 raw 値
    fn min_raw() -> i64;

    /// 表現可能な最大 raw 値
    fn max_raw() -> i64;

    #[inline]
    fn is_positive(self) -> bool {
        self.to_raw() > 0
    }

    /// 実数値へ変換
    fn to_f64(self) -> f64 {
        self.to_raw() as f64 / (1u64 << Self::FRAC_BITS) as f64
    }

    /// 実数値から変換（最近接丸め、範囲外は飽和）
    fn from_f64_saturating(value: f64) -> Self {
        let scaled = (value * (1u64 << Self::FRAC_BITS) as f64).round();
        let raw = if scaled.is_nan() {
            0
        } else {
            (scaled as i64).clamp(Self::min_raw(), Self::max_raw())
        };
        // clamp 済みなので必ず表現できる
        Self::from_raw(raw).unwrap_or_else(Self::zero)
    }
}

macro_rules! impl_fixed_for_int {
    ($($int:ty),*) => {
        $(
            impl FixedPoint for $int {
                const FRAC_BITS: u32 = 0;

                #[inline]
                fn zero() -> Self {
                    0
                }

                #[inline]
                fn to_raw(self) -> i64 {
                    self as i64
                }

                #[inline]
                fn from_raw(raw: i64) -> Option<Self> {
                    <$int>::try_from(raw).ok()
                }

                #[inline]
                fn min_raw() -> i64 {
                    <$int>::MIN as i64
                }

                #[inline]
                fn max_raw() -> i64 {
                    <$int>::MAX as i64
                }
            }
        )*
    };
}

impl_fixed_for_int!(i8, i16, i32);

/// 固定小数点型を生成するマクロ
///
/// `$name<FRAC>` は `$repr` を raw 値として持つ。
macro_rules! define_fixed {
    ($(#[$meta:meta])* $name:ident, $repr:ty) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name<const FRAC: u32>(pub $repr);

        impl<const FRAC: u32> $name<FRAC> {
            /// raw 値から直接構築
            #[inline]
            pub const fn from_bits(raw: $repr) -> Self {
                Self(raw)
            }

            /// raw 値
            #[inline]
            pub const fn to_bits(self) -> $repr {
                self.0
            }
        }

        impl<const FRAC: u32> FixedPoint for $name<FRAC> {
            const FRAC_BITS: u32 = FRAC;

            #[inline]
            fn zero() -> Self {
                Self(0)
            }

            #[inline]
            fn to_raw(self) -> i64 {
                self.0 as i64
            }

            #[inline]
            fn from_raw(raw: i64) -> Option<Self> {
                <$repr>::try_from(raw).ok().map(Self)
            }

            #[inline]
            fn min_raw() -> i64 {
                <$repr>::MIN as i64
            }

            #[inline]
            fn max_raw() -> i64 {
                <$repr>::MAX as i64
            }
        }

        impl<const FRAC: u32> fmt::Debug for $name<FRAC> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_f64())
            }
        }

        impl<const FRAC: u32> fmt::Display for $name<FRAC> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_f64())
            }
        }
    };
}

define_fixed!(
    /// 16bit 符号付き固定小数点（`Fixed16<10>` は整数部 6bit のパイプライン既定型）
    Fixed16,
    i16
);

define_fixed!(
    /// 32bit 符号付き固定小数点
    Fixed32,
    i32
);

/// 保持確率（Q0.16、`[0, 65536]`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeepRate(u32);

impl KeepRate {
    /// 常に保持
    pub const ONE: Self = Self(PROB_ONE);

    /// 常に破棄
    pub const ZERO: Self = Self(0);

    /// 実数から変換（最近接丸め）
    ///
    /// 0 でも 1 でもない値が丸めで 0 や 1.0 に潰れる場合はエラー。
    pub fn from_f64(p: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&p) {
            // NaN もここで弾かれる
            return Err(ConfigError::KeepRateOutOfRange(p));
        }
        let raw = (p * PROB_ONE as f64).round() as u32;
        if (raw == 0 && p > 0.0) || (raw == PROB_ONE && p < 1.0) {
            return Err(ConfigError::KeepRateUnrepresentable(p));
        }
        if raw as f64 != p * PROB_ONE as f64 {
            log::debug!("keep_rate {p} quantized to {}", raw as f64 / PROB_ONE as f64);
        }
        Ok(Self(raw))
    }

    /// raw 値から変換
    pub fn from_raw(raw: u32) -> Result<Self, ConfigError> {
        if raw > PROB_ONE {
            return Err(ConfigError::KeepRateOutOfRange(raw as f64 / PROB_ONE as f64));
        }
        Ok(Self(raw))
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / PROB_ONE as f64
    }

    /// RNG の値 `r`（`[0, max]`）が保持条件 `r / (max + 1) < keep_rate` を満たすか
    ///
    /// max は包含上限なので `max + 1` で正規化する。keep_rate = 1.0 は全て保持、
    /// keep_rate = 0.0 は全て破棄になる。
    #[inline]
    pub fn admits(self, r: u32, max: u32) -> bool {
        debug_assert!(r <= max);
        ((r as u64) << PROB_FRAC_BITS) < self.0 as u64 * (max as u64 + 1)
    }

    /// 逆スケーリング係数 `1 / keep_rate`。keep_rate = 0 なら None
    pub fn rescale_factor(self) -> Option<RescaleFactor> {
        if self.0 == 0 {
            return None;
        }
        // round(2^32 / raw)
        let numerator = 1u64 << (2 * PROB_FRAC_BITS);
        let raw = (numerator + self.0 as u64 / 2) / self.0 as u64;
        Some(RescaleFactor(raw))
    }
}

impl fmt::Display for KeepRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}

/// 逆スケーリング係数（Q16.16）
///
/// keep_rate の最小 raw 値は 1 なので最大でも `2^32`（= 65536.0）に収まる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RescaleFactor(u64);

impl RescaleFactor {
    /// 等倍
    pub const UNITY: Self = Self(PROB_ONE as u64);

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / PROB_ONE as f64
    }

    /// 要素に係数を掛ける
    ///
    /// `(raw * factor + 2^15) >> 16`（最近接丸め、0.5 は正方向）。
    /// 要素の表現範囲外なら None。
    #[inline]
    pub fn apply<T: FixedPoint>(self, value: T) -> Option<T> {
        let product = value.to_raw() as i128 * self.0 as i128;
        let shifted = (product + (1i128 << (PROB_FRAC_BITS - 1))) >> PROB_FRAC_BITS;
        T::from_raw(i64::try_from(shifted).ok()?)
    }
}
