//! マスクポリシー
//!
//! 要素ごとの keep/drop 判定と逆スケーリング係数を決める純粋な判定ロジック。
//!
//! | ポリシー | RNG | 判定 |
//! |---|---|---|
//! | `Identity` | 不使用 | 常に通過 |
//! | `ReluGated` | 不使用 | `x > 0` なら通過、それ以外は 0 |
//! | `BernoulliDropout` | 要素ごとに 1 回 | `r / (max + 1) < keep_rate` で保持 |
//! | `PrecomputedMaskDropout` | パス先頭で n_in 回 | 事前計算したマスクで保持 |

use crate::error::{RegularizerError, RegularizerResult};
use crate::fixed::{FixedPoint, KeepRate, RescaleFactor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ポリシーの種類（設定ファイル上の表現）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Identity,
    ReluGated,
    BernoulliDropout,
    PrecomputedMaskDropout,
}

impl PolicyKind {
    /// 文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::ReluGated => "relu_gated",
            Self::BernoulliDropout => "bernoulli_dropout",
            Self::PrecomputedMaskDropout => "precomputed_mask_dropout",
        }
    }

    /// keep_rate を必要とするか
    pub fn uses_keep_rate(&self) -> bool {
        matches!(self, Self::BernoulliDropout | Self::PrecomputedMaskDropout)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ドロップアウト判定規則
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropoutRule {
    keep: KeepRate,
    /// None は keep_rate = 0（全て破棄）または逆スケーリング無効
    scale: Option<RescaleFactor>,
}

impl DropoutRule {
    /// `rescale = false` なら保持した要素をそのまま出力する
    pub fn new(keep: KeepRate, rescale: bool) -> Self {
        let scale = if rescale {
            keep.rescale_factor()
        } else {
            None
        };
        Self { keep, scale }
    }

    #[inline]
    pub fn keep_rate(&self) -> KeepRate {
        self.keep
    }

    #[inline]
    pub fn rescale_factor(&self) -> Option<RescaleFactor> {
        self.scale
    }

    /// RNG の値 1 つから判定
    #[inline]
    pub fn decide_draw(&self, r: u32, max: u32) -> Decision {
        self.decide_flag(self.keep.admits(r, max))
    }

    /// 事前計算した keep フラグから判定
    #[inline]
    pub fn decide_flag(&self, keep: bool) -> Decision {
        match (keep, self.scale) {
            (false, _) => Decision::Drop,
            (true, Some(scale)) => Decision::Keep(scale),
            (true, None) => Decision::Pass,
        }
    }
}

/// 要素 1 つに対する判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// そのまま通過
    Pass,
    /// 保持して逆スケーリング
    Keep(RescaleFactor),
    /// 加法単位元に置き換え
    Drop,
}

impl Decision {
    /// 出力側に値が残るか
    #[inline]
    pub fn is_kept(&self) -> bool {
        !matches!(self, Self::Drop)
    }

    /// 判定を要素に適用
    ///
    /// `index` はパス内の平坦化インデックス（エラー報告用）。
    #[inline]
    pub fn apply<T: FixedPoint>(self, value: T, index: usize) -> RegularizerResult<T> {
        match self {
            Self::Pass => Ok(value),
            Self::Drop => Ok(T::zero()),
            Self::Keep(scale) => {
                scale
                    .apply(value)
                    .ok_or_else(|| RegularizerError::NumericRange {
                        index,
                        raw: value.to_raw(),
                        factor: scale.to_f64(),
                    })
            }
        }
    }
}

/// マスクポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    Identity,
    ReluGated,
    BernoulliDropout(DropoutRule),
    PrecomputedMaskDropout(DropoutRule),
}

impl MaskPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::Identity => PolicyKind::Identity,
            Self::ReluGated => PolicyKind::ReluGated,
            Self::BernoulliDropout(_) => PolicyKind::BernoulliDropout,
            Self::PrecomputedMaskDropout(_) => PolicyKind::PrecomputedMaskDropout,
        }
    }

    /// ドロップアウト規則（Identity / ReluGated は None）
    pub fn dropout_rule(&self) -> Option<&DropoutRule> {
        match self {
            Self::BernoulliDropout(rule) | Self::PrecomputedMaskDropout(rule) => Some(rule),
            Self::Identity | Self::ReluGated => None,
        }
    }

    /// パス先頭でマスクを事前計算するか
    #[inline]
    pub fn precomputes_mask(&self) -> bool {
        matches!(self, Self::PrecomputedMaskDropout(_))
    }

    /// 要素ごとに RNG を 1 回引くか
    #[inline]
    pub fn draws_per_element(&self) -> bool {
        matches!(self, Self::BernoulliDropout(_))
    }

    /// RNG を使わないポリシーの判定
    ///
    /// ドロップアウト系では呼ばない（呼んだ場合は `Pass` を返す）。
    #[inline]
    pub fn decide_value<T: FixedPoint>(&self, value: T) -> Decision {
        match self {
            Self::ReluGated if !value.is_positive() => Decision::Drop,
            _ => Decision::Pass,
        }
    }
}
