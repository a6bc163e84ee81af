//! 設定
//!
//! レイヤグラフ側のコンパイラが生成する per-instance 定数。構築後は変更しない。

use crate::error::ConfigError;
use crate::fixed::KeepRate;
use crate::policy::{DropoutRule, MaskPolicy, PolicyKind};
use crate::rng::{DEFAULT_RNG_BITS, check_rng_bits};
use serde::{Deserialize, Serialize};

/// チャンク分割
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    n_in: usize,
    vector_width: usize,
}

impl ChunkLayout {
    /// `n_in` が `vector_width` の倍数でなければエラー
    pub fn new(n_in: usize, vector_width: usize) -> Result<Self, ConfigError> {
        if vector_width == 0 {
            return Err(ConfigError::ZeroWidth);
        }
        if !n_in.is_multiple_of(vector_width) {
            return Err(ConfigError::NotDivisible { n_in, vector_width });
        }
        Ok(Self { n_in, vector_width })
    }

    #[inline]
    pub fn n_in(&self) -> usize {
        self.n_in
    }

    #[inline]
    pub fn vector_width(&self) -> usize {
        self.vector_width
    }

    /// 1 パスのチャンク数
    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.n_in / self.vector_width
    }
}

/// StreamingRegularizer の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegularizerConfig {
    /// 1 パスの要素数
    pub n_in: usize,
    /// 1 チャンクの要素数
    pub vector_width: usize,
    /// 保持確率（drop_rate と排他）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_rate: Option<f64>,
    /// 破棄確率（keep_rate = 1 - drop_rate）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_rate: Option<f64>,
    /// RNG シード
    pub seed: u64,
    pub policy: PolicyKind,
    /// RNG 出力のビット幅（16..=32）
    pub rng_bits: u32,
    /// 保持した要素を 1 / keep_rate 倍するか
    pub rescale: bool,
}

impl Default for RegularizerConfig {
    fn default() -> Self {
        Self {
            n_in: 0,
            vector_width: 1,
            keep_rate: None,
            drop_rate: None,
            seed: 0,
            policy: PolicyKind::Identity,
            rng_bits: DEFAULT_RNG_BITS,
            rescale: true,
        }
    }
}

impl RegularizerConfig {
    /// TOML 文字列から読み込み
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn layout(&self) -> Result<ChunkLayout, ConfigError> {
        ChunkLayout::new(self.n_in, self.vector_width)
    }

    /// keep_rate / drop_rate を解決
    ///
    /// どちらも未指定なら None。
    pub fn resolved_keep_rate(&self) -> Result<Option<KeepRate>, ConfigError> {
        match (self.keep_rate, self.drop_rate) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingRates),
            (Some(keep), None) => KeepRate::from_f64(keep).map(Some),
            (None, Some(drop)) => {
                if !(0.0..=1.0).contains(&drop) {
                    return Err(ConfigError::KeepRateOutOfRange(1.0 - drop));
                }
                KeepRate::from_f64(1.0 - drop).map(Some)
            }
            (None, None) => Ok(None),
        }
    }

    /// 設定から MaskPolicy を構築
    pub fn mask_policy(&self) -> Result<MaskPolicy, ConfigError> {
        let keep = self.resolved_keep_rate()?;
        let rule = || {
            keep.map(|k| DropoutRule::new(k, self.rescale))
                .ok_or(ConfigError::MissingKeepRate(self.policy))
        };
        Ok(match self.policy {
            PolicyKind::Identity => MaskPolicy::Identity,
            PolicyKind::ReluGated => MaskPolicy::ReluGated,
            PolicyKind::BernoulliDropout => MaskPolicy::BernoulliDropout(rule()?),
            PolicyKind::PrecomputedMaskDropout => MaskPolicy::PrecomputedMaskDropout(rule()?),
        })
    }

    /// 全項目を検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout()?;
        self.mask_policy()?;
        check_rng_bits(self.rng_bits)
    }
}

/// EnsembleMasker の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnsembleConfig {
    pub n_in: usize,
    pub vector_width: usize,
    /// アンサンブルのマスク数
    pub num_masks: usize,
    /// マスク生成時のスケール（モデル変換側が記録する値）
    pub scale: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            n_in: 0,
            vector_width: 1,
            num_masks: 1,
            scale: 1.0,
        }
    }
}

impl EnsembleConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn layout(&self) -> Result<ChunkLayout, ConfigError> {
        ChunkLayout::new(self.n_in, self.vector_width)
    }
}
