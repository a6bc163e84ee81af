//! エラー型
//!
//! 設定エラーは構築時に検出し、ストリームエラーはパス単位で致命的として扱う。
//! どちらも内部でリトライしない。

use crate::policy::PolicyKind;

/// 設定エラー
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// vector_width が 0
    #[error("vector_width must be non-zero")]
    ZeroWidth,

    /// n_in が vector_width の倍数でない
    #[error("n_in ({n_in}) is not a multiple of vector_width ({vector_width})")]
    NotDivisible { n_in: usize, vector_width: usize },

    /// keep_rate が [0, 1] の範囲外
    #[error("keep_rate out of range [0, 1]: {0}")]
    KeepRateOutOfRange(f64),

    /// keep_rate が Q0.16 に量子化すると 0 または 1 に潰れる
    #[error("keep_rate {0} is not representable in Q0.16 (rounds to 0 or 1)")]
    KeepRateUnrepresentable(f64),

    /// keep_rate と drop_rate の両方が指定された
    #[error("keep_rate and drop_rate are mutually exclusive")]
    ConflictingRates,

    /// ドロップアウト系ポリシーで確率が未指定
    #[error("policy {0} requires keep_rate or drop_rate")]
    MissingKeepRate(PolicyKind),

    /// RNG のビット幅が範囲外
    ///
    /// 16bit 未満では保持確率を keep_rate の精度で再現できない。
    #[error("rng_bits must be in 16..=32, got {0}")]
    RngBits(u32),

    /// マスクテーブルが空
    #[error("mask table has no rows")]
    EmptyMaskTable,

    /// マスクテーブルの行数が num_masks と一致しない
    #[error("mask table has {actual} rows, expected num_masks = {expected}")]
    MaskCount { expected: usize, actual: usize },

    /// マスク行の長さが n_in と一致しない
    #[error("mask row {row} has length {actual}, expected n_in = {expected}")]
    MaskRowLength {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// mask_index がテーブルの範囲外
    #[error("mask_index {index} out of range (num_masks = {num_masks})")]
    MaskIndexOutOfRange { index: usize, num_masks: usize },

    /// TOML の解析失敗
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

/// ストリーム処理のエラー
#[derive(thiserror::Error, Debug)]
pub enum RegularizerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 入力ストリームが n_in / vector_width 個より前に終端した
    #[error("stream underrun: expected {expected} chunks, received {received}")]
    StreamUnderrun { expected: usize, received: usize },

    /// 入力チャンクの幅が vector_width と一致しない
    #[error("chunk {index} has width {actual}, expected {expected}")]
    ChunkWidth {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// 出力ストリームが閉じている
    #[error("output stream closed at chunk {index}")]
    OutputClosed { index: usize },

    /// 配列形式の入出力長が n_in と一致しない
    #[error("array length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// 逆スケーリングが要素型の表現範囲を超えた
    ///
    /// 設定検証が正しければ到達しない。発生した場合は設定（要素型のビット幅と
    /// keep_rate の組み合わせ）の欠陥として扱う。
    #[error("numeric range exceeded at element {index}: raw {raw} rescaled by {factor}")]
    NumericRange { index: usize, raw: i64, factor: f64 },
}

/// ストリーム処理の Result 型
pub type RegularizerResult<T> = Result<T, RegularizerError>;
