//! EnsembleMasker（Masksembles）
//!
//! 呼び出しごとの乱数の代わりに、事前計算済みのマスクテーブルから
//! `mask_index` 行を選んで固定の疎パターンを適用するバリアント。
//!
//! マスク行・`weights`・スケールの組み合わせ方はモデル変換側と未確定のため、
//! 現状は `mask_index` を検証した上で入力をそのまま出力する。
// TODO: 行 `mask_index` の keep フラグと rescale の式をモデル変換側と確定したら適用する

use crate::config::{ChunkLayout, EnsembleConfig};
use crate::error::{ConfigError, RegularizerResult};
use crate::fixed::FixedPoint;
use crate::regularizer::PassState;
use crate::stream::{ChunkSink, ChunkSource, PassSummary, run_chunks};

/// マスクテーブル `[num_masks][n_in]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskTable {
    n_in: usize,
    num_masks: usize,
    /// 行優先で平坦化した keep フラグ
    flags: Vec<bool>,
}

impl MaskTable {
    /// 行の集合から構築。全行の長さは `n_in` でなければならない
    pub fn from_rows(rows: Vec<Vec<bool>>, n_in: usize) -> Result<Self, ConfigError> {
        if rows.is_empty() {
            return Err(ConfigError::EmptyMaskTable);
        }
        let num_masks = rows.len();
        let mut flags = Vec::with_capacity(num_masks * n_in);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != n_in {
                return Err(ConfigError::MaskRowLength {
                    row,
                    expected: n_in,
                    actual: values.len(),
                });
            }
            flags.extend(values);
        }
        Ok(Self {
            n_in,
            num_masks,
            flags,
        })
    }

    /// 0/1 の整数行から構築（モデルの重みファイル由来）
    pub fn from_binary_rows(rows: &[Vec<u8>], n_in: usize) -> Result<Self, ConfigError> {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|&v| v != 0).collect())
            .collect();
        Self::from_rows(rows, n_in)
    }

    pub fn num_masks(&self) -> usize {
        self.num_masks
    }

    pub fn n_in(&self) -> usize {
        self.n_in
    }

    /// `index` が有効な行か検証
    pub fn check_index(&self, index: usize) -> Result<(), ConfigError> {
        let num_masks = self.num_masks();
        if index >= num_masks {
            return Err(ConfigError::MaskIndexOutOfRange { index, num_masks });
        }
        Ok(())
    }

    /// 行 `index` の keep フラグ
    pub fn row(&self, index: usize) -> Result<&[bool], ConfigError> {
        self.check_index(index)?;
        Ok(&self.flags[index * self.n_in..(index + 1) * self.n_in])
    }

    /// 行 `index` で保持される要素の割合
    pub fn kept_fraction(&self, index: usize) -> Result<f64, ConfigError> {
        let row = self.row(index)?;
        if row.is_empty() {
            return Ok(1.0);
        }
        let kept = row.iter().filter(|&&keep| keep).count();
        Ok(kept as f64 / row.len() as f64)
    }
}

/// アンサンブルマスカー
#[derive(Debug, Clone)]
pub struct EnsembleMasker {
    config: EnsembleConfig,
    layout: ChunkLayout,
    table: MaskTable,
    state: PassState,
    next_pass: u64,
}

impl EnsembleMasker {
    /// 設定とテーブルの整合性を検証して構築
    pub fn new(config: EnsembleConfig, table: MaskTable) -> Result<Self, ConfigError> {
        let layout = config.layout()?;
        if table.n_in() != layout.n_in() {
            return Err(ConfigError::MaskRowLength {
                row: 0,
                expected: layout.n_in(),
                actual: table.n_in(),
            });
        }
        if table.num_masks() != config.num_masks {
            return Err(ConfigError::MaskCount {
                expected: config.num_masks,
                actual: table.num_masks(),
            });
        }
        Ok(Self {
            config,
            layout,
            table,
            state: PassState::Constructed,
            next_pass: 0,
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn table(&self) -> &MaskTable {
        &self.table
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// 1 パスを処理する
    ///
    /// チャンク数・順序・幅の規約は `StreamingRegularizer::process` と同じ。
    /// `weights` は受け取るが解釈しない。
    pub fn process<T, W, S, K>(
        &mut self,
        input: &mut S,
        output: &mut K,
        weights: &[W],
        mask_index: usize,
    ) -> RegularizerResult<PassSummary>
    where
        T: FixedPoint,
        S: ChunkSource<T> + ?Sized,
        K: ChunkSink<T> + ?Sized,
    {
        self.table.check_index(mask_index)?;

        let pass_index = self.next_pass;
        self.next_pass += 1;
        self.state = PassState::Ready;
        log::debug!(
            "ensemble pass {pass_index} start: mask_index={mask_index} num_masks={} weights={}",
            self.table.num_masks(),
            weights.len()
        );

        let layout = self.layout;
        let state = &mut self.state;
        let result = run_chunks(
            layout,
            input,
            output,
            |chunk| *state = PassState::Streaming { chunk },
            |_, value: T| Ok((value, true)),
        );

        match result {
            Ok((kept, dropped)) => {
                self.state = PassState::Drained;
                Ok(PassSummary {
                    pass_index,
                    chunks: layout.num_chunks(),
                    kept,
                    dropped,
                })
            }
            Err(e) => {
                self.state = PassState::Aborted;
                log::warn!("ensemble pass {pass_index} aborted: {e}");
                Err(e)
            }
        }
    }
}
