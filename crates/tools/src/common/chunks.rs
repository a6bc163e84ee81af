//! チャンク列ファイル（JSON）と設定ファイル（TOML）
//!
//! 入力: 実数の二次元配列 `[[x00, x01, ...], [x10, ...], ...]`（1 行 = 1 チャンク）
//! 出力: パスごとの集計と変換後のチャンク列

use super::io::{open_reader, open_writer};
use anyhow::{Context, Result};
use rdropout_core::{EnsembleConfig, Fixed16, FixedPoint, MaskTable, PassSummary};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::path::Path;

/// ツールで使う要素型（整数部 6bit / 小数部 10bit）
pub type Sample = Fixed16<10>;

/// 実数のチャンク列を固定小数点へ変換（範囲外は飽和）
pub fn to_fixed(chunks: &[Vec<f64>]) -> VecDeque<Vec<Sample>> {
    chunks
        .iter()
        .map(|chunk| chunk.iter().map(|&v| Sample::from_f64_saturating(v)).collect())
        .collect()
}

/// 固定小数点のチャンク列を実数へ変換
pub fn to_real(chunks: &[Vec<Sample>]) -> Vec<Vec<f64>> {
    chunks
        .iter()
        .map(|chunk| chunk.iter().map(|v| v.to_f64()).collect())
        .collect()
}

/// チャンク列を読み込む
pub fn read_chunks(path: &Path) -> Result<Vec<Vec<f64>>> {
    let reader = open_reader(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(reader).with_context(|| format!("parse {}", path.display()))
}

/// 1 パスの出力
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PassOutput {
    pub pass_index: u64,
    pub kept: usize,
    pub dropped: usize,
    pub chunks: Vec<Vec<f64>>,
}

impl PassOutput {
    pub fn new(summary: PassSummary, chunks: &[Vec<Sample>]) -> Self {
        Self {
            pass_index: summary.pass_index,
            kept: summary.kept,
            dropped: summary.dropped,
            chunks: to_real(chunks),
        }
    }
}

/// 全パスの出力を書き出す
pub fn write_passes(path: &Path, passes: &[PassOutput]) -> Result<()> {
    let mut w = open_writer(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(&mut w, passes)?;
    writeln!(w)?;
    w.close()?;
    Ok(())
}

/// TOML ファイルを文字列として読む
pub fn read_text(path: &Path) -> Result<String> {
    let mut s = String::new();
    open_reader(path)
        .with_context(|| format!("open {}", path.display()))?
        .read_to_string(&mut s)?;
    Ok(s)
}

/// Masksembles 用の設定ファイル
///
/// ```toml
/// masks = [[1, 0, 1, 0], [0, 1, 0, 1]]
///
/// [layer]
/// n_in = 4
/// vector_width = 2
/// num_masks = 2
/// scale = 2.0
/// ```
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct EnsembleFile {
    pub masks: Vec<Vec<u8>>,
    pub layer: EnsembleConfig,
}

impl EnsembleFile {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn mask_table(&self) -> Result<MaskTable> {
        Ok(MaskTable::from_binary_rows(&self.masks, self.layer.n_in)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed_saturates() {
        let fixed = to_fixed(&[vec![1.5, -0.25], vec![64.0, -64.0]]);
        assert_eq!(fixed[0], vec![Sample::from_bits(1536), Sample::from_bits(-256)]);
        assert_eq!(fixed[1], vec![Sample::from_bits(i16::MAX), Sample::from_bits(i16::MIN)]);
        let real = to_real(&[fixed[0].clone()]);
        assert_eq!(real, vec![vec![1.5, -0.25]]);
    }

    #[test]
    fn test_ensemble_file() {
        let file = EnsembleFile::parse(
            r#"
            masks = [[1, 0, 1, 0], [0, 1, 0, 1]]

            [layer]
            n_in = 4
            vector_width = 2
            num_masks = 2
            scale = 2.0
            "#,
        )
        .unwrap();
        let table = file.mask_table().unwrap();
        assert_eq!(table.num_masks(), 2);
        assert_eq!(table.row(1).unwrap(), &[false, true, false, true]);
    }

    #[test]
    fn test_write_and_read_passes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        std::fs::write(&input, "[[1.0, -2.0], [0.5, 0.0]]").unwrap();
        let chunks = read_chunks(&input).unwrap();
        assert_eq!(chunks.len(), 2);

        let output = dir.path().join("out.json");
        let pass = PassOutput {
            pass_index: 0,
            kept: 4,
            dropped: 0,
            chunks,
        };
        write_passes(&output, std::slice::from_ref(&pass)).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        let parsed: Vec<PassOutput> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, vec![pass]);
    }
}
