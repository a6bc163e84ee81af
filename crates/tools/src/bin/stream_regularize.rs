//! チャンク列にドロップアウト / Masksembles を適用するツール
//!
//! ```bash
//! # 同じ入力に 8 パス分のドロップアウトを適用（MC dropout の推論サンプル）
//! cargo run -p tools --bin stream_regularize -- dropout \
//!     --config dropout.toml --input act.json --output out.json --passes 8
//!
//! # Masksembles（マスク 1 番）
//! cargo run -p tools --bin stream_regularize -- ensemble \
//!     --config masks.toml --input act.json.gz --output out.json --mask-index 1
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rdropout_core::{EnsembleMasker, FixedPoint, RegularizerConfig, StreamingRegularizer};
use std::path::PathBuf;
use tools::common::chunks::{
    EnsembleFile, PassOutput, Sample, read_chunks, read_text, to_fixed, write_passes,
};

#[derive(Parser)]
#[command(
    name = "stream_regularize",
    version,
    about = "固定小数点チャンク列に推論時ドロップアウト / Masksembles を適用する"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// StreamingRegularizer を複数パス実行する
    Dropout {
        /// レイヤー設定（TOML）
        #[arg(long)]
        config: PathBuf,
        /// 入力チャンク列（JSON、.gz 可）
        #[arg(long)]
        input: PathBuf,
        /// 出力ファイル（"-" で標準出力）
        #[arg(long, default_value = "-")]
        output: PathBuf,
        /// パス数
        #[arg(long, default_value_t = 1)]
        passes: u64,
    },
    /// EnsembleMasker を 1 パス実行する
    Ensemble {
        /// マスク表とレイヤー設定（TOML）
        #[arg(long)]
        config: PathBuf,
        /// 入力チャンク列（JSON、.gz 可）
        #[arg(long)]
        input: PathBuf,
        /// 出力ファイル（"-" で標準出力）
        #[arg(long, default_value = "-")]
        output: PathBuf,
        /// 使うマスクの行番号
        #[arg(long, default_value_t = 0)]
        mask_index: usize,
    },
}

fn run_dropout(config: PathBuf, input: PathBuf, output: PathBuf, passes: u64) -> Result<()> {
    if passes == 0 {
        bail!("--passes must be >= 1");
    }
    let text = read_text(&config)?;
    let config = RegularizerConfig::from_toml_str(&text)
        .with_context(|| format!("parse {}", config.display()))?;
    let mut reg = StreamingRegularizer::new(config)?;
    let layout = reg.layout();
    log::info!(
        "policy={} n_in={} vector_width={} chunks={}",
        reg.policy().kind(),
        layout.n_in(),
        layout.vector_width(),
        layout.num_chunks()
    );

    let chunks = read_chunks(&input)?;
    let fixed = to_fixed(&chunks);

    let mut results = Vec::with_capacity(passes as usize);
    for _ in 0..passes {
        let mut source = fixed.clone();
        let mut sink: Vec<Vec<Sample>> = Vec::with_capacity(layout.num_chunks());
        let summary = reg.process(&mut source, &mut sink)?;
        if !source.is_empty() {
            log::warn!("{} trailing chunk(s) left unread", source.len());
        }
        results.push(PassOutput::new(summary, &sink));
    }

    write_passes(&output, &results)
}

fn run_ensemble(config: PathBuf, input: PathBuf, output: PathBuf, mask_index: usize) -> Result<()> {
    let text = read_text(&config)?;
    let file = EnsembleFile::parse(&text).with_context(|| format!("parse {}", config.display()))?;
    let table = file.mask_table()?;
    log::info!(
        "mask_index={mask_index} kept_fraction={:.3}",
        table.kept_fraction(mask_index)?
    );
    let mut masker = EnsembleMasker::new(file.layer, table)?;

    let chunks = read_chunks(&input)?;
    let mut source = to_fixed(&chunks);
    let mut sink: Vec<Vec<Sample>> = Vec::new();
    let weights = vec![Sample::zero(); masker.layout().n_in()];
    let summary = masker.process(&mut source, &mut sink, &weights, mask_index)?;

    write_passes(&output, &[PassOutput::new(summary, &sink)])
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Dropout {
            config,
            input,
            output,
            passes,
        } => run_dropout(config, input, output, passes),
        Cmd::Ensemble {
            config,
            input,
            output,
            mask_index,
        } => run_ensemble(config, input, output, mask_index),
    }
}
