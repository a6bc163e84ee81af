//! StreamingRegularizer
//!
//! 入力ストリームからチャンクを読み、MaskPolicy を要素ごとに適用して
//! 同じ順序・同じ幅で出力ストリームへ書き出す。
//!
//! # 状態遷移
//!
//! ```text
//! Constructed ─┐
//!              ├─ begin_pass ─→ Ready ─→ Streaming{0} ─→ … ─→ Streaming{n-1} ─→ Drained
//! Drained ─────┤                                  │
//! Aborted ─────┘                                  └─ エラー ─→ Aborted
//! ```
//!
//! パスごとに RNG をパス番号のサブストリーム先頭へ移動し、
//! PrecomputedMaskDropout では最初のチャンクを読む前にマスク全体を確定する。

use crate::config::{ChunkLayout, RegularizerConfig};
use crate::error::{ConfigError, RegularizerError, RegularizerResult};
use crate::fixed::FixedPoint;
use crate::policy::MaskPolicy;
use crate::rng::FixedPointRng;
use crate::stream::{ChunkSink, ChunkSource, PassSummary, SliceSink, SliceSource, run_chunks};

/// パスの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// 構築直後
    Constructed,
    /// RNG / マスクの初期化済み、最初のチャンク待ち
    Ready,
    /// チャンク `chunk` を処理中
    Streaming { chunk: usize },
    /// 全チャンクを出力済み
    Drained,
    /// エラーで中断
    Aborted,
}

/// ストリーミング正則化器
#[derive(Debug, Clone)]
pub struct StreamingRegularizer {
    config: RegularizerConfig,
    layout: ChunkLayout,
    policy: MaskPolicy,
    rng: FixedPointRng,
    /// PrecomputedMaskDropout のパスマスク（長さ n_in）
    mask: Vec<bool>,
    state: PassState,
    next_pass: u64,
}

impl StreamingRegularizer {
    /// 設定を検証して構築
    pub fn new(config: RegularizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = config.layout()?;
        let policy = config.mask_policy()?;
        let rng = FixedPointRng::new(config.seed, config.rng_bits)?;
        let mask = if policy.precomputes_mask() {
            Vec::with_capacity(layout.n_in())
        } else {
            Vec::new()
        };
        Ok(Self {
            config,
            layout,
            policy,
            rng,
            mask,
            state: PassState::Constructed,
            next_pass: 0,
        })
    }

    pub fn config(&self) -> &RegularizerConfig {
        &self.config
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn policy(&self) -> &MaskPolicy {
        &self.policy
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn rng(&self) -> &FixedPointRng {
        &self.rng
    }

    /// 次に開始するパスの番号
    pub fn next_pass_index(&self) -> u64 {
        self.next_pass
    }

    /// 現在のパスマスク（PrecomputedMaskDropout 以外は None）
    pub fn precomputed_mask(&self) -> Option<&[bool]> {
        if self.policy.precomputes_mask() && self.state != PassState::Constructed {
            Some(&self.mask)
        } else {
            None
        }
    }

    /// パス 0 からやり直す
    pub fn reset(&mut self) {
        self.rng.restart();
        self.mask.clear();
        self.next_pass = 0;
        self.state = PassState::Constructed;
    }

    /// パスの初期化（RNG の位置決めとマスクの事前計算）
    fn begin_pass(&mut self) -> u64 {
        let pass_index = self.next_pass;
        self.next_pass += 1;
        self.rng.begin_pass(pass_index);

        if let MaskPolicy::PrecomputedMaskDropout(rule) = &self.policy {
            let max = self.rng.max();
            let keep = rule.keep_rate();
            self.mask.clear();
            for _ in 0..self.layout.n_in() {
                self.mask.push(keep.admits(self.rng.draw(), max));
            }
        }

        log::debug!(
            "pass {pass_index} start: policy={} n_in={} vector_width={} seed={}",
            self.policy.kind(),
            self.layout.n_in(),
            self.layout.vector_width(),
            self.rng.seed()
        );
        self.state = PassState::Ready;
        pass_index
    }

    /// 1 パスを処理する
    ///
    /// `n_in / vector_width` 個のチャンクをちょうど読み、1 チャンクにつき 1 チャンクを
    /// 同じ順序で書き出す。入力が途中で終端した場合は `StreamUnderrun` で中断し、
    /// パディングや巻き戻しはしない。
    pub fn process<T, S, K>(&mut self, input: &mut S, output: &mut K) -> RegularizerResult<PassSummary>
    where
        T: FixedPoint,
        S: ChunkSource<T> + ?Sized,
        K: ChunkSink<T> + ?Sized,
    {
        let pass_index = self.begin_pass();

        let layout = self.layout;
        let policy = self.policy;
        let max = self.rng.max();
        let rng = &mut self.rng;
        let mask = &self.mask;
        let state = &mut self.state;

        let result = run_chunks(
            layout,
            input,
            output,
            |chunk| *state = PassState::Streaming { chunk },
            |k, value: T| {
                let decision = match &policy {
                    MaskPolicy::Identity | MaskPolicy::ReluGated => policy.decide_value(value),
                    MaskPolicy::BernoulliDropout(rule) => rule.decide_draw(rng.draw(), max),
                    MaskPolicy::PrecomputedMaskDropout(rule) => rule.decide_flag(mask[k]),
                };
                Ok((decision.apply(value, k)?, decision.is_kept()))
            },
        );

        match result {
            Ok((kept, dropped)) => {
                self.state = PassState::Drained;
                let summary = PassSummary {
                    pass_index,
                    chunks: layout.num_chunks(),
                    kept,
                    dropped,
                };
                log::info!(
                    "pass {pass_index} drained: chunks={} kept={kept} dropped={dropped}",
                    summary.chunks
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = PassState::Aborted;
                log::warn!("pass {pass_index} aborted: {e}");
                Err(e)
            }
        }
    }

    /// 配列形式の 1 パス
    ///
    /// `data` / `res` はどちらも長さ `n_in`。チャンクループは `process` と共通。
    pub fn process_array<T: FixedPoint>(
        &mut self,
        data: &[T],
        res: &mut [T],
    ) -> RegularizerResult<PassSummary> {
        let n_in = self.layout.n_in();
        for len in [data.len(), res.len()] {
            if len != n_in {
                return Err(RegularizerError::LengthMismatch {
                    expected: n_in,
                    actual: len,
                });
            }
        }
        let mut input = SliceSource::new(data, self.layout.vector_width());
        let mut output = SliceSink::new(res);
        self.process(&mut input, &mut output)
    }
}
