//! ストリーミング規約の統合テスト

use rdropout_core::{
    ChunkLayout, EnsembleConfig, EnsembleMasker, Fixed16, FixedPoint, KeepRate, MaskTable,
    PassState, PolicyKind, RegularizerConfig, RegularizerError, StreamingRegularizer,
};
use std::collections::VecDeque;
use std::thread;

type Q = Fixed16<10>;

fn q(v: f64) -> Q {
    Q::from_f64_saturating(v)
}

fn chunks_of(values: &[Q], width: usize) -> VecDeque<Vec<Q>> {
    values.chunks(width).map(<[Q]>::to_vec).collect()
}

/// Identity: 出力チャンクは入力チャンクと完全一致し、順序も保たれる
#[test]
fn test_identity_preserves_chunks_in_order() {
    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 6,
        vector_width: 3,
        policy: PolicyKind::Identity,
        ..Default::default()
    })
    .unwrap();

    let mut input: VecDeque<Vec<i32>> = VecDeque::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
    let mut output: Vec<Vec<i32>> = Vec::new();
    let summary = reg.process(&mut input, &mut output).unwrap();

    assert_eq!(output, vec![vec![1, 2, 3], vec![4, 5, 6]]);
    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.dropped, 0);
    assert_eq!(reg.rng().draws(), 0, "Identity must not draw");
}

/// ReluGated: [-2, 0, 3, -1] → [0, 0, 3, 0]
#[test]
fn test_relu_gated_scenario() {
    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 4,
        vector_width: 4,
        policy: PolicyKind::ReluGated,
        ..Default::default()
    })
    .unwrap();

    let mut input: VecDeque<Vec<i16>> = VecDeque::from(vec![vec![-2, 0, 3, -1]]);
    let mut output: Vec<Vec<i16>> = Vec::new();
    let summary = reg.process(&mut input, &mut output).unwrap();

    assert_eq!(output, vec![vec![0, 0, 3, 0]]);
    assert_eq!(summary.kept, 1);
    assert_eq!(summary.dropped, 3);
}

/// keep_rate = 1.0 の BernoulliDropout はどのシードでも恒等変換
#[test]
fn test_keep_rate_one_is_identity_for_any_seed() {
    let values: Vec<Q> = (0..10).map(|i| q(i as f64 * 0.75 - 3.0)).collect();
    for seed in [0u64, 1, 42, 0xFFFF_FFFF_FFFF_FFFF] {
        let mut reg = StreamingRegularizer::new(RegularizerConfig {
            n_in: 10,
            vector_width: 5,
            keep_rate: Some(1.0),
            seed,
            policy: PolicyKind::BernoulliDropout,
            ..Default::default()
        })
        .unwrap();
        let mut input = chunks_of(&values, 5);
        let mut output: Vec<Vec<Q>> = Vec::new();
        reg.process(&mut input, &mut output).unwrap();
        assert_eq!(output.concat(), values, "seed {seed}");
    }
}

/// keep_rate = 0.0 なら全要素が加法単位元
#[test]
fn test_keep_rate_zero_drops_everything() {
    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 8,
        vector_width: 2,
        drop_rate: Some(1.0),
        seed: 9,
        policy: PolicyKind::BernoulliDropout,
        ..Default::default()
    })
    .unwrap();
    let data = [5i32; 8];
    let mut res = [1i32; 8];
    let summary = reg.process_array(&data, &mut res).unwrap();
    assert_eq!(res, [0; 8]);
    assert_eq!(summary.dropped, 8);
}

/// ちょうど n_in / vector_width 個で成功し、1 個少ないと StreamUnderrun
#[test]
fn test_chunk_count_contract() {
    let config = RegularizerConfig {
        n_in: 12,
        vector_width: 4,
        keep_rate: Some(0.5),
        seed: 1,
        policy: PolicyKind::BernoulliDropout,
        ..Default::default()
    };

    let mut reg = StreamingRegularizer::new(config.clone()).unwrap();
    let mut exact: VecDeque<Vec<i16>> = (0..4).map(|_| vec![1i16; 4]).collect();
    let mut output: Vec<Vec<i16>> = Vec::new();
    reg.process(&mut exact, &mut output).unwrap();
    assert_eq!(output.len(), 3);
    assert_eq!(exact.len(), 1, "must not consume more than 3 chunks");

    let mut reg = StreamingRegularizer::new(config).unwrap();
    let mut short: VecDeque<Vec<i16>> = (0..2).map(|_| vec![1i16; 4]).collect();
    let mut output: Vec<Vec<i16>> = Vec::new();
    let err = reg.process(&mut short, &mut output).unwrap_err();
    assert!(matches!(
        err,
        RegularizerError::StreamUnderrun {
            expected: 3,
            received: 2
        }
    ));
    assert_eq!(reg.state(), PassState::Aborted);
}

/// 同じシードなら別インスタンスでも同じ出力
#[test]
fn test_bernoulli_is_reproducible_across_instances() {
    let config = RegularizerConfig {
        n_in: 64,
        vector_width: 8,
        keep_rate: Some(0.7),
        seed: 2024,
        policy: PolicyKind::BernoulliDropout,
        ..Default::default()
    };
    let values: Vec<Q> = (0..64).map(|i| q((i % 13) as f64 * 0.25)).collect();

    let run = || {
        let mut reg = StreamingRegularizer::new(config.clone()).unwrap();
        let mut input = chunks_of(&values, 8);
        let mut output: Vec<Vec<Q>> = Vec::new();
        reg.process(&mut input, &mut output).unwrap();
        output
    };
    assert_eq!(run(), run());
}

/// 出力要素は 0 か input * (1 / keep_rate) のいずれか
#[test]
fn test_bernoulli_outputs_zero_or_rescaled() {
    let keep = KeepRate::from_f64(0.8).unwrap();
    let factor = keep.rescale_factor().unwrap();
    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 40,
        vector_width: 10,
        keep_rate: Some(0.8),
        seed: 31337,
        policy: PolicyKind::BernoulliDropout,
        ..Default::default()
    })
    .unwrap();

    let values: Vec<Q> = (0..40).map(|i| q(i as f64 * 0.5 - 10.0)).collect();
    let mut res = vec![Q::zero(); 40];
    let summary = reg.process_array(&values, &mut res).unwrap();

    for (x, y) in values.iter().zip(&res) {
        let rescaled = factor.apply(*x).unwrap();
        assert!(*y == Q::zero() || *y == rescaled, "{x:?} -> {y:?}");
    }
    assert_eq!(summary.kept + summary.dropped, 40);
}

/// 事前計算マスクは平坦化インデックスで参照される
#[test]
fn test_precomputed_mask_uses_flattened_index() {
    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 12,
        vector_width: 3,
        keep_rate: Some(0.5),
        seed: 8,
        policy: PolicyKind::PrecomputedMaskDropout,
        ..Default::default()
    })
    .unwrap();

    // 全チャンク同じ値にしておけば、出力の違いはマスク位置だけで決まる
    let mut input: VecDeque<Vec<i32>> = (0..4).map(|_| vec![3, 3, 3]).collect();
    let mut output: Vec<Vec<i32>> = Vec::new();
    reg.process(&mut input, &mut output).unwrap();

    let mask = reg.precomputed_mask().unwrap();
    for (k, value) in output.concat().iter().enumerate() {
        let expected = if mask[k] { 6 } else { 0 };
        assert_eq!(*value, expected, "flattened index {k}");
    }
}

/// rescale = false なら保持要素は入力のまま
#[test]
fn test_dropout_without_rescale() {
    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 16,
        vector_width: 4,
        drop_rate: Some(0.1),
        seed: 4,
        policy: PolicyKind::BernoulliDropout,
        rescale: false,
        ..Default::default()
    })
    .unwrap();
    let data = [7i16; 16];
    let mut res = [0i16; 16];
    reg.process_array(&data, &mut res).unwrap();
    assert!(res.iter().all(|&v| v == 0 || v == 7));
}

/// ブロッキングするチャネル端点（別スレッドの producer / consumer）
#[test]
fn test_channel_endpoints_across_threads() {
    let layout = ChunkLayout::new(32, 4).unwrap();
    let (in_tx, mut in_rx) = crossbeam_channel::bounded::<Vec<i32>>(1);
    let (mut out_tx, out_rx) = crossbeam_channel::bounded::<Vec<i32>>(1);

    let producer = thread::spawn(move || {
        for i in 0..layout.num_chunks() as i32 {
            in_tx.send(vec![i; 4]).unwrap();
        }
    });
    let consumer = thread::spawn(move || out_rx.iter().collect::<Vec<_>>());

    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 32,
        vector_width: 4,
        policy: PolicyKind::ReluGated,
        ..Default::default()
    })
    .unwrap();
    reg.process(&mut in_rx, &mut out_tx).unwrap();
    drop(out_tx);

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    assert_eq!(received.len(), 8);
    for (i, chunk) in received.iter().enumerate() {
        assert_eq!(chunk, &vec![i as i32; 4]);
    }
}

/// producer が途中で閉じたら StreamUnderrun
#[test]
fn test_closed_producer_underruns() {
    let (tx, mut rx) = std::sync::mpsc::channel::<Vec<i16>>();
    tx.send(vec![1, 2]).unwrap();
    drop(tx);

    let mut reg = StreamingRegularizer::new(RegularizerConfig {
        n_in: 4,
        vector_width: 2,
        ..Default::default()
    })
    .unwrap();
    let mut output: Vec<Vec<i16>> = Vec::new();
    let err = reg.process(&mut rx, &mut output).unwrap_err();
    assert!(matches!(err, RegularizerError::StreamUnderrun { .. }));
    assert_eq!(output, vec![vec![1, 2]]);
}

/// EnsembleMasker は幅と順序を保ったまま通過させる
#[test]
fn test_ensemble_identity_pass_through() {
    let table = MaskTable::from_binary_rows(&[vec![1, 0, 1, 0, 1, 0], vec![0, 1, 0, 1, 0, 1]], 6)
        .unwrap();
    let mut masker = EnsembleMasker::new(
        EnsembleConfig {
            n_in: 6,
            vector_width: 2,
            num_masks: 2,
            scale: 2.0,
        },
        table,
    )
    .unwrap();

    let values: Vec<Q> = [-1.0, 0.5, 2.0, -0.25, 0.0, 3.0].iter().map(|&v| q(v)).collect();
    for mask_index in 0..2 {
        let mut input = chunks_of(&values, 2);
        let mut output: Vec<Vec<Q>> = Vec::new();
        let weights = vec![Q::zero(); 6];
        masker.process(&mut input, &mut output, &weights, mask_index).unwrap();
        assert_eq!(output.len(), 3);
        assert!(output.iter().all(|c| c.len() == 2));
        assert_eq!(output.concat(), values);
    }
}
