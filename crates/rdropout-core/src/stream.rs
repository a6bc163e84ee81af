//! ストリーム端点とチャンクループ
//!
//! 入出力はチャンク単位で原子的かつ順序保存。読み込みと書き込みだけが
//! 呼び出し側をブロックしうる地点で、それ以外の共有資源は待たない。

use crate::config::ChunkLayout;
use crate::error::{RegularizerError, RegularizerResult};
use std::collections::VecDeque;

/// 端点側のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// チャンクの供給元
pub trait ChunkSource<T> {
    /// 次のチャンクを取得。終端なら None
    ///
    /// ブロッキング実装はデータが来るまで待ってよい。
    fn read_chunk(&mut self) -> Option<Vec<T>>;
}

/// チャンクの出力先
pub trait ChunkSink<T> {
    /// チャンクを書き込む。受け手が閉じていれば `Disconnected`
    fn write_chunk(&mut self, chunk: Vec<T>) -> Result<(), Disconnected>;
}

impl<T> ChunkSource<T> for VecDeque<Vec<T>> {
    fn read_chunk(&mut self) -> Option<Vec<T>> {
        self.pop_front()
    }
}

impl<T> ChunkSink<T> for Vec<Vec<T>> {
    fn write_chunk(&mut self, chunk: Vec<T>) -> Result<(), Disconnected> {
        self.push(chunk);
        Ok(())
    }
}

impl<T> ChunkSource<T> for crossbeam_channel::Receiver<Vec<T>> {
    fn read_chunk(&mut self) -> Option<Vec<T>> {
        self.recv().ok()
    }
}

impl<T> ChunkSink<T> for crossbeam_channel::Sender<Vec<T>> {
    fn write_chunk(&mut self, chunk: Vec<T>) -> Result<(), Disconnected> {
        self.send(chunk).map_err(|_| Disconnected)
    }
}

impl<T> ChunkSource<T> for std::sync::mpsc::Receiver<Vec<T>> {
    fn read_chunk(&mut self) -> Option<Vec<T>> {
        self.recv().ok()
    }
}

impl<T> ChunkSink<T> for std::sync::mpsc::Sender<Vec<T>> {
    fn write_chunk(&mut self, chunk: Vec<T>) -> Result<(), Disconnected> {
        self.send(chunk).map_err(|_| Disconnected)
    }
}

/// スライスを固定幅チャンクとして読む供給元（配列形式の入力用）
pub struct SliceSource<'a, T> {
    chunks: std::slice::Chunks<'a, T>,
}

impl<'a, T> SliceSource<'a, T> {
    pub fn new(data: &'a [T], vector_width: usize) -> Self {
        Self {
            chunks: data.chunks(vector_width),
        }
    }
}

impl<T: Copy> ChunkSource<T> for SliceSource<'_, T> {
    fn read_chunk(&mut self) -> Option<Vec<T>> {
        self.chunks.next().map(<[T]>::to_vec)
    }
}

/// 可変スライスへ順に書き込む出力先（配列形式の出力用）
pub struct SliceSink<'a, T> {
    out: &'a mut [T],
    pos: usize,
}

impl<'a, T> SliceSink<'a, T> {
    pub fn new(out: &'a mut [T]) -> Self {
        Self { out, pos: 0 }
    }
}

impl<T: Copy> ChunkSink<T> for SliceSink<'_, T> {
    fn write_chunk(&mut self, chunk: Vec<T>) -> Result<(), Disconnected> {
        let end = self.pos + chunk.len();
        if end > self.out.len() {
            return Err(Disconnected);
        }
        self.out[self.pos..end].copy_from_slice(&chunk);
        self.pos = end;
        Ok(())
    }
}

/// 1 パスの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// パス番号（0 始まり）
    pub pass_index: u64,
    /// 処理したチャンク数
    pub chunks: usize,
    /// 値が残った要素数
    pub kept: usize,
    /// 加法単位元に置き換えた要素数
    pub dropped: usize,
}

/// チャンクループ
///
/// `layout.num_chunks()` 個のチャンクをちょうど読み、要素ごとに `element` を
/// インデックス順に適用して 1 チャンクずつ書き出す。`element` は
/// `(平坦化インデックス, 値)` を受け取り `(出力値, 保持したか)` を返す。
///
/// スループット契約: 1 チャンク入力につき 1 チャンク出力。チャンク i の出力は
/// 全要素の判定が終わるまで書き出さず、チャンク i+1 はチャンク i を書き出した後に
/// 読む。バッファは 1 チャンク分のみ。
///
/// `on_chunk` はチャンクを読む直前に呼ばれる（状態遷移の記録用）。
pub(crate) fn run_chunks<T, S, K, F, C>(
    layout: ChunkLayout,
    input: &mut S,
    output: &mut K,
    mut on_chunk: C,
    mut element: F,
) -> RegularizerResult<(usize, usize)>
where
    T: Copy,
    S: ChunkSource<T> + ?Sized,
    K: ChunkSink<T> + ?Sized,
    F: FnMut(usize, T) -> RegularizerResult<(T, bool)>,
    C: FnMut(usize),
{
    let expected = layout.num_chunks();
    let width = layout.vector_width();
    let mut kept = 0;
    let mut dropped = 0;

    for i in 0..expected {
        on_chunk(i);
        let mut chunk = input.read_chunk().ok_or(RegularizerError::StreamUnderrun {
            expected,
            received: i,
        })?;
        if chunk.len() != width {
            return Err(RegularizerError::ChunkWidth {
                index: i,
                expected: width,
                actual: chunk.len(),
            });
        }

        let base = i * width;
        for (j, value) in chunk.iter_mut().enumerate() {
            let (out, is_kept) = element(base + j, *value)?;
            *value = out;
            if is_kept {
                kept += 1;
            } else {
                dropped += 1;
            }
        }

        output
            .write_chunk(chunk)
            .map_err(|Disconnected| RegularizerError::OutputClosed { index: i })?;
    }

    Ok((kept, dropped))
}
