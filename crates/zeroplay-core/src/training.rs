//! 学習データ（1手ごとのサンプル）と終局後の確定処理
//!
//! 対局中は結果と残り手数が未確定のままサンプルを積み、終局時に
//! [`finalize_chunks`] で一括して埋めてから [`TrainingDataWriter`] に渡す。

use std::io::Write;

use serde::Serialize;

use crate::board::{FillEmptyHistory, InputFormat, Position};
use crate::search::BestEval;
use crate::tree::GameTree;
use crate::types::{Color, GameResult};

/// サンプル形式のバージョン
pub const TRAINING_DATA_VERSION: u32 = 1;

/// 学習データに含める履歴局面数
pub const TRAINING_HISTORY_PLANES: usize = 8;

/// 方策ターゲットの1要素（head の各エッジの訪問割合）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyEntry {
    /// 絶対表現の指し手
    #[serde(rename = "move")]
    pub mv: String,
    pub probability: f32,
}

/// 1手分の学習サンプル
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingChunk {
    pub version: u32,
    pub input_format: InputFormat,
    /// 入力プレーンのマスク
    pub planes: Vec<u64>,
    pub policy: Vec<PolicyEntry>,
    /// Classical 形式では黒番なら 1
    pub side_to_move_or_enpassant: u8,
    /// 下位ビットは幾何変換。Canonical 形式では bit 7 が黒番。
    pub invariance_info: u8,
    /// 手番側から見た対局結果（終局時に確定）
    pub result: i8,
    pub best_q: f32,
    pub best_d: f32,
    pub best_m: f32,
    /// 終局までの残り手数（終局時に確定）
    pub plies_left: f32,
    pub visits: u64,
}

impl TrainingChunk {
    /// 木の head からサンプルを作る。結果と残り手数は未確定。
    pub fn from_tree<P: Position>(
        tree: &GameTree<P>,
        input_format: InputFormat,
        fill: FillEmptyHistory,
        eval: BestEval,
    ) -> Self {
        let black = tree.is_black_to_move();
        let encoded = tree.position_history().encode_for_nn(
            input_format,
            TRAINING_HISTORY_PLANES,
            fill,
        );

        let head = tree.current_head();
        let visits = head.total_visits();
        let policy = head
            .edges()
            .iter()
            .map(|edge| PolicyEntry {
                mv: edge.get_move(black).to_string(),
                probability: if visits == 0 {
                    0.0
                } else {
                    edge.visits() as f32 / visits as f32
                },
            })
            .collect();

        let (side_to_move_or_enpassant, invariance_info) = match input_format {
            InputFormat::Classical => (u8::from(black), encoded.transform),
            InputFormat::Canonical => (0, encoded.transform | (u8::from(black) << 7)),
        };

        Self {
            version: TRAINING_DATA_VERSION,
            input_format,
            planes: encoded.planes.iter().map(|p| p.mask).collect(),
            policy,
            side_to_move_or_enpassant,
            invariance_info,
            result: 0,
            best_q: eval.wl,
            best_d: eval.d,
            best_m: eval.ml,
            plies_left: 0.0,
            visits,
        }
    }

    /// サンプル局面の手番
    pub fn side_to_move(&self) -> Color {
        let black = match self.input_format {
            InputFormat::Classical => self.side_to_move_or_enpassant != 0,
            InputFormat::Canonical => self.invariance_info & 0x80 != 0,
        };
        if black { Color::Black } else { Color::White }
    }
}

/// 終局結果と残り手数をサンプルに書き込む。
///
/// 残り手数は最終サンプルの推定残り手数から、先頭に向かって1ずつ増える。
pub fn finalize_chunks(chunks: &mut [TrainingChunk], result: GameResult) {
    let Some(last) = chunks.last() else {
        return;
    };
    let mut m = last.best_m + chunks.len() as f32 - 1.0;
    for chunk in chunks.iter_mut() {
        chunk.plies_left = m;
        m -= 1.0;
        chunk.result = result.score_for(chunk.side_to_move());
    }
}

/// 学習データの出力先
pub trait TrainingDataWriter {
    fn write_chunk(&mut self, chunk: &TrainingChunk) -> anyhow::Result<()>;

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 1行1サンプルの JSON Lines で書き出す
pub struct JsonlTrainingWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> JsonlTrainingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> TrainingDataWriter for JsonlTrainingWriter<W> {
    fn write_chunk(&mut self, chunk: &TrainingChunk) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.inner, chunk)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// メモリに溜めるだけの出力先
impl TrainingDataWriter for Vec<TrainingChunk> {
    fn write_chunk(&mut self, chunk: &TrainingChunk) -> anyhow::Result<()> {
        self.push(chunk.clone());
        Ok(())
    }
}
