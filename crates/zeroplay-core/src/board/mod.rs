//! 盤面レイヤーとのインターフェース
//!
//! 局面表現・合法手生成・終局判定は外部実装に委ねる。自己対局レイヤーが
//! 必要とするのは [`Position`] と [`GameMove`] の2つのトレイトだけである。
//!
//! 指し手は2種類の表現を持つ:
//! - 絶対表現: コールバックや定跡・ログに現れる、盤面に固定された表記
//! - 手番相対表現: 探索木のエッジと [`Position::play`] が扱う、手番側から見た表記
//!
//! 黒番の局面では `mirrored()` で両者を相互に変換する。

mod encoding;
pub mod tictactoe;

use std::fmt;
use std::hash::Hash;

pub use encoding::{EncodedPosition, FillEmptyHistory, InputFormat, InputPlane, InputPlanes};

use crate::error::Result;
use crate::types::{Color, GameResult};

/// 指し手
pub trait GameMove: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// 盤面を上下反転した指し手（絶対表現 <-> 手番相対表現）
    fn mirrored(self) -> Self;

    /// 指定した手番の局面で、絶対表現を手番相対表現に変換する
    #[inline]
    fn relative_to(self, side: Color) -> Self {
        if side.is_black() { self.mirrored() } else { self }
    }
}

/// 局面
pub trait Position: Clone + Send + Sync + 'static {
    type Move: GameMove;

    /// 局面文字列から構築する
    fn from_fen(fen: &str) -> Result<Self>;

    /// 局面文字列へ変換する
    fn to_fen(&self) -> String;

    /// 開始局面からの手数（ply）
    fn game_ply(&self) -> u32;

    #[inline]
    fn side_to_move(&self) -> Color {
        Color::from_ply(self.game_ply())
    }

    #[inline]
    fn is_black_to_move(&self) -> bool {
        self.side_to_move().is_black()
    }

    /// 合法手（手番相対表現）
    fn legal_moves(&self) -> Vec<Self::Move>;

    /// 手番相対表現の指し手を適用した局面を返す
    fn play(&self, mv: Self::Move) -> Self;

    /// どちらの手番にもキャスリング権が残っていない
    fn no_legal_castle(&self) -> bool;

    /// 盤上の駒数
    fn piece_count(&self) -> u32;

    /// 代替キャスリング表記（キングがルークを取る形式）の指し手を従来表記に変換する。
    /// 引数・戻り値とも手番相対表現。キャスリングの無いゲームではそのまま返す。
    fn legacy_move(&self, mv: Self::Move) -> Self::Move {
        mv
    }

    /// 履歴全体から規則上の終局判定を行う（詰み・ステイルメイト・千日手・手数制限など）
    fn compute_game_result(history: &[Self]) -> GameResult;

    /// 履歴をネットワーク入力にエンコードする
    fn encode_for_nn(
        history: &[Self],
        format: InputFormat,
        history_planes: usize,
        fill: FillEmptyHistory,
    ) -> EncodedPosition;
}

/// 開始局面から現在局面までの局面列
#[derive(Clone)]
pub struct PositionHistory<P: Position> {
    positions: Vec<P>,
}

impl<P: Position> PositionHistory<P> {
    pub fn new(start: P) -> Self {
        Self {
            positions: vec![start],
        }
    }

    pub fn starting(&self) -> &P {
        &self.positions[0]
    }

    pub fn last(&self) -> &P {
        // positions は常に開始局面を含む
        &self.positions[self.positions.len() - 1]
    }

    /// 開始局面を含む局面数
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[P] {
        &self.positions
    }

    #[inline]
    pub fn is_black_to_move(&self) -> bool {
        self.last().is_black_to_move()
    }

    /// 手番相対表現の指し手を追加する
    pub fn append(&mut self, mv: P::Move) {
        let next = self.last().play(mv);
        self.positions.push(next);
    }

    /// 最後の指し手を取り消す。開始局面は取り除かない。
    pub fn pop(&mut self) {
        if self.positions.len() > 1 {
            self.positions.pop();
        }
    }

    pub fn compute_game_result(&self) -> GameResult {
        P::compute_game_result(&self.positions)
    }

    pub fn encode_for_nn(
        &self,
        format: InputFormat,
        history_planes: usize,
        fill: FillEmptyHistory,
    ) -> EncodedPosition {
        P::encode_for_nn(&self.positions, format, history_planes, fill)
    }
}
