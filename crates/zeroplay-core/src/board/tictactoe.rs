//! 三目並べ（参照実装）
//!
//! 盤面レイヤーの最小実装。ツールの動作確認と自己対局ドライバのテストに使う。
//! 白（x）が先手、黒（o）が後手。マスは `a1`〜`c3`（a〜c が筋、1〜3 が段）。
//!
//! 局面文字列は段3から段1へ `/` 区切りで並べる（例: `x../.o./...`）。
//! 手番は石の数から決まる。

use std::fmt;
use std::str::FromStr;

use crate::board::{
    EncodedPosition, FillEmptyHistory, GameMove, InputFormat, InputPlane, InputPlanes, Position,
};
use crate::error::{Result, SelfPlayError};
use crate::network::{Network, NetworkCapabilities, NetworkComputation};
use crate::tablebase::{ProbeState, Tablebase, WdlScore};
use crate::types::GameResult;

pub const STARTPOS: &str = ".../.../...";

const FULL_BOARD: u16 = 0x1FF;
const LINES: [u16; 8] = [0x007, 0x038, 0x1C0, 0x049, 0x092, 0x124, 0x111, 0x054];

/// マス（`rank * 3 + file`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    pub const NUM: usize = 9;

    pub fn new(file: u8, rank: u8) -> Option<Square> {
        (file < 3 && rank < 3).then(|| Square(rank * 3 + file))
    }

    pub fn from_index(index: u8) -> Option<Square> {
        (usize::from(index) < Self::NUM).then_some(Square(index))
    }

    #[inline]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    #[inline]
    pub fn file(self) -> u8 {
        self.0 % 3
    }

    #[inline]
    pub fn rank(self) -> u8 {
        self.0 / 3
    }

    #[inline]
    fn bit(self) -> u16 {
        1 << self.0
    }

    /// `a1` 形式の文字列からパースする
    pub fn parse(s: &str) -> Option<Square> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].checked_sub(b'a')?;
        let rank = bytes[1].checked_sub(b'1')?;
        Square::new(file, rank)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(b'a' + self.file()), char::from(b'1' + self.rank()))
    }
}

impl FromStr for Square {
    type Err = SelfPlayError;

    fn from_str(s: &str) -> Result<Self> {
        Square::parse(s).ok_or_else(|| SelfPlayError::InvalidMove(s.to_string()))
    }
}

impl GameMove for Square {
    fn mirrored(self) -> Self {
        Square((2 - self.rank()) * 3 + self.file())
    }
}

/// 段を上下反転したマスク
fn mirror_ranks(mask: u16) -> u16 {
    ((mask & 0x007) << 6) | (mask & 0x038) | ((mask & 0x1C0) >> 6)
}

/// 筋を左右反転したマスク
fn flip_files(mask: u16) -> u16 {
    ((mask & 0x049) << 2) | (mask & 0x092) | ((mask & 0x124) >> 2)
}

fn has_line(mask: u16) -> bool {
    LINES.iter().any(|&line| mask & line == line)
}

/// 三目並べの局面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TicTacToe {
    white: u16,
    black: u16,
    ply: u32,
}

impl TicTacToe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stone_at(&self, sq: Square) -> Option<char> {
        if self.white & sq.bit() != 0 {
            Some('x')
        } else if self.black & sq.bit() != 0 {
            Some('o')
        } else {
            None
        }
    }

    fn occupied(&self) -> u16 {
        self.white | self.black
    }

    fn rule_result(&self) -> GameResult {
        if has_line(self.white) {
            GameResult::WhiteWon
        } else if has_line(self.black) {
            GameResult::BlackWon
        } else if self.occupied() == FULL_BOARD {
            GameResult::Draw
        } else {
            GameResult::Undecided
        }
    }

    /// 絶対表現の指し手を適用する
    pub fn play_absolute(&self, sq: Square) -> Self {
        let mut next = *self;
        if self.is_black_to_move() {
            next.black |= sq.bit();
        } else {
            next.white |= sq.bit();
        }
        next.ply += 1;
        next
    }
}

impl Position for TicTacToe {
    type Move = Square;

    fn from_fen(fen: &str) -> Result<Self> {
        let invalid = || SelfPlayError::InvalidFen(fen.to_string());
        let ranks: Vec<&str> = fen.trim().split('/').collect();
        if ranks.len() != 3 {
            return Err(invalid());
        }
        let mut pos = TicTacToe::new();
        for (row, rank_str) in ranks.iter().enumerate() {
            let rank = 2 - row as u8;
            if rank_str.chars().count() != 3 {
                return Err(invalid());
            }
            for (file, c) in rank_str.chars().enumerate() {
                let sq = Square::new(file as u8, rank).ok_or_else(invalid)?;
                match c {
                    'x' | 'X' => pos.white |= sq.bit(),
                    'o' | 'O' => pos.black |= sq.bit(),
                    '.' => {}
                    _ => return Err(invalid()),
                }
            }
        }
        let whites = pos.white.count_ones();
        let blacks = pos.black.count_ones();
        if whites != blacks && whites != blacks + 1 {
            return Err(invalid());
        }
        pos.ply = whites + blacks;
        Ok(pos)
    }

    fn to_fen(&self) -> String {
        let mut out = String::with_capacity(11);
        for rank in (0..3u8).rev() {
            for file in 0..3u8 {
                let sq = Square(rank * 3 + file);
                out.push(self.stone_at(sq).unwrap_or('.'));
            }
            if rank > 0 {
                out.push('/');
            }
        }
        out
    }

    fn game_ply(&self) -> u32 {
        self.ply
    }

    fn legal_moves(&self) -> Vec<Square> {
        if self.rule_result().is_terminal() {
            return Vec::new();
        }
        let side = self.side_to_move();
        (0..Square::NUM as u8)
            .map(Square)
            .filter(|sq| self.occupied() & sq.bit() == 0)
            .map(|sq| sq.relative_to(side))
            .collect()
    }

    fn play(&self, mv: Square) -> Self {
        self.play_absolute(mv.relative_to(self.side_to_move()))
    }

    fn no_legal_castle(&self) -> bool {
        true
    }

    fn piece_count(&self) -> u32 {
        self.occupied().count_ones()
    }

    fn compute_game_result(history: &[Self]) -> GameResult {
        history.last().map_or(GameResult::Undecided, TicTacToe::rule_result)
    }

    fn encode_for_nn(
        history: &[Self],
        format: InputFormat,
        history_planes: usize,
        fill: FillEmptyHistory,
    ) -> EncodedPosition {
        let Some(current) = history.last() else {
            return EncodedPosition {
                planes: Vec::new(),
                transform: 0,
            };
        };
        let flip_side = current.is_black_to_move();
        let from_fen = history[0].ply != 0 || history[0].occupied() != 0;
        let fill_with = match fill {
            FillEmptyHistory::No => None,
            FillEmptyHistory::FenOnly if from_fen => Some(history[0]),
            FillEmptyHistory::FenOnly => None,
            FillEmptyHistory::Always => Some(history[0]),
        };

        // 手番側から見た (ours, theirs) を新しい順に並べる
        let mut pairs: Vec<(u16, u16)> = Vec::with_capacity(history_planes);
        for i in 0..history_planes {
            let pos = if i < history.len() {
                Some(history[history.len() - 1 - i])
            } else {
                fill_with
            };
            let pair = match pos {
                Some(p) => {
                    let (w, b) = (p.white, p.black);
                    let (ours, theirs) = if flip_side { (b, w) } else { (w, b) };
                    if flip_side {
                        (mirror_ranks(ours), mirror_ranks(theirs))
                    } else {
                        (ours, theirs)
                    }
                }
                None => (0, 0),
            };
            pairs.push(pair);
        }

        let mut transform = 0u8;
        if format == InputFormat::Canonical {
            if let Some(&(ours, theirs)) = pairs.first() {
                if (flip_files(ours), flip_files(theirs)) < (ours, theirs) {
                    transform = 1;
                }
            }
        }
        if transform == 1 {
            for pair in &mut pairs {
                *pair = (flip_files(pair.0), flip_files(pair.1));
            }
        }

        let mut planes: InputPlanes = Vec::with_capacity(pairs.len() * 2 + 2);
        for (ours, theirs) in pairs {
            planes.push(InputPlane::new(u64::from(ours), 1.0));
            planes.push(InputPlane::new(u64::from(theirs), 1.0));
        }
        if format == InputFormat::Classical {
            planes.push(InputPlane::filled(if flip_side { 1.0 } else { 0.0 }));
        }
        planes.push(InputPlane::filled(1.0));
        EncodedPosition { planes, transform }
    }
}

/// 開いているライン数の差で評価する簡易ネットワーク
///
/// 入力の先頭2プレーン（現局面の手番側・相手側）だけを見る。
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicNetwork;

struct HeuristicComputation {
    inputs: Vec<InputPlanes>,
    values: Vec<f32>,
}

fn open_lines(ours: u16, theirs: u16) -> i32 {
    LINES
        .iter()
        .filter(|&&line| line & theirs == 0 && line & ours != 0)
        .count() as i32
}

impl NetworkComputation for HeuristicComputation {
    fn add_input(&mut self, input: InputPlanes) {
        self.inputs.push(input);
    }

    fn batch_size(&self) -> usize {
        self.inputs.len()
    }

    fn compute_blocking(&mut self) -> anyhow::Result<()> {
        self.values = self
            .inputs
            .iter()
            .map(|planes| {
                let ours = planes.first().map_or(0, |p| p.mask as u16);
                let theirs = planes.get(1).map_or(0, |p| p.mask as u16);
                let diff = open_lines(ours, theirs) - open_lines(theirs, ours);
                (diff as f32 / 8.0).clamp(-1.0, 1.0)
            })
            .collect();
        Ok(())
    }

    fn q_val(&self, sample: usize) -> f32 {
        self.values.get(sample).copied().unwrap_or(0.0)
    }
}

impl Network for HeuristicNetwork {
    fn capabilities(&self) -> NetworkCapabilities {
        NetworkCapabilities::default()
    }

    fn new_computation(&self) -> Box<dyn NetworkComputation + '_> {
        Box::new(HeuristicComputation {
            inputs: Vec::new(),
            values: Vec::new(),
        })
    }
}

/// 全探索による完全解テーブル
#[derive(Debug, Clone, Copy)]
pub struct PerfectPlayTablebase {
    max_cardinality: u32,
}

impl PerfectPlayTablebase {
    pub fn new(max_cardinality: u32) -> Self {
        Self { max_cardinality }
    }

    /// 手番側から見た勝敗（+1 / 0 / -1）
    fn solve(pos: &TicTacToe) -> i8 {
        match pos.rule_result() {
            GameResult::Undecided => {}
            GameResult::Draw => return 0,
            // 終局局面では直前に指した側が勝っている
            _ => return -1,
        }
        let mut best = -1;
        for mv in pos.legal_moves() {
            let score = -Self::solve(&pos.play(mv));
            if score > best {
                best = score;
                if best == 1 {
                    break;
                }
            }
        }
        best
    }
}

impl Tablebase<TicTacToe> for PerfectPlayTablebase {
    fn max_cardinality(&self) -> u32 {
        self.max_cardinality
    }

    fn probe_wdl(&self, pos: &TicTacToe) -> (WdlScore, ProbeState) {
        let wdl = match Self::solve(pos) {
            1 => WdlScore::Win,
            -1 => WdlScore::Loss,
            _ => WdlScore::Draw,
        };
        (wdl, ProbeState::Ok)
    }
}
