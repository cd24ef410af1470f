//! 対局結果（GameResult）

use serde::{Deserialize, Serialize};

use super::Color;

/// 対局結果。`Undecided` から終局値へ一度だけ遷移する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    #[default]
    Undecided,
    WhiteWon,
    BlackWon,
    Draw,
}

impl GameResult {
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != GameResult::Undecided
    }

    /// 指定した手番の勝ち
    #[inline]
    pub fn win_for(color: Color) -> GameResult {
        match color {
            Color::White => GameResult::WhiteWon,
            Color::Black => GameResult::BlackWon,
        }
    }

    /// 指定した手番の負け（相手の勝ち）
    #[inline]
    pub fn loss_for(color: Color) -> GameResult {
        GameResult::win_for(color.opponent())
    }

    /// 白から見た得点（+1 / -1 / 0）。未決着は 0 として扱う。
    pub fn white_score(self) -> i8 {
        match self {
            GameResult::WhiteWon => 1,
            GameResult::BlackWon => -1,
            GameResult::Draw | GameResult::Undecided => 0,
        }
    }

    /// 指定した手番から見た得点
    pub fn score_for(self, color: Color) -> i8 {
        match color {
            Color::White => self.white_score(),
            Color::Black => -self.white_score(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GameResult::Undecided => "undecided",
            GameResult::WhiteWon => "white_won",
            GameResult::BlackWon => "black_won",
            GameResult::Draw => "draw",
        }
    }
}
