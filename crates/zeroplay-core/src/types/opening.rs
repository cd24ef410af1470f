//! 開始局面（Opening）

use serde::{Deserialize, Serialize};

/// 開始局面と、自己対局の前に強制的に指す手順（絶対表現）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening<M> {
    pub start_fen: String,
    pub moves: Vec<M>,
}

impl<M> Opening<M> {
    pub fn new(start_fen: impl Into<String>, moves: Vec<M>) -> Self {
        Self {
            start_fen: start_fen.into(),
            moves,
        }
    }

    /// 強制手順なしの開始局面
    pub fn from_fen(start_fen: impl Into<String>) -> Self {
        Self::new(start_fen, Vec::new())
    }
}
