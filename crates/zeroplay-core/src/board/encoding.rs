//! ニューラルネットワーク入力のエンコーディング型

use serde::{Deserialize, Serialize};

/// ネットワーク入力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// 手番は独立したフィールドで表す
    #[default]
    Classical,
    /// 盤面を正規化（対称変換）し、手番は invariance 情報の bit 7 で表す
    Canonical,
}

/// 開始局面より前の履歴プレーンの埋め方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillEmptyHistory {
    /// 埋めない（ゼロのまま）
    No,
    /// FEN から始まった対局のときだけ開始局面で埋める
    #[default]
    FenOnly,
    /// 常に開始局面で埋める
    Always,
}

/// 1枚の入力プレーン（64bit マスク + 値）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputPlane {
    pub mask: u64,
    pub value: f32,
}

impl InputPlane {
    pub const fn new(mask: u64, value: f32) -> Self {
        Self { mask, value }
    }

    /// 全マスに値を立てたプレーン
    pub const fn filled(value: f32) -> Self {
        Self { mask: u64::MAX, value }
    }
}

pub type InputPlanes = Vec<InputPlane>;

/// エンコード済み局面と、選ばれた幾何変換のインデックス
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPosition {
    pub planes: InputPlanes,
    pub transform: u8,
}
