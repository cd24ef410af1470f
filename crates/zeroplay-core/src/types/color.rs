//! 手番（Color）

/// 手番（白/黒）。白が先手。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    /// 手番の数
    pub const NUM: usize = 2;

    /// 手数（ply）から手番を求める。偶数手目は白番。
    #[inline]
    pub const fn from_ply(ply: u32) -> Color {
        if ply % 2 == 1 { Color::Black } else { Color::White }
    }

    /// 相手番を返す
    #[inline]
    pub const fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// インデックスとして使用（プレイヤー設定の配列アクセス用）
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn is_black(self) -> bool {
        matches!(self, Color::Black)
    }

    pub fn label(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

impl std::ops::Not for Color {
    type Output = Color;

    #[inline]
    fn not(self) -> Color {
        self.opponent()
    }
}
