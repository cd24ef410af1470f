//! 終盤データベース（テーブルベース）の適用判定

use crate::board::Position;
use crate::types::{Color, GameResult};

/// 手番側から見た WDL 分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WdlScore {
    Loss,
    /// 手数制限により引き分けになる負け
    BlessedLoss,
    Draw,
    /// 手数制限により引き分けになる勝ち
    CursedWin,
    Win,
}

/// プローブの状態。`Fail` 以外ならば WDL は正しい。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Fail,
    Ok,
    ChangeStm,
    ZeroingBestMove,
}

/// 終盤データベース
pub trait Tablebase<P: Position>: Send + Sync {
    /// 対応する最大駒数
    fn max_cardinality(&self) -> u32;

    fn probe_wdl(&self, pos: &P) -> (WdlScore, ProbeState);
}

/// テーブルベースを引くべき局面か（キャスリング権なし、かつ駒数が対応範囲内）
pub fn is_applicable<P: Position>(tb: &dyn Tablebase<P>, pos: &P) -> bool {
    pos.no_legal_castle() && pos.piece_count() <= tb.max_cardinality()
}

/// WDL を手番から見た対局結果に変換する。
/// 手数制限付きの勝ち・負けは引き分けとして扱う。
pub fn wdl_to_result(wdl: WdlScore, side_to_move: Color) -> GameResult {
    match wdl {
        WdlScore::Win => GameResult::win_for(side_to_move),
        WdlScore::Loss => GameResult::loss_for(side_to_move),
        WdlScore::Draw | WdlScore::CursedWin | WdlScore::BlessedLoss => GameResult::Draw,
    }
}

/// 局面をテーブルベースで判定する。
///
/// 適用外の局面ではプローブせず `None`。プローブが `Fail` の場合も `None` を返し、
/// 通常の探索で対局を続ける。
pub fn probe_game_result<P: Position>(tb: &dyn Tablebase<P>, pos: &P) -> Option<GameResult> {
    if !is_applicable(tb, pos) {
        return None;
    }
    let (wdl, state) = tb.probe_wdl(pos);
    if state == ProbeState::Fail {
        log::debug!("tablebase probe failed at {}", pos.to_fen());
        return None;
    }
    Some(wdl_to_result(wdl, pos.side_to_move()))
}
