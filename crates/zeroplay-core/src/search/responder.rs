//! 探索エンジンの出力（最善手・思考情報）を呼び出し側へ届ける

use std::sync::Arc;

use crate::board::{GameMove, Position};

/// 最善手の通知
#[derive(Debug, Clone, PartialEq)]
pub struct BestMoveInfo<M> {
    pub best_move: M,
    pub ponder: Option<M>,
}

/// 思考情報の通知（multipv ごとに1件）
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingInfo<M> {
    pub depth: u32,
    pub seldepth: u32,
    pub time_ms: u64,
    pub nodes: u64,
    pub nps: u64,
    /// 評価値（センチポーン相当）
    pub score: Option<i32>,
    /// 千分率の (勝ち, 引き分け, 負け)
    pub wdl: Option<(u32, u32, u32)>,
    pub moves_left: Option<u32>,
    pub multipv: u32,
    pub pv: Vec<M>,
    pub comment: Option<String>,
}

impl<M> Default for ThinkingInfo<M> {
    fn default() -> Self {
        Self {
            depth: 0,
            seldepth: 0,
            time_ms: 0,
            nodes: 0,
            nps: 0,
            score: None,
            wdl: None,
            moves_left: None,
            multipv: 1,
            pv: Vec::new(),
            comment: None,
        }
    }
}

/// 最小訪問数に届かず捨てられた指し手の通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedMove<M> {
    /// 対局の開始局面
    pub start_fen: String,
    /// 開始局面からの指し手列。最後の要素が捨てられた指し手。
    pub moves: Vec<M>,
}

pub type BestMoveCallback<M> = Arc<dyn Fn(&BestMoveInfo<M>) + Send + Sync>;
pub type InfoCallback<M> = Arc<dyn Fn(&[ThinkingInfo<M>]) + Send + Sync>;
pub type DiscardedCallback<M> = Arc<dyn Fn(&DiscardedMove<M>) + Send + Sync>;

/// 何もしないコールバック
pub fn noop_best_move<M: 'static>() -> BestMoveCallback<M> {
    Arc::new(|_| {})
}

pub fn noop_info<M: 'static>() -> InfoCallback<M> {
    Arc::new(|_| {})
}

pub fn noop_discarded<M: 'static>() -> DiscardedCallback<M> {
    Arc::new(|_| {})
}

/// 探索エンジンの出力先
pub trait Responder<M>: Send {
    fn output_best_move(&mut self, info: &mut BestMoveInfo<M>);

    fn output_thinking_info(&mut self, infos: &mut Vec<ThinkingInfo<M>>);
}

/// コールバックに転送する
pub struct CallbackResponder<M> {
    best_move_callback: BestMoveCallback<M>,
    info_callback: InfoCallback<M>,
}

impl<M> CallbackResponder<M> {
    pub fn new(best_move_callback: BestMoveCallback<M>, info_callback: InfoCallback<M>) -> Self {
        Self {
            best_move_callback,
            info_callback,
        }
    }
}

impl<M: GameMove> Responder<M> for CallbackResponder<M> {
    fn output_best_move(&mut self, info: &mut BestMoveInfo<M>) {
        (self.best_move_callback)(info);
    }

    fn output_thinking_info(&mut self, infos: &mut Vec<ThinkingInfo<M>>) {
        (self.info_callback)(infos);
    }
}

/// 代替キャスリング表記を従来表記に直してから転送する
pub struct LegacyCastlingTransformer<P: Position> {
    parent: Box<dyn Responder<P::Move>>,
    head: P,
}

impl<P: Position> LegacyCastlingTransformer<P> {
    pub fn new(parent: Box<dyn Responder<P::Move>>, head: P) -> Self {
        Self { parent, head }
    }

    /// 絶対表現の指し手列を、head から順に進めながら従来表記に変換する
    fn transform_line(&self, moves: &mut [P::Move]) {
        let mut pos = self.head.clone();
        let last = moves.len().saturating_sub(1);
        for (i, mv) in moves.iter_mut().enumerate() {
            let side = pos.side_to_move();
            let relative = mv.relative_to(side);
            *mv = pos.legacy_move(relative).relative_to(side);
            if i < last {
                pos = pos.play(relative);
            }
        }
    }
}

impl<P: Position> Responder<P::Move> for LegacyCastlingTransformer<P> {
    fn output_best_move(&mut self, info: &mut BestMoveInfo<P::Move>) {
        let mut line: Vec<P::Move> = std::iter::once(info.best_move).chain(info.ponder).collect();
        self.transform_line(&mut line);
        info.best_move = line[0];
        info.ponder = line.get(1).copied();
        self.parent.output_best_move(info);
    }

    fn output_thinking_info(&mut self, infos: &mut Vec<ThinkingInfo<P::Move>>) {
        for info in infos.iter_mut() {
            self.transform_line(&mut info.pv);
        }
        self.parent.output_thinking_info(infos);
    }
}
