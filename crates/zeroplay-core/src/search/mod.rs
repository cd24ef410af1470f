//! 木探索エンジンとのインターフェース
//!
//! 探索エンジン本体（ノード展開・選択方策・対局内バッチ評価）は外部実装。
//! 自己対局ドライバは [`SearchEngineFactory`] でエンジンを1手ごとに作り、
//! [`SearchEngine::run_blocking`] で停止条件まで探索させる。

pub mod responder;
pub mod stoppers;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::board::{FillEmptyHistory, Position};
use crate::network::{Network, NnCache};
use crate::options::OptionsDict;
use crate::tree::GameTree;

pub use responder::{
    BestMoveCallback, BestMoveInfo, CallbackResponder, DiscardedCallback, DiscardedMove,
    InfoCallback, LegacyCastlingTransformer, Responder, ThinkingInfo,
};
pub use stoppers::{
    ChainedSearchStopper, IterationStats, PlayoutsStopper, SearchStopper, SelfPlayLimits,
    TimeLimitStopper, VisitsStopper,
};

/// 最善手の評価（手番側から見た値）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestEval {
    /// 勝ち確率 - 負け確率（[-1, 1]）
    pub wl: f32,
    /// 引き分け確率
    pub d: f32,
    /// 残り手数の推定
    pub ml: f32,
}

impl BestEval {
    /// (勝ち, 引き分け, 負け) の確率に分解する
    pub fn wdl(&self) -> (f32, f32, f32) {
        let w = (self.wl + 1.0 - self.d) / 2.0;
        let l = w - self.wl;
        (w, self.d, l)
    }

    /// 勝率表現（[-1, 1] を [0, 1] に写したもの）
    pub fn win_rate(&self) -> f32 {
        (self.wl + 1.0) / 2.0
    }
}

/// 1手分の探索エンジン
///
/// `abort` は `run_blocking` 実行中に別スレッドから呼ばれる。
pub trait SearchEngine<M>: Send + Sync {
    /// 停止条件を満たすか中断されるまで探索する
    fn run_blocking(&self, threads: usize) -> anyhow::Result<()>;

    /// 最善手（絶対表現）
    fn best_move(&self) -> M;

    fn best_eval(&self) -> BestEval;

    /// この探索で行ったプレイアウト数
    fn total_playouts(&self) -> u64;

    fn abort(&self);

    /// 直前の最善手を候補から外し、次善手を最善手とする
    fn reset_best_move(&self);

    /// 学習データのエンコードに使う履歴の埋め方
    fn history_fill(&self) -> FillEmptyHistory {
        FillEmptyHistory::FenOnly
    }
}

/// エンジン生成に渡す材料
pub struct SearchContext<P: Position> {
    pub tree: Arc<Mutex<GameTree<P>>>,
    pub network: Arc<dyn Network>,
    pub responder: Box<dyn Responder<P::Move>>,
    /// 探索対象を絞る指し手（空なら全合法手）
    pub search_moves: Vec<P::Move>,
    pub start_time: Instant,
    pub stopper: ChainedSearchStopper,
    pub infinite: bool,
    pub options: Arc<OptionsDict>,
    pub cache: Arc<NnCache>,
}

/// 探索エンジンの生成器
pub trait SearchEngineFactory<P: Position>: Send + Sync {
    fn create(&self, context: SearchContext<P>) -> anyhow::Result<Arc<dyn SearchEngine<P::Move>>>;

    /// エンジン固有の停止条件（最小思考時間など）を追加する
    fn populate_intrinsic_stoppers(&self, _stopper: &mut ChainedSearchStopper, _options: &OptionsDict) {}
}
