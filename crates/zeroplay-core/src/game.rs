//! 木探索による1局の自己対局
//!
//! 1手ごとに探索エンジンを作って停止条件まで探索させ、投了判定と
//! 最小訪問数による指し手の選び直しを行う。学習モードでは各手のサンプルを積み、
//! 終局後に [`SelfPlayGame::write_training_data`] で書き出す。

use std::sync::Arc;
use std::time::Instant;

use crate::abort::AbortHandle;
use crate::board::{GameMove, Position};
use crate::error::{Result, SelfPlayError};
use crate::options::{PlayerOptions, SelfPlayOptions};
use crate::search::{
    BestEval, CallbackResponder, DiscardedMove, LegacyCastlingTransformer, Responder,
    SearchContext, SearchEngine, SearchEngineFactory,
};
use crate::training::{TrainingChunk, TrainingDataWriter, finalize_chunks};
use crate::tree::{GameTrees, lock_tree};
use crate::types::{Color, GameResult, Opening};

/// 選び直しの判定結果
enum Retrieval<M> {
    Accept(M),
    Retry { discarded: Option<M> },
}

/// 木探索自己対局の1局
pub struct SelfPlayGame<P: Position> {
    players: [PlayerOptions<P>; Color::NUM],
    options: [SelfPlayOptions; Color::NUM],
    factory: Arc<dyn SearchEngineFactory<P>>,
    opening: Opening<P::Move>,
    trees: GameTrees<P>,
    chess960: bool,
    game_result: GameResult,
    abort: AbortHandle,
    training_data: Vec<TrainingChunk>,
    move_count: u32,
    nodes_total: u64,
    /// 手番ごとの勝率（[0, 1]）の最小値
    min_eval: [f32; Color::NUM],
    /// (白勝ち, 引き分け, 黒勝ち) 確率の最大値
    max_eval: [f32; 3],
}

impl<P: Position> SelfPlayGame<P> {
    /// 対局を作る。`shared_tree` が真なら両者で1本の木を使う。
    ///
    /// 両者の投了方式（WDL 方式か勝率方式か）が異なる場合はエラー。
    pub fn new(
        white: PlayerOptions<P>,
        black: PlayerOptions<P>,
        factory: Arc<dyn SearchEngineFactory<P>>,
        shared_tree: bool,
        opening: Opening<P::Move>,
    ) -> Result<Self> {
        let options = [white.selfplay_options()?, black.selfplay_options()?];
        if options[0].resign_wdl_style != options[1].resign_wdl_style {
            return Err(SelfPlayError::MixedResignStyle);
        }
        let trees = GameTrees::new(&opening.start_fen, &opening.moves, shared_tree)?;
        Ok(Self {
            players: [white, black],
            chess960: options[0].chess960 || options[1].chess960,
            options,
            factory,
            opening,
            trees,
            game_result: GameResult::Undecided,
            abort: AbortHandle::new(),
            training_data: Vec::new(),
            move_count: 0,
            nodes_total: 0,
            min_eval: [1.0; Color::NUM],
            max_eval: [0.0; 3],
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// 中断する。探索中ならエンジンにも中断を伝える。
    pub fn abort(&self) {
        self.abort.request_abort();
    }

    fn side_to_move(&self) -> Color {
        self.trees.lock(Color::White).side_to_move()
    }

    /// 終局するか中断されるまで対局を進める
    ///
    /// 既に決着した対局では何もせずその結果を返す。
    pub fn play(
        &mut self,
        white_threads: usize,
        black_threads: usize,
        training: bool,
        enable_resign: bool,
    ) -> Result<GameResult> {
        if self.game_result.is_terminal() {
            return Ok(self.game_result);
        }
        let threads = [white_threads, black_threads];
        loop {
            let side = self.side_to_move();
            let idx = side.index();

            let rule_result = self.trees.lock(side).position_history().compute_game_result();
            if rule_result.is_terminal() {
                self.game_result = rule_result;
                break;
            }

            if !self.options[idx].reuse_tree {
                self.trees.lock(side).trim_tree_at_head();
            }

            let Some(engine) = self.start_search(side)? else {
                break;
            };
            let run = engine.run_blocking(threads[idx].max(1));
            self.abort.clear_in_flight();
            run.map_err(SelfPlayError::Engine)?;

            self.move_count += 1;
            self.nodes_total += engine.total_playouts();
            if self.abort.is_aborted() {
                log::info!("selfplay game aborted at move {}", self.move_count);
                break;
            }

            let eval = engine.best_eval();
            if training {
                let format = self.players[idx].network.capabilities().input_format;
                let tree = self.trees.lock(side);
                self.training_data.push(TrainingChunk::from_tree(
                    &tree,
                    format,
                    engine.history_fill(),
                    eval,
                ));
            }

            self.update_eval_marks(side, eval);

            if enable_resign {
                if let Some(result) = self.resign_result(side, eval) {
                    log::info!(
                        "{} resigns at move {}: {}",
                        side.label(),
                        self.move_count,
                        result.label()
                    );
                    self.game_result = result;
                    break;
                }
            }

            let mv = self.retrieve_best_move(side, engine.as_ref());
            log::debug!("move {}: {} plays {mv}", self.move_count, side.label());
            self.trees.make_move(mv);
        }
        Ok(self.game_result)
    }

    /// 中断フラグを確認し、探索エンジンを作って中断先として登録する。
    /// 中断済みなら `None`。
    fn start_search(&self, side: Color) -> Result<Option<Arc<dyn SearchEngine<P::Move>>>> {
        let mut state = self.abort.lock();
        if state.aborted {
            return Ok(None);
        }
        let player = &self.players[side.index()];

        let mut stopper = player.search_limits.make_search_stopper();
        self.factory
            .populate_intrinsic_stoppers(&mut stopper, &player.options);

        let tree = Arc::clone(self.trees.tree(side));
        let mut responder: Box<dyn Responder<P::Move>> = Box::new(CallbackResponder::new(
            Arc::clone(&player.best_move_callback),
            Arc::clone(&player.info_callback),
        ));
        if !self.chess960 {
            let head = lock_tree(&tree).head_position().clone();
            responder = Box::new(LegacyCastlingTransformer::new(responder, head));
        }

        let context = SearchContext {
            tree,
            network: Arc::clone(&player.network),
            responder,
            search_moves: Vec::new(),
            start_time: Instant::now(),
            stopper,
            infinite: false,
            options: Arc::new(player.options.clone()),
            cache: Arc::clone(&player.cache),
        };
        let engine = self.factory.create(context).map_err(SelfPlayError::Engine)?;
        let in_flight = Arc::clone(&engine);
        state.in_flight = Some(Arc::new(move || in_flight.abort()));
        Ok(Some(engine))
    }

    fn update_eval_marks(&mut self, side: Color, eval: BestEval) {
        let idx = side.index();
        self.min_eval[idx] = self.min_eval[idx].min(eval.win_rate());
        let (w, d, l) = eval.wdl();
        let (white_win, black_win) = if side.is_black() { (l, w) } else { (w, l) };
        self.max_eval[0] = self.max_eval[0].max(white_win);
        self.max_eval[1] = self.max_eval[1].max(d);
        self.max_eval[2] = self.max_eval[2].max(black_win);
    }

    /// 投了（または勝ち・引き分けの確定）による結果
    fn resign_result(&self, side: Color, eval: BestEval) -> Option<GameResult> {
        let options = &self.options[side.index()];
        let move_number = self.trees.lock(side).position_history().len() / 2 + 1;
        if move_number < options.resign_earliest_move as usize {
            return None;
        }
        let threshold = options.resign_fraction();
        if options.resign_wdl_style {
            let limit = 1.0 - threshold;
            let (w, d, l) = eval.wdl();
            if w > limit {
                return Some(GameResult::win_for(side));
            }
            if l > limit {
                return Some(GameResult::loss_for(side));
            }
            if d > limit {
                return Some(GameResult::Draw);
            }
            None
        } else {
            (eval.win_rate() < threshold).then_some(GameResult::loss_for(side))
        }
    }

    /// 最小訪問数に届かない最善手を捨てながら指し手を決める。
    ///
    /// 選び直しは head のエッジ数までで打ち切り、その後は最多訪問手を採る。
    fn retrieve_best_move(&self, side: Color, engine: &dyn SearchEngine<P::Move>) -> P::Move {
        let min_visits = self.options[side.index()].minimum_allowed_visits;
        let black = side.is_black();
        let max_retries = self.trees.lock(side).current_head().edges().len();
        let mut retries = 0;
        loop {
            let best = engine.best_move();
            match self.check_visits(side, best, min_visits) {
                Retrieval::Accept(mv) => return mv,
                Retrieval::Retry { discarded } => {
                    if retries >= max_retries {
                        let tree = self.trees.lock(side);
                        let head = tree.current_head();
                        let max_n = head.max_edge_visits();
                        let fallback = head
                            .edges()
                            .iter()
                            .find(|e| e.visits() == max_n)
                            .map_or(best, |e| e.get_move(black));
                        log::warn!(
                            "best move retry limit reached after {retries} attempts; playing {fallback}"
                        );
                        return fallback;
                    }
                    if let Some(mv) = discarded {
                        let mut moves = self.moves();
                        moves.push(mv);
                        log::debug!("discarding low-visit move {mv}");
                        (self.players[side.index()].discarded_callback)(&DiscardedMove {
                            start_fen: self.opening.start_fen.clone(),
                            moves,
                        });
                    }
                    engine.reset_best_move();
                    retries += 1;
                }
            }
        }
    }

    fn check_visits(&self, side: Color, best: P::Move, min_visits: u32) -> Retrieval<P::Move> {
        let tree = self.trees.lock(side);
        let head = tree.current_head();
        let relative = best.relative_to(side);
        let max_n = head.max_edge_visits();
        let cur_n = head.edge(relative).map_or(0, |e| e.visits());
        if cur_n == max_n || cur_n >= min_visits {
            return Retrieval::Accept(best);
        }
        // 既に決着がつく手は報告しない
        let mut history = tree.position_history().clone();
        history.append(relative);
        let discarded = (!history.compute_game_result().is_terminal()).then_some(best);
        Retrieval::Retry { discarded }
    }

    /// 開始局面からの指し手（絶対表現）
    pub fn moves(&self) -> Vec<P::Move> {
        self.trees.lock(Color::White).moves(self.chess960)
    }

    /// 勝者（引き分けなら両者）が対局中に見せた最悪の評価。投了閾値の誤判定率の推定に使う。
    ///
    /// 投了方式は白の設定に従う。
    pub fn worst_eval_for_winner_or_draw(&self) -> f32 {
        if self.options[0].resign_wdl_style {
            return match self.game_result {
                GameResult::WhiteWon => self.max_eval[1].max(self.max_eval[2]),
                GameResult::BlackWon => self.max_eval[1].max(self.max_eval[0]),
                _ => self.max_eval[2].max(self.max_eval[0]),
            };
        }
        match self.game_result {
            GameResult::WhiteWon => self.min_eval[0],
            GameResult::BlackWon => self.min_eval[1],
            _ => self.min_eval[0].min(self.min_eval[1]),
        }
    }

    /// 探索を行った手数
    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    /// 全探索のプレイアウト数の合計
    pub fn total_nodes(&self) -> u64 {
        self.nodes_total
    }

    pub fn game_result(&self) -> GameResult {
        self.game_result
    }

    pub fn opening(&self) -> &Opening<P::Move> {
        &self.opening
    }

    /// 結果と残り手数を確定させて学習データを書き出す。
    ///
    /// 未決着（中断）の対局とサンプルの無い対局は何も書かない。書いた件数を返す。
    pub fn write_training_data(&mut self, writer: &mut dyn TrainingDataWriter) -> Result<usize> {
        if self.training_data.is_empty() {
            return Ok(0);
        }
        if !self.game_result.is_terminal() {
            log::debug!(
                "skipping {} training chunks of an unfinished game",
                self.training_data.len()
            );
            return Ok(0);
        }
        finalize_chunks(&mut self.training_data, self.game_result);
        for chunk in &self.training_data {
            writer.write_chunk(chunk).map_err(SelfPlayError::Writer)?;
        }
        writer.flush().map_err(SelfPlayError::Writer)?;
        Ok(self.training_data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tictactoe::{HeuristicNetwork, STARTPOS, TicTacToe};
    use crate::options::RESIGN_WDL_STYLE;

    struct NeverCalled;

    impl SearchEngineFactory<TicTacToe> for NeverCalled {
        fn create(
            &self,
            _context: SearchContext<TicTacToe>,
        ) -> anyhow::Result<Arc<dyn SearchEngine<<TicTacToe as Position>::Move>>> {
            anyhow::bail!("not expected")
        }
    }

    #[test]
    fn test_mixed_resign_styles_are_rejected() {
        let white = PlayerOptions::<TicTacToe>::new(Arc::new(HeuristicNetwork))
            .with_option(RESIGN_WDL_STYLE, true);
        let black = PlayerOptions::<TicTacToe>::new(Arc::new(HeuristicNetwork));
        let game = SelfPlayGame::new(
            white,
            black,
            Arc::new(NeverCalled),
            true,
            Opening::from_fen(STARTPOS),
        );
        assert!(matches!(game, Err(SelfPlayError::MixedResignStyle)));
    }

    #[test]
    fn test_terminal_opening_needs_no_search() {
        let player = || PlayerOptions::<TicTacToe>::new(Arc::new(HeuristicNetwork));
        let mut game = SelfPlayGame::new(
            player(),
            player(),
            Arc::new(NeverCalled),
            false,
            Opening::from_fen("o../oo./xxx"),
        )
        .unwrap();
        assert_eq!(game.play(1, 1, true, true).unwrap(), GameResult::WhiteWon);
        assert_eq!(game.move_count(), 0);
        let mut sink: Vec<TrainingChunk> = Vec::new();
        assert_eq!(game.write_training_data(&mut sink).unwrap(), 0);
    }

    #[test]
    fn test_engine_creation_failure_propagates() {
        let player = || PlayerOptions::<TicTacToe>::new(Arc::new(HeuristicNetwork));
        let mut game = SelfPlayGame::new(
            player(),
            player(),
            Arc::new(NeverCalled),
            true,
            Opening::from_fen(STARTPOS),
        )
        .unwrap();
        assert!(matches!(game.play(1, 1, false, false), Err(SelfPlayError::Engine(_))));
    }
}
