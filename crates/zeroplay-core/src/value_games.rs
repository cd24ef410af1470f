//! 1手読みによるバッチ自己対局
//!
//! 多数の対局を1手ずつ並行に進める。手番が同じ対局をまとめ、全対局の全子局面を
//! 1回のネットワークバッチで評価する。木探索は行わない。

use std::sync::Arc;

use crate::abort::AbortHandle;
use crate::board::{FillEmptyHistory, Position};
use crate::error::{Result, SelfPlayError};
use crate::options::PlayerOptions;
use crate::tablebase::{Tablebase, probe_game_result};
use crate::tree::GameTree;
use crate::types::{Color, GameResult, Opening};

/// ネットワーク入力に使う履歴局面数
const VALUE_HISTORY_PLANES: usize = 8;

/// 子局面の評価方法
#[derive(Debug, Clone, Copy, PartialEq)]
enum Candidate {
    /// 終局局面（指し手側から見た値）
    Terminal(f32),
    /// バッチ内のインデックス
    Batch(usize),
}

/// 値が最大の候補を選ぶ。同値なら後の候補を選ぶ。
pub fn select_best(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in values.iter().enumerate() {
        match best {
            Some((_, best_value)) if value < best_value => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}

/// バッチ自己対局ドライバ
pub struct ValueSelfPlayGames<P: Position> {
    players: [PlayerOptions<P>; Color::NUM],
    tablebase: Option<Arc<dyn Tablebase<P>>>,
    trees: Vec<GameTree<P>>,
    results: Vec<GameResult>,
    chess960: bool,
    plies_played: u64,
    abort: AbortHandle,
}

impl<P: Position> ValueSelfPlayGames<P> {
    pub fn new(
        white: PlayerOptions<P>,
        black: PlayerOptions<P>,
        openings: &[Opening<P::Move>],
        tablebase: Option<Arc<dyn Tablebase<P>>>,
    ) -> Result<Self> {
        let chess960 = white.selfplay_options()?.chess960 || black.selfplay_options()?.chess960;
        let trees = openings
            .iter()
            .map(|opening| GameTree::from_fen(&opening.start_fen, &opening.moves))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            players: [white, black],
            tablebase,
            results: vec![GameResult::Undecided; trees.len()],
            trees,
            chess960,
            plies_played: 0,
            abort: AbortHandle::new(),
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.request_abort();
    }

    /// 全対局が終局するか中断されるまで進める
    pub fn play(&mut self) -> Result<()> {
        loop {
            if self.abort.is_aborted() {
                log::info!("value selfplay aborted after {} plies", self.plies_played);
                break;
            }
            self.update_results();

            let Some(first) = self.results.iter().position(|r| !r.is_terminal()) else {
                break;
            };
            let black = self.trees[first].is_black_to_move();
            self.play_group(black)?;
        }
        Ok(())
    }

    /// 規則とテーブルベースで未決着の対局を判定する
    fn update_results(&mut self) {
        for (i, (tree, result)) in self.trees.iter().zip(self.results.iter_mut()).enumerate() {
            if result.is_terminal() {
                continue;
            }
            let mut outcome = tree.position_history().compute_game_result();
            if !outcome.is_terminal() {
                if let Some(tb) = &self.tablebase {
                    outcome = probe_game_result(tb.as_ref(), tree.head_position())
                        .unwrap_or(GameResult::Undecided);
                }
            }
            if outcome.is_terminal() {
                log::debug!("game {i} finished: {} at ply {}", outcome.label(), tree.ply_count());
                *result = outcome;
            }
        }
    }

    /// 指定した手番の未決着対局を1手ずつ進める
    fn play_group(&mut self, black: bool) -> Result<()> {
        let side = if black { Color::Black } else { Color::White };
        let network = Arc::clone(&self.players[side.index()].network);
        let input_format = network.capabilities().input_format;
        let mut computation = network.new_computation();

        let mut plans: Vec<(usize, Vec<Candidate>)> = Vec::new();
        for (i, tree) in self.trees.iter_mut().enumerate() {
            if self.results[i].is_terminal() || tree.is_black_to_move() != black {
                continue;
            }
            let legal = tree.head_position().legal_moves();
            tree.current_head_mut().create_edges(&legal);

            let mut history = tree.position_history().clone();
            let mut candidates = Vec::with_capacity(legal.len());
            for edge in tree.current_head().edges() {
                history.append(edge.relative_move());
                let candidate = match history.compute_game_result() {
                    GameResult::Undecided => {
                        let encoded = history.encode_for_nn(
                            input_format,
                            VALUE_HISTORY_PLANES,
                            FillEmptyHistory::FenOnly,
                        );
                        computation.add_input(encoded.planes);
                        Candidate::Batch(computation.batch_size() - 1)
                    }
                    GameResult::Draw => Candidate::Terminal(0.0),
                    // 直前に指した側の勝ち
                    GameResult::WhiteWon | GameResult::BlackWon => Candidate::Terminal(1.0),
                };
                candidates.push(candidate);
                history.pop();
            }
            plans.push((i, candidates));
        }

        if computation.batch_size() > 0 {
            computation.compute_blocking().map_err(SelfPlayError::Network)?;
        }

        for (i, candidates) in plans {
            let values: Vec<f32> = candidates
                .iter()
                .map(|c| match *c {
                    Candidate::Terminal(value) => value,
                    Candidate::Batch(sample) => -computation.q_val(sample),
                })
                .collect();
            let tree = &mut self.trees[i];
            let Some(best) = select_best(&values) else {
                log::warn!(
                    "game {i} has no legal moves but is undecided at {}; scoring as draw",
                    tree.head_position().to_fen()
                );
                self.results[i] = GameResult::Draw;
                continue;
            };
            let mv = tree.current_head().edges()[best].get_move(black);
            log::debug!("game {i} ply {}: {mv} ({:.3})", tree.ply_count(), values[best]);
            tree.make_move(mv);
            self.plies_played += 1;
        }
        Ok(())
    }

    /// 各対局の結果
    pub fn results(&self) -> &[GameResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// 対局 `index` の開始局面からの指し手（絶対表現）
    pub fn game_moves(&self, index: usize) -> Option<Vec<P::Move>> {
        self.trees.get(index).map(|tree| tree.moves(self.chess960))
    }

    /// 対局 `index` の現局面
    pub fn head_fen(&self, index: usize) -> Option<String> {
        self.trees.get(index).map(|tree| tree.head_position().to_fen())
    }

    /// 全対局で指された手数の合計（強制手順を除く）
    pub fn plies_played(&self) -> u64 {
        self.plies_played
    }
}
