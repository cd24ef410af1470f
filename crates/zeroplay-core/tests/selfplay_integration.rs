//! 自己対局ドライバの統合テスト
//!
//! 探索エンジンは台本どおりに訪問数・最善手・評価を返すモックで置き換える。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use zeroplay_core::board::tictactoe::{STARTPOS, Square, TicTacToe};
use zeroplay_core::board::{GameMove, InputPlanes, Position};
use zeroplay_core::network::{Network, NetworkCapabilities, NetworkComputation};
use zeroplay_core::options::{
    MINIMUM_ALLOWED_VISITS, RESIGN_EARLIEST_MOVE, RESIGN_PERCENTAGE, RESIGN_WDL_STYLE,
};
use zeroplay_core::search::{
    BestEval, BestMoveInfo, DiscardedMove, Responder, SearchContext, SearchEngine, SearchEngineFactory,
};
use zeroplay_core::tablebase::{ProbeState, Tablebase, WdlScore};
use zeroplay_core::tree::{GameTree, lock_tree};
use zeroplay_core::{
    Color, GameResult, Opening, PlayerOptions, SelfPlayConfig, SelfPlayGame, TrainingChunk,
    ValueSelfPlayGames,
};

fn sq(s: &str) -> Square {
    Square::parse(s).unwrap()
}

/// 常に 0 を返すネットワーク
struct ZeroNetwork;

struct ZeroComputation {
    inputs: usize,
}

impl NetworkComputation for ZeroComputation {
    fn add_input(&mut self, _input: InputPlanes) {
        self.inputs += 1;
    }

    fn batch_size(&self) -> usize {
        self.inputs
    }

    fn compute_blocking(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn q_val(&self, _sample: usize) -> f32 {
        0.0
    }
}

impl Network for ZeroNetwork {
    fn capabilities(&self) -> NetworkCapabilities {
        NetworkCapabilities::default()
    }

    fn new_computation(&self) -> Box<dyn NetworkComputation + '_> {
        Box::new(ZeroComputation { inputs: 0 })
    }
}

/// 常にプローブに失敗するテーブルベース
struct FailingTablebase {
    probes: AtomicUsize,
}

impl Tablebase<TicTacToe> for FailingTablebase {
    fn max_cardinality(&self) -> u32 {
        9
    }

    fn probe_wdl(&self, _pos: &TicTacToe) -> (WdlScore, ProbeState) {
        self.probes.fetch_add(1, Ordering::SeqCst);
        (WdlScore::Win, ProbeState::Fail)
    }
}

/// 1手分の台本
#[derive(Clone)]
struct Script {
    /// 絶対表現の指し手ごとの訪問数
    visits: Vec<(Square, u32)>,
    /// `reset_best_move` のたびに次へ進む最善手
    best_order: Vec<Square>,
    eval: BestEval,
    block_until_abort: bool,
}

impl Script {
    fn play(best: Square, eval: BestEval) -> Self {
        Self {
            visits: vec![(best, 10)],
            best_order: vec![best],
            eval,
            block_until_abort: false,
        }
    }
}

fn eval(wl: f32, d: f32, ml: f32) -> BestEval {
    BestEval { wl, d, ml }
}

/// 空いている最初のマス（絶対座標の順）
fn first_empty(pos: &TicTacToe) -> Square {
    (0..9u8)
        .filter_map(Square::from_index)
        .find(|&s| pos.stone_at(s).is_none())
        .unwrap()
}

type ScriptFn = Box<dyn Fn(&TicTacToe) -> Script + Send + Sync>;

struct ScriptedFactory {
    script: ScriptFn,
    created: AtomicUsize,
    resets: Arc<AtomicUsize>,
    /// `run_blocking` に渡されたスレッド数
    threads: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedFactory {
    fn new(script: impl Fn(&TicTacToe) -> Script + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            created: AtomicUsize::new(0),
            resets: Arc::new(AtomicUsize::new(0)),
            threads: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

struct ScriptedEngine {
    tree: Arc<Mutex<GameTree<TicTacToe>>>,
    responder: Mutex<Box<dyn Responder<Square>>>,
    script: Script,
    cursor: AtomicUsize,
    aborted: AtomicBool,
    resets: Arc<AtomicUsize>,
    threads: Arc<Mutex<Vec<usize>>>,
}

impl SearchEngine<Square> for ScriptedEngine {
    fn run_blocking(&self, threads: usize) -> anyhow::Result<()> {
        self.threads.lock().unwrap().push(threads);
        {
            let mut tree = lock_tree(&self.tree);
            let side = tree.side_to_move();
            let legal = tree.head_position().legal_moves();
            let head = tree.current_head_mut();
            head.create_edges(&legal);
            for &(mv, n) in &self.script.visits {
                if let Some(edge) = head.edge_mut(mv.relative_to(side)) {
                    edge.set_visits(n);
                }
            }
        }
        if self.script.block_until_abort {
            while !self.aborted.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        }
        let mut info = BestMoveInfo {
            best_move: self.best_move(),
            ponder: None,
        };
        self.responder.lock().unwrap().output_best_move(&mut info);
        Ok(())
    }

    fn best_move(&self) -> Square {
        let order = &self.script.best_order;
        let i = self.cursor.load(Ordering::SeqCst).min(order.len() - 1);
        order[i]
    }

    fn best_eval(&self) -> BestEval {
        self.script.eval
    }

    fn total_playouts(&self) -> u64 {
        self.script.visits.iter().map(|&(_, n)| u64::from(n)).sum()
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn reset_best_move(&self) {
        self.cursor.fetch_add(1, Ordering::SeqCst);
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

impl SearchEngineFactory<TicTacToe> for ScriptedFactory {
    fn create(
        &self,
        context: SearchContext<TicTacToe>,
    ) -> anyhow::Result<Arc<dyn SearchEngine<Square>>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let script = (self.script)(lock_tree(&context.tree).head_position());
        Ok(Arc::new(ScriptedEngine {
            tree: context.tree,
            responder: Mutex::new(context.responder),
            script,
            cursor: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
            resets: Arc::clone(&self.resets),
            threads: Arc::clone(&self.threads),
        }))
    }
}

fn player() -> PlayerOptions<TicTacToe> {
    PlayerOptions::new(Arc::new(ZeroNetwork))
}

#[test]
fn test_low_visit_best_move_is_retried() {
    // c1 (50 visits) は白の勝ち、a3 (30 visits) は続行
    let factory = ScriptedFactory::new(|_| Script {
        visits: vec![(sq("c1"), 50), (sq("a3"), 30)],
        best_order: vec![sq("a3"), sq("c1")],
        eval: eval(0.0, 0.0, 1.0),
        block_until_abort: false,
    });
    let discarded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&discarded);
    let white = player()
        .with_option(MINIMUM_ALLOWED_VISITS, 40)
        .with_discarded_callback(Arc::new(move |d: &DiscardedMove<Square>| {
            sink.lock().unwrap().push(d.clone())
        }));
    let opening = Opening::from_fen(".../oo./xx.");
    let mut game = SelfPlayGame::new(white, player(), factory.clone(), true, opening).unwrap();

    assert_eq!(game.play(1, 1, false, false).unwrap(), GameResult::WhiteWon);
    assert_eq!(game.moves(), vec![sq("c1")]);
    assert_eq!(factory.resets.load(Ordering::SeqCst), 1);

    let discarded = discarded.lock().unwrap();
    assert_eq!(discarded.len(), 1);
    assert_eq!(discarded[0].start_fen, ".../oo./xx.");
    assert_eq!(discarded[0].moves, vec![sq("a3")]);
}

#[test]
fn test_minimum_visits_met_accepts_immediately() {
    // 最初の1手だけ台本、以降は空きマスを順に埋める
    let factory = ScriptedFactory::new(|pos| {
        if pos.game_ply() != 4 {
            return Script::play(first_empty(pos), eval(0.0, 0.0, 1.0));
        }
        Script {
            visits: vec![(sq("c1"), 50), (sq("a3"), 45)],
            best_order: vec![sq("a3"), sq("c1")],
            eval: eval(0.0, 0.0, 1.0),
            block_until_abort: false,
        }
    });
    let white = player().with_option(MINIMUM_ALLOWED_VISITS, 40);
    let opening = Opening::from_fen(".../oo./xx.");
    let mut game = SelfPlayGame::new(white, player(), factory.clone(), true, opening).unwrap();
    assert_eq!(game.play(1, 1, false, false).unwrap(), GameResult::Draw);
    assert_eq!(game.moves()[0], sq("a3"));
    assert_eq!(factory.resets.load(Ordering::SeqCst), 0);
}

#[test]
fn test_retry_is_bounded_by_edge_count() {
    // 最多訪問手を決して返さないエンジン
    let factory = ScriptedFactory::new(|_| Script {
        visits: vec![(sq("c1"), 50), (sq("a3"), 30)],
        best_order: vec![sq("a3")],
        eval: eval(0.0, 0.0, 1.0),
        block_until_abort: false,
    });
    let white = player().with_option(MINIMUM_ALLOWED_VISITS, 40);
    let opening = Opening::from_fen(".../oo./xx.");
    let mut game = SelfPlayGame::new(white, player(), factory.clone(), false, opening).unwrap();
    assert_eq!(game.play(1, 1, false, false).unwrap(), GameResult::WhiteWon);
    assert_eq!(game.moves(), vec![sq("c1")]);
    // 合法手は5つ
    assert_eq!(factory.resets.load(Ordering::SeqCst), 5);
}

/// 黒番でだけ悪い評価を返す台本
fn black_pessimist(pos: &TicTacToe) -> Script {
    let e = if pos.is_black_to_move() {
        eval(-0.9, 0.0, 10.0)
    } else {
        eval(0.0, 0.0, 10.0)
    };
    Script::play(first_empty(pos), e)
}

#[test]
fn test_win_rate_resign_respects_earliest_move() {
    let resigner = || {
        player()
            .with_option(RESIGN_PERCENTAGE, 10)
            .with_option(RESIGN_EARLIEST_MOVE, 3)
    };
    let factory = ScriptedFactory::new(black_pessimist);
    let mut game =
        SelfPlayGame::new(resigner(), resigner(), factory, true, Opening::from_fen(STARTPOS))
            .unwrap();
    // 黒の2手目（ply 3, move number 3）で投了
    assert_eq!(game.play(1, 1, false, true).unwrap(), GameResult::WhiteWon);
    assert_eq!(game.move_count(), 4);
    assert!(game.worst_eval_for_winner_or_draw() >= 0.5);

    let late = || {
        player()
            .with_option(RESIGN_PERCENTAGE, 10)
            .with_option(RESIGN_EARLIEST_MOVE, 1000)
    };
    let factory = ScriptedFactory::new(black_pessimist);
    let mut game =
        SelfPlayGame::new(late(), late(), factory, true, Opening::from_fen(STARTPOS)).unwrap();
    // 投了せず、a3-b2-c1 の斜めで白の勝ち
    assert_eq!(game.play(1, 1, false, true).unwrap(), GameResult::WhiteWon);
    assert_eq!(game.move_count(), 7);
}

#[test]
fn test_resign_disabled_by_caller() {
    let resigner = || {
        player()
            .with_option(RESIGN_PERCENTAGE, 10)
            .with_option(RESIGN_EARLIEST_MOVE, 0)
    };
    let factory = ScriptedFactory::new(black_pessimist);
    let mut game =
        SelfPlayGame::new(resigner(), resigner(), factory, true, Opening::from_fen(STARTPOS))
            .unwrap();
    game.play(1, 1, false, false).unwrap();
    assert_eq!(game.move_count(), 7);
}

fn wdl_game(white_eval: BestEval, black_eval: BestEval) -> SelfPlayGame<TicTacToe> {
    let wdl = || {
        player()
            .with_option(RESIGN_WDL_STYLE, true)
            .with_option(RESIGN_PERCENTAGE, 20)
    };
    let factory = ScriptedFactory::new(move |pos| {
        let e = if pos.is_black_to_move() {
            black_eval
        } else {
            white_eval
        };
        Script::play(first_empty(pos), e)
    });
    SelfPlayGame::new(wdl(), wdl(), factory, true, Opening::from_fen(STARTPOS)).unwrap()
}

#[test]
fn test_wdl_style_resign() {
    let neutral = eval(0.0, 0.2, 5.0);

    // 白の勝ち確率 0.925
    let mut game = wdl_game(eval(0.9, 0.05, 5.0), neutral);
    assert_eq!(game.play(1, 1, false, true).unwrap(), GameResult::WhiteWon);
    assert_eq!(game.move_count(), 1);

    // 黒の負け確率 0.925
    let mut game = wdl_game(neutral, eval(-0.9, 0.05, 5.0));
    assert_eq!(game.play(1, 1, false, true).unwrap(), GameResult::WhiteWon);
    assert_eq!(game.move_count(), 2);

    // 黒の勝ち確率 0.925
    let mut game = wdl_game(neutral, eval(0.9, 0.05, 5.0));
    assert_eq!(game.play(1, 1, false, true).unwrap(), GameResult::BlackWon);
    assert_eq!(game.move_count(), 2);

    // 引き分け確率 0.85
    let mut game = wdl_game(neutral, eval(0.0, 0.85, 5.0));
    assert_eq!(game.play(1, 1, false, true).unwrap(), GameResult::Draw);
    assert!(game.worst_eval_for_winner_or_draw() > 0.0);
}

#[test]
fn test_finished_game_result_is_final() {
    let mut game = wdl_game(eval(0.0, 0.2, 5.0), eval(0.9, 0.05, 5.0));
    assert_eq!(game.play(1, 1, false, true).unwrap(), GameResult::BlackWon);
    let moves = game.moves();
    assert_eq!(game.move_count(), 2);

    // 投了なしで呼び直しても続きは指さない
    assert_eq!(game.play(1, 1, false, false).unwrap(), GameResult::BlackWon);
    assert_eq!(game.game_result(), GameResult::BlackWon);
    assert_eq!(game.move_count(), 2);
    assert_eq!(game.moves(), moves);
}

#[test]
fn test_config_threads_reach_engine() {
    let config =
        SelfPlayConfig::from_toml_str("[white]\nthreads = 3\n\n[black]\nthreads = 2\n").unwrap();
    let line = ["a1", "a2", "b1", "b2", "c1"];
    let factory = ScriptedFactory::new(move |pos| {
        Script::play(sq(line[pos.game_ply() as usize]), eval(0.0, 0.0, 5.0))
    });
    let white = config.white.apply(player());
    let black = config.black.apply(player());
    let mut game =
        SelfPlayGame::new(white, black, factory.clone(), true, Opening::from_fen(STARTPOS))
            .unwrap();
    let result = game
        .play(config.threads(Color::White), config.threads(Color::Black), false, false)
        .unwrap();
    assert_eq!(result, GameResult::WhiteWon);
    assert_eq!(*factory.threads.lock().unwrap(), vec![3, 2, 3, 2, 3]);
}

#[test]
fn test_abort_interrupts_running_search() {
    let factory = ScriptedFactory::new(|pos| Script {
        block_until_abort: true,
        ..Script::play(first_empty(pos), eval(0.0, 0.0, 5.0))
    });
    let mut game =
        SelfPlayGame::new(player(), player(), factory.clone(), true, Opening::from_fen(STARTPOS))
            .unwrap();
    let handle = game.abort_handle();
    let worker = thread::spawn(move || {
        let result = game.play(1, 1, true, false);
        (game, result)
    });

    while factory.created.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    handle.request_abort();

    let (mut game, result) = worker.join().unwrap();
    assert_eq!(result.unwrap(), GameResult::Undecided);
    assert_eq!(game.move_count(), 1);
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    let mut sink: Vec<TrainingChunk> = Vec::new();
    assert_eq!(game.write_training_data(&mut sink).unwrap(), 0);
}

#[test]
fn test_training_data_for_five_ply_game() {
    let line = ["a1", "a2", "b1", "b2", "c1"];
    let factory = ScriptedFactory::new(move |pos| {
        let ply = pos.game_ply() as usize;
        let ml = if ply == 4 { 2.0 } else { 20.0 };
        Script::play(sq(line[ply]), eval(0.1, 0.2, ml))
    });
    let best_moves = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&best_moves);
    let white = player().with_best_move_callback(Arc::new(move |info: &BestMoveInfo<Square>| {
        sink.lock().unwrap().push(info.best_move);
    }));
    let mut game =
        SelfPlayGame::new(white, player(), factory, false, Opening::from_fen(STARTPOS)).unwrap();

    assert_eq!(game.play(1, 1, true, false).unwrap(), GameResult::WhiteWon);
    assert_eq!(game.moves(), line.iter().map(|s| sq(s)).collect::<Vec<_>>());
    assert_eq!(game.total_nodes(), 50);
    assert_eq!(*best_moves.lock().unwrap(), vec![sq("a1"), sq("b1"), sq("c1")]);

    let mut chunks: Vec<TrainingChunk> = Vec::new();
    assert_eq!(game.write_training_data(&mut chunks).unwrap(), 5);
    let plies: Vec<f32> = chunks.iter().map(|c| c.plies_left).collect();
    assert_eq!(plies, vec![6.0, 5.0, 4.0, 3.0, 2.0]);
    let results: Vec<i8> = chunks.iter().map(|c| c.result).collect();
    assert_eq!(results, vec![1, -1, 1, -1, 1]);
    // 黒番のサンプルの方策も絶対表現
    assert!(chunks[1].policy.iter().any(|p| p.mv == "a2" && p.probability == 1.0));
}

#[test]
fn test_batched_games_terminate_with_zero_network() {
    let openings = vec![
        Opening::from_fen(STARTPOS),
        Opening::new(STARTPOS, vec![sq("b2")]),
        Opening::new(STARTPOS, vec![sq("a1"), sq("c3")]),
        Opening::from_fen("x../.o./..."),
    ];
    let tablebase = Arc::new(FailingTablebase {
        probes: AtomicUsize::new(0),
    });
    let mut games =
        ValueSelfPlayGames::new(player(), player(), &openings, Some(tablebase.clone())).unwrap();
    games.play().unwrap();

    assert_eq!(games.len(), 4);
    assert!(games.results().iter().all(|r| r.is_terminal()));
    assert!(games.plies_played() <= 4 * 9);
    assert!(tablebase.probes.load(Ordering::SeqCst) > 0);
    // 評価がすべて同点なら最後のエッジ（絶対座標で最後の空きマス）を選ぶ
    assert_eq!(games.game_moves(0).unwrap()[0], sq("c3"));
    assert_eq!(games.game_moves(1).unwrap()[..2], [sq("b2"), sq("c3")]);
    assert_eq!(games.game_moves(2).unwrap()[..3], [sq("a1"), sq("c3"), sq("b3")]);
    for i in 0..games.len() {
        let pos = TicTacToe::from_fen(&games.head_fen(i).unwrap()).unwrap();
        assert!(pos.legal_moves().is_empty());
    }
}

#[test]
fn test_batched_games_take_immediate_wins() {
    let openings = vec![
        Opening::from_fen(".../oo./xx."),
        Opening::from_fen("x../oo./x.x"),
    ];
    let mut games = ValueSelfPlayGames::new(player(), player(), &openings, None).unwrap();
    games.play().unwrap();
    assert_eq!(games.results(), &[GameResult::WhiteWon, GameResult::BlackWon]);
    assert_eq!(games.game_moves(0).unwrap(), vec![sq("c1")]);
    assert_eq!(games.game_moves(1).unwrap(), vec![sq("c2")]);
}
