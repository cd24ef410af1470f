use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use rand::SeedableRng;
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use serde::Serialize;
use zeroplay_core::board::tictactoe::{HeuristicNetwork, PerfectPlayTablebase, STARTPOS, TicTacToe};
use zeroplay_core::network::NnCache;
use zeroplay_core::tablebase::Tablebase;
use zeroplay_core::search::SelfPlayLimits;
use zeroplay_core::{
    Color, GameResult, Opening, PlayerConfig, PlayerOptions, SelfPlayConfig, SelfPlayOptions,
    ValueSelfPlayGames,
};

use tools::common::io::open_writer;
use tools::openings::{OpeningLine, load_openings};

/// 1手読みバッチ自己対局ハーネス（三目並べ）。
///
/// # よく使うコマンド例
///
/// - 初期局面から16局:
///   `cargo run -p tools --bin value_selfplay -- --games 16`
///
/// - 開始局面ファイルからランダムに選んで、5石以下は完全解で判定:
///   `cargo run -p tools --bin value_selfplay -- --games 64 --openings openings.txt --random --tablebase-pieces 5`
///
/// `--out` 未指定時は `runs/selfplay/<timestamp>-value-selfplay.jsonl` に書き出す。
#[derive(Parser, Debug)]
#[command(author, version, about = "Batched one-ply value self-play harness")]
struct Cli {
    /// Number of games played in one batch
    #[arg(long, default_value_t = 8)]
    games: usize,

    /// Openings file (one per line, `startpos` / `fen <fen>` with optional `moves ...`)
    #[arg(long)]
    openings: Option<PathBuf>,

    /// Single opening line used for every game
    #[arg(long, conflicts_with = "openings")]
    fen: Option<String>,

    /// Pick openings at random instead of cycling through them in file order
    #[arg(long, default_value_t = false)]
    random: bool,

    /// RNG seed for --random
    #[arg(long)]
    seed: Option<u64>,

    /// TOML config with [white] / [black] sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// Adjudicate positions with at most this many stones by exact solving
    #[arg(long)]
    tablebase_pieces: Option<u32>,

    /// Evaluation cache entries per side
    #[arg(long, default_value_t = 200_000)]
    cache_size: usize,

    /// Output path (defaults to runs/selfplay/<timestamp>-value-selfplay.jsonl, `.gz` compresses)
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Serialize)]
struct MetaLog<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: String,
    games: usize,
    openings: Vec<String>,
    random: bool,
    seed: Option<u64>,
    tablebase_pieces: Option<u32>,
    white: &'a SelfPlayOptions,
    black: &'a SelfPlayOptions,
}

#[derive(Serialize)]
struct GameLog<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    game_id: usize,
    opening: &'a str,
    moves: Vec<String>,
    result: GameResult,
    final_fen: String,
}

#[derive(Serialize)]
struct SummaryLog {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: String,
    total_games: usize,
    white_wins: usize,
    black_wins: usize,
    draws: usize,
    unfinished: usize,
    plies_played: u64,
    aborted: bool,
    elapsed_ms: u128,
}

fn resolve_output_path(out: Option<&Path>, timestamp: &chrono::DateTime<Local>) -> PathBuf {
    if let Some(path) = out {
        return path.to_path_buf();
    }
    let name = format!("{}-value-selfplay.jsonl", timestamp.format("%Y%m%d-%H%M%S"));
    PathBuf::from("runs/selfplay").join(name)
}

/// 1手読みでは使われない設定項目の名前
fn ignored_settings(player: &PlayerConfig) -> Vec<&'static str> {
    let defaults = SelfPlayOptions::default();
    let mut ignored = Vec::new();
    if player.limits != SelfPlayLimits::default() {
        ignored.push("limits");
    }
    if player.threads != 1 {
        ignored.push("threads");
    }
    if player.selfplay.reuse_tree {
        ignored.push("reuse-tree");
    }
    if player.selfplay.resign_percentage != defaults.resign_percentage {
        ignored.push("resign-percentage");
    }
    if player.selfplay.resign_wdl_style {
        ignored.push("resign-wdlstyle");
    }
    if player.selfplay.resign_earliest_move != defaults.resign_earliest_move {
        ignored.push("resign-earliest-move");
    }
    if player.selfplay.minimum_allowed_visits != defaults.minimum_allowed_visits {
        ignored.push("minimum-allowed-visits");
    }
    ignored
}

/// 対局数ぶんの開始局面を選ぶ（インデックス）
fn assign_openings(count: usize, games: usize, random: bool, seed: Option<u64>) -> Vec<usize> {
    if !random {
        return (0..games).map(|i| i % count).collect();
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let indices: Vec<usize> = (0..count).collect();
    (0..games)
        .map(|_| indices.choose(&mut rng).copied().unwrap_or(0))
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    if cli.games == 0 {
        bail!("--games must be at least 1");
    }

    let config = match &cli.config {
        Some(path) => SelfPlayConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SelfPlayConfig::default(),
    };
    for side in [Color::White, Color::Black] {
        let ignored = ignored_settings(config.player(side));
        if !ignored.is_empty() {
            log::warn!(
                "[{}] settings ignored by one-ply value self-play: {}",
                side.label(),
                ignored.join(", ")
            );
        }
    }

    let lines = load_openings(cli.openings.as_deref(), cli.fen.as_deref())?;
    let openings: Vec<Opening<_>> = lines
        .iter()
        .map(|line| {
            line.build::<TicTacToe>(STARTPOS)
                .with_context(|| format!("invalid opening: {}", line.describe()))
        })
        .collect::<Result<_>>()?;
    let assignment = assign_openings(openings.len(), cli.games, cli.random, cli.seed);
    let batch: Vec<Opening<_>> = assignment.iter().map(|&i| openings[i].clone()).collect();

    let network = Arc::new(HeuristicNetwork);
    let white = config.white.apply(
        PlayerOptions::<TicTacToe>::new(network.clone())
            .with_cache(Arc::new(NnCache::new(cli.cache_size))),
    );
    let black = config.black.apply(
        PlayerOptions::<TicTacToe>::new(network).with_cache(Arc::new(NnCache::new(cli.cache_size))),
    );
    let white_options = white.selfplay_options()?;
    let black_options = black.selfplay_options()?;
    let tablebase = cli
        .tablebase_pieces
        .map(|n| Arc::new(PerfectPlayTablebase::new(n)) as Arc<dyn Tablebase<TicTacToe>>);

    let mut games = ValueSelfPlayGames::new(white, black, &batch, tablebase)?;

    // Ctrl-C で中断
    {
        let handle = games.abort_handle();
        ctrlc::set_handler(move || {
            eprintln!("\nAborting self-play...");
            handle.request_abort();
        })
        .ok();
    }

    let timestamp = Local::now();
    let output_path = resolve_output_path(cli.out.as_deref(), &timestamp);
    let mut writer = open_writer(&output_path)
        .with_context(|| format!("failed to open {}", output_path.display()))?;
    writer.write_json_line(&MetaLog {
        kind: "meta",
        timestamp: timestamp.to_rfc3339(),
        games: cli.games,
        openings: lines.iter().map(OpeningLine::describe).collect(),
        random: cli.random,
        seed: cli.seed,
        tablebase_pieces: cli.tablebase_pieces,
        white: &white_options,
        black: &black_options,
    })?;

    log::info!("playing {} games from {} openings", cli.games, openings.len());
    let started = Instant::now();
    games.play()?;
    let elapsed = started.elapsed();

    let mut summary = SummaryLog {
        kind: "summary",
        timestamp: Local::now().to_rfc3339(),
        total_games: games.len(),
        white_wins: 0,
        black_wins: 0,
        draws: 0,
        unfinished: 0,
        plies_played: games.plies_played(),
        aborted: games.abort_handle().is_aborted(),
        elapsed_ms: elapsed.as_millis(),
    };
    for (game_id, (&result, &opening_idx)) in games.results().iter().zip(&assignment).enumerate() {
        match result {
            GameResult::WhiteWon => summary.white_wins += 1,
            GameResult::BlackWon => summary.black_wins += 1,
            GameResult::Draw => summary.draws += 1,
            GameResult::Undecided => summary.unfinished += 1,
        }
        let moves = games
            .game_moves(game_id)
            .unwrap_or_default()
            .iter()
            .map(ToString::to_string)
            .collect();
        writer.write_json_line(&GameLog {
            kind: "game",
            game_id: game_id + 1,
            opening: &lines[opening_idx].describe(),
            moves,
            result,
            final_fen: games.head_fen(game_id).unwrap_or_default(),
        })?;
    }
    writer.write_json_line(&summary)?;
    writer
        .close()
        .with_context(|| format!("failed to finalize {}", output_path.display()))?;

    log::info!(
        "finished {} games in {:.1}s: white {} / black {} / draw {} / unfinished {}",
        summary.total_games,
        elapsed.as_secs_f64(),
        summary.white_wins,
        summary.black_wins,
        summary.draws,
        summary.unfinished
    );
    log::info!("wrote {}", output_path.display());
    Ok(())
}
