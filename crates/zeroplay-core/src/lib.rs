//! # zeroplay-core
//!
//! AlphaZero 方式の学習データ生成のための自己対局ライブラリ。
//!
//! ## モジュール構成
//!
//! - `types`: 基本型（Color, GameResult, Opening）
//! - `board`: 盤面レイヤーのトレイトと参照実装（三目並べ）
//! - `network`: ニューラルネットワークのバッチ計算と評価キャッシュ
//! - `tablebase`: 終盤データベースの適用判定
//! - `tree`: 対局ごとの探索木
//! - `search`: 探索エンジンのインターフェースと停止条件
//! - `options` / `config`: プレイヤー設定と TOML 設定ファイル
//! - `value_games`: 1手読みのバッチ自己対局
//! - `game`: 木探索による自己対局
//! - `training`: 学習サンプルと終局後の確定処理
//!

// 基本型
pub mod error;
pub mod types;

// 外部レイヤーとのインターフェース
pub mod board;
pub mod network;
pub mod search;
pub mod tablebase;

// 対局状態
pub mod abort;
pub mod tree;

// 設定
pub mod config;
pub mod options;

// 自己対局ドライバ
pub mod game;
pub mod training;
pub mod value_games;

pub use abort::AbortHandle;
pub use config::{PlayerConfig, SelfPlayConfig};
pub use error::{Result, SelfPlayError};
pub use game::SelfPlayGame;
pub use options::{OptionsDict, PlayerOptions, SelfPlayOptions};
pub use training::{JsonlTrainingWriter, TrainingChunk, TrainingDataWriter};
pub use types::{Color, GameResult, Opening};
pub use value_games::ValueSelfPlayGames;
