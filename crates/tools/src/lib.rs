//! 自己対局ツール群
//!
//! - `common`: gzip 対応のファイル入出力
//! - `openings`: 開始局面ファイルの読み込み

pub mod common;
pub mod openings;
