//! TOML 設定ファイル
//!
//! ```toml
//! [white]
//! resign-percentage = 5.0
//! threads = 2
//!
//! [white.limits]
//! visits = 800
//!
//! [black]
//! reuse-tree = true
//!
//! [black.engine-options]
//! cpuct = "1.7"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::board::Position;
use crate::error::Result;
use crate::options::{PlayerOptions, SelfPlayOptions};
use crate::search::SelfPlayLimits;
use crate::types::Color;

fn default_threads() -> usize {
    1
}

/// 片側プレイヤーの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlayerConfig {
    #[serde(flatten)]
    pub selfplay: SelfPlayOptions,
    #[serde(default)]
    pub limits: SelfPlayLimits,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// 探索エンジンへそのまま渡すオプション
    #[serde(default)]
    pub engine_options: BTreeMap<String, String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            selfplay: SelfPlayOptions::default(),
            limits: SelfPlayLimits::default(),
            threads: default_threads(),
            engine_options: BTreeMap::new(),
        }
    }
}

impl PlayerConfig {
    /// プレイヤー設定に反映する
    pub fn apply<P: Position>(&self, player: PlayerOptions<P>) -> PlayerOptions<P> {
        let mut player = player
            .with_selfplay_options(&self.selfplay)
            .with_limits(self.limits);
        for (name, value) in &self.engine_options {
            player.options.set(name, value);
        }
        player
    }
}

/// 自己対局設定（白・黒）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfPlayConfig {
    pub white: PlayerConfig,
    pub black: PlayerConfig,
}

impl SelfPlayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SelfPlayConfig = toml::from_str(text)?;
        config.white.selfplay.validate()?;
        config.black.selfplay.validate()?;
        log::debug!("loaded selfplay config: {config:?}");
        Ok(config)
    }

    pub fn player(&self, side: Color) -> &PlayerConfig {
        match side {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    /// 探索スレッド数（0 は 1 とみなす）
    pub fn threads(&self, side: Color) -> usize {
        self.player(side).threads.max(1)
    }
}
