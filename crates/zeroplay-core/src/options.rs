//! プレイヤーごとのオプション
//!
//! 名前付きオプション集合 [`OptionsDict`] はそのまま探索エンジンにも渡される。
//! 自己対局レイヤーが読むのは [`SelfPlayOptions`] の6項目だけ。

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::board::Position;
use crate::error::{Result, SelfPlayError};
use crate::network::{Network, NnCache};
use crate::search::responder::{noop_best_move, noop_discarded, noop_info};
use crate::search::{BestMoveCallback, DiscardedCallback, InfoCallback, SelfPlayLimits};

pub const REUSE_TREE: &str = "reuse-tree";
pub const RESIGN_PERCENTAGE: &str = "resign-percentage";
pub const RESIGN_WDL_STYLE: &str = "resign-wdlstyle";
pub const RESIGN_EARLIEST_MOVE: &str = "resign-earliest-move";
pub const MINIMUM_ALLOWED_VISITS: &str = "minimum-allowed-visits";
pub const CHESS960: &str = "chess960";

const RESIGN_PERCENTAGE_MAX: f32 = 100.0;
const RESIGN_EARLIEST_MOVE_MAX: u32 = 1000;
const MINIMUM_ALLOWED_VISITS_MAX: u32 = 1_000_000;

/// 名前付きオプション集合（名前 -> 文字列値）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsDict {
    values: BTreeMap<String, String>,
}

impl OptionsDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Display) {
        self.values.insert(name.to_string(), value.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// 型付きで取得する。未設定なら `None`。
    pub fn get<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| SelfPlayError::InvalidOptionValue {
                    name: name.to_string(),
                    value: raw.clone(),
                }),
        }
    }

    pub fn get_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.get(name)?.unwrap_or(default))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// 自己対局レイヤーが使うオプション
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SelfPlayOptions {
    /// 手をまたいで探索木を再利用する
    pub reuse_tree: bool,
    /// 投了閾値（%）
    pub resign_percentage: f32,
    /// 投了閾値を勝ち・引き分け・負けのいずれかが (100 - 閾値)% を超えたかで判定する
    #[serde(rename = "resign-wdlstyle")]
    pub resign_wdl_style: bool,
    /// 投了を許す最も早い手数
    pub resign_earliest_move: u32,
    /// 最多訪問手でない限り、この訪問数に満たない最善手は選び直す
    pub minimum_allowed_visits: u32,
    /// キャスリングを「キングがルークを取る」形式で表記する
    pub chess960: bool,
}

impl Default for SelfPlayOptions {
    fn default() -> Self {
        Self {
            reuse_tree: false,
            resign_percentage: 0.0,
            resign_wdl_style: false,
            resign_earliest_move: 0,
            minimum_allowed_visits: 0,
            chess960: false,
        }
    }
}

fn out_of_range(name: &'static str, value: impl Display, max: impl Display) -> SelfPlayError {
    SelfPlayError::OptionOutOfRange {
        name,
        value: value.to_string(),
        min: "0".to_string(),
        max: max.to_string(),
    }
}

impl SelfPlayOptions {
    /// 名前付きオプション集合から読み取る。未設定の項目は既定値。
    pub fn from_dict(dict: &OptionsDict) -> Result<Self> {
        let defaults = Self::default();
        let options = Self {
            reuse_tree: dict.get_or(REUSE_TREE, defaults.reuse_tree)?,
            resign_percentage: dict.get_or(RESIGN_PERCENTAGE, defaults.resign_percentage)?,
            resign_wdl_style: dict.get_or(RESIGN_WDL_STYLE, defaults.resign_wdl_style)?,
            resign_earliest_move: dict.get_or(RESIGN_EARLIEST_MOVE, defaults.resign_earliest_move)?,
            minimum_allowed_visits: dict
                .get_or(MINIMUM_ALLOWED_VISITS, defaults.minimum_allowed_visits)?,
            chess960: dict.get_or(CHESS960, defaults.chess960)?,
        };
        options.validate()?;
        Ok(options)
    }

    /// 名前付きオプション集合へ書き出す
    pub fn write_to(&self, dict: &mut OptionsDict) {
        dict.set(REUSE_TREE, self.reuse_tree);
        dict.set(RESIGN_PERCENTAGE, self.resign_percentage);
        dict.set(RESIGN_WDL_STYLE, self.resign_wdl_style);
        dict.set(RESIGN_EARLIEST_MOVE, self.resign_earliest_move);
        dict.set(MINIMUM_ALLOWED_VISITS, self.minimum_allowed_visits);
        dict.set(CHESS960, self.chess960);
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=RESIGN_PERCENTAGE_MAX).contains(&self.resign_percentage) {
            return Err(out_of_range(
                RESIGN_PERCENTAGE,
                self.resign_percentage,
                RESIGN_PERCENTAGE_MAX,
            ));
        }
        if self.resign_earliest_move > RESIGN_EARLIEST_MOVE_MAX {
            return Err(out_of_range(
                RESIGN_EARLIEST_MOVE,
                self.resign_earliest_move,
                RESIGN_EARLIEST_MOVE_MAX,
            ));
        }
        if self.minimum_allowed_visits > MINIMUM_ALLOWED_VISITS_MAX {
            return Err(out_of_range(
                MINIMUM_ALLOWED_VISITS,
                self.minimum_allowed_visits,
                MINIMUM_ALLOWED_VISITS_MAX,
            ));
        }
        Ok(())
    }

    /// 投了閾値（0〜1）
    #[inline]
    pub fn resign_fraction(&self) -> f32 {
        self.resign_percentage / 100.0
    }
}

/// 手番ごとのプレイヤー設定
///
/// 呼び出し側が所有し、ドライバは `Arc` 経由で共有資源を参照する。
pub struct PlayerOptions<P: Position> {
    pub network: Arc<dyn Network>,
    pub options: OptionsDict,
    pub search_limits: SelfPlayLimits,
    pub cache: Arc<NnCache>,
    pub best_move_callback: BestMoveCallback<P::Move>,
    pub info_callback: InfoCallback<P::Move>,
    pub discarded_callback: DiscardedCallback<P::Move>,
}

impl<P: Position> Clone for PlayerOptions<P> {
    fn clone(&self) -> Self {
        Self {
            network: Arc::clone(&self.network),
            options: self.options.clone(),
            search_limits: self.search_limits,
            cache: Arc::clone(&self.cache),
            best_move_callback: Arc::clone(&self.best_move_callback),
            info_callback: Arc::clone(&self.info_callback),
            discarded_callback: Arc::clone(&self.discarded_callback),
        }
    }
}

impl<P: Position> PlayerOptions<P> {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            options: OptionsDict::new(),
            search_limits: SelfPlayLimits::default(),
            cache: Arc::new(NnCache::default()),
            best_move_callback: noop_best_move(),
            info_callback: noop_info(),
            discarded_callback: noop_discarded(),
        }
    }

    pub fn with_option(mut self, name: &str, value: impl Display) -> Self {
        self.options.set(name, value);
        self
    }

    pub fn with_selfplay_options(mut self, options: &SelfPlayOptions) -> Self {
        options.write_to(&mut self.options);
        self
    }

    pub fn with_limits(mut self, limits: SelfPlayLimits) -> Self {
        self.search_limits = limits;
        self
    }

    pub fn with_cache(mut self, cache: Arc<NnCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_best_move_callback(mut self, callback: BestMoveCallback<P::Move>) -> Self {
        self.best_move_callback = callback;
        self
    }

    pub fn with_info_callback(mut self, callback: InfoCallback<P::Move>) -> Self {
        self.info_callback = callback;
        self
    }

    pub fn with_discarded_callback(mut self, callback: DiscardedCallback<P::Move>) -> Self {
        self.discarded_callback = callback;
        self
    }

    /// 自己対局オプションを読み取る（範囲外ならエラー）
    pub fn selfplay_options(&self) -> Result<SelfPlayOptions> {
        SelfPlayOptions::from_dict(&self.options)
    }
}
