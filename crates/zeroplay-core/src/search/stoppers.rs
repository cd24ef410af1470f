//! 探索停止条件
//!
//! 自己対局の1手ごとの予算（ノード数・プレイアウト数・時間）を
//! [`ChainedSearchStopper`] にまとめる。どれか1つでも満たせば停止する。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 探索エンジンが停止判定に渡す統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationStats {
    /// 木全体のノード数（再利用された木を含む）
    pub total_nodes: u64,
    /// この手の探索開始からのプレイアウト数
    pub nodes_since_movestart: u64,
    /// この手の探索開始からの経過時間
    pub time_since_movestart: Duration,
}

/// 停止条件
pub trait SearchStopper: Send {
    /// 停止すべきなら true
    fn should_stop(&mut self, stats: &IterationStats) -> bool;
}

/// ノード数（訪問数）上限
pub struct VisitsStopper {
    limit: u64,
}

impl VisitsStopper {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl SearchStopper for VisitsStopper {
    fn should_stop(&mut self, stats: &IterationStats) -> bool {
        stats.total_nodes >= self.limit
    }
}

/// プレイアウト数上限
pub struct PlayoutsStopper {
    limit: u64,
}

impl PlayoutsStopper {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl SearchStopper for PlayoutsStopper {
    fn should_stop(&mut self, stats: &IterationStats) -> bool {
        stats.nodes_since_movestart >= self.limit
    }
}

/// 思考時間上限
pub struct TimeLimitStopper {
    limit: Duration,
}

impl TimeLimitStopper {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl SearchStopper for TimeLimitStopper {
    fn should_stop(&mut self, stats: &IterationStats) -> bool {
        stats.time_since_movestart >= self.limit
    }
}

/// 複数の停止条件の OR
#[derive(Default)]
pub struct ChainedSearchStopper {
    stoppers: Vec<Box<dyn SearchStopper>>,
}

impl ChainedSearchStopper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stopper(&mut self, stopper: Box<dyn SearchStopper>) {
        self.stoppers.push(stopper);
    }

    pub fn len(&self) -> usize {
        self.stoppers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stoppers.is_empty()
    }
}

impl SearchStopper for ChainedSearchStopper {
    fn should_stop(&mut self, stats: &IterationStats) -> bool {
        // 全条件を評価する（状態を持つ停止条件があるため短絡しない）
        let mut stop = false;
        for stopper in &mut self.stoppers {
            stop |= stopper.should_stop(stats);
        }
        stop
    }
}

/// 自己対局の1手あたりの探索予算。`None` は無制限。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SelfPlayLimits {
    pub visits: Option<u64>,
    pub playouts: Option<u64>,
    pub movetime_ms: Option<u64>,
}

impl SelfPlayLimits {
    pub fn with_visits(mut self, visits: u64) -> Self {
        self.visits = Some(visits);
        self
    }

    pub fn with_playouts(mut self, playouts: u64) -> Self {
        self.playouts = Some(playouts);
        self
    }

    pub fn with_movetime(mut self, movetime: Duration) -> Self {
        self.movetime_ms = Some(u64::try_from(movetime.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// 設定された上限だけを並べた停止条件を作る
    pub fn make_search_stopper(&self) -> ChainedSearchStopper {
        let mut result = ChainedSearchStopper::new();
        if let Some(visits) = self.visits {
            result.add_stopper(Box::new(VisitsStopper::new(visits)));
        }
        if let Some(playouts) = self.playouts {
            result.add_stopper(Box::new(PlayoutsStopper::new(playouts)));
        }
        if let Some(ms) = self.movetime_ms {
            result.add_stopper(Box::new(TimeLimitStopper::new(Duration::from_millis(ms))));
        }
        result
    }
}
