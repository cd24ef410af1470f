//! ニューラルネットワークのバッチ計算インターフェースと評価キャッシュ

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::board::{InputFormat, InputPlanes};

/// ネットワークが受け付ける入力形式などの情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCapabilities {
    pub input_format: InputFormat,
}

/// 1回分のバッチ計算
///
/// `add_input` で積んだ順にインデックスが振られ、`compute_blocking` 後に
/// `q_val(i)` で取り出す。値は入力局面の手番側から見た [-1, 1]。
pub trait NetworkComputation {
    fn add_input(&mut self, input: InputPlanes);

    fn batch_size(&self) -> usize;

    /// バッチ全体を同期的に計算する
    fn compute_blocking(&mut self) -> anyhow::Result<()>;

    fn q_val(&self, sample: usize) -> f32;

    /// 引き分け確率（対応しないネットワークは 0）
    fn d_val(&self, _sample: usize) -> f32 {
        0.0
    }
}

/// ネットワーク本体。複数の対局から共有されるため内部で同期を取ること。
pub trait Network: Send + Sync {
    fn capabilities(&self) -> NetworkCapabilities;

    fn new_computation(&self) -> Box<dyn NetworkComputation + '_>;
}

/// キャッシュされた評価値
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedEval {
    pub q: f32,
    pub d: f32,
    pub m: f32,
}

/// 局面ハッシュをキーにした評価キャッシュ（FIFO で追い出す）
///
/// 同じ手番の対局間で共有される。ロックは1回の操作の間だけ保持する。
pub struct NnCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    map: HashMap<u64, CachedEval>,
    order: VecDeque<u64>,
}

impl NnCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, key: u64) -> Option<CachedEval> {
        self.lock().map.get(&key).copied()
    }

    pub fn insert(&self, key: u64, eval: CachedEval) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.lock();
        if inner.map.insert(key, eval).is_some() {
            return;
        }
        inner.order.push_back(key);
        while inner.map.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.map.remove(&oldest);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // 他スレッドの panic で poison されても中身は壊れていない
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for NnCache {
    fn default() -> Self {
        Self::new(200_000)
    }
}
