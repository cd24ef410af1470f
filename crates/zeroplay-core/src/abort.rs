//! 自己対局の中断

use std::sync::{Arc, Mutex, MutexGuard};

/// 実行中の探索に中断を伝える関数
pub(crate) type InFlightAbort = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct AbortState {
    pub(crate) aborted: bool,
    /// 実行中の探索エンジン（無ければ None）
    pub(crate) in_flight: Option<InFlightAbort>,
}

/// ドライバの外から中断を要求するためのハンドル
///
/// フラグはロックの下で立てられ、同時に実行中の探索エンジンにも `abort()` が届く。
/// ドライバは外側ループの先頭で毎回フラグを確認する。
#[derive(Clone, Default)]
pub struct AbortHandle {
    state: Arc<Mutex<AbortState>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_abort(&self) {
        let mut state = self.lock();
        state.aborted = true;
        if let Some(abort) = &state.in_flight {
            abort();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AbortState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn clear_in_flight(&self) {
        self.lock().in_flight = None;
    }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
