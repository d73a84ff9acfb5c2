//! 参照構築の進捗・状態・キャンセル

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// 参照構築の状態
#[derive(Debug, Clone, PartialEq)]
pub enum BuildState {
    Idle,
    /// progress: 0-100
    Decoding { progress: u8 },
    Cancelled,
    Built,
    Failed(String),
}

/// 一定ステップ進んだときだけ通知する
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step: u8,
    last: Option<u8>,
}

impl ProgressThrottle {
    pub fn new(step: u8) -> Self {
        Self { step: step.max(1), last: None }
    }

    /// 通知すべき進捗なら Some
    ///
    /// 前回通知から step 以上進んだとき、または 100 到達時。
    pub fn advance(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        let fire = match self.last {
            None => true,
            Some(last) if last >= 100 => false,
            Some(last) => percent == 100 || percent >= last.saturating_add(self.step),
        };
        if fire {
            self.last = Some(percent);
            Some(percent)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

type Listener = Box<dyn FnMut(&BuildState) + Send>;

struct StatusInner {
    state: BuildState,
    throttle: ProgressThrottle,
    listener: Option<Listener>,
}

/// 構築状態の共有ハンドル（UI 側が監視する）
#[derive(Clone)]
pub struct BuildStatus {
    inner: Arc<Mutex<StatusInner>>,
}

impl BuildStatus {
    pub fn new(progress_step: u8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatusInner {
                state: BuildState::Idle,
                throttle: ProgressThrottle::new(progress_step),
                listener: None,
            })),
        }
    }

    /// 状態変化ごとに呼ばれるリスナーを登録
    pub fn with_listener(self, listener: impl FnMut(&BuildState) + Send + 'static) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.listener = Some(Box::new(listener));
        }
        self
    }

    pub fn state(&self) -> BuildState {
        match self.inner.lock() {
            Ok(inner) => inner.state.clone(),
            Err(poisoned) => poisoned.into_inner().state.clone(),
        }
    }

    /// 新しい構築の開始
    pub fn begin(&self) {
        self.update(|inner| {
            inner.throttle.reset();
            inner.throttle.advance(0);
            Some(BuildState::Decoding { progress: 0 })
        });
    }

    /// 進捗更新（間引きあり）
    pub fn progress(&self, percent: u8) {
        self.update(|inner| {
            inner
                .throttle
                .advance(percent)
                .map(|progress| BuildState::Decoding { progress })
        });
    }

    pub fn set(&self, state: BuildState) {
        self.update(|_| Some(state));
    }

    fn update(&self, f: impl FnOnce(&mut StatusInner) -> Option<BuildState>) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(state) = f(&mut inner) {
            inner.state = state;
            let StatusInner { state, listener, .. } = &mut *inner;
            if let Some(listener) = listener.as_mut() {
                listener(state);
            }
        }
    }
}

impl Default for BuildStatus {
    fn default() -> Self {
        Self::new(5)
    }
}

/// 協調キャンセル用フラグ
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
