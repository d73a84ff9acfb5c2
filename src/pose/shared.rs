use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, TryLockError};

use super::detector::PoseEstimator;
use super::segmenter::Segmenter;

type Factory<M> = Box<dyn Fn() -> Result<M> + Send + Sync>;

/// プロセス共有のモデルハンドル
///
/// 初回利用時に factory で生成し、以後は再利用する。推論はミューテックスで
/// 直列化されるため、参照構築とライブループが同時に触っても壊れない。
pub struct SharedModel<M> {
    slot: Mutex<Option<M>>,
    factory: Factory<M>,
}

pub type SharedPoseModel = Arc<SharedModel<Box<dyn PoseEstimator + Send>>>;
pub type SharedSegmenter = Arc<SharedModel<Box<dyn Segmenter + Send>>>;

impl<M> SharedModel<M> {
    /// 遅延初期化。factory が失敗した場合は次回呼び出しで再試行する
    pub fn lazy<F>(factory: F) -> Arc<Self>
    where
        F: Fn() -> Result<M> + Send + Sync + 'static,
    {
        Arc::new(Self {
            slot: Mutex::new(None),
            factory: Box::new(factory),
        })
    }

    /// 生成済みモデルから作成
    pub fn ready(model: M) -> Arc<Self>
    where
        M: Send + 'static,
    {
        Arc::new(Self {
            slot: Mutex::new(Some(model)),
            factory: Box::new(|| Err(anyhow!("model already consumed"))),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// 他の呼び出しが終わるまで待ってから実行
    pub fn with<R>(&self, f: impl FnOnce(&mut M) -> R) -> Result<R> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("model lock poisoned"))?;
        self.run(&mut slot, f)
    }

    /// 実行中の呼び出しがあればスキップして `Ok(None)`
    pub fn try_with<R>(&self, f: impl FnOnce(&mut M) -> R) -> Result<Option<R>> {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(_)) => return Err(anyhow!("model lock poisoned")),
        };
        self.run(&mut slot, f).map(Some)
    }

    fn run<R>(&self, slot: &mut Option<M>, f: impl FnOnce(&mut M) -> R) -> Result<R> {
        if slot.is_none() {
            log::info!("initializing shared model");
            *slot = Some((self.factory)()?);
        }
        match slot.as_mut() {
            Some(model) => Ok(f(model)),
            None => Err(anyhow!("model not initialized")),
        }
    }
}
