use std::sync::{Arc, RwLock};
use std::thread;

use crate::camera::VideoDecoder;
use crate::error::BuildError;
use crate::pose::SegmentationMode;

use super::builder::{BuildOutcome, Reference, ReferenceBuilder};
use super::state::{BuildState, BuildStatus, CancelToken};

/// 現在の参照シグネチャ。構築完了時にのみ丸ごと差し替える
#[derive(Clone, Default)]
pub struct ReferenceSlot {
    inner: Arc<RwLock<Option<Arc<Reference>>>>,
}

impl ReferenceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Reference>> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    pub fn commit(&self, reference: Reference) -> Arc<Reference> {
        let reference = Arc::new(reference);
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(reference.clone());
        reference
    }

    pub fn clear(&self) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
    }
}

/// ワーカースレッド上の参照構築
///
/// Drop するとキャンセルして終了を待つ。
pub struct ReferenceJob {
    cancel: CancelToken,
    status: BuildStatus,
    handle: Option<thread::JoinHandle<Result<BuildOutcome, BuildError>>>,
}

impl ReferenceJob {
    pub fn spawn<D>(
        builder: ReferenceBuilder,
        decoder: D,
        file_name: String,
        mode: SegmentationMode,
        status: BuildStatus,
    ) -> Self
    where
        D: VideoDecoder + Send + 'static,
    {
        Self::spawn_with(status, move |cancel, status| builder.build(decoder, &file_name, mode, cancel, status))
    }

    /// 任意の構築処理をワーカースレッドで実行
    pub fn spawn_with<F>(status: BuildStatus, work: F) -> Self
    where
        F: FnOnce(&CancelToken, &BuildStatus) -> Result<BuildOutcome, BuildError> + Send + 'static,
    {
        let cancel = CancelToken::new();
        let handle = {
            let cancel = cancel.clone();
            let status = status.clone();
            thread::spawn(move || work(&cancel, &status))
        };
        Self {
            cancel,
            status,
            handle: Some(handle),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> BuildState {
        self.status.state()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// 構築の終了を待つ
    pub fn join(mut self) -> Result<BuildOutcome, BuildError> {
        self.wait()
    }

    fn wait(&mut self) -> Result<BuildOutcome, BuildError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(BuildError::Model("reference build thread panicked".into()))),
            None => Ok(BuildOutcome::Cancelled),
        }
    }
}

impl Drop for ReferenceJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
            let _ = self.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferenceConfig;
    use crate::testing::{scripted_model, squat_curve, FakeDecoder};
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use std::time::Duration;

    fn builder() -> ReferenceBuilder {
        let (model, _) = scripted_model();
        ReferenceBuilder::new(model, ReferenceConfig::default())
    }

    fn commit_if_built(slot: &ReferenceSlot, outcome: Result<BuildOutcome, BuildError>) {
        if let Ok(BuildOutcome::Built(reference)) = outcome {
            slot.commit(reference);
        }
    }

    #[test]
    fn test_job_builds_and_commits() {
        let slot = ReferenceSlot::new();
        let job = ReferenceJob::spawn(
            builder(),
            FakeDecoder::new(Duration::from_secs(2), |t| squat_curve(t, 1.0)),
            "a.mp4".into(),
            SegmentationMode::Off,
            BuildStatus::default(),
        );
        commit_if_built(&slot, job.join());
        let current = slot.current().unwrap();
        assert_eq!(current.meta.file_name, "a.mp4");
        assert_eq!(current.signature.len(), 100);
    }

    #[test]
    fn test_cancel_keeps_previous_reference() {
        let slot = ReferenceSlot::new();
        let first = ReferenceJob::spawn(
            builder(),
            FakeDecoder::new(Duration::from_secs(2), |t| squat_curve(t, 1.0)),
            "first.mp4".into(),
            SegmentationMode::Off,
            BuildStatus::default(),
        );
        commit_if_built(&slot, first.join());
        let before = slot.current().unwrap();

        // 9枚目を返した後で止めて、外からキャンセルするまで待たせる
        let (reached_tx, reached_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel::<()>();
        let mut decoder = FakeDecoder::new(Duration::from_secs(2), |t| squat_curve(t, 1.0));
        let dropped = decoder.dropped.clone();
        decoder.on_call = Some(Box::new(move |n| {
            if n == 9 {
                reached_tx.send(()).ok();
                resume_rx.recv_timeout(Duration::from_secs(5)).ok();
            }
        }));
        let second = ReferenceJob::spawn(
            builder(),
            decoder,
            "second.mp4".into(),
            SegmentationMode::Off,
            BuildStatus::default(),
        );
        reached_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        second.cancel();
        resume_tx.send(()).unwrap();
        let outcome = second.join();
        assert!(matches!(outcome, Ok(BuildOutcome::Cancelled)));
        commit_if_built(&slot, outcome);

        assert!(dropped.load(Ordering::SeqCst));
        let after = slot.current().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.meta.file_name, "first.mp4");
    }

    #[test]
    fn test_drop_cancels_job() {
        let mut decoder = FakeDecoder::new(Duration::from_secs(60), |t| squat_curve(t, 1.0));
        let calls = decoder.calls.clone();
        decoder.on_call = Some(Box::new(|_| std::thread::sleep(Duration::from_millis(1))));
        let job = ReferenceJob::spawn(
            builder(),
            decoder,
            "long.mp4".into(),
            SegmentationMode::Off,
            BuildStatus::default(),
        );
        drop(job);
        assert!(calls.load(Ordering::SeqCst) < 900);
    }
}
