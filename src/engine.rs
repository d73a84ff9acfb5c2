//! モデル・参照・重みを束ねてライブセッションと参照構築を起動する

use std::sync::Arc;
use std::time::Duration;

use crate::camera::{CameraProvider, VideoDecoder};
use crate::classify::{classify, Classification, ExerciseMatcher};
use crate::config::{Config, ReferenceConfig};
use crate::error::{BuildError, EngineError};
use crate::live::{LiveAnalyzer, LiveSession, LiveStatus, SessionOptions, SinkFactory};
use crate::pose::{SharedPoseModel, SharedSegmenter};
use crate::reference::{
    BuildOutcome, BuildState, BuildStatus, CancelToken, Reference, ReferenceBuilder, ReferenceJob, ReferenceMeta,
    ReferenceSlot,
};
use crate::scoring::{scorer_from_config, ChannelWeights, WeightsHandle};

/// 参照の構築から分類・重み更新・コミットまで
///
/// ワーカースレッドへ渡せるよう Clone。
#[derive(Clone)]
struct ReferenceLoader {
    pose_model: SharedPoseModel,
    segmenter: Option<SharedSegmenter>,
    config: ReferenceConfig,
    focus_boost: f32,
    slot: ReferenceSlot,
    weights: WeightsHandle,
    matcher: Option<Arc<ExerciseMatcher>>,
}

impl ReferenceLoader {
    fn builder(&self) -> ReferenceBuilder {
        let builder = ReferenceBuilder::new(self.pose_model.clone(), self.config.clone());
        match &self.segmenter {
            Some(segmenter) => builder.with_segmenter(segmenter.clone()),
            None => builder,
        }
    }

    /// 構築が完了した場合だけ参照と重みを差し替える
    ///
    /// 検索中のキャンセルも拾い、その場合は何も差し替えない。
    fn load<D: VideoDecoder>(
        &self,
        decoder: D,
        file_name: &str,
        cancel: &CancelToken,
        status: &BuildStatus,
    ) -> Result<BuildOutcome, BuildError> {
        let outcome = self
            .builder()
            .decode(decoder, file_name, self.config.segmentation, cancel, status)?;
        let BuildOutcome::Built(mut reference) = outcome else {
            return Ok(BuildOutcome::Cancelled);
        };

        let classification = self.classify(&reference.meta);
        if cancel.is_cancelled() {
            log::info!("reference build of {} cancelled during classification", file_name);
            status.set(BuildState::Cancelled);
            return Ok(BuildOutcome::Cancelled);
        }
        reference.meta.apply_classification(&classification);
        self.publish(reference.clone(), &classification);
        status.set(BuildState::Built);
        log::info!(
            "reference {} loaded: {} ({} reps, confidence {:.2})",
            file_name,
            reference.meta.class_name,
            reference.meta.peak_count,
            reference.meta.confidence
        );
        Ok(BuildOutcome::Built(reference))
    }

    /// 参照を先にコミットしてから重みを差し替える
    fn publish(&self, reference: Reference, classification: &Classification) -> Arc<Reference> {
        let committed = self.slot.commit(reference);
        self.weights
            .replace(ChannelWeights::from_focus(&classification.focus_joints, self.focus_boost));
        committed
    }

    fn classify(&self, meta: &ReferenceMeta) -> Classification {
        let mut classification = classify(meta.rom());
        log::debug!("rom {:?} -> {:?}", meta.rom(), classification.pattern);
        if let Some(suggestion) = self.matcher.as_ref().and_then(|m| m.refine(&mut classification)) {
            if !suggestion.applied {
                log::info!(
                    "suggested exercise: {} (similarity {:.2})",
                    suggestion.record.name,
                    suggestion.similarity
                );
            }
        }
        classification
    }
}

pub struct Engine {
    config: Config,
    loader: ReferenceLoader,
    build_status: BuildStatus,
    live_status: LiveStatus,
}

impl Engine {
    pub fn new(config: Config, pose_model: SharedPoseModel, segmenter: Option<SharedSegmenter>) -> Self {
        let loader = ReferenceLoader {
            pose_model,
            segmenter,
            config: config.reference.clone(),
            focus_boost: config.scoring.focus_boost,
            slot: ReferenceSlot::new(),
            weights: WeightsHandle::default(),
            matcher: None,
        };
        let build_status = BuildStatus::new(config.reference.progress_step);
        Self {
            config,
            loader,
            build_status,
            live_status: LiveStatus::new(),
        }
    }

    /// 設定のモデルパスから遅延ロードするモデルでエンジンを作る
    #[cfg(feature = "desktop")]
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        use crate::classify::matcher_from_config;
        use crate::pose::{MoveNetDetector, OnnxSegmenter, PoseEstimator, Segmenter, SharedModel};

        let pose_path = config.model.pose_model.clone();
        let pose_model: SharedPoseModel = SharedModel::lazy(move || {
            log::info!("loading pose model {}", pose_path);
            let detector: Box<dyn PoseEstimator + Send> = Box::new(MoveNetDetector::new(&pose_path)?);
            Ok(detector)
        });

        let needs_segmenter = config.live.segmentation.is_enabled() || config.reference.segmentation.is_enabled();
        let segmenter: Option<SharedSegmenter> = needs_segmenter.then(|| {
            let path = config.model.segmentation_model.clone();
            let input_size = config.model.segmentation_input as usize;
            SharedModel::lazy(move || {
                log::info!("loading segmentation model {}", path);
                let segmenter: Box<dyn Segmenter + Send> = Box::new(OnnxSegmenter::new(&path, input_size)?);
                Ok(segmenter)
            })
        });

        let matcher = matcher_from_config(&config.matcher)?;
        let engine = Self::new(config, pose_model, segmenter);
        Ok(match matcher {
            Some(matcher) => engine.with_matcher(matcher),
            None => engine,
        })
    }

    pub fn with_matcher(mut self, matcher: ExerciseMatcher) -> Self {
        self.loader.matcher = Some(Arc::new(matcher));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reference(&self) -> &ReferenceSlot {
        &self.loader.slot
    }

    pub fn weights(&self) -> &WeightsHandle {
        &self.loader.weights
    }

    pub fn build_status(&self) -> &BuildStatus {
        &self.build_status
    }

    pub fn live_status(&self) -> &LiveStatus {
        &self.live_status
    }

    /// 呼び出しスレッドで参照を構築してロード
    pub fn load_reference<D: VideoDecoder>(&self, decoder: D, file_name: &str) -> Result<BuildOutcome, EngineError> {
        Ok(self
            .loader
            .load(decoder, file_name, &CancelToken::new(), &self.build_status)?)
    }

    /// ワーカースレッドで参照を構築。キャンセルは返り値の job から
    pub fn spawn_reference<D>(&self, decoder: D, file_name: String) -> ReferenceJob
    where
        D: VideoDecoder + Send + 'static,
    {
        let loader = self.loader.clone();
        ReferenceJob::spawn_with(self.build_status.clone(), move |cancel, status| {
            loader.load(decoder, &file_name, cancel, status)
        })
    }

    /// ユーザーが選んだ分類で現在の参照と重みを更新
    pub fn select_exercise(&self, mut classification: Classification) -> Option<Arc<Reference>> {
        let current = self.loader.slot.current()?;
        classification.user_selected = true;
        let mut reference = Reference::clone(&current);
        reference.meta.apply_classification(&classification);
        Some(self.loader.publish(reference, &classification))
    }

    pub fn live_analyzer(&self) -> LiveAnalyzer {
        let analyzer = LiveAnalyzer::new(
            self.loader.pose_model.clone(),
            scorer_from_config(&self.config.scoring),
            self.loader.weights.clone(),
            self.loader.slot.clone(),
            &self.config.live,
            &self.config.reference,
        );
        match &self.loader.segmenter {
            Some(segmenter) => analyzer.with_segmentation(
                segmenter.clone(),
                self.config.live.segmentation,
                Duration::from_millis(self.config.live.segmentation_interval_ms),
            ),
            None => analyzer,
        }
    }

    pub fn start_live(&self, provider: Box<dyn CameraProvider + Send>, sink_factory: SinkFactory) -> LiveSession {
        self.start_live_with(provider, sink_factory, SessionOptions::from_config(&self.config.live))
    }

    pub fn start_live_with(
        &self,
        provider: Box<dyn CameraProvider + Send>,
        sink_factory: SinkFactory,
        options: SessionOptions,
    ) -> LiveSession {
        LiveSession::start(
            self.live_analyzer(),
            provider,
            sink_factory,
            options,
            self.live_status.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraRequest, FrameStream};
    use crate::classify::{ExerciseRecord, ExerciseSearch, JointsField, MatchPolicy};
    use crate::config::MatcherConfig;
    use crate::error::{CameraError, SearchError};
    use crate::live::LiveState;
    use crate::signal::Channel;
    use crate::testing::{coded_frame, scripted_model, squat_curve, FakeDecoder, MemorySink, ScriptedStream};
    use std::sync::atomic::Ordering;
    use std::sync::{mpsc, Mutex};

    const PERIOD: f32 = 3.0;

    fn engine() -> Engine {
        let (model, _) = scripted_model();
        Engine::new(Config::default(), model, None)
    }

    fn squat_video() -> FakeDecoder {
        FakeDecoder::new(Duration::from_secs(3), |t| squat_curve(t, PERIOD))
    }

    struct WallSitSearch;

    impl ExerciseSearch for WallSitSearch {
        fn search(&self, _query: &str) -> Result<Vec<ExerciseRecord>, SearchError> {
            Ok(vec![ExerciseRecord {
                name: "Wall sit".to_string(),
                description: "Isometric knee and hip hold".to_string(),
                cues: vec!["Back flat on the wall".to_string()],
                joints: Some(JointsField::List(vec!["knee".into(), "hip".into()])),
                tags: Vec::new(),
            }])
        }
    }

    /// 呼ばれたことを通知し、解放されるまで戻らない検索
    struct GatedSearch {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ExerciseSearch for GatedSearch {
        fn search(&self, query: &str) -> Result<Vec<ExerciseRecord>, SearchError> {
            if let Ok(entered) = self.entered.lock() {
                let _ = entered.send(());
            }
            if let Ok(release) = self.release.lock() {
                let _ = release.recv();
            }
            WallSitSearch.search(query)
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_load_reference_classifies_and_sets_weights() {
        let engine = engine();
        let outcome = engine.load_reference(squat_video(), "squat.mp4").unwrap();
        assert!(matches!(outcome, BuildOutcome::Built(_)));

        // 股関節・体幹が動かない膝だけの屈伸
        let reference = engine.reference().current().unwrap();
        assert_eq!(reference.meta.class_name, "Unclassified");
        assert_eq!(reference.meta.focus_joints, vec![Channel::Knee]);
        assert!(approx(engine.weights().snapshot().knee, 0.5));
        assert_eq!(engine.build_status().state(), BuildState::Built);
    }

    #[test]
    fn test_matcher_enriches_reference() {
        let config = MatcherConfig {
            policy: MatchPolicy::Apply,
            ..MatcherConfig::default()
        };
        let engine = engine().with_matcher(ExerciseMatcher::new(Box::new(WallSitSearch), &config));
        engine.load_reference(squat_video(), "squat.mp4").unwrap();

        let reference = engine.reference().current().unwrap();
        assert_eq!(reference.meta.class_name, "Wall sit");
        assert_eq!(reference.meta.focus_joints, vec![Channel::Knee, Channel::Hip]);
        let weights = engine.weights().snapshot();
        assert!(approx(weights.knee, 0.4));
        assert!(approx(weights.hip, 0.4));
        assert!(approx(weights.trunk, 0.2));
    }

    #[test]
    fn test_failed_build_keeps_previous_reference() {
        let engine = engine();
        engine.load_reference(squat_video(), "squat.mp4").unwrap();
        let before = engine.reference().current().unwrap();

        let err = engine
            .load_reference(FakeDecoder::new(Duration::from_secs(2), |_| 0), "empty.mp4")
            .unwrap_err();
        assert!(matches!(err, EngineError::Build(BuildError::NoUsableFrames)));
        assert!(Arc::ptr_eq(&before, &engine.reference().current().unwrap()));
    }

    #[test]
    fn test_cancel_during_search_commits_nothing() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let search = GatedSearch {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let config = MatcherConfig {
            policy: MatchPolicy::Apply,
            ..MatcherConfig::default()
        };
        let engine = engine().with_matcher(ExerciseMatcher::new(Box::new(search), &config));
        let before = engine.weights().snapshot();

        let job = engine.spawn_reference(squat_video(), "squat.mp4".to_string());
        entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        // 検索中は Built を出さない
        assert_ne!(job.status(), BuildState::Built);
        job.cancel();
        drop(release_tx);

        assert!(matches!(job.join(), Ok(BuildOutcome::Cancelled)));
        assert!(!engine.reference().is_loaded());
        assert_eq!(engine.weights().snapshot(), before);
        assert_eq!(engine.build_status().state(), BuildState::Cancelled);
    }

    #[test]
    fn test_publish_commits_reference_and_weights_together() {
        let engine = engine();
        engine.load_reference(squat_video(), "squat.mp4").unwrap();
        let reference = Reference::clone(&engine.reference().current().unwrap());

        let classification = Classification::user_selected("Hip thrust", vec![Channel::Hip]);
        let committed = engine.loader.publish(reference, &classification);
        assert!(Arc::ptr_eq(&committed, &engine.reference().current().unwrap()));
        assert!(approx(engine.weights().snapshot().hip, 0.5));
    }

    #[test]
    fn test_spawn_reference_commits_on_completion() {
        let engine = engine();
        let job = engine.spawn_reference(squat_video(), "squat.mp4".to_string());
        assert!(matches!(job.join(), Ok(BuildOutcome::Built(_))));
        assert!(engine.reference().is_loaded());
    }

    #[test]
    fn test_select_exercise_overrides_weights() {
        let engine = engine();
        let before = engine.weights().snapshot();
        assert!(engine
            .select_exercise(Classification::user_selected("Deadlift", vec![Channel::Hip]))
            .is_none());
        // 参照が無ければ重みも触らない
        assert_eq!(engine.weights().snapshot(), before);

        engine.load_reference(squat_video(), "squat.mp4").unwrap();
        let reference = engine
            .select_exercise(Classification::user_selected("Deadlift", vec![Channel::Hip, Channel::Trunk]))
            .unwrap();
        assert_eq!(reference.meta.class_name, "Deadlift");
        assert!(approx(engine.weights().snapshot().knee, 0.2));
    }

    struct OnceProvider(Option<ScriptedStream>);

    impl CameraProvider for OnceProvider {
        fn open(&mut self, _request: &CameraRequest) -> Result<Box<dyn FrameStream + Send>, CameraError> {
            match self.0.take() {
                Some(stream) => Ok(Box::new(stream)),
                None => Err(CameraError::NotFound),
            }
        }
    }

    #[test]
    fn test_live_session_scores_against_loaded_reference() {
        let engine = engine();
        engine.load_reference(squat_video(), "squat.mp4").unwrap();

        let frames = (0..30u64).map(|k| coded_frame(squat_curve(Duration::from_millis(50 * k), PERIOD)));
        let sink = MemorySink::default();
        let factory_sink = sink.clone();
        let mut session = engine.start_live(
            Box::new(OnceProvider(Some(ScriptedStream::new(frames)))),
            Box::new(move || Ok(Box::new(factory_sink) as Box<dyn crate::render::FrameSink>)),
        );
        session.wait_started(Duration::from_secs(5)).unwrap();
        session.join();

        assert_eq!(engine.live_status().state(), LiveState::Stopped);
        assert_eq!(engine.live_status().score(), None);
        assert!(sink.presented.load(Ordering::SeqCst) >= 30);
    }
}
