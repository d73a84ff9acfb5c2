use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::{acquire_camera, CameraProvider, FrameStream, RetryPolicy};
use crate::config::LiveConfig;
use crate::error::{CameraError, EngineError, StreamError};
use crate::frame::Frame;
use crate::render::{Canvas, FrameSink};

use super::analyzer::LiveAnalyzer;
use super::gate::FramePacer;

/// 最初のフレームを待つ間に許す一時エラーの回数
const FIRST_FRAME_RETRIES: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveState {
    Stopped,
    Starting,
    Running,
    Failed(String),
}

/// UI から見えるライブセッションの状態
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot {
    pub state: LiveState,
    pub score: Option<u8>,
    /// Running 中、参照ありならスコア計算中
    pub has_reference: bool,
}

#[derive(Clone)]
pub struct LiveStatus {
    inner: Arc<Mutex<LiveSnapshot>>,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LiveSnapshot {
                state: LiveState::Stopped,
                score: None,
                has_reference: false,
            })),
        }
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn state(&self) -> LiveState {
        self.snapshot().state
    }

    pub fn score(&self) -> Option<u8> {
        self.snapshot().score
    }

    fn update(&self, f: impl FnOnce(&mut LiveSnapshot)) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    fn set_state(&self, state: LiveState) {
        self.update(|s| s.state = state);
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub retry: RetryPolicy,
    /// 出力側がペーシングしない場合の描画FPS
    pub fallback_fps: u32,
    /// None なら最初のフレームと同じサイズ
    pub canvas_size: Option<(usize, usize)>,
}

impl SessionOptions {
    pub fn from_config(live: &LiveConfig) -> Self {
        Self {
            retry: RetryPolicy {
                attempts: live.camera_attempts,
                backoff: Duration::from_millis(live.retry_backoff_ms),
                ..RetryPolicy::default()
            },
            fallback_fps: live.fallback_fps,
            canvas_size: None,
        }
    }
}

pub type SinkFactory = Box<dyn FnOnce() -> Result<Box<dyn FrameSink>> + Send>;

/// ライブ解析ループを別スレッドで回すセッション
///
/// 出力先はループスレッド内で生成する（ウィンドウはスレッドを跨げないため）。
pub struct LiveSession {
    stop: Arc<AtomicBool>,
    status: LiveStatus,
    started: Option<Receiver<Result<(), EngineError>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LiveSession {
    pub fn start(
        analyzer: LiveAnalyzer,
        provider: Box<dyn CameraProvider + Send>,
        sink_factory: SinkFactory,
        options: SessionOptions,
        status: LiveStatus,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = mpsc::channel();
        status.update(|s| {
            s.state = LiveState::Starting;
            s.score = None;
        });

        let handle = {
            let stop = stop.clone();
            let status = status.clone();
            thread::spawn(move || {
                let mut live_loop = LiveLoop {
                    analyzer,
                    options,
                    stop,
                    status,
                };
                live_loop.run(provider, sink_factory, started_tx);
            })
        };

        Self {
            stop,
            status,
            started: Some(started_rx),
            handle: Some(handle),
        }
    }

    /// カメラ取得と最初のフレームを待つ
    pub fn wait_started(&mut self, timeout: Duration) -> Result<(), EngineError> {
        let Some(rx) = self.started.take() else {
            return match self.status.state() {
                LiveState::Running => Ok(()),
                other => Err(EngineError::NotStarted(format!("{:?}", other))),
            };
        };
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.started = Some(rx);
                Err(EngineError::NotStarted("timed out waiting for the camera".into()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(EngineError::NotStarted("live loop exited before starting".into()))
            }
        }
    }

    pub fn status(&self) -> &LiveStatus {
        &self.status
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// ループを止めてカメラを解放する
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.join();
    }

    /// ループが自然終了（ウィンドウを閉じた・ストリーム終了）するまで待つ
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("live loop thread panicked");
                self.status.set_state(LiveState::Failed("live loop panicked".into()));
            }
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LiveLoop {
    analyzer: LiveAnalyzer,
    options: SessionOptions,
    stop: Arc<AtomicBool>,
    status: LiveStatus,
}

impl LiveLoop {
    fn run(
        &mut self,
        mut provider: Box<dyn CameraProvider + Send>,
        sink_factory: SinkFactory,
        started: Sender<Result<(), EngineError>>,
    ) {
        let mut stream = match acquire_camera(provider.as_mut(), &self.options.retry) {
            Ok(stream) => stream,
            Err(e) => return self.fail(e, &started),
        };

        let first = match self.first_frame(stream.as_mut()) {
            Ok(frame) => frame,
            Err(e) => return self.fail(e, &started),
        };

        let mut sink = match sink_factory() {
            Ok(sink) => sink,
            Err(e) => return self.fail(EngineError::Display(format!("{:#}", e)), &started),
        };

        let (w, h) = self
            .options
            .canvas_size
            .unwrap_or((first.width as usize, first.height as usize));
        let mut canvas = Canvas::new(w, h);

        self.status.update(|s| {
            s.state = LiveState::Running;
            s.has_reference = self.analyzer.has_reference();
        });
        started.send(Ok(())).ok();
        log::info!("live session running ({}x{})", w, h);

        let reason = self.render_loop(stream.as_mut(), sink.as_mut(), &mut canvas, first);
        log::info!("live session stopped: {}", reason);

        // カメラ解放 → キャンバス消去 → スコアリセット
        drop(stream);
        canvas.clear(0);
        if let Err(e) = sink.present(&canvas) {
            log::debug!("final clear not presented: {:#}", e);
        }
        self.analyzer.reset();
        self.status.update(|s| {
            s.state = LiveState::Stopped;
            s.score = None;
        });
    }

    fn render_loop(
        &mut self,
        stream: &mut (dyn FrameStream + Send),
        sink: &mut dyn FrameSink,
        canvas: &mut Canvas,
        first: Frame,
    ) -> &'static str {
        let mut pacer = FramePacer::new(self.options.fallback_fps);
        let mut frame = first;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return "stop requested";
            }
            if !sink.is_open() {
                return "display closed";
            }

            let score = self.analyzer.tick(&frame, Instant::now(), canvas);
            let has_reference = self.analyzer.has_reference();
            self.status.update(|s| {
                s.score = score;
                s.has_reference = has_reference;
            });

            if let Err(e) = sink.present(canvas) {
                log::warn!("present failed: {:#}", e);
                return "display error";
            }
            if !sink.paces_itself() {
                pacer.wait();
            }

            match stream.next_frame() {
                Ok(next) => frame = next,
                Err(StreamError::Transient(msg)) => log::debug!("frame skipped: {}", msg),
                Err(StreamError::Ended) => return "camera stream ended",
            }
        }
    }

    fn first_frame(&self, stream: &mut (dyn FrameStream + Send)) -> Result<Frame, EngineError> {
        let mut transient = 0;
        loop {
            match stream.next_frame() {
                Ok(frame) if !frame.is_empty() => return Ok(frame),
                Ok(_) => transient += 1,
                Err(StreamError::Transient(msg)) => {
                    log::debug!("waiting for first frame: {}", msg);
                    transient += 1;
                }
                Err(StreamError::Ended) => {
                    return Err(EngineError::CameraUnavailable {
                        attempts: 1,
                        last: CameraError::Other("stream ended before the first frame".into()),
                    })
                }
            }
            if transient >= FIRST_FRAME_RETRIES || self.stop.load(Ordering::Relaxed) {
                return Err(EngineError::NotStarted("no decodable frame from the camera".into()));
            }
        }
    }

    fn fail(&self, error: EngineError, started: &Sender<Result<(), EngineError>>) {
        log::error!("live session failed: {}", error);
        self.status.update(|s| {
            s.state = LiveState::Failed(error.to_string());
            s.score = None;
        });
        started.send(Err(error)).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraRequest, Facing};
    use crate::config::ReferenceConfig;
    use crate::reference::ReferenceSlot;
    use crate::scoring::{RmseScorer, WeightsHandle};
    use crate::testing::{coded_frame, scripted_model, MemorySink, ScriptedStream};

    struct StreamProvider {
        stream: Option<ScriptedStream>,
    }

    impl CameraProvider for StreamProvider {
        fn open(&mut self, _: &CameraRequest) -> Result<Box<dyn FrameStream + Send>, CameraError> {
            match self.stream.take() {
                Some(stream) => Ok(Box::new(stream)),
                None => Err(CameraError::PermissionDenied),
            }
        }
    }

    fn analyzer() -> LiveAnalyzer {
        let (model, _) = scripted_model();
        LiveAnalyzer::new(
            model,
            Box::new(RmseScorer::new(0.5)),
            WeightsHandle::default(),
            ReferenceSlot::new(),
            &LiveConfig::default(),
            &ReferenceConfig::default(),
        )
    }

    fn options() -> SessionOptions {
        SessionOptions {
            retry: RetryPolicy {
                attempts: 4,
                backoff: Duration::ZERO,
                facing: Facing::User,
            },
            fallback_fps: 240,
            canvas_size: None,
        }
    }

    #[test]
    fn test_stream_end_stops_cleanly() {
        let stream = ScriptedStream::new((0..10).map(|_| coded_frame(120)));
        let released = stream.released.clone();
        let sink = MemorySink::default();
        let factory_sink = sink.clone();
        let mut session = LiveSession::start(
            analyzer(),
            Box::new(StreamProvider { stream: Some(stream) }),
            Box::new(move || Ok(Box::new(factory_sink) as Box<dyn FrameSink>)),
            options(),
            LiveStatus::new(),
        );
        session.wait_started(Duration::from_secs(5)).unwrap();
        session.join();

        let snapshot = session.status().snapshot();
        assert_eq!(snapshot.state, LiveState::Stopped);
        assert_eq!(snapshot.score, None);
        assert!(released.load(Ordering::SeqCst));
        // 10フレーム + 停止時のクリア
        assert_eq!(sink.presented.load(Ordering::SeqCst), 11);
        let last = sink.last.lock().unwrap().clone().unwrap();
        assert!(last.buffer().iter().all(|p| *p == 0));
    }

    #[test]
    fn test_camera_unavailable_fails_session() {
        let mut session = LiveSession::start(
            analyzer(),
            Box::new(StreamProvider { stream: None }),
            Box::new(|| Ok(Box::new(MemorySink::default()) as Box<dyn FrameSink>)),
            options(),
            LiveStatus::new(),
        );
        match session.wait_started(Duration::from_secs(5)) {
            Err(EngineError::CameraUnavailable { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("unexpected: {:?}", other),
        }
        session.join();
        assert!(matches!(session.status().state(), LiveState::Failed(_)));
    }

    #[test]
    fn test_stop_releases_camera() {
        // 十分長いストリームを途中で止める
        let stream = ScriptedStream::new((0..2_000).map(|_| coded_frame(120)));
        let released = stream.released.clone();
        let mut session = LiveSession::start(
            analyzer(),
            Box::new(StreamProvider { stream: Some(stream) }),
            Box::new(|| Ok(Box::new(MemorySink::default()) as Box<dyn FrameSink>)),
            SessionOptions {
                fallback_fps: 60,
                ..options()
            },
            LiveStatus::new(),
        );
        session.wait_started(Duration::from_secs(5)).unwrap();
        assert_eq!(session.status().state(), LiveState::Running);
        session.stop();
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(session.status().state(), LiveState::Stopped);
        assert_eq!(session.status().score(), None);
    }
}
