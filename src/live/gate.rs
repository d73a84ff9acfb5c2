//! 描画ループ内の実行レート制御

use std::time::{Duration, Instant};

use crate::frame::{Frame, Mask};
use crate::pose::SharedSegmenter;

/// 最小間隔を空けてのみ通す
#[derive(Debug, Clone)]
pub struct RateGate {
    interval: Duration,
    last: Option<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// 上限レート (Hz) から作成
    pub fn from_hz(hz: f32) -> Self {
        let interval = if hz > 0.0 {
            Duration::from_secs_f64(1.0 / hz as f64)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 通す場合は now を記録して true
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// セグメンテーションの間引き
///
/// 最小間隔ごとに1回だけモデルを呼び、実行中なら待たずにスキップする。
/// 間の tick は直前のマスクを使い回す。
pub struct SegmentationGate {
    gate: RateGate,
    model: SharedSegmenter,
    last_mask: Option<Mask>,
}

impl SegmentationGate {
    pub fn new(model: SharedSegmenter, interval: Duration) -> Self {
        Self {
            gate: RateGate::new(interval),
            model,
            last_mask: None,
        }
    }

    pub fn update(&mut self, frame: &Frame, now: Instant) -> Option<&Mask> {
        if self.gate.allow(now) {
            match self.model.try_with(|segmenter| segmenter.segment(frame)) {
                Ok(Some(Ok(Some(mask)))) => self.last_mask = Some(mask),
                Ok(Some(Ok(None))) => {}
                Ok(Some(Err(e))) => log::warn!("segmentation failed: {:#}", e),
                Ok(None) => log::debug!("segmentation busy, reusing last mask"),
                Err(e) => log::warn!("segmentation model unavailable: {:#}", e),
            }
        }
        self.last_mask.as_ref()
    }

    pub fn last_mask(&self) -> Option<&Mask> {
        self.last_mask.as_ref()
    }

    pub fn reset(&mut self) {
        self.gate.reset();
        self.last_mask = None;
    }
}

/// 表示側が待たない場合の固定FPSペーサー
#[derive(Debug, Clone)]
pub struct FramePacer {
    target_interval: Duration,
    frame_start: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        Self {
            target_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            frame_start: None,
        }
    }

    /// 前回の `wait` 以降の経過時間に対する残り待ち時間
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.frame_start {
            Some(start) => self.target_interval.saturating_sub(now.saturating_duration_since(start)),
            None => Duration::ZERO,
        }
    }

    /// 目標間隔まで眠る
    pub fn wait(&mut self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.frame_start = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Segmenter, SharedModel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_rate_gate_caps_rate() {
        let mut gate = RateGate::from_hz(20.0);
        let t0 = Instant::now();
        assert!(gate.allow(t0));
        assert!(!gate.allow(t0 + Duration::from_millis(16)));
        assert!(!gate.allow(t0 + Duration::from_millis(33)));
        assert!(gate.allow(t0 + Duration::from_millis(51)));
        assert!(!gate.allow(t0 + Duration::from_millis(70)));
    }

    #[test]
    fn test_rate_gate_at_60hz_render_admits_20hz() {
        let mut gate = RateGate::from_hz(20.0);
        let t0 = Instant::now();
        let admitted = (0..60)
            .filter(|i| gate.allow(t0 + Duration::from_micros(16_667 * i)))
            .count();
        assert_eq!(admitted, 20);
    }

    struct CountingSegmenter {
        calls: Arc<AtomicUsize>,
    }

    impl Segmenter for CountingSegmenter {
        fn segment(&mut self, frame: &Frame) -> anyhow::Result<Option<Mask>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Mask::new(frame.width, frame.height, vec![1.0; frame.pixels.len()])))
        }
    }

    #[test]
    fn test_segmentation_gate_reuses_mask() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model: SharedSegmenter = SharedModel::ready(Box::new(CountingSegmenter { calls: calls.clone() })
            as Box<dyn Segmenter + Send>);
        let mut gate = SegmentationGate::new(model, Duration::from_millis(80));
        let frame = Frame::filled(4, 4, 0);
        let t0 = Instant::now();
        assert!(gate.update(&frame, t0).is_some());
        assert!(gate.update(&frame, t0 + Duration::from_millis(40)).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        gate.update(&frame, t0 + Duration::from_millis(90));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_segmentation_gate_skips_when_busy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model: SharedSegmenter = SharedModel::ready(Box::new(CountingSegmenter { calls: calls.clone() })
            as Box<dyn Segmenter + Send>);
        let mut gate = SegmentationGate::new(model.clone(), Duration::ZERO);
        let frame = Frame::filled(2, 2, 0);
        // 参照構築側がモデルを使用中
        model
            .with(|_| {
                assert!(gate.update(&frame, Instant::now()).is_none());
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(gate.update(&frame, Instant::now()).is_some());
    }

    #[test]
    fn test_pacer_remaining() {
        let mut pacer = FramePacer::new(60);
        assert_eq!(pacer.remaining(Instant::now()), Duration::ZERO);
        pacer.wait();
        let remaining = pacer.remaining(Instant::now());
        assert!(remaining <= Duration::from_millis(17));
    }
}
