use serde::Serialize;
use std::sync::{Arc, RwLock};

use crate::signal::Channel;

/// Per-channel importance, always summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelWeights {
    pub knee: f32,
    pub hip: f32,
    pub trunk: f32,
}

impl ChannelWeights {
    pub const EQUAL: ChannelWeights = ChannelWeights {
        knee: 1.0 / 3.0,
        hip: 1.0 / 3.0,
        trunk: 1.0 / 3.0,
    };

    /// Normalises to sum 1. Negative or non-finite entries count as 0;
    /// an all-zero input falls back to equal weights.
    pub fn new(knee: f32, hip: f32, trunk: f32) -> Self {
        let clean = |v: f32| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        let (knee, hip, trunk) = (clean(knee), clean(hip), clean(trunk));
        let sum = knee + hip + trunk;
        if sum <= 0.0 {
            return Self::EQUAL;
        }
        Self {
            knee: knee / sum,
            hip: hip / sum,
            trunk: trunk / sum,
        }
    }

    /// Emphasised joints get `boost` times the base weight.
    pub fn from_focus(focus: &[Channel], boost: f32) -> Self {
        let mut raw = [1.0f32; Channel::COUNT];
        for channel in focus {
            raw[*channel as usize] = boost.max(1.0);
        }
        Self::new(raw[0], raw[1], raw[2])
    }

    pub fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Knee => self.knee,
            Channel::Hip => self.hip,
            Channel::Trunk => self.trunk,
        }
    }

    pub fn as_array(&self) -> [f32; 3] {
        [self.knee, self.hip, self.trunk]
    }
}

impl Default for ChannelWeights {
    fn default() -> Self {
        Self::EQUAL
    }
}

/// Single-writer / many-reader handle for the active channel weights.
///
/// Readers copy the whole triple out under the lock, so a scoring tick never
/// observes a half-updated set.
#[derive(Debug, Clone, Default)]
pub struct WeightsHandle {
    inner: Arc<RwLock<ChannelWeights>>,
}

impl WeightsHandle {
    pub fn new(weights: ChannelWeights) -> Self {
        Self {
            inner: Arc::new(RwLock::new(weights)),
        }
    }

    pub fn snapshot(&self) -> ChannelWeights {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn replace(&self, weights: ChannelWeights) {
        match self.inner.write() {
            Ok(mut guard) => *guard = weights,
            Err(poisoned) => *poisoned.into_inner() = weights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(w: &ChannelWeights) -> f32 {
        w.knee + w.hip + w.trunk
    }

    #[test]
    fn test_new_normalises() {
        let w = ChannelWeights::new(2.0, 1.0, 1.0);
        assert!((sum(&w) - 1.0).abs() < 1e-6);
        assert!((w.knee - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_all_zero_falls_back_to_equal() {
        assert_eq!(ChannelWeights::new(0.0, -1.0, f32::NAN), ChannelWeights::EQUAL);
    }

    #[test]
    fn test_from_focus_boosts() {
        let w = ChannelWeights::from_focus(&[Channel::Knee, Channel::Hip], 2.0);
        assert!((w.knee - 0.4).abs() < 1e-6);
        assert!((w.hip - 0.4).abs() < 1e-6);
        assert!((w.trunk - 0.2).abs() < 1e-6);
        assert_eq!(ChannelWeights::from_focus(&[], 2.0), ChannelWeights::EQUAL);
    }

    #[test]
    fn test_handle_replace_visible_to_clones() {
        let handle = WeightsHandle::default();
        let reader = handle.clone();
        let updated = ChannelWeights::new(1.0, 0.0, 0.0);
        handle.replace(updated);
        assert_eq!(reader.snapshot(), updated);
    }

    #[test]
    fn test_concurrent_readers_see_whole_triples() {
        let handle = WeightsHandle::default();
        let a = ChannelWeights::new(1.0, 0.0, 0.0);
        let b = ChannelWeights::new(0.0, 0.0, 1.0);
        let writer = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    handle.replace(if i % 2 == 0 { a } else { b });
                }
            })
        };
        for _ in 0..1000 {
            let w = handle.snapshot();
            assert!(w == a || w == b || w == ChannelWeights::EQUAL, "torn read: {:?}", w);
        }
        writer.join().unwrap();
    }
}
