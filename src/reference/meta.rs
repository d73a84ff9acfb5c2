use serde::Serialize;

use crate::classify::Classification;
use crate::signal::{range_of_motion, AngleTriple, Channel};

/// 近接した谷はこのサンプル数以内なら1回とみなす
pub const MIN_DIP_DISTANCE: usize = 8;

/// 可動域がこれ未満なら反復なしとみなす (度)
const MIN_DIP_ROM: f32 = 5.0;

/// 参照動画から得たメタ情報
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceMeta {
    pub file_name: String,
    pub knee_rom: f32,
    pub hip_rom: f32,
    pub trunk_rom: f32,
    /// 膝角度の谷（しゃがみ込み）の回数
    pub peak_count: usize,
    pub class_name: String,
    pub class_description: String,
    pub cues: Vec<String>,
    pub confidence: f32,
    pub focus_joints: Vec<Channel>,
}

impl ReferenceMeta {
    /// 正規化前のリサンプル済み系列から作成（分類は未設定）
    pub fn from_sequence(file_name: &str, seq: &[AngleTriple]) -> Self {
        let rom = range_of_motion(seq);
        let knee: Vec<f32> = seq.iter().map(|f| f[Channel::Knee as usize]).collect();
        Self {
            file_name: file_name.to_string(),
            knee_rom: rom[0],
            hip_rom: rom[1],
            trunk_rom: rom[2],
            peak_count: count_dips(&knee, MIN_DIP_DISTANCE),
            class_name: String::new(),
            class_description: String::new(),
            cues: Vec::new(),
            confidence: 0.0,
            focus_joints: Vec::new(),
        }
    }

    pub fn rom(&self) -> AngleTriple {
        [self.knee_rom, self.hip_rom, self.trunk_rom]
    }

    /// 分類結果を反映
    pub fn apply_classification(&mut self, classification: &Classification) {
        self.class_name = classification.name.clone();
        self.class_description = classification.description.clone();
        self.cues = classification.cues.clone();
        self.confidence = classification.confidence;
        self.focus_joints = classification.focus_joints.clone();
    }
}

/// 可動域の下半分にある局所最小の数
///
/// min_distance 以内に続く谷はより低い方だけを残す。
pub fn count_dips(values: &[f32], min_distance: usize) -> usize {
    if values.len() < 3 {
        return 0;
    }
    let (lo, hi) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if !(hi - lo >= MIN_DIP_ROM) {
        return 0;
    }
    let threshold = lo + (hi - lo) * 0.5;

    let mut dips: Vec<usize> = Vec::new();
    for i in 1..values.len() - 1 {
        let v = values[i];
        let is_min = v <= values[i - 1] && v < values[i + 1];
        if !is_min || v >= threshold {
            continue;
        }
        match dips.last_mut() {
            Some(last) if i - *last < min_distance => {
                if v < values[*last] {
                    *last = i;
                }
            }
            _ => dips.push(i),
        }
    }
    dips.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squats(n: usize, reps: f32) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let phase = i as f32 / n as f32 * reps * std::f32::consts::TAU;
                130.0 + 40.0 * phase.cos()
            })
            .collect()
    }

    #[test]
    fn test_count_dips_three_reps() {
        assert_eq!(count_dips(&squats(100, 3.0), MIN_DIP_DISTANCE), 3);
    }

    #[test]
    fn test_count_dips_ignores_jitter() {
        let mut values = squats(100, 2.0);
        // 谷の近くに小さな揺れを入れる
        values[26] -= 0.5;
        values[28] -= 2.0;
        assert_eq!(count_dips(&values, MIN_DIP_DISTANCE), 2);
    }

    #[test]
    fn test_count_dips_flat_signal() {
        assert_eq!(count_dips(&[120.0; 50], MIN_DIP_DISTANCE), 0);
        assert_eq!(count_dips(&[], MIN_DIP_DISTANCE), 0);
    }

    #[test]
    fn test_meta_rom() {
        let seq: Vec<AngleTriple> = vec![[90.0, 100.0, 10.0], [170.0, 160.0, 30.0], [120.0, 130.0, 20.0]];
        let meta = ReferenceMeta::from_sequence("squat.mp4", &seq);
        assert_eq!(meta.rom(), [80.0, 60.0, 20.0]);
        assert_eq!(meta.file_name, "squat.mp4");
        assert!(meta.class_name.is_empty());
    }
}
