//! 角度時系列の前処理: 平滑化・リサンプル・正規化

use serde::Serialize;

/// [膝, 股関節, 体幹] の角度（度）
pub type AngleTriple = [f32; 3];

/// 角度チャンネル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(usize)]
pub enum Channel {
    Knee = 0,
    Hip = 1,
    Trunk = 2,
}

impl Channel {
    pub const COUNT: usize = 3;
    pub const ALL: [Channel; Self::COUNT] = [Channel::Knee, Channel::Hip, Channel::Trunk];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Knee => "knee",
            Channel::Hip => "hip",
            Channel::Trunk => "trunk",
        }
    }
}

/// 正規化で max - min がこれ未満にならないようにする
const MIN_SPAN_DEG: f32 = 1.0;

/// チャンネルごとの角度レンジ
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AngleRange {
    pub min: AngleTriple,
    pub max: AngleTriple,
}

impl AngleRange {
    /// 固定の解剖学的デフォルト
    pub const ANATOMICAL: AngleRange = AngleRange {
        min: [30.0, 30.0, 0.0],
        max: [180.0, 180.0, 90.0],
    };

    /// min < max を保証して作成
    pub fn new(min: AngleTriple, max: AngleTriple) -> Self {
        let mut range = Self { min, max };
        range.ensure_span();
        range
    }

    /// シーケンスの観測 min/max から、スパンの pad_ratio だけ両側を広げたレンジ
    ///
    /// 空シーケンスでは ANATOMICAL を返す。
    pub fn from_sequence(seq: &[AngleTriple], pad_ratio: f32) -> Self {
        if seq.is_empty() {
            return Self::ANATOMICAL;
        }
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for frame in seq {
            for c in 0..Channel::COUNT {
                min[c] = min[c].min(frame[c]);
                max[c] = max[c].max(frame[c]);
            }
        }
        for c in 0..Channel::COUNT {
            let pad = (max[c] - min[c]) * pad_ratio;
            min[c] -= pad;
            max[c] += pad;
        }
        Self::new(min, max)
    }

    fn ensure_span(&mut self) {
        for c in 0..Channel::COUNT {
            let span = self.max[c] - self.min[c];
            if !(span >= MIN_SPAN_DEG) {
                let mid = if self.min[c].is_finite() && self.max[c].is_finite() {
                    (self.min[c] + self.max[c]) * 0.5
                } else {
                    0.0
                };
                self.min[c] = mid - MIN_SPAN_DEG * 0.5;
                self.max[c] = mid + MIN_SPAN_DEG * 0.5;
            }
        }
    }

    pub fn span(&self, channel: Channel) -> f32 {
        self.max[channel as usize] - self.min[channel as usize]
    }
}

impl Default for AngleRange {
    fn default() -> Self {
        Self::ANATOMICAL
    }
}

/// 指数平滑: out[0] = in[0], out[i] = α·in[i] + (1-α)·out[i-1]
pub fn exponential_smooth(seq: &[AngleTriple], alpha: f32) -> Vec<AngleTriple> {
    let alpha = alpha.clamp(0.0, 1.0);
    let mut out: Vec<AngleTriple> = Vec::with_capacity(seq.len());
    for (i, frame) in seq.iter().enumerate() {
        if i == 0 {
            out.push(*frame);
            continue;
        }
        let prev = out[i - 1];
        out.push([
            alpha * frame[0] + (1.0 - alpha) * prev[0],
            alpha * frame[1] + (1.0 - alpha) * prev[1],
            alpha * frame[2] + (1.0 - alpha) * prev[2],
        ]);
    }
    out
}

/// 出力 i をソース位置 i·(L-1)/(N-1) に写す
fn source_position(i: usize, len: usize, n: usize) -> (usize, usize, f32) {
    if n <= 1 || len <= 1 {
        return (0, 0, 0.0);
    }
    let pos = i as f32 * (len - 1) as f32 / (n - 1) as f32;
    let lo = (pos.floor() as usize).min(len - 1);
    let hi = (lo + 1).min(len - 1);
    (lo, hi, pos - lo as f32)
}

/// 線形補間で長さ n にリサンプル
pub fn resample(seq: &[AngleTriple], n: usize) -> Vec<AngleTriple> {
    if seq.is_empty() || n == 0 {
        return Vec::new();
    }
    if seq.len() == n {
        return seq.to_vec();
    }
    (0..n)
        .map(|i| {
            let (lo, hi, t) = source_position(i, seq.len(), n);
            let a = seq[lo];
            let b = seq[hi];
            [
                a[0] + (b[0] - a[0]) * t,
                a[1] + (b[1] - a[1]) * t,
                a[2] + (b[2] - a[2]) * t,
            ]
        })
        .collect()
}

/// フレーム重みのリサンプル
///
/// 補間に寄与するサンプルの最小値を取る。除外フレーム (0) は
/// 補間で部分的に復活しない。
pub fn resample_weights(weights: &[f32], n: usize) -> Vec<f32> {
    if weights.is_empty() || n == 0 {
        return Vec::new();
    }
    if weights.len() == n {
        return weights.to_vec();
    }
    (0..n)
        .map(|i| {
            let (lo, hi, t) = source_position(i, weights.len(), n);
            if t <= f32::EPSILON {
                weights[lo]
            } else if t >= 1.0 - f32::EPSILON {
                weights[hi]
            } else {
                weights[lo].min(weights[hi])
            }
        })
        .collect()
}

/// レンジでクランプしてから [0, 1] に写す
pub fn normalize_value(value: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if !(span > 0.0) {
        return 0.0;
    }
    ((value.clamp(min, max) - min) / span).clamp(0.0, 1.0)
}

pub fn normalize(seq: &[AngleTriple], range: &AngleRange) -> Vec<AngleTriple> {
    seq.iter()
        .map(|frame| {
            [
                normalize_value(frame[0], range.min[0], range.max[0]),
                normalize_value(frame[1], range.min[1], range.max[1]),
                normalize_value(frame[2], range.min[2], range.max[2]),
            ]
        })
        .collect()
}

/// 除外フレーム (重み0) の角度を直前の有効フレームで埋める
///
/// 先頭の欠損は最初の有効フレームで埋める。有効フレームが無ければそのまま返す。
pub fn fill_gaps(seq: &[AngleTriple], weights: &[f32]) -> Vec<AngleTriple> {
    let first_valid = seq
        .iter()
        .zip(weights)
        .find(|(_, w)| **w > 0.0)
        .map(|(frame, _)| *frame);
    let Some(mut last) = first_valid else {
        return seq.to_vec();
    };
    seq.iter()
        .enumerate()
        .map(|(i, frame)| {
            if weights.get(i).copied().unwrap_or(0.0) > 0.0 {
                last = *frame;
            }
            last
        })
        .collect()
}

/// 正規化前のシグネチャ: 欠損補完 → 平滑化 → リサンプル
///
/// ライブ側と参照側で同じ処理を通す。
pub fn prepare_signature(
    seq: &[AngleTriple],
    weights: &[f32],
    length: usize,
    alpha: f32,
) -> (Vec<AngleTriple>, Vec<f32>) {
    let filled = fill_gaps(seq, weights);
    let smoothed = exponential_smooth(&filled, alpha);
    (resample(&smoothed, length), resample_weights(weights, length))
}

/// チャンネルごとの可動域 (max - min)
pub fn range_of_motion(seq: &[AngleTriple]) -> AngleTriple {
    if seq.is_empty() {
        return [0.0; 3];
    }
    let mut rom = [0.0; 3];
    for c in 0..Channel::COUNT {
        let (lo, hi) = seq.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), f| {
            (lo.min(f[c]), hi.max(f[c]))
        });
        rom[c] = hi - lo;
    }
    rom
}
