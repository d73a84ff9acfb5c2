use super::{score_from_distance, ChannelWeights, ScoreInput, SimilarityScorer};
use crate::signal::{AngleTriple, Channel};

/// Channel-weighted Euclidean distance between two frames.
fn frame_distance(a: &AngleTriple, b: &AngleTriple, cw: &[f32; 3]) -> f32 {
    let mut sum = 0.0;
    for c in 0..Channel::COUNT {
        let d = a[c] - b[c];
        sum += cw[c].max(0.0) * d * d;
    }
    sum.sqrt()
}

/// Sakoe–Chiba band half-width for sequences of length n and m.
pub fn band_width(n: usize, m: usize, band_ratio: f32) -> usize {
    let ratio_band = (band_ratio.max(0.0) * n.max(m) as f32).ceil() as usize;
    ratio_band.max(n.abs_diff(m)).max(1)
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    cost: f32,
    steps: f32,
}

impl Cell {
    const UNREACHABLE: Cell = Cell {
        cost: f32::INFINITY,
        steps: 0.0,
    };
}

/// Banded DTW alignment cost, averaged over the weighted warping path.
///
/// Cells whose combined frame weight (min of both sides) is zero add neither
/// cost nor path length. Cost is O(N·band) using two rolling rows.
pub fn dtw_distance(
    a: &[AngleTriple],
    wa: &[f32],
    b: &[AngleTriple],
    wb: &[f32],
    channels: ChannelWeights,
    band_ratio: f32,
) -> f32 {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 || wa.len() != n || wb.len() != m {
        return f32::INFINITY;
    }
    let cw = channels.as_array();
    let band = band_width(n, m, band_ratio);

    let mut prev = vec![Cell::UNREACHABLE; m + 1];
    let mut curr = vec![Cell::UNREACHABLE; m + 1];
    prev[0] = Cell { cost: 0.0, steps: 0.0 };

    for i in 1..=n {
        curr.fill(Cell::UNREACHABLE);
        // 対角線 j ≈ i·m/n を中心にバンドを取る
        let center = (i * m) / n;
        let lo = center.saturating_sub(band).max(1);
        let hi = (center + band).min(m);
        for j in lo..=hi {
            let w = wa[i - 1].min(wb[j - 1]);
            let (cost, steps) = if w > 0.0 {
                (w * frame_distance(&a[i - 1], &b[j - 1], &cw), w)
            } else {
                (0.0, 0.0)
            };

            let best = [prev[j - 1], prev[j], curr[j - 1]]
                .into_iter()
                .filter(|c| c.cost.is_finite())
                .min_by(|x, y| x.cost.total_cmp(&y.cost));
            if let Some(best) = best {
                curr[j] = Cell {
                    cost: best.cost + cost,
                    steps: best.steps + steps,
                };
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let end = prev[m];
    if !end.cost.is_finite() || end.steps <= 0.0 {
        return f32::INFINITY;
    }
    end.cost / end.steps
}

#[derive(Debug, Clone, Copy)]
pub struct DtwScorer {
    divisor: f32,
    band_ratio: f32,
}

impl DtwScorer {
    pub const DEFAULT_DIVISOR: f32 = 0.7;
    pub const DEFAULT_BAND_RATIO: f32 = 0.12;

    pub fn new(divisor: f32, band_ratio: f32) -> Self {
        Self { divisor, band_ratio }
    }
}

impl Default for DtwScorer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIVISOR, Self::DEFAULT_BAND_RATIO)
    }
}

impl SimilarityScorer for DtwScorer {
    fn distance(&self, input: &ScoreInput<'_>) -> f32 {
        dtw_distance(
            input.live,
            input.live_weights,
            input.reference,
            input.reference_weights,
            input.channels,
            self.band_ratio,
        )
    }

    fn score(&self, input: &ScoreInput<'_>) -> u8 {
        score_from_distance(self.distance(input), self.divisor)
    }

    fn name(&self) -> &'static str {
        "dtw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize, shift: usize) -> Vec<AngleTriple> {
        (0..n)
            .map(|i| {
                let t = (i + shift) as f32 / n as f32 * std::f32::consts::TAU;
                let v = 0.5 + 0.4 * t.sin();
                [v, v, 0.5]
            })
            .collect()
    }

    #[test]
    fn test_band_width() {
        assert_eq!(band_width(100, 100, 0.12), 12);
        assert_eq!(band_width(100, 60, 0.12), 40);
        assert_eq!(band_width(3, 3, 0.0), 1);
    }

    #[test]
    fn test_identical_sequences_zero_distance() {
        let a = wave(100, 0);
        let w = vec![1.0; 100];
        let d = dtw_distance(&a, &w, &a, &w, ChannelWeights::EQUAL, 0.12);
        assert_eq!(d, 0.0);
        let scorer = DtwScorer::default();
        let input = ScoreInput {
            live: &a,
            live_weights: &w,
            reference: &a,
            reference_weights: &w,
            channels: ChannelWeights::EQUAL,
        };
        assert_eq!(scorer.score(&input), 100);
    }

    #[test]
    fn test_time_shift_cheaper_than_rmse() {
        let a = wave(100, 0);
        let b = wave(100, 5);
        let w = vec![1.0; 100];
        let dtw = dtw_distance(&a, &w, &b, &w, ChannelWeights::EQUAL, 0.12);
        let rmse = super::super::weighted_rmse(&a, &b, &w, ChannelWeights::EQUAL);
        assert!(dtw < rmse, "dtw={} rmse={}", dtw, rmse);
    }

    #[test]
    fn test_different_lengths_supported() {
        let a = wave(100, 0);
        let b = wave(60, 0);
        let d = dtw_distance(&a, &vec![1.0; 100], &b, &vec![1.0; 60], ChannelWeights::EQUAL, 0.12);
        assert!(d.is_finite());
        assert!(d < 0.05, "d={}", d);
    }

    #[test]
    fn test_all_zero_weights_infinite() {
        let a = wave(20, 0);
        let d = dtw_distance(&a, &[0.0; 20], &a, &[1.0; 20], ChannelWeights::EQUAL, 0.12);
        assert!(d.is_infinite());
        assert!(dtw_distance(&[], &[], &a, &[1.0; 20], ChannelWeights::EQUAL, 0.12).is_infinite());
    }

    #[test]
    fn test_maximal_divergence_scores_zero() {
        let a = vec![[1.0; 3]; 50];
        let b = vec![[0.0; 3]; 50];
        let w = vec![1.0; 50];
        let scorer = DtwScorer::default();
        let input = ScoreInput {
            live: &a,
            live_weights: &w,
            reference: &b,
            reference_weights: &w,
            channels: ChannelWeights::EQUAL,
        };
        assert_eq!(scorer.score(&input), 0);
    }
}
