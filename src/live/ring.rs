//! 直近 N フレームの角度チャンネルを保持するリングバッファ

use crate::signal::AngleTriple;

/// ライブ側のデフォルト窓長
pub const DEFAULT_WINDOW: usize = 60;

pub struct AngleRing {
    angles: Vec<AngleTriple>,
    weights: Vec<f32>,
    /// 次に書き込む位置
    write_index: usize,
    len: usize,
}

impl AngleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            angles: vec![[0.0; 3]; capacity],
            weights: vec![0.0; capacity],
            write_index: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.angles.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// 最古のエントリを上書きして追加
    pub fn push(&mut self, angles: AngleTriple, weight: f32) {
        self.angles[self.write_index] = angles;
        self.weights[self.write_index] = weight;
        self.write_index = (self.write_index + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
    }

    /// 古い順に並べた (角度, 重み)。埋まっている分だけ返す
    pub fn ordered(&self) -> (Vec<AngleTriple>, Vec<f32>) {
        let start = (self.write_index + self.capacity() - self.len) % self.capacity();
        (0..self.len)
            .map(|i| {
                let idx = (start + i) % self.capacity();
                (self.angles[idx], self.weights[idx])
            })
            .unzip()
    }

    /// 有効フレーム（重み > 0）が1つでもあるか
    pub fn has_usable(&self) -> bool {
        let (_, weights) = self.ordered();
        weights.iter().any(|w| *w > 0.0)
    }

    pub fn clear(&mut self) {
        self.write_index = 0;
        self.len = 0;
    }
}

impl Default for AngleRing {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
