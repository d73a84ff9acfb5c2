//! 可動域 (ROM) による粗い動作分類

use serde::Serialize;

use crate::signal::{AngleTriple, Channel};

/// 体幹屈曲型と判定する体幹ROMの下限 (度)
const TRUNK_FLEXION_MIN: f32 = 40.0;
/// 股関節ヒンジ型と判定する股関節ROMの下限 (度)
const HIP_HINGE_MIN: f32 = 45.0;
/// ヒンジ型では膝ROMが股関節ROMのこの割合未満
const HINGE_KNEE_RATIO: f32 = 0.6;
/// 膝主導型の膝ROM下限 (度)。スクワットへの過剰分類を避けるため厳しめ
const KNEE_DOMINANT_MIN: f32 = 70.0;
/// 膝主導型でも股関節がこれだけ動いていること
const KNEE_DOMINANT_HIP_MIN: f32 = 40.0;

const UNCLASSIFIED_CONFIDENCE: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPattern {
    TrunkFlexion,
    HipHinge,
    KneeDominant,
    Unclassified,
}

impl MovementPattern {
    /// 検索クエリに使うキーワード
    pub fn keyword(self) -> &'static str {
        match self {
            MovementPattern::TrunkFlexion => "trunk flexion",
            MovementPattern::HipHinge => "hip hinge",
            MovementPattern::KneeDominant => "squat",
            MovementPattern::Unclassified => "exercise",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            MovementPattern::TrunkFlexion => "Trunk flexion",
            MovementPattern::HipHinge => "Hip hinge",
            MovementPattern::KneeDominant => "Knee-dominant (squat pattern)",
            MovementPattern::Unclassified => "Unclassified",
        }
    }

    fn description(self) -> &'static str {
        match self {
            MovementPattern::TrunkFlexion => "Movement driven mainly by bending the torso forward and back.",
            MovementPattern::HipHinge => "Hips travel back while the knees stay relatively fixed.",
            MovementPattern::KneeDominant => "Knees and hips flex together to lower the body.",
            MovementPattern::Unclassified => "Motion did not match a known pattern.",
        }
    }

    fn cues(self) -> &'static [&'static str] {
        match self {
            MovementPattern::TrunkFlexion => &["Move through the spine slowly", "Control the return"],
            MovementPattern::HipHinge => &["Push the hips back", "Keep a soft knee", "Keep the back flat"],
            MovementPattern::KneeDominant => &["Knees track over toes", "Keep the chest up", "Sit between the heels"],
            MovementPattern::Unclassified => &[],
        }
    }

    fn focus_joints(self) -> &'static [Channel] {
        match self {
            MovementPattern::TrunkFlexion => &[Channel::Trunk, Channel::Hip],
            MovementPattern::HipHinge => &[Channel::Hip, Channel::Trunk],
            MovementPattern::KneeDominant => &[Channel::Knee, Channel::Hip],
            MovementPattern::Unclassified => &[],
        }
    }
}

/// 参照動画の分類結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub pattern: MovementPattern,
    pub name: String,
    pub description: String,
    pub cues: Vec<String>,
    /// [0, 1]
    pub confidence: f32,
    pub focus_joints: Vec<Channel>,
    /// ユーザーが選んだ分類は自動マッチで上書きしない
    pub user_selected: bool,
}

impl Classification {
    fn from_pattern(pattern: MovementPattern, confidence: f32) -> Self {
        Self {
            pattern,
            name: pattern.display_name().to_string(),
            description: pattern.description().to_string(),
            cues: pattern.cues().iter().map(|c| c.to_string()).collect(),
            confidence,
            focus_joints: pattern.focus_joints().to_vec(),
            user_selected: false,
        }
    }

    /// ユーザーが手動で選んだ分類
    pub fn user_selected(name: &str, focus_joints: Vec<Channel>) -> Self {
        Self {
            pattern: MovementPattern::Unclassified,
            name: name.to_string(),
            description: String::new(),
            cues: Vec::new(),
            confidence: 1.0,
            focus_joints,
            user_selected: true,
        }
    }

    /// 重複なしでフォーカス関節を追加
    pub fn merge_focus(&mut self, joints: &[Channel]) {
        for joint in joints {
            if !self.focus_joints.contains(joint) {
                self.focus_joints.push(*joint);
            }
        }
    }
}

/// しきい値をどれだけ超えたかで 0.4〜1.0
fn excess_confidence(rom: f32, threshold: f32) -> f32 {
    0.4 + 0.6 * ((rom - threshold) / threshold).clamp(0.0, 1.0)
}

/// ROM が最大のチャンネル（同値なら膝→股関節→体幹の順）
pub fn dominant_joint(rom: AngleTriple) -> Channel {
    let mut best = Channel::Knee;
    for channel in Channel::ALL {
        if rom[channel as usize] > rom[best as usize] {
            best = channel;
        }
    }
    best
}

/// [膝, 股関節, 体幹] の ROM から動作パターンを判定
///
/// ルールは上から順に評価し、最初に合致したものを採用する。
pub fn classify(rom: AngleTriple) -> Classification {
    let [knee, hip, trunk] = rom;

    if trunk >= TRUNK_FLEXION_MIN && trunk >= hip {
        return Classification::from_pattern(
            MovementPattern::TrunkFlexion,
            excess_confidence(trunk, TRUNK_FLEXION_MIN),
        );
    }
    if hip >= HIP_HINGE_MIN && knee < HINGE_KNEE_RATIO * hip {
        return Classification::from_pattern(MovementPattern::HipHinge, excess_confidence(hip, HIP_HINGE_MIN));
    }
    if knee >= KNEE_DOMINANT_MIN && hip >= KNEE_DOMINANT_HIP_MIN {
        return Classification::from_pattern(
            MovementPattern::KneeDominant,
            excess_confidence(knee, KNEE_DOMINANT_MIN),
        );
    }

    let hint = dominant_joint(rom);
    let mut unclassified = Classification::from_pattern(MovementPattern::Unclassified, UNCLASSIFIED_CONFIDENCE);
    unclassified.description = format!("Motion did not match a known pattern; most movement at the {}.", hint.name());
    unclassified.focus_joints = vec![hint];
    unclassified
}
