use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::MatcherConfig;
use crate::error::SearchError;
use crate::signal::Channel;

use super::classifier::Classification;

/// 自動マッチの適用方針
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// 検索しない
    Off,
    /// 候補を返すだけで分類は変更しない
    Suggest,
    /// 最良候補で分類を更新する（ユーザー選択は除く）
    #[default]
    Apply,
}

/// `joints` はリストか自由記述のどちらか
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JointsField {
    List(Vec<String>),
    Text(String),
}

/// 検索サービスが返すエクササイズ
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExerciseRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cues: Vec<String>,
    #[serde(default)]
    pub joints: Option<JointsField>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExerciseRecord {
    /// 候補が対象とする関節
    ///
    /// `joints`（リストか自由記述、無ければ説明文）と `tags` の和集合。
    pub fn joints(&self) -> Vec<Channel> {
        let mut joints = Vec::new();
        let mut add = |channel: Channel| {
            if !joints.contains(&channel) {
                joints.push(channel);
            }
        };
        match &self.joints {
            Some(JointsField::List(tags)) => tags.iter().filter_map(|t| joint_from_tag(t)).for_each(&mut add),
            Some(JointsField::Text(text)) => joints_in_text(text).into_iter().for_each(&mut add),
            None => joints_in_text(&self.description).into_iter().for_each(&mut add),
        }
        self.tags.iter().filter_map(|t| joint_from_tag(t)).for_each(&mut add);
        joints
    }
}

/// 関節タグ → チャンネル
pub fn joint_from_tag(tag: &str) -> Option<Channel> {
    let tag = tag.trim().to_lowercase();
    if tag.starts_with("knee") || tag.starts_with("quad") {
        Some(Channel::Knee)
    } else if tag.starts_with("hip") || tag.starts_with("glute") || tag.starts_with("hamstring") {
        Some(Channel::Hip)
    } else if ["trunk", "spine", "torso", "back", "core", "lumbar"].iter().any(|k| tag.starts_with(k)) {
        Some(Channel::Trunk)
    } else {
        None
    }
}

fn joints_in_text(text: &str) -> Vec<Channel> {
    let mut joints = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if let Some(channel) = joint_from_tag(word) {
            if !joints.contains(&channel) {
                joints.push(channel);
            }
        }
    }
    joints
}

/// |A ∩ B| / |A ∪ B|。両方空なら 0
pub fn jaccard(a: &[Channel], b: &[Channel]) -> f32 {
    let union = Channel::ALL.iter().filter(|c| a.contains(c) || b.contains(c)).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = Channel::ALL.iter().filter(|c| a.contains(c) && b.contains(c)).count();
    intersection as f32 / union as f32
}

/// 外部エクササイズ検索
pub trait ExerciseSearch {
    fn search(&self, query: &str) -> Result<Vec<ExerciseRecord>, SearchError>;
}

/// マッチした候補
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSuggestion {
    pub record: ExerciseRecord,
    pub joints: Vec<Channel>,
    pub similarity: f32,
    /// 分類に反映したか
    pub applied: bool,
}

/// 粗い分類を外部検索結果で精緻化する
pub struct ExerciseMatcher {
    search: Box<dyn ExerciseSearch + Send + Sync>,
    /// 認可エラー後はセッション中ずっと true
    disabled: AtomicBool,
    policy: MatchPolicy,
    min_similarity: f32,
    name_boost: f32,
}

impl ExerciseMatcher {
    pub fn new(search: Box<dyn ExerciseSearch + Send + Sync>, config: &MatcherConfig) -> Self {
        Self {
            search,
            disabled: AtomicBool::new(false),
            policy: config.policy,
            min_similarity: config.min_similarity,
            name_boost: config.name_boost,
        }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// パターンのキーワードとフォーカス関節名
    fn queries(classification: &Classification) -> Vec<String> {
        let mut queries = vec![classification.pattern.keyword().to_string()];
        for joint in &classification.focus_joints {
            let q = joint.name().to_string();
            if !queries.contains(&q) {
                queries.push(q);
            }
        }
        queries
    }

    fn similarity(&self, record: &ExerciseRecord, joints: &[Channel], focus: &[Channel], queries: &[String]) -> f32 {
        let name = record.name.to_lowercase();
        let boost = if queries.iter().any(|q| name.contains(q.as_str())) {
            self.name_boost
        } else {
            0.0
        };
        jaccard(joints, focus) + boost
    }

    /// 検索して最良候補を返す。`Apply` なら分類も更新する
    ///
    /// 検索エラーは「候補なし」として扱う。
    pub fn refine(&self, classification: &mut Classification) -> Option<MatchSuggestion> {
        if self.policy == MatchPolicy::Off || self.is_disabled() {
            return None;
        }

        let queries = Self::queries(classification);
        let mut best: Option<MatchSuggestion> = None;
        for query in &queries {
            let records = match self.search.search(query) {
                Ok(records) => records,
                Err(SearchError::Unauthorized) => {
                    log::warn!("exercise search unauthorized, disabling matcher for this session");
                    self.disabled.store(true, Ordering::SeqCst);
                    return None;
                }
                Err(e) => {
                    log::warn!("exercise search for {:?} failed: {}", query, e);
                    continue;
                }
            };
            log::debug!("exercise search {:?}: {} results", query, records.len());

            for record in records {
                let joints = record.joints();
                let similarity = self.similarity(&record, &joints, &classification.focus_joints, &queries);
                if similarity < self.min_similarity {
                    continue;
                }
                if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                    best = Some(MatchSuggestion {
                        record,
                        joints,
                        similarity,
                        applied: false,
                    });
                }
            }
        }

        let mut suggestion = best?;
        if self.policy == MatchPolicy::Apply && !classification.user_selected {
            let record = &suggestion.record;
            classification.name = record.name.clone();
            if !record.description.is_empty() {
                classification.description = record.description.clone();
            }
            if !record.cues.is_empty() {
                classification.cues = record.cues.clone();
            }
            classification.merge_focus(&suggestion.joints);
            suggestion.applied = true;
            log::info!(
                "matched exercise {:?} (similarity {:.2})",
                suggestion.record.name,
                suggestion.similarity
            );
        }
        Some(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// 呼び出し回数を数える検索
    struct CountingSearch {
        calls: Arc<AtomicUsize>,
        response: Result<Vec<ExerciseRecord>, SearchError>,
    }

    impl ExerciseSearch for CountingSearch {
        fn search(&self, _query: &str) -> Result<Vec<ExerciseRecord>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn record(name: &str, joints: &[&str]) -> ExerciseRecord {
        ExerciseRecord {
            name: name.to_string(),
            description: format!("{} description", name),
            cues: vec![format!("{} cue", name)],
            joints: Some(JointsField::List(joints.iter().map(|j| j.to_string()).collect())),
            tags: Vec::new(),
        }
    }

    fn matcher(response: Result<Vec<ExerciseRecord>, SearchError>, policy: MatchPolicy) -> (ExerciseMatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let search = CountingSearch {
            calls: calls.clone(),
            response,
        };
        let config = MatcherConfig {
            policy,
            ..MatcherConfig::default()
        };
        (ExerciseMatcher::new(Box::new(search), &config), calls)
    }

    fn squat() -> Classification {
        classify([110.0, 80.0, 20.0])
    }

    #[test]
    fn test_unauthorized_disables_for_session() {
        let (matcher, calls) = matcher(Err(SearchError::Unauthorized), MatchPolicy::Apply);
        for _ in 0..3 {
            let mut c = squat();
            assert_eq!(matcher.refine(&mut c), None);
            assert_eq!(c, squat());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matcher.is_disabled());
    }

    #[test]
    fn test_transport_error_means_no_enrichment() {
        let (matcher, calls) = matcher(Err(SearchError::Transport("timeout".into())), MatchPolicy::Apply);
        let mut c = squat();
        assert_eq!(matcher.refine(&mut c), None);
        assert_eq!(c, squat());
        // 各クエリは試す。次回も再試行する
        let per_refine = calls.load(Ordering::SeqCst);
        assert_eq!(per_refine, 3);
        matcher.refine(&mut c);
        assert_eq!(calls.load(Ordering::SeqCst), 2 * per_refine);
        assert!(!matcher.is_disabled());
    }

    #[test]
    fn test_best_candidate_applied() {
        let records = vec![
            record("Bicep curl", &["elbow"]),
            record("Goblet squat", &["knees", "hips", "spine"]),
            record("Leg extension", &["knee"]),
        ];
        let (matcher, _) = matcher(Ok(records), MatchPolicy::Apply);
        let mut c = squat();
        let suggestion = matcher.refine(&mut c).unwrap();
        assert_eq!(suggestion.record.name, "Goblet squat");
        assert!(suggestion.applied);
        assert_eq!(c.name, "Goblet squat");
        assert_eq!(c.cues, vec!["Goblet squat cue".to_string()]);
        assert_eq!(c.focus_joints, vec![Channel::Knee, Channel::Hip, Channel::Trunk]);
    }

    #[test]
    fn test_below_threshold_ignored() {
        let (matcher, _) = matcher(Ok(vec![record("Shoulder press", &["shoulder", "trunk"])]), MatchPolicy::Apply);
        let mut c = squat();
        // jaccard = 0 / 3
        assert_eq!(matcher.refine(&mut c), None);
        assert_eq!(c, squat());
    }

    #[test]
    fn test_suggest_does_not_modify() {
        let (matcher, _) = matcher(Ok(vec![record("Box squat", &["knee", "hip"])]), MatchPolicy::Suggest);
        let mut c = squat();
        let suggestion = matcher.refine(&mut c).unwrap();
        assert!(!suggestion.applied);
        assert_eq!(c, squat());
    }

    #[test]
    fn test_user_selected_not_overwritten() {
        let (matcher, _) = matcher(Ok(vec![record("Box squat", &["knee", "hip"])]), MatchPolicy::Apply);
        let mut c = Classification::user_selected("My split squat", vec![Channel::Knee]);
        let before = c.clone();
        let suggestion = matcher.refine(&mut c).unwrap();
        assert!(!suggestion.applied);
        assert_eq!(c, before);
    }

    #[test]
    fn test_off_policy_never_searches() {
        let (matcher, calls) = matcher(Ok(vec![record("Box squat", &["knee"])]), MatchPolicy::Off);
        assert_eq!(matcher.refine(&mut squat()), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_joints_from_free_text() {
        let json = r#"[
            {"name": "Good morning", "description": "Hinge at the hips", "joints": "hips and lower back"},
            {"name": "Wall sit", "description": "Hold with knees bent at 90 degrees"}
        ]"#;
        let records: Vec<ExerciseRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].joints(), vec![Channel::Hip, Channel::Trunk]);
        assert_eq!(records[1].joints(), vec![Channel::Knee]);
        assert!(records[1].cues.is_empty());
    }

    #[test]
    fn test_tags_only_record_matches() {
        let single_leg = ExerciseRecord {
            name: "Step-up".to_string(),
            description: "single leg".to_string(),
            cues: Vec::new(),
            joints: None,
            tags: vec!["knee".to_string(), "hip".to_string()],
        };
        assert_eq!(single_leg.joints(), vec![Channel::Knee, Channel::Hip]);

        let (matcher, _) = matcher(Ok(vec![single_leg]), MatchPolicy::Apply);
        let mut c = squat();
        let suggestion = matcher.refine(&mut c).unwrap();
        assert_eq!(suggestion.record.name, "Step-up");
        assert!(suggestion.similarity >= 1.0);
        assert_eq!(c.name, "Step-up");
    }

    #[test]
    fn test_tags_union_with_joints() {
        let json = r#"{"name": "Front squat", "joints": ["knees"], "tags": ["glutes", "strength", "knee"]}"#;
        let record: ExerciseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.joints(), vec![Channel::Knee, Channel::Hip]);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&[], &[]), 0.0);
        assert_eq!(jaccard(&[Channel::Knee], &[Channel::Knee]), 1.0);
        assert!((jaccard(&[Channel::Knee, Channel::Hip], &[Channel::Hip, Channel::Trunk]) - 1.0 / 3.0).abs() < 1e-6);
    }
}
