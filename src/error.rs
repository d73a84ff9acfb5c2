use thiserror::Error;

/// 参照動画の構築失敗（キャンセルはエラーではない）
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("no usable frames: pose was never detected in the reference video")]
    NoUsableFrames,
    #[error("failed to decode reference video: {0}")]
    Decode(String),
    #[error("pose model unavailable: {0}")]
    Model(String),
}

/// 外部エクササイズ検索サービスのエラー
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SearchError {
    /// 401/403: このセッション中は二度と問い合わせない
    #[error("exercise search denied authorization")]
    Unauthorized,
    #[error("exercise search transport error: {0}")]
    Transport(String),
}

/// カメラ取得エラー
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera matches the requested constraints")]
    NotFound,
    #[error("camera error: {0}")]
    Other(String),
}

/// ライブストリームのフレーム取得エラー
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamError {
    /// ストリームが途中で終了した（デバイス切断など）
    #[error("camera stream ended")]
    Ended,
    #[error("transient frame error: {0}")]
    Transient(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("camera unavailable after {attempts} attempts: {last}")]
    CameraUnavailable { attempts: u32, last: CameraError },
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("display error: {0}")]
    Display(String),
    #[error("live session did not start: {0}")]
    NotStarted(String),
}
