use thiserror::Error;

/// Failure of an outbound call to the weather or generative-AI service.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("API key for {0} is not configured")]
    MissingKey(&'static str),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("service returned no content")]
    Empty,
}

impl CollaboratorError {
    /// Text shown to the user in place of the missing result.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingKey(service) => format!("尚未設定 {service} 的 API 金鑰，無法使用此功能。"),
            Self::Http { status, message } => format!("服務回應錯誤 (HTTP {status})：{message}"),
            Self::Connection(_) => "無法連線到服務，請檢查網路連線。".to_string(),
            Self::Timeout => "服務回應逾時，請稍後再試。".to_string(),
            Self::Decode(_) => "服務回傳的資料格式無法解析。".to_string(),
            Self::Service(message) => format!("服務回報錯誤：{message}"),
            Self::Empty => "服務沒有回傳任何內容。".to_string(),
        }
    }
}
