//! 에러 타입
//!
//! ## 분류
//! - `FetchError`: 원격 API 조회 실패 (복구 가능: "업데이트 없음"으로 강등하거나 rate limit 안내)
//! - `FetchError::RateLimited`: API 할당량 소진 (리셋 시각 안내 전용 메시지)
//! - `MigrationError`: 레이아웃 마이그레이션 실패 (치명적, 변경 없음)
//! - `AlreadyRunning`: 설치/제거/업데이트 중복 실행 (가드가 구조적으로 막음)

use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;

/// 원격 릴리스 API 조회 에러
#[derive(thiserror::Error, Debug, Clone)]
pub enum FetchError {
    /// API 할당량 소진: `reset_at` 이후 다시 요청 가능
    #[error("API rate limit exceeded (resets at {reset_at})")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Timeout after {duration_secs}s: {operation}")]
    Timeout { operation: String, duration_secs: u64 },

    #[error("API error ({status_code}): {message}")]
    Api { status_code: u16, message: String },

    /// 응답 형식 오류 (JSON 파싱 실패, 버전 태그 해석 불가 등)
    #[error("Malformed response: {message}")]
    Decode { message: String },
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }

    /// 사용자에게 표시할 메시지
    pub fn user_message(&self) -> String {
        match self {
            FetchError::RateLimited { reset_at } => format!(
                "You are currently rate limited on the GitHub API. Try again after {}.",
                format_reset_time(reset_at)
            ),
            FetchError::Network { .. } => "Please check your internet connection.".to_string(),
            FetchError::Timeout { .. } => {
                "The server is taking too long to respond. Please try again later.".to_string()
            }
            FetchError::Api { status_code, .. } => {
                if *status_code == 404 {
                    "No release was found.".to_string()
                } else if *status_code >= 500 {
                    "GitHub is having temporary problems. Please try again later.".to_string()
                } else {
                    format!("Server error ({})", status_code)
                }
            }
            FetchError::Decode { .. } => "The release information could not be read.".to_string(),
        }
    }

    /// reqwest 에러를 FetchError로 변환
    pub fn from_reqwest(err: &reqwest::Error, operation: &str) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                operation: operation.to_string(),
                duration_secs: 30,
            }
        } else if err.is_decode() {
            FetchError::Decode { message: err.to_string() }
        } else if let Some(status) = err.status() {
            FetchError::Api {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_connect() {
            FetchError::Network { message: "Connection failed".to_string() }
        } else {
            FetchError::Network { message: err.to_string() }
        }
    }
}

/// 리셋 시각을 로컬 시간대로 표시
pub fn format_reset_time(reset_at: &DateTime<Utc>) -> String {
    reset_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// 레이아웃 마이그레이션 에러: 실패 시 디스크는 마이그레이션 전 상태 그대로
#[derive(thiserror::Error, Debug)]
pub enum MigrationError {
    #[error("Migration target '{}' already exists", .0.display())]
    TargetExists(PathBuf),

    #[error("Legacy folder '{}' not found", .0.display())]
    LegacyMissing(PathBuf),

    #[error("File system error during {operation} on '{}': {source}", path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrationError {
    pub fn io(operation: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            operation: operation.to_string(),
            path: path.into(),
            source,
        }
    }
}

/// 다른 설치/제거/업데이트가 이미 진행 중
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Another {running} operation is already running")]
pub struct AlreadyRunning {
    pub running: crate::guard::OperationKind,
}

/// 오케스트레이터 경계에서 발생하는 에러
#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    AlreadyRunning(#[from] AlreadyRunning),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rate_limit_is_distinct() {
        let err = FetchError::RateLimited {
            reset_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        assert!(err.is_rate_limited());
        assert!(err.user_message().contains("rate limited"));
    }

    #[test]
    fn api_errors_have_user_messages() {
        let e404 = FetchError::Api { status_code: 404, message: String::new() };
        assert!(!e404.is_rate_limited());
        assert_eq!(e404.user_message(), "No release was found.");
    }

    #[test]
    fn migration_error_mentions_path() {
        let err = MigrationError::TargetExists(PathBuf::from("/opt/app"));
        assert!(err.to_string().contains("/opt/app"));
    }
}
