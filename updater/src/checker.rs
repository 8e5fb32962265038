//! 업데이트 확인: 로컬 버전과 최신 원격 릴리스 비교
//!
//! 컨트롤러 자체 업데이트 채널과 대상 애플리케이션 채널에 각각 하나씩 사용합니다.
//! 네트워크 실패는 "업데이트 없음"으로 강등되고, rate limit만 구분해서 알려줍니다.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;
use crate::github::{ReleaseApi, RemoteRelease};
use crate::version::VersionTag;

/// 기본 확인 타임아웃
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// 업데이트 확인 결과
#[derive(Debug, Clone)]
pub enum UpdateCheck {
    /// 원격 버전이 더 새로움
    Available(RemoteRelease),
    UpToDate,
    /// 설치되지 않았으므로 업데이트 대상 아님
    NotInstalled,
    /// API 할당량 소진
    RateLimited { reset_at: DateTime<Utc> },
    /// 네트워크/API 실패 또는 타임아웃
    Unavailable,
}

impl UpdateCheck {
    pub fn is_available(&self) -> bool {
        matches!(self, UpdateCheck::Available(_))
    }
}

/// 업데이트 확인기
#[derive(Clone)]
pub struct UpdateChecker {
    channel: String,
    current: Option<VersionTag>,
    api: Arc<dyn ReleaseApi>,
    timeout: Duration,
}

impl UpdateChecker {
    /// `current`가 None이면 미설치로 간주하고 네트워크 조회 없이 항상 "업데이트 없음"
    pub fn new(channel: &str, current: Option<VersionTag>, api: Arc<dyn ReleaseApi>) -> Self {
        Self {
            channel: channel.to_string(),
            current,
            api,
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn check(&self) -> UpdateCheck {
        let current = match self.current {
            Some(ref v) => v,
            None => return UpdateCheck::NotInstalled,
        };

        let fetched = tokio::time::timeout(self.timeout, self.api.fetch_latest_release()).await;
        let release = match fetched {
            Ok(Ok(release)) => release,
            Ok(Err(FetchError::RateLimited { reset_at })) => {
                tracing::warn!(
                    "[Checker:{}] Rate limited, update check skipped until {}",
                    self.channel, reset_at
                );
                return UpdateCheck::RateLimited { reset_at };
            }
            Ok(Err(e)) => {
                tracing::warn!("[Checker:{}] Update check failed: {}", self.channel, e);
                return UpdateCheck::Unavailable;
            }
            Err(_) => {
                tracing::warn!(
                    "[Checker:{}] Update check timed out after {:?}",
                    self.channel, self.timeout
                );
                return UpdateCheck::Unavailable;
            }
        };

        if release.version.is_newer_than(current) {
            tracing::info!(
                "[Checker:{}] Update available: {} → {}",
                self.channel, current, release.version
            );
            UpdateCheck::Available(release)
        } else {
            tracing::debug!("[Checker:{}] Up to date ({})", self.channel, current);
            UpdateCheck::UpToDate
        }
    }

    pub async fn check_for_update(&self) -> bool {
        self.check().await.is_available()
    }
}
