//! GitHub Release API 클라이언트 (rate limit 인식)
//!
//! 최신 릴리스 조회가 할당량 소진으로 거부되면 `FetchError::RateLimited`로 구분하고,
//! `/rate_limit` 엔드포인트로 리셋 시각을 조회할 수 있습니다.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::FetchError;
use crate::events::ProgressReporter;
use crate::version::VersionTag;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("perch-updater/", env!("CARGO_PKG_VERSION"));

/// GitHub Release 응답 (필요한 필드만)
#[derive(Debug, Clone, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    published_at: Option<DateTime<Utc>>,
    html_url: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// 릴리스 에셋
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub browser_download_url: String,
}

/// 원격 최신 릴리스 스냅샷 (조회마다 새로 받아오며 저장하지 않음)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRelease {
    pub version: VersionTag,
    pub tag_name: String,
    /// 릴리스 페이지 URL
    pub download_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub assets: Vec<ReleaseAsset>,
}

/// API 할당량 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// `/rate_limit` 응답 (resources.core만 사용)
#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitWindow,
}

#[derive(Debug, Deserialize)]
struct RateLimitWindow {
    remaining: u64,
    reset: i64,
}

/// 원격 릴리스 피드. 컨트롤러는 이 트레이트로만 네트워크에 접근합니다.
#[async_trait]
pub trait ReleaseApi: Send + Sync {
    /// 최신 정식 릴리스 조회
    async fn fetch_latest_release(&self) -> Result<RemoteRelease, FetchError>;

    /// 현재 API 할당량 조회
    async fn fetch_rate_limit(&self) -> Result<RateLimitStatus, FetchError>;
}

/// GitHub API 클라이언트
pub struct GitHubClient {
    owner: String,
    repo: String,
    http: reqwest::Client,
    /// API 베이스 URL (기본: "https://api.github.com")
    /// 로컬 mock 서버 테스트 시 "http://127.0.0.1:9876" 등으로 오버라이드
    base_url: String,
}

impl GitHubClient {
    /// base_url이 None이면 api.github.com (테스트/mock 서버는 오버라이드)
    pub fn with_base_url(owner: &str, repo: &str, base_url: Option<&str>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            http,
            base_url: base_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// 응답 상태를 확인하고, 할당량 소진이면 RateLimited로 변환
    async fn check_response(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if let Some(reset_at) = rate_limit_reset(&response) {
            tracing::warn!("[GitHub] {} denied: rate limited until {}", operation, reset_at);
            return Err(FetchError::RateLimited { reset_at });
        }

        let body = response.text().await.unwrap_or_default();
        Err(FetchError::Api {
            status_code: status.as_u16(),
            message: format!("{}: {}", operation, body.trim()),
        })
    }

    /// 에셋을 파일로 스트리밍 다운로드. 진행률은 `progress`의 [start, end] 구간으로 보고
    pub async fn download_asset_to_file(
        &self,
        asset: &ReleaseAsset,
        dest: &Path,
        progress: &ProgressReporter,
        (start, end): (f64, f64),
    ) -> anyhow::Result<u64> {
        tracing::info!("[GitHub] Downloading {} → {}", asset.name, dest.display());

        let response = self
            .http
            .get(&asset.browser_download_url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, "download asset"))?;
        let response = Self::check_response(response, "download asset").await?;

        let total = response.content_length().unwrap_or(asset.size);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(&e, "download asset"))?;
            tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;
            downloaded += chunk.len() as u64;
            if total > 0 {
                let ratio = (downloaded as f64 / total as f64).min(1.0);
                progress.report(start + (end - start) * ratio);
            }
        }
        tokio::io::AsyncWriteExt::flush(&mut file).await?;
        progress.report(end);

        tracing::info!("[GitHub] Downloaded {} ({} bytes)", asset.name, downloaded);
        Ok(downloaded)
    }

    /// 작은 텍스트 에셋 다운로드 (체크섬 파일 등)
    pub async fn download_text(&self, asset: &ReleaseAsset) -> Result<String, FetchError> {
        let response = self
            .http
            .get(&asset.browser_download_url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, "download text asset"))?;
        let response = Self::check_response(response, "download text asset").await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, "download text asset"))
    }
}

#[async_trait]
impl ReleaseApi for GitHubClient {
    async fn fetch_latest_release(&self) -> Result<RemoteRelease, FetchError> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.base_url, self.owner, self.repo
        );

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, "fetch latest release"))?;
        let response = Self::check_response(response, "fetch latest release").await?;

        let release: GitHubRelease = response
            .json()
            .await
            .map_err(|e| FetchError::Decode { message: e.to_string() })?;

        let version = VersionTag::parse(&release.tag_name).ok_or_else(|| FetchError::Decode {
            message: format!("Release tag '{}' is not a version", release.tag_name),
        })?;

        tracing::debug!("[GitHub] {} latest release: {}", self.repository(), version);
        Ok(RemoteRelease {
            version,
            tag_name: release.tag_name,
            download_url: release.html_url,
            published_at: release.published_at,
            assets: release.assets,
        })
    }

    async fn fetch_rate_limit(&self) -> Result<RateLimitStatus, FetchError> {
        let url = format!("{}/rate_limit", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, "fetch rate limit"))?;

        // /rate_limit 자체는 할당량을 소모하지 않으므로 403이어도 본문을 읽지 않음
        if !response.status().is_success() {
            return Err(FetchError::Api {
                status_code: response.status().as_u16(),
                message: "fetch rate limit".to_string(),
            });
        }

        let body: RateLimitResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode { message: e.to_string() })?;

        let reset_at = Utc
            .timestamp_opt(body.resources.core.reset, 0)
            .single()
            .ok_or_else(|| FetchError::Decode {
                message: format!("Invalid reset timestamp {}", body.resources.core.reset),
            })?;

        Ok(RateLimitStatus {
            remaining: body.resources.core.remaining,
            reset_at,
        })
    }
}

/// 403/429 응답에서 `x-ratelimit-remaining: 0`이면 `x-ratelimit-reset` 시각을 반환
fn rate_limit_reset(response: &reqwest::Response) -> Option<DateTime<Utc>> {
    let status = response.status().as_u16();
    if status != 403 && status != 429 {
        return None;
    }

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
    };

    if header("x-ratelimit-remaining").as_deref() != Some("0") {
        return None;
    }

    let reset = header("x-ratelimit-reset")?.parse::<i64>().ok()?;
    Utc.timestamp_opt(reset, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_release_payload() {
        let json = r#"{
            "tag_name": "v0.6.4.0",
            "name": "0.6.4",
            "prerelease": false,
            "draft": false,
            "published_at": "2024-03-01T12:00:00Z",
            "html_url": "https://github.com/acme/app/releases/tag/v0.6.4.0",
            "assets": [
                { "name": "app.linux-x64.zip", "size": 1024, "browser_download_url": "https://example.com/a.zip" }
            ]
        }"#;
        let release: GitHubRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.assets.len(), 1);
        let version = VersionTag::parse(&release.tag_name).unwrap();
        assert_eq!((version.minor, version.patch, version.revision), (6, 4, 0));
    }

    #[test]
    fn parse_rate_limit_payload() {
        let json = r#"{
            "resources": {
                "core": { "limit": 60, "remaining": 0, "reset": 1700000000, "used": 60 },
                "search": { "limit": 10, "remaining": 10, "reset": 1700000000, "used": 0 }
            },
            "rate": { "limit": 60, "remaining": 0, "reset": 1700000000, "used": 60 }
        }"#;
        let body: RateLimitResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.resources.core.remaining, 0);
        assert_eq!(body.resources.core.reset, 1_700_000_000);
    }

    #[test]
    fn base_url_override_is_normalized() {
        let client = GitHubClient::with_base_url("acme", "app", Some("http://127.0.0.1:9876/")).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:9876");

        let client = GitHubClient::with_base_url("acme", "app", Some("  ")).unwrap();
        assert_eq!(client.base_url, DEFAULT_API_BASE);
        assert_eq!(client.repository(), "acme/app");
    }
}
