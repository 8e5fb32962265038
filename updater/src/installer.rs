//! 설치기: 대상 애플리케이션의 설치/업데이트/제거
//!
//! 컨트롤러는 `Installer` 트레이트만 사용합니다. `GitHubInstaller`는 GitHub 릴리스의
//! zip 에셋을 내려받아 설치 디렉터리에 풀어 넣는 기본 구현입니다.
//!
//! ## 설치 디렉터리 구조
//! ```text
//! <install_dir>/
//!   install.json        ← 설치 기록 (버전, 릴리스 태그, 설치 시각)
//!   <executable>
//!   ...
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::checker::{UpdateCheck, UpdateChecker, DEFAULT_CHECK_TIMEOUT};
use crate::events::ProgressReporter;
use crate::fsutil;
use crate::github::{GitHubClient, ReleaseApi, ReleaseAsset, RemoteRelease};
use crate::version::VersionTag;

/// 설치 기록 파일 이름
pub const INSTALL_RECORD: &str = "install.json";

/// 설치 기록
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalledVersion {
    pub version: VersionTag,
    pub tag_name: String,
    pub installed_at: DateTime<Utc>,
}

/// 마이그레이션으로 옮겨 온 설치의 태그 이름
pub const LEGACY_TAG: &str = "legacy";

impl InstalledVersion {
    /// 예전 레이아웃에서 옮겨 온 설치용 기록 (버전을 알 수 없으므로 0.0.0)
    pub fn legacy() -> Self {
        Self {
            version: VersionTag::default(),
            tag_name: LEGACY_TAG.to_string(),
            installed_at: Utc::now(),
        }
    }

    /// `<dir>/install.json`에 기록
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::write(dir.join(INSTALL_RECORD), serde_json::to_string_pretty(self)?)
    }
}

/// 설치 상태 스냅샷. 미설치면 버전도 없음
#[derive(Debug, Clone, PartialEq)]
pub struct InstallationState {
    is_installed: bool,
    installed_version: Option<VersionTag>,
    install_directory: PathBuf,
}

impl InstallationState {
    pub fn new(installed_version: Option<VersionTag>, is_installed: bool, install_directory: PathBuf) -> Self {
        Self {
            is_installed,
            installed_version: if is_installed { installed_version } else { None },
            install_directory,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.is_installed
    }

    pub fn installed_version(&self) -> Option<&VersionTag> {
        self.installed_version.as_ref()
    }

    pub fn install_directory(&self) -> &Path {
        &self.install_directory
    }
}

/// 설치기 협력자 계약
#[async_trait]
pub trait Installer: Send + Sync {
    fn is_installed(&self) -> bool;

    fn installed_version(&self) -> Option<InstalledVersion>;

    fn install_directory(&self) -> PathBuf;

    /// 설치된 버전보다 새 릴리스가 있는지 확인 (미설치면 항상 업데이트 없음)
    async fn check_for_update(&self) -> UpdateCheck;

    /// 최신 릴리스 설치. 실패하면 false (예외 대신 논리적 실패)
    async fn install(&self, progress: ProgressReporter) -> bool;

    /// 설치 제거
    async fn uninstall(&self, progress: ProgressReporter) -> Result<()>;

    /// 컨트롤러 실행 파일 자신을 제거
    fn self_uninstall(&self) -> Result<()>;

    fn state(&self) -> InstallationState {
        let installed = self.is_installed();
        InstallationState::new(
            self.installed_version().map(|v| v.version),
            installed,
            self.install_directory(),
        )
    }
}

/// GitHub 릴리스 기반 설치기
pub struct GitHubInstaller {
    client: Arc<GitHubClient>,
    install_dir: PathBuf,
    /// 에셋 이름에 포함되어야 하는 문자열 (기본: 현재 OS 이름)
    asset_pattern: String,
    check_timeout: Duration,
}

impl GitHubInstaller {
    pub fn new(client: Arc<GitHubClient>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            install_dir: install_dir.into(),
            asset_pattern: std::env::consts::OS.to_string(),
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_asset_pattern(mut self, pattern: &str) -> Self {
        if !pattern.trim().is_empty() {
            self.asset_pattern = pattern.trim().to_string();
        }
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    fn record_path(&self) -> PathBuf {
        self.install_dir.join(INSTALL_RECORD)
    }

    fn read_record(&self) -> Option<InstalledVersion> {
        let content = std::fs::read_to_string(self.record_path()).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("[Installer] Ignoring unreadable {}: {}", INSTALL_RECORD, e);
                None
            }
        }
    }

    /// 릴리스에서 설치할 zip 에셋 선택
    fn select_asset<'a>(&self, release: &'a RemoteRelease) -> Option<&'a ReleaseAsset> {
        let pattern = self.asset_pattern.to_lowercase();
        let zips = || {
            release
                .assets
                .iter()
                .filter(|a| a.name.to_lowercase().ends_with(".zip"))
        };
        zips()
            .find(|a| a.name.to_lowercase().contains(&pattern))
            .or_else(|| zips().next())
    }

    /// `<asset>.sha256` 에셋이 있으면 다운로드 파일과 비교
    async fn verify_checksum(&self, release: &RemoteRelease, asset: &ReleaseAsset, file: &Path) -> Result<()> {
        let checksum_name = format!("{}.sha256", asset.name);
        let checksum_asset = match release.assets.iter().find(|a| a.name == checksum_name) {
            Some(a) => a,
            None => return Ok(()),
        };

        let text = self.client.download_text(checksum_asset).await?;
        let expected = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();

        let bytes = tokio::fs::read(file).await?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if expected != actual {
            anyhow::bail!(
                "Checksum mismatch for {}: expected {}, got {}",
                asset.name, expected, actual
            );
        }
        tracing::info!("[Installer] Checksum verified for {}", asset.name);
        Ok(())
    }

    async fn try_install(&self, progress: &ProgressReporter) -> Result<InstalledVersion> {
        let release = self.client.fetch_latest_release().await?;
        let asset = self
            .select_asset(&release)
            .ok_or_else(|| anyhow::anyhow!("Release {} has no installable archive", release.tag_name))?
            .clone();
        progress.report(0.02);

        let staging = fsutil::sibling_path(&self.install_dir, "staging");
        fsutil::remove_dir_if_exists(&staging)?;
        let archive = fsutil::sibling_path(&self.install_dir, "download.zip");

        let result = self.download_and_swap(&release, &asset, &archive, &staging, progress).await;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("[Installer] Failed to remove {}: {}", archive.display(), e);
            }
        }
        if result.is_err() {
            fsutil::remove_dir_if_exists(&staging).ok();
        }
        result
    }

    async fn download_and_swap(
        &self,
        release: &RemoteRelease,
        asset: &ReleaseAsset,
        archive: &Path,
        staging: &Path,
        progress: &ProgressReporter,
    ) -> Result<InstalledVersion> {
        self.client
            .download_asset_to_file(asset, archive, progress, (0.02, 0.8))
            .await?;
        self.verify_checksum(release, asset, archive).await?;

        // zip 해제는 블로킹 작업이므로 별도 스레드에서, 진행률은 채널로만 전달
        let (archive_owned, staging_owned, reporter) =
            (archive.to_path_buf(), staging.to_path_buf(), progress.clone());
        tokio::task::spawn_blocking(move || {
            fsutil::extract_zip(&archive_owned, &staging_owned, |done, total| {
                reporter.report(0.8 + 0.15 * done as f64 / total.max(1) as f64);
            })
        })
        .await
        .context("Extraction task panicked")??;

        let record = InstalledVersion {
            version: release.version.clone(),
            tag_name: release.tag_name.clone(),
            installed_at: Utc::now(),
        };
        record.write_to(staging)?;

        // 기존 설치를 옆으로 치우고 새 디렉터리를 제자리에
        let previous = fsutil::sibling_path(&self.install_dir, "previous");
        fsutil::remove_dir_if_exists(&previous)?;
        let had_previous = self.install_dir.exists();
        if had_previous {
            std::fs::rename(&self.install_dir, &previous)
                .with_context(|| format!("Failed to move aside {}", self.install_dir.display()))?;
        } else if let Some(parent) = self.install_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if let Err(e) = std::fs::rename(staging, &self.install_dir) {
            if had_previous {
                std::fs::rename(&previous, &self.install_dir).ok();
            }
            return Err(e).with_context(|| format!("Failed to move {} into place", staging.display()));
        }
        if had_previous {
            fsutil::remove_dir_if_exists(&previous).ok();
        }

        progress.report(1.0);
        Ok(record)
    }
}

#[async_trait]
impl Installer for GitHubInstaller {
    fn is_installed(&self) -> bool {
        self.record_path().is_file()
    }

    fn installed_version(&self) -> Option<InstalledVersion> {
        if !self.is_installed() {
            return None;
        }
        self.read_record()
    }

    fn install_directory(&self) -> PathBuf {
        self.install_dir.clone()
    }

    async fn check_for_update(&self) -> UpdateCheck {
        let current = self.installed_version().map(|v| v.version);
        let api: Arc<dyn ReleaseApi> = self.client.clone();
        UpdateChecker::new("application", current, api)
            .with_timeout(self.check_timeout)
            .check()
            .await
    }

    async fn install(&self, progress: ProgressReporter) -> bool {
        tracing::info!(
            "[Installer] Installing latest release of {} into {}",
            self.client.repository(),
            self.install_dir.display()
        );
        match self.try_install(&progress).await {
            Ok(record) => {
                tracing::info!("[Installer] Installed {} ({})", record.version, record.tag_name);
                true
            }
            Err(e) => {
                tracing::error!("[Installer] Install failed: {:#}", e);
                false
            }
        }
    }

    async fn uninstall(&self, progress: ProgressReporter) -> Result<()> {
        if !self.install_dir.exists() {
            progress.report(1.0);
            return Ok(());
        }

        let entries: Vec<PathBuf> = std::fs::read_dir(&self.install_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        let total = entries.len().max(1);

        // 설치 기록부터 지워 중간에 실패해도 "설치됨"으로 보이지 않게 함
        let record = self.record_path();
        if record.exists() {
            std::fs::remove_file(&record)?;
        }

        for (idx, path) in entries.iter().enumerate() {
            if path == &record {
                continue;
            }
            let removed = if path.is_dir() {
                tokio::fs::remove_dir_all(path).await
            } else {
                tokio::fs::remove_file(path).await
            };
            removed.with_context(|| format!("Failed to remove {}", path.display()))?;
            progress.report((idx + 1) as f64 / total as f64);
        }

        std::fs::remove_dir(&self.install_dir).ok();
        progress.report(1.0);
        tracing::info!("[Installer] Uninstalled {}", self.install_dir.display());
        Ok(())
    }

    fn self_uninstall(&self) -> Result<()> {
        let exe = std::env::current_exe().context("Cannot locate controller executable")?;
        tracing::info!("[Installer] Removing controller executable {}", exe.display());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // 실행 중인 exe는 지울 수 없으므로 종료 후 삭제하는 분리 프로세스 스폰
            std::process::Command::new("cmd")
                .args(["/C", "ping", "127.0.0.1", "-n", "3", ">", "nul", "&", "del", "/F", "/Q"])
                .arg(&exe)
                // DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW
                .creation_flags(0x00000008 | 0x00000200 | 0x08000000)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()
                .context("Failed to schedule controller removal")?;
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::fs::remove_file(&exe)
                .with_context(|| format!("Failed to remove {}", exe.display()))?;
        }

        Ok(())
    }
}
