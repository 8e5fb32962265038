//! 컨트롤러 설정 파일 관리
//!
//! `perch.toml`을 실행 파일 옆 → 현재 디렉터리 순으로 찾고,
//! `--config <path>`가 주어지면 그 파일만 사용합니다. 파일이 없으면 기본값.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "perch.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("'{0}' must be set in perch.toml")]
    Missing(&'static str),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// 사용자에게 보여줄 앱 이름
    pub app_name: String,
    /// 대상 앱 릴리스 저장소
    pub github_owner: String,
    pub github_repo: String,
    /// 컨트롤러 자신의 릴리스 저장소 (비어 있으면 자체 업데이트 확인 안 함)
    pub installer_owner: String,
    pub installer_repo: String,
    pub installer_version: String,
    /// 상대 경로는 실행 파일 디렉터리 기준
    pub install_dir: PathBuf,
    /// 구 바이너리 폴더
    pub legacy_dir: Option<PathBuf>,
    pub executable: String,
    /// 테스트용 API 주소 (기본: https://api.github.com)
    pub api_base_url: Option<String>,
    pub check_timeout_secs: u64,
    /// 설치할 zip 에셋 이름에 포함될 문자열 (기본: 현재 OS 이름)
    pub asset_pattern: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            app_name: "Application".to_string(),
            github_owner: String::new(),
            github_repo: String::new(),
            installer_owner: String::new(),
            installer_repo: String::new(),
            installer_version: env!("CARGO_PKG_VERSION").to_string(),
            install_dir: PathBuf::from("app"),
            legacy_dir: Some(PathBuf::from("bin")),
            executable: "app".to_string(),
            api_base_url: None,
            check_timeout_secs: 15,
            asset_pattern: None,
        }
    }
}

impl ControllerConfig {
    /// 경로가 주어지면 그 파일, 아니면 기본 위치에서 로드
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match config_file_path() {
                Some(p) => p,
                None => {
                    tracing::info!("[Config] No {} found, using defaults", CONFIG_FILE_NAME);
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let cfg = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        tracing::info!("[Config] Loaded {}", path.display());
        Ok(cfg)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 대상 앱 저장소가 설정됐는지 확인
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github_owner.trim().is_empty() {
            return Err(ConfigError::Missing("github_owner"));
        }
        if self.github_repo.trim().is_empty() {
            return Err(ConfigError::Missing("github_repo"));
        }
        Ok(())
    }

    pub fn self_update_enabled(&self) -> bool {
        !self.installer_owner.trim().is_empty() && !self.installer_repo.trim().is_empty()
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs.max(1))
    }

    pub fn install_dir_in(&self, base: &Path) -> PathBuf {
        resolve(base, &self.install_dir)
    }

    pub fn legacy_dir_in(&self, base: &Path) -> Option<PathBuf> {
        self.legacy_dir.as_deref().map(|p| resolve(base, p))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// 실행 파일이 있는 디렉터리 (알 수 없으면 현재 디렉터리)
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 설정 파일 경로 결정
pub fn config_file_path() -> Option<PathBuf> {
    // 1. 실행 파일 옆
    let beside_exe = executable_dir().join(CONFIG_FILE_NAME);
    if beside_exe.is_file() {
        return Some(beside_exe);
    }

    // 2. CWD
    let cwd_cfg = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_cfg.is_file() {
        return Some(cwd_cfg);
    }

    None
}
