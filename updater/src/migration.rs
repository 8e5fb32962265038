//! 바이너리 폴더 마이그레이션 게이트
//!
//! 시작 시 한 번만 평가합니다. 마이그레이션이 필요하면 다른 모든 작업보다 먼저
//! 사용자에게 묻고, 거절하면 아무것도 건드리지 않고 즉시 종료합니다.
//! 마이그레이션은 전부 아니면 전무: 새 레이아웃이 완성되기 전에는 기존 폴더를 지우지 않습니다.

use std::path::{Path, PathBuf};

use crate::error::MigrationError;
use crate::fsutil;
use crate::installer::{InstalledVersion, INSTALL_RECORD};

/// 시작 시 계산되는 마이그레이션 필요 여부
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationNeed {
    pub required: bool,
    pub prompt_text: String,
}

/// 레이아웃 마이그레이터
pub trait Migrator: Send {
    fn needs_migration(&self) -> bool;
    fn migration_prompt(&self) -> String;
    fn migrate(&self) -> Result<(), MigrationError>;
}

/// 예전 평면 바이너리 폴더(`legacy_dir`)를 새 설치 디렉터리(`install_dir`)로 옮김
pub struct BinaryFolderMigrator {
    app_name: String,
    legacy_dir: PathBuf,
    install_dir: PathBuf,
}

impl BinaryFolderMigrator {
    pub fn new(app_name: &str, legacy_dir: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_name: app_name.to_string(),
            legacy_dir: legacy_dir.into(),
            install_dir: install_dir.into(),
        }
    }

    /// 같은 파일시스템이 아니어서 rename이 안 되면 스테이징에 복사한 뒤 rename
    fn copy_then_swap(&self) -> Result<(), MigrationError> {
        let staging = fsutil::sibling_path(&self.install_dir, "migrating");
        fsutil::remove_dir_if_exists(&staging)
            .map_err(|e| MigrationError::io("clean staging", &staging, e))?;

        let swapped = fsutil::copy_dir_all(&self.legacy_dir, &staging)
            .map_err(|e| MigrationError::io("copy legacy folder", &staging, e))
            .and_then(|_| write_legacy_record(&staging))
            .and_then(|_| {
                std::fs::rename(&staging, &self.install_dir)
                    .map_err(|e| MigrationError::io("move staging into place", &self.install_dir, e))
            });

        if let Err(e) = swapped {
            // 실패 시 스테이징만 정리하고 기존 폴더는 그대로 둠
            if let Err(clean) = fsutil::remove_dir_if_exists(&staging) {
                tracing::warn!("[Migration] Failed to clean {}: {}", staging.display(), clean);
            }
            return Err(e);
        }

        if let Err(e) = std::fs::remove_dir_all(&self.legacy_dir) {
            tracing::warn!(
                "[Migration] New layout complete but legacy folder {} could not be removed: {}",
                self.legacy_dir.display(), e
            );
        }
        Ok(())
    }

    /// rename 후 설치 기록을 남김. 기록에 실패하면 원래 자리로 되돌림
    fn rename_in_place(&self) -> Result<(), MigrationError> {
        if let Err(e) = std::fs::rename(&self.legacy_dir, &self.install_dir) {
            tracing::info!("[Migration] rename failed ({}), falling back to copy", e);
            return self.copy_then_swap();
        }

        if let Err(e) = write_legacy_record(&self.install_dir) {
            if let Err(back) = std::fs::rename(&self.install_dir, &self.legacy_dir) {
                tracing::error!(
                    "[Migration] Could not restore {}: {}",
                    self.legacy_dir.display(), back
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

/// 예전 레이아웃에는 설치 기록이 없으므로 버전 미상 기록을 추가 (이미 있으면 유지)
fn write_legacy_record(dir: &Path) -> Result<(), MigrationError> {
    if dir.join(INSTALL_RECORD).is_file() {
        return Ok(());
    }
    InstalledVersion::legacy()
        .write_to(dir)
        .map_err(|e| MigrationError::io("write install record", dir.join(INSTALL_RECORD), e))
}

/// 아직 없는 가장 바깥 조상 디렉터리 (실패 시 이것만 지우면 원상태)
fn first_missing_ancestor(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .take_while(|a| !a.as_os_str().is_empty() && !a.exists())
        .last()
        .map(Path::to_path_buf)
}

impl Migrator for BinaryFolderMigrator {
    fn needs_migration(&self) -> bool {
        self.legacy_dir.is_dir() && !self.install_dir.exists()
    }

    fn migration_prompt(&self) -> String {
        format!(
            "{} was installed with an older folder layout in '{}'.\n\
             It needs to be moved to '{}' before continuing.\n\
             Do you want to migrate now? Choosing 'No' will exit without changing anything.",
            self.app_name,
            self.legacy_dir.display(),
            self.install_dir.display()
        )
    }

    fn migrate(&self) -> Result<(), MigrationError> {
        if !self.legacy_dir.is_dir() {
            return Err(MigrationError::LegacyMissing(self.legacy_dir.clone()));
        }
        if self.install_dir.exists() {
            return Err(MigrationError::TargetExists(self.install_dir.clone()));
        }
        // 부모가 없을 때만 만들고, 실패하면 만든 것만 되돌림
        let parent = self.install_dir.parent();
        let created = parent.and_then(first_missing_ancestor);
        let prepared = match (parent, created.as_ref()) {
            (Some(parent), Some(_)) => std::fs::create_dir_all(parent)
                .map_err(|e| MigrationError::io("create parent", parent, e)),
            _ => Ok(()),
        };

        tracing::info!(
            "[Migration] Moving {} → {}",
            self.legacy_dir.display(),
            self.install_dir.display()
        );

        let moved = prepared.and_then(|_| self.rename_in_place());
        if let (Err(_), Some(parent), Some(root)) = (&moved, parent, created.as_ref()) {
            // 비어 있는 디렉터리만 지움 (되돌리기에 실패한 파일은 남김)
            for dir in parent.ancestors() {
                if std::fs::remove_dir(dir).is_err() || dir == root.as_path() {
                    break;
                }
            }
        }
        moved
    }
}

/// 마이그레이션 게이트 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// 마이그레이션 불필요
    NotNeeded,
    /// 마이그레이션 완료
    Migrated,
    /// 사용자가 거절: 즉시 종료해야 함
    Declined,
}

impl GateOutcome {
    pub fn should_exit(&self) -> bool {
        matches!(self, GateOutcome::Declined)
    }
}

/// 시작 시 한 번만 소비되는 게이트
pub struct MigrationGate {
    migrator: Box<dyn Migrator>,
    need: MigrationNeed,
}

impl MigrationGate {
    /// 디스크 레이아웃을 한 번 읽어 필요 여부를 고정
    pub fn new(migrator: Box<dyn Migrator>) -> Self {
        let required = migrator.needs_migration();
        let prompt_text = if required { migrator.migration_prompt() } else { String::new() };
        Self {
            migrator,
            need: MigrationNeed { required, prompt_text },
        }
    }

    pub fn need(&self) -> &MigrationNeed {
        &self.need
    }

    /// 필요하면 `confirm(prompt)`로 묻고 수락 시 마이그레이션 실행
    pub fn resolve(self, confirm: impl FnOnce(&str) -> bool) -> Result<GateOutcome, MigrationError> {
        if !self.need.required {
            return Ok(GateOutcome::NotNeeded);
        }

        if !confirm(&self.need.prompt_text) {
            tracing::info!("[Migration] Declined by user, exiting without changes");
            return Ok(GateOutcome::Declined);
        }

        self.migrator.migrate().map_err(|e| {
            tracing::error!("[Migration] Failed: {}", e);
            e
        })?;
        tracing::info!("[Migration] Completed");
        Ok(GateOutcome::Migrated)
    }
}
