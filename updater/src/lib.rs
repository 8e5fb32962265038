//! # perch 업데이터 라이브러리
//!
//! 대상 애플리케이션을 GitHub 릴리스에서 설치/업데이트/제거하고,
//! 설치 상태에 따라 앱을 자동 실행하거나 컨트롤러를 보여줍니다.
//!
//! ## 구성
//! - **버전(version.rs)**: 태그 파싱과 SemVer 우선순위 비교
//! - **GitHub(github.rs)**: 최신 릴리스 조회, rate limit 조회, 에셋 다운로드
//! - **확인기(checker.rs)**: 설치 버전과 원격 릴리스 비교 (타임아웃 포함)
//! - **마이그레이션(migration.rs)**: 시작 시 한 번, 구 바이너리 폴더 레이아웃 이전
//! - **가드(guard.rs)**: 설치/제거/업데이트 상호 배제, 트리거 활성 상태
//! - **오케스트레이터(orchestrator.rs)**: 작업 실행, 진행률 중계, rate limit 안내
//! - **실행 결정(launch.rs)**: 자동 실행 / 업데이트 대기 / 상태 표시
//! - **컨트롤러(controller.rs)**: 위 구성 요소를 묶는 시작 흐름과 명령 처리
//!
//! ## 동시성
//! current-thread 런타임 하나에서 동작합니다. 설치기가 보낸 진행률은
//! 오케스트레이터만 읽고, 셸은 브로드캐스트된 이벤트를 표시만 합니다.

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod checker;
pub mod controller;
pub mod error;
pub mod events;
pub mod fsutil;
pub mod github;
pub mod guard;
pub mod installer;
pub mod launch;
pub mod launcher;
pub mod migration;
pub mod orchestrator;
pub mod session;
pub mod version;


// Re-exports for convenience
pub use checker::{UpdateCheck, UpdateChecker, DEFAULT_CHECK_TIMEOUT};
pub use controller::{Collaborators, Command, Controller, ControllerView, Outcome, Shell};
pub use error::{format_reset_time, AlreadyRunning, FetchError, MigrationError, OrchestratorError};
pub use events::{ControllerEvent, Notice, NoticeLevel, ProgressReporter};
pub use github::{GitHubClient, RateLimitStatus, ReleaseApi, ReleaseAsset, RemoteRelease};
pub use guard::{OperationGuard, OperationKind, OperationLock};
pub use installer::{GitHubInstaller, InstallationState, InstalledVersion, Installer};
pub use launch::{LaunchAction, LaunchIntent, LaunchState, MINIMIZED_FLAG, UNINSTALL_FLAG};
pub use launcher::{Launcher, ProcessLauncher};
pub use migration::{BinaryFolderMigrator, GateOutcome, MigrationGate, MigrationNeed, Migrator};
pub use orchestrator::InstallOrchestrator;
pub use session::{ControllerSession, NO_AUTOSTART_FLAG};
pub use version::VersionTag;
