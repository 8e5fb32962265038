//! 설치 오케스트레이터: 가드를 잡고 설치/업데이트/제거를 실행하며 진행률을 중계
//!
//! ## 진행률 흐름
//! 설치기 → `ProgressReporter`(mpsc) → 오케스트레이터 → `ControllerEvent`(broadcast) → 셸
//!
//! 진행률 채널은 오케스트레이터의 태스크에서만 비워지므로, 설치기가 다른 스레드에서
//! 보고하더라도 공유 상태를 쓰는 쪽은 항상 하나입니다.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::error::{format_reset_time, AlreadyRunning, OrchestratorError};
use crate::events::{to_percent, ControllerEvent, Notice, ProgressReporter};
use crate::github::{RateLimitStatus, ReleaseApi};
use crate::guard::{OperationGuard, OperationKind};
use crate::installer::Installer;

const EVENT_CAPACITY: usize = 256;

/// rate limit 안내 메시지 (action: "install" 또는 "update")
pub fn rate_limit_message(kind: OperationKind, status: &RateLimitStatus) -> String {
    format!(
        "Failed to {action} because you are currently rate limited on the GitHub API.\n\
         You will be able to {action} after {reset}.",
        action = kind,
        reset = format_reset_time(&status.reset_at)
    )
}

#[derive(Clone)]
pub struct InstallOrchestrator {
    installer: Arc<dyn Installer>,
    api: Arc<dyn ReleaseApi>,
    guard: OperationGuard,
    events: broadcast::Sender<ControllerEvent>,
}

impl InstallOrchestrator {
    pub fn new(installer: Arc<dyn Installer>, api: Arc<dyn ReleaseApi>, guard: OperationGuard) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { installer, api, guard, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn guard(&self) -> &OperationGuard {
        &self.guard
    }

    fn emit(&self, event: ControllerEvent) {
        // 구독자가 없어도 무시
        let _ = self.events.send(event);
    }

    /// 작업 future를 실행하면서 진행률 채널을 비워 이벤트로 중계
    async fn track<T>(
        &self,
        kind: OperationKind,
        mut progress: mpsc::UnboundedReceiver<f64>,
        work: impl Future<Output = T>,
    ) -> T {
        tokio::pin!(work);
        let mut last: Option<u8> = None;
        let relay = |fraction: f64, last: &mut Option<u8>| {
            let percent = to_percent(fraction);
            if *last != Some(percent) {
                *last = Some(percent);
                self.emit(ControllerEvent::Progress { kind, percent });
            }
        };

        let output = loop {
            tokio::select! {
                biased;
                Some(fraction) = progress.recv() => relay(fraction, &mut last),
                out = &mut work => break out,
            }
        };

        // 작업이 끝난 뒤 남은 보고 처리
        while let Ok(fraction) = progress.try_recv() {
            relay(fraction, &mut last);
        }
        output
    }

    /// 설치 또는 업데이트
    ///
    /// - `Ok(true)`: 성공
    /// - `Ok(false)`: 실패, rate limit 안내 표시됨
    /// - `Err(Fetch)`: 실패했고 rate limit 조회도 실패 (일반 실패 안내 표시됨)
    ///
    /// 어떤 결과든 호출자는 이후 프로세스를 종료해야 합니다.
    pub async fn install(&self, is_update: bool) -> Result<bool, OrchestratorError> {
        let kind = if is_update { OperationKind::Update } else { OperationKind::Install };
        let _lock = self.guard.acquire(kind)?;

        let status = if is_update { "Updating..." } else { "Installing..." };
        tracing::info!("[Orchestrator] {}", status);
        self.emit(ControllerEvent::OperationStarted { kind, status: status.to_string() });

        let (reporter, progress) = ProgressReporter::channel();
        let success = self.track(kind, progress, self.installer.install(reporter)).await;
        self.emit(ControllerEvent::OperationFinished { kind, success });

        if success {
            tracing::info!("[Orchestrator] {} finished", kind);
            return Ok(true);
        }

        tracing::warn!("[Orchestrator] {} failed, querying rate limit", kind);
        match self.api.fetch_rate_limit().await {
            Ok(rate) => {
                tracing::info!(
                    "[Orchestrator] Rate limit: {} remaining, resets at {}",
                    rate.remaining, rate.reset_at
                );
                self.emit(ControllerEvent::Notice(Notice::warning(
                    "Rate limited",
                    rate_limit_message(kind, &rate),
                )));
                Ok(false)
            }
            Err(e) => {
                tracing::error!("[Orchestrator] Rate limit lookup failed: {}", e);
                self.emit(ControllerEvent::Notice(Notice::error(
                    "Error",
                    format!("Failed to {}. {}", kind, e.user_message()),
                )));
                Err(e.into())
            }
        }
    }

    /// 설치 제거. rate limit 경로 없음, 실패는 에러 안내로 표시
    ///
    /// 끝나면 호출자는 종료하지 말고 상태를 다시 평가해야 합니다.
    pub async fn uninstall(&self) -> Result<(), AlreadyRunning> {
        let kind = OperationKind::Uninstall;
        let _lock = self.guard.acquire(kind)?;

        tracing::info!("[Orchestrator] Uninstalling...");
        self.emit(ControllerEvent::OperationStarted { kind, status: "Uninstalling...".to_string() });

        let (reporter, progress) = ProgressReporter::channel();
        let result = self.track(kind, progress, self.installer.uninstall(reporter)).await;

        if let Err(ref e) = result {
            tracing::error!("[Orchestrator] Uninstall failed: {:#}", e);
            self.emit(ControllerEvent::Notice(Notice::error(
                "Uninstall failed",
                format!("Failed to uninstall: {}", e),
            )));
        }
        self.emit(ControllerEvent::OperationFinished { kind, success: result.is_ok() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::UpdateCheck;
    use crate::error::FetchError;
    use crate::github::RemoteRelease;
    use crate::installer::InstalledVersion;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use std::time::Duration;

    struct ScriptedInstaller {
        succeed: bool,
        steps: Vec<f64>,
    }

    #[async_trait]
    impl Installer for ScriptedInstaller {
        fn is_installed(&self) -> bool {
            false
        }
        fn installed_version(&self) -> Option<InstalledVersion> {
            None
        }
        fn install_directory(&self) -> PathBuf {
            PathBuf::from("/tmp/app")
        }
        async fn check_for_update(&self) -> UpdateCheck {
            UpdateCheck::NotInstalled
        }
        async fn install(&self, progress: ProgressReporter) -> bool {
            // 다른 스레드에서 보고해도 순서대로 전달되는지 확인
            let steps = self.steps.clone();
            tokio::task::spawn_blocking(move || {
                for s in steps {
                    progress.report(s);
                }
            })
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.succeed
        }
        async fn uninstall(&self, progress: ProgressReporter) -> anyhow::Result<()> {
            progress.report(0.5);
            progress.report(1.0);
            Ok(())
        }
        fn self_uninstall(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FixedRateLimit(Result<RateLimitStatus, FetchError>);

    #[async_trait]
    impl ReleaseApi for FixedRateLimit {
        async fn fetch_latest_release(&self) -> Result<RemoteRelease, FetchError> {
            Err(FetchError::Network { message: "unused".into() })
        }
        async fn fetch_rate_limit(&self) -> Result<RateLimitStatus, FetchError> {
            self.0.clone()
        }
    }

    fn reset_at() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_900_000_000, 0).unwrap()
    }

    fn orchestrator(succeed: bool, rate: Result<RateLimitStatus, FetchError>) -> InstallOrchestrator {
        InstallOrchestrator::new(
            Arc::new(ScriptedInstaller { succeed, steps: vec![0.1, 0.1, 0.5, 1.0] }),
            Arc::new(FixedRateLimit(rate)),
            OperationGuard::new(),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<ControllerEvent>) -> Vec<ControllerEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn successful_install_relays_deduplicated_progress() {
        let orch = orchestrator(true, Err(FetchError::Network { message: "x".into() }));
        let mut rx = orch.subscribe();

        assert!(orch.install(false).await.unwrap());

        let percents: Vec<u8> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![10, 50, 100]);
        assert!(orch.guard().triggers_enabled());
    }

    #[tokio::test]
    async fn failed_update_shows_rate_limit_with_update_wording() {
        let rate = RateLimitStatus { remaining: 0, reset_at: reset_at() };
        let orch = orchestrator(false, Ok(rate));
        let mut rx = orch.subscribe();

        assert!(!orch.install(true).await.unwrap());

        let notice = drain(&mut rx)
            .into_iter()
            .find_map(|e| match e {
                ControllerEvent::Notice(n) => Some(n),
                _ => None,
            })
            .unwrap();
        assert_eq!(notice.message, rate_limit_message(OperationKind::Update, &rate));
        assert!(notice.message.contains("Failed to update"));
        assert!(notice.message.contains(&format_reset_time(&reset_at())));
        assert!(!notice.message.contains("install"));
    }

    #[tokio::test]
    async fn failed_install_uses_install_wording() {
        let rate = RateLimitStatus { remaining: 0, reset_at: reset_at() };
        let orch = orchestrator(false, Ok(rate));
        let mut rx = orch.subscribe();

        assert!(!orch.install(false).await.unwrap());
        let messages: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ControllerEvent::Notice(n) => Some(n.message),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Failed to install because"));
        assert!(messages[0].contains("You will be able to install after"));
    }

    #[tokio::test]
    async fn rate_limit_lookup_failure_is_returned_not_panicked() {
        let orch = orchestrator(false, Err(FetchError::Network { message: "offline".into() }));
        let err = orch.install(false).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Fetch(FetchError::Network { .. })));
        assert!(orch.guard().triggers_enabled());
    }

    #[tokio::test]
    async fn busy_guard_rejects_install() {
        let orch = orchestrator(true, Err(FetchError::Network { message: "x".into() }));
        let _held = orch.guard().acquire(OperationKind::Uninstall).unwrap();

        let err = orch.install(false).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::AlreadyRunning(AlreadyRunning { running: OperationKind::Uninstall })
        ));
        assert!(orch.uninstall().await.is_err());
    }

    #[tokio::test]
    async fn uninstall_reports_progress_and_releases_guard() {
        let orch = orchestrator(true, Err(FetchError::Network { message: "x".into() }));
        let mut rx = orch.subscribe();

        orch.uninstall().await.unwrap();

        let events = drain(&mut rx);
        assert!(matches!(
            events.first(),
            Some(ControllerEvent::OperationStarted { kind: OperationKind::Uninstall, .. })
        ));
        assert!(events.contains(&ControllerEvent::Progress { kind: OperationKind::Uninstall, percent: 100 }));
        assert!(matches!(
            events.last(),
            Some(ControllerEvent::OperationFinished { success: true, .. })
        ));
        assert!(orch.guard().triggers_enabled());
    }
}
