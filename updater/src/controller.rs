//! 컨트롤러: 시작 흐름, 상태 평가, 명령 처리
//!
//! ## 시작 순서
//! 1. `--uninstall` 플래그: 제거 → 컨트롤러 자체 제거 → 종료
//! 2. 마이그레이션 게이트 (거절 시 즉시 종료)
//! 3. 컨트롤러 자체 업데이트 확인 (프로세스당 한 번만 안내)
//! 4. 대상 앱 상태 평가 → 자동 실행 / 업데이트 대기 / 상태 표시
//!
//! 창이나 메뉴는 [`Shell`] 구현체가 담당하며, 컨트롤러는 [`Command`]만 받습니다.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::checker::{UpdateCheck, UpdateChecker};
use crate::error::{format_reset_time, OrchestratorError};
use crate::events::{ControllerEvent, Notice};
use crate::github::ReleaseApi;
use crate::guard::OperationGuard;
use crate::installer::{InstallationState, Installer};
use crate::launch::{decide, LaunchAction, LaunchState};
use crate::launcher::Launcher;
use crate::migration::{GateOutcome, MigrationGate, Migrator};
use crate::orchestrator::InstallOrchestrator;
use crate::session::ControllerSession;
use crate::version::VersionTag;

/// UI 트리거
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Install,
    Update,
    Uninstall,
    Start,
    ShowInstallFolder,
    Quit,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Install,
        Command::Update,
        Command::Uninstall,
        Command::Start,
        Command::ShowInstallFolder,
        Command::Quit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Command::Install => "Install",
            Command::Update => "Update",
            Command::Uninstall => "Uninstall",
            Command::Start => "Start",
            Command::ShowInstallFolder => "Show install folder",
            Command::Quit => "Quit",
        }
    }

    /// 입력 문자열을 명령으로 해석 (대소문자 무시, 레이블 또는 짧은 이름)
    pub fn parse(input: &str) -> Option<Command> {
        let input = input.trim().to_lowercase();
        let alias = match input.as_str() {
            "folder" | "show-folder" | "open" => Some(Command::ShowInstallFolder),
            "q" | "exit" => Some(Command::Quit),
            _ => None,
        };
        alias.or_else(|| {
            Command::ALL
                .into_iter()
                .find(|c| c.label().to_lowercase() == input)
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 셸에 그려질 상태 스냅샷
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerView {
    pub app_name: String,
    pub installed: bool,
    pub installed_version: Option<VersionTag>,
    pub update_available: bool,
    pub status_lines: Vec<String>,
    /// 현재 상태에서 유효한 명령만
    pub actions: Vec<Command>,
}

impl ControllerView {
    fn build(app_name: &str, state: &InstallationState, check: &UpdateCheck) -> Self {
        let installed = state.is_installed();
        let update_available = installed && check.is_available();

        let mut status_lines = Vec::new();
        let mut actions = Vec::new();
        if installed {
            match state.installed_version() {
                Some(v) => status_lines.push(format!("{} {} is installed.", app_name, v)),
                None => status_lines.push(format!("{} is installed.", app_name)),
            }
            if update_available {
                status_lines.push("An update is available.".to_string());
            }
            if let UpdateCheck::RateLimited { reset_at } = check {
                status_lines.push(format!(
                    "Update check is rate limited until {}.",
                    format_reset_time(reset_at)
                ));
            }
            actions.push(Command::Uninstall);
            if update_available {
                actions.push(Command::Update);
            }
            actions.push(Command::Start);
        } else {
            status_lines.push(format!("{} is not installed.", app_name));
            actions.push(Command::Install);
        }
        actions.push(Command::ShowInstallFolder);
        actions.push(Command::Quit);

        Self {
            app_name: app_name.to_string(),
            installed,
            installed_version: state.installed_version().cloned(),
            update_available,
            status_lines,
            actions,
        }
    }
}

/// 처리 후 프로세스가 할 일
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 프로세스 종료 (종료 코드 0)
    Exit,
    /// 계속 명령 대기
    Continue,
}

/// UI 셸 계약. 상태를 직접 바꾸지 않고 이벤트를 표시만 함
pub trait Shell {
    /// 예/아니오 질문
    fn confirm(&mut self, title: &str, message: &str) -> bool;

    fn notify(&mut self, notice: &Notice);

    /// 작업 시작/진행률/종료 이벤트
    fn on_event(&mut self, event: &ControllerEvent);

    fn set_triggers_enabled(&mut self, enabled: bool);

    fn render(&mut self, view: &ControllerView);

    /// 컨트롤러를 화면에 띄움
    fn show(&mut self);

    fn is_minimized(&self) -> bool;

    /// 폴더나 URL을 시스템 기본 프로그램으로 열기
    fn open(&mut self, target: &str) -> anyhow::Result<()>;

    /// 다음 명령 대기. None이면 입력 종료
    fn next_command(&mut self) -> Option<Command>;
}

/// 컨트롤러가 사용하는 협력자 묶음
pub struct Collaborators {
    pub installer: Arc<dyn Installer>,
    /// rate limit 조회용 (대상 앱 피드)
    pub releases: Arc<dyn ReleaseApi>,
    pub launcher: Arc<dyn Launcher>,
    /// 컨트롤러 자신의 업데이트 채널
    pub self_update: UpdateChecker,
    pub migrator: Option<Box<dyn Migrator>>,
}

pub struct Controller<S: Shell> {
    app_name: String,
    shell: S,
    session: ControllerSession,
    installer: Arc<dyn Installer>,
    launcher: Arc<dyn Launcher>,
    self_update: UpdateChecker,
    orchestrator: InstallOrchestrator,
    migration: Option<MigrationGate>,
    view: Option<ControllerView>,
}

impl<S: Shell> Controller<S> {
    /// 마이그레이션 필요 여부는 여기서 한 번만 계산됨
    pub fn new(app_name: &str, shell: S, session: ControllerSession, parts: Collaborators) -> Self {
        let orchestrator = InstallOrchestrator::new(
            parts.installer.clone(),
            parts.releases,
            OperationGuard::new(),
        );
        Self {
            app_name: app_name.to_string(),
            shell,
            session,
            installer: parts.installer,
            launcher: parts.launcher,
            self_update: parts.self_update,
            orchestrator,
            migration: parts.migrator.map(MigrationGate::new),
            view: None,
        }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn session(&self) -> &ControllerSession {
        &self.session
    }

    pub fn orchestrator(&self) -> &InstallOrchestrator {
        &self.orchestrator
    }

    /// 마지막으로 그린 상태
    pub fn view(&self) -> Option<&ControllerView> {
        self.view.as_ref()
    }

    /// 시작 흐름 실행
    pub async fn start(&mut self) -> Outcome {
        if self.session.uninstall_requested() {
            tracing::info!("[Controller] --uninstall requested");
            return self.uninstall_and_remove_self().await;
        }

        if let Some(gate) = self.migration.take() {
            let shell = &mut self.shell;
            match gate.resolve(|prompt| shell.confirm("Migration", prompt)) {
                Ok(outcome) if outcome.should_exit() => return Outcome::Exit,
                Ok(GateOutcome::Migrated) => {
                    self.shell.notify(&Notice::info(
                        "Migration",
                        format!("{} has been moved to the new folder layout.", self.app_name),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    self.shell
                        .notify(&Notice::error("Migration failed", e.to_string()));
                    return Outcome::Exit;
                }
            }
        }

        self.update_controls(true).await
    }

    /// 시작 후 입력이 끝날 때까지 명령 처리
    pub async fn run(&mut self) {
        if self.start().await == Outcome::Exit {
            return;
        }
        while let Some(command) = self.shell.next_command() {
            if self.dispatch(command).await == Outcome::Exit {
                return;
            }
        }
        tracing::debug!("[Controller] Input closed, exiting");
    }

    /// 상태를 다시 평가하고 실행 결정을 적용
    pub async fn update_controls(&mut self, autostart: bool) -> Outcome {
        let mut autostart = autostart;

        if !self.session.self_update_prompt_shown() {
            if let UpdateCheck::Available(release) = self.self_update.check().await {
                self.session.mark_self_update_prompt_shown();
                autostart = false;
                let accepted = self.shell.confirm(
                    "Installer Update",
                    "An update is available for the installer.\n\
                     Do you wish to be directed to the latest release?",
                );
                if accepted {
                    if let Err(e) = self.shell.open(&release.download_url) {
                        tracing::warn!("[Controller] Failed to open {}: {:#}", release.download_url, e);
                    }
                    return Outcome::Exit;
                }
            }
        }

        let state = self.installer.state();
        let check = if state.is_installed() {
            self.installer.check_for_update().await
        } else {
            UpdateCheck::NotInstalled
        };
        let view = ControllerView::build(&self.app_name, &state, &check);

        let intent = self.session.launch_intent(autostart, self.shell.is_minimized());
        let action = decide(LaunchState {
            installed: view.installed,
            update: view.update_available,
            autostart: intent.autostart,
        });
        tracing::debug!("[Controller] State {:?} → {:?}", state, action);
        self.view = Some(view);

        if action == LaunchAction::Launch {
            match self.launch(&intent.forwarded_args()) {
                Outcome::Exit => return Outcome::Exit,
                Outcome::Continue => {}
            }
        }

        self.render();
        self.shell.show();
        Outcome::Continue
    }

    /// 명령 하나 처리
    pub async fn dispatch(&mut self, command: Command) -> Outcome {
        let allowed = self
            .view
            .as_ref()
            .map_or(false, |v| v.actions.contains(&command));
        if !allowed {
            tracing::warn!("[Controller] '{}' is not available in the current state", command);
            return Outcome::Continue;
        }

        match command {
            Command::Install => self.install(false).await,
            Command::Update => self.install(true).await,
            Command::Uninstall => {
                self.uninstall().await;
                self.update_controls(false).await
            }
            Command::Start => {
                let args = self
                    .session
                    .launch_intent(false, self.shell.is_minimized())
                    .forwarded_args();
                let outcome = self.launch(&args);
                if outcome == Outcome::Continue {
                    self.render();
                }
                outcome
            }
            Command::ShowInstallFolder => {
                let dir = self.installer.install_directory();
                if let Err(e) = self.shell.open(&dir.to_string_lossy()) {
                    tracing::warn!("[Controller] Failed to open {}: {:#}", dir.display(), e);
                    self.shell.notify(&Notice::error(
                        "Error",
                        format!("Failed to open {}: {}", dir.display(), e),
                    ));
                }
                Outcome::Continue
            }
            Command::Quit => Outcome::Exit,
        }
    }

    /// 설치/업데이트. 작업이 실행됐으면 결과와 상관없이 종료
    async fn install(&mut self, is_update: bool) -> Outcome {
        let orchestrator = self.orchestrator.clone();
        match self.drive(orchestrator.install(is_update)).await {
            Ok(true) => tracing::info!("[Controller] Operation succeeded, exiting"),
            Ok(false) => tracing::info!("[Controller] Operation failed, exiting"),
            Err(OrchestratorError::AlreadyRunning(e)) => {
                self.shell.notify(&Notice::warning("Busy", e.to_string()));
                return Outcome::Continue;
            }
            Err(OrchestratorError::Fetch(e)) => {
                tracing::error!("[Controller] Operation failed and rate limit is unknown: {}", e);
            }
        }
        Outcome::Exit
    }

    async fn uninstall(&mut self) {
        let orchestrator = self.orchestrator.clone();
        if let Err(e) = self.drive(orchestrator.uninstall()).await {
            self.shell.notify(&Notice::warning("Busy", e.to_string()));
        }
    }

    async fn uninstall_and_remove_self(&mut self) -> Outcome {
        self.uninstall().await;
        if let Err(e) = self.installer.self_uninstall() {
            tracing::error!("[Controller] Self uninstall failed: {:#}", e);
            self.shell.notify(&Notice::error(
                "Error",
                format!("Failed to remove the installer: {}", e),
            ));
        }
        Outcome::Exit
    }

    fn launch(&mut self, args: &[String]) -> Outcome {
        match self.launcher.start(args) {
            Ok(()) => Outcome::Exit,
            Err(e) => {
                tracing::error!("[Controller] Launch failed: {:#}", e);
                self.shell.notify(&Notice::error(
                    "Error",
                    format!("Failed to start {}: {}", self.app_name, e),
                ));
                Outcome::Continue
            }
        }
    }

    fn render(&mut self) {
        if let Some(ref view) = self.view {
            self.shell.render(view);
        }
    }

    /// 작업 future를 돌리면서 오케스트레이터 이벤트와 트리거 상태를 셸로 전달
    async fn drive<T>(&mut self, work: impl Future<Output = T>) -> T {
        let mut events = self.orchestrator.subscribe();
        let mut triggers = self.orchestrator.guard().subscribe();
        tokio::pin!(work);

        let output = loop {
            tokio::select! {
                biased;
                Ok(event) = events.recv() => self.forward(event),
                Ok(()) = triggers.changed() => {
                    let enabled = *triggers.borrow_and_update();
                    self.shell.set_triggers_enabled(enabled);
                }
                out = &mut work => break out,
            }
        };

        while let Ok(event) = events.try_recv() {
            self.forward(event);
        }
        self.shell
            .set_triggers_enabled(self.orchestrator.guard().triggers_enabled());
        output
    }

    fn forward(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Notice(ref notice) => self.shell.notify(notice),
            ref other => self.shell.on_event(other),
        }
    }
}
