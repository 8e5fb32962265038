//! 명령줄 처리와 실행 진입점
//!
//! ## 사용법
//! ```text
//! perch                       # 상태 확인 후 자동 실행 또는 컨트롤러 표시
//! perch --minimized           # 앱을 최소화 상태로 실행
//! perch --uninstall           # 앱과 컨트롤러 제거
//! perch --no-autostart        # 자동 실행하지 않고 컨트롤러 표시
//! perch --config <path>       # 설정 파일 지정
//! ```
//!
//! 컨트롤러가 받은 인자는 모두 그대로 앱에 전달됩니다.
//! 종료 코드는 항상 0이며, 실패는 화면 메시지로 알립니다.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use perch_updater_lib::{
    BinaryFolderMigrator, Collaborators, Controller, ControllerSession, GitHubClient,
    GitHubInstaller, Migrator, ProcessLauncher, ReleaseApi, UpdateChecker, VersionTag,
};

use crate::config::{executable_dir, ControllerConfig};
use crate::shell::ConsoleShell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub help: bool,
    pub version: bool,
    /// 프로그램 이름을 제외한 원래 인자 전체
    pub args: Vec<String>,
}

impl CliArgs {
    pub fn parse(args: Vec<String>) -> anyhow::Result<Self> {
        let mut config_path = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--config" {
                let value = iter.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            } else if let Some(value) = arg.strip_prefix("--config=") {
                config_path = Some(PathBuf::from(value));
            }
        }

        Ok(Self {
            config_path,
            help: args.iter().any(|a| a == "--help" || a == "-h"),
            version: args.iter().any(|a| a == "--version" || a == "-V"),
            args,
        })
    }
}

/// 실행: main에서 인자를 받아 호출
pub fn run_cli(args: Vec<String>) {
    // 로깅 초기화 (stdout은 콘솔 셸이 사용하므로 stderr로)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = match CliArgs::parse(args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("✗ Error: {:#}", e);
            return;
        }
    };

    if cli.help {
        print_help();
        return;
    }
    if cli.version {
        println!("perch {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Error: failed to create runtime: {}", e);
            return;
        }
    };

    if let Err(e) = rt.block_on(run_controller(cli)) {
        tracing::error!("[Controller] {:#}", e);
        eprintln!("✗ Error: {:#}", e);
    }
}

/// 설정을 읽고 협력자를 구성한 뒤 컨트롤러 실행
pub async fn run_controller(cli: CliArgs) -> anyhow::Result<()> {
    let cfg = ControllerConfig::load(cli.config_path.as_deref())?;
    cfg.validate()?;

    let base = executable_dir();
    let install_dir = cfg.install_dir_in(&base);
    tracing::info!(
        "[Controller] {} from {}/{} into {}",
        cfg.app_name,
        cfg.github_owner,
        cfg.github_repo,
        install_dir.display()
    );

    let client = Arc::new(GitHubClient::with_base_url(
        &cfg.github_owner,
        &cfg.github_repo,
        cfg.api_base_url.as_deref(),
    )?);

    let mut installer = GitHubInstaller::new(client.clone(), &install_dir)
        .with_check_timeout(cfg.check_timeout());
    if let Some(ref pattern) = cfg.asset_pattern {
        installer = installer.with_asset_pattern(pattern);
    }

    let self_update = if cfg.self_update_enabled() {
        let feed = GitHubClient::with_base_url(
            &cfg.installer_owner,
            &cfg.installer_repo,
            cfg.api_base_url.as_deref(),
        )?;
        let current = VersionTag::parse(&cfg.installer_version);
        if current.is_none() {
            tracing::warn!(
                "[Controller] installer_version '{}' is not a version, self-update check disabled",
                cfg.installer_version
            );
        }
        UpdateChecker::new("installer", current, Arc::new(feed))
    } else {
        UpdateChecker::new("installer", None, client.clone())
    }
    .with_timeout(cfg.check_timeout());

    let migrator = cfg.legacy_dir_in(&base).map(|legacy| {
        Box::new(BinaryFolderMigrator::new(&cfg.app_name, legacy, &install_dir)) as Box<dyn Migrator>
    });

    let session = ControllerSession::new(cli.args);
    let shell = ConsoleShell::stdio(session.started_minimized());
    let releases: Arc<dyn ReleaseApi> = client;

    let mut controller = Controller::new(
        &cfg.app_name,
        shell,
        session,
        Collaborators {
            installer: Arc::new(installer),
            releases,
            launcher: Arc::new(ProcessLauncher::new(&install_dir, &cfg.executable)),
            self_update,
            migrator,
        },
    );
    controller.run().await;
    Ok(())
}

fn print_help() {
    println!(
        "perch {}\n\n\
         Usage: perch [options] [arguments forwarded to the application]\n\n\
         Options:\n  \
           --config <path>   Use the given config file instead of perch.toml\n  \
           --uninstall       Uninstall the application and this controller\n  \
           --minimized       Start the application minimized\n  \
           --no-autostart    Show the controller instead of starting the application\n  \
           -h, --help        Show this help\n  \
           -V, --version     Show the version",
        env!("CARGO_PKG_VERSION")
    );
}
