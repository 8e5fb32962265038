//! 콘솔 셸: 표준 입출력으로 컨트롤러 화면과 명령을 제공

use std::io::{self, BufRead, Write};
use std::process::{Command as ProcessCommand, Stdio};

use perch_updater_lib::{Command, ControllerEvent, ControllerView, Notice, NoticeLevel, Shell};

pub struct ConsoleShell<R: BufRead, W: Write> {
    input: R,
    output: W,
    started_minimized: bool,
    triggers_enabled: bool,
    visible: bool,
    actions: Vec<Command>,
}

impl ConsoleShell<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(started_minimized: bool) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), started_minimized)
    }
}

impl<R: BufRead, W: Write> ConsoleShell<R, W> {
    pub fn new(input: R, output: W, started_minimized: bool) -> Self {
        Self {
            input,
            output,
            started_minimized,
            triggers_enabled: true,
            visible: false,
            actions: Vec::new(),
        }
    }

    /// 컨트롤러가 화면에 표시됐는지
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                tracing::warn!("[Shell] Failed to read input: {}", e);
                None
            }
        }
    }

    /// 번호 또는 명령 이름을 현재 가능한 명령으로 해석
    fn resolve(&self, input: &str) -> Option<Command> {
        if let Ok(n) = input.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| self.actions.get(i)).copied();
        }
        Command::parse(input).filter(|c| self.actions.contains(c))
    }

    fn print(&mut self, text: std::fmt::Arguments<'_>) {
        // 출력 실패는 무시 (파이프가 닫힌 경우 등)
        let _ = self.output.write_fmt(text);
        let _ = self.output.flush();
    }
}

impl<R: BufRead, W: Write> Shell for ConsoleShell<R, W> {
    fn confirm(&mut self, title: &str, message: &str) -> bool {
        self.print(format_args!("\n== {} ==\n{}\n[y/N] ", title, message));
        matches!(
            self.read_line().map(|s| s.to_lowercase()).as_deref(),
            Some("y") | Some("yes")
        )
    }

    fn notify(&mut self, notice: &Notice) {
        let mark = match notice.level {
            NoticeLevel::Info => "ℹ",
            NoticeLevel::Warning => "⚠",
            NoticeLevel::Error => "✗",
        };
        self.print(format_args!("\n{} {}\n{}\n", mark, notice.title, notice.message));
    }

    fn on_event(&mut self, event: &ControllerEvent) {
        match event {
            ControllerEvent::OperationStarted { status, .. } => {
                self.print(format_args!("\n{}\n", status));
            }
            ControllerEvent::Progress { percent, .. } => {
                self.print(format_args!("\r  [{:<20}] {:>3}%", "#".repeat(usize::from(*percent) / 5), percent));
            }
            ControllerEvent::OperationFinished { kind, success } => {
                let result = if *success { "done" } else { "failed" };
                self.print(format_args!("\n✓ {} {}\n", kind, result));
            }
            ControllerEvent::Notice(notice) => self.notify(notice),
        }
    }

    fn set_triggers_enabled(&mut self, enabled: bool) {
        self.triggers_enabled = enabled;
        tracing::debug!("[Shell] Triggers {}", if enabled { "enabled" } else { "disabled" });
    }

    fn render(&mut self, view: &ControllerView) {
        self.actions = view.actions.clone();
        self.print(format_args!("\n{} Updater\n", view.app_name));
        for line in &view.status_lines {
            self.print(format_args!("  {}\n", line));
        }
        self.print(format_args!("\n"));
        for (i, action) in view.actions.iter().enumerate() {
            self.print(format_args!("  {}) {}\n", i + 1, action));
        }
    }

    fn show(&mut self) {
        self.visible = true;
    }

    fn is_minimized(&self) -> bool {
        self.started_minimized || console_minimized()
    }

    fn open(&mut self, target: &str) -> anyhow::Result<()> {
        open_with_system(target)
    }

    fn next_command(&mut self) -> Option<Command> {
        loop {
            self.print(format_args!("> "));
            let line = self.read_line()?;
            if line.is_empty() {
                continue;
            }
            if !self.triggers_enabled {
                self.print(format_args!("An operation is in progress.\n"));
                continue;
            }
            match self.resolve(&line) {
                Some(command) => return Some(command),
                None => self.print(format_args!("Unknown command: {}\n", line)),
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn console_minimized() -> bool {
    use winapi::um::wincon::GetConsoleWindow;
    use winapi::um::winuser::IsIconic;
    unsafe {
        let hwnd = GetConsoleWindow();
        !hwnd.is_null() && IsIconic(hwnd) != 0
    }
}

#[cfg(not(target_os = "windows"))]
fn console_minimized() -> bool {
    false
}

/// 폴더/URL을 시스템 기본 프로그램으로 열기
pub fn open_with_system(target: &str) -> anyhow::Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = ProcessCommand::new("cmd");
        c.args(["/C", "start", "", target]);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = ProcessCommand::new("open");
        c.arg(target);
        c
    } else {
        let mut c = ProcessCommand::new("xdg-open");
        c.arg(target);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to open '{}': {}", target, e))?;
    tracing::info!("[Shell] Opened {}", target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_updater_lib::{OperationKind, VersionTag};

    fn shell(input: &str) -> ConsoleShell<&[u8], Vec<u8>> {
        ConsoleShell::new(input.as_bytes(), Vec::new(), false)
    }

    fn view() -> ControllerView {
        ControllerView {
            app_name: "Demo".into(),
            installed: true,
            installed_version: VersionTag::parse("1.0.0"),
            update_available: true,
            status_lines: vec!["Demo 1.0.0 is installed.".into(), "An update is available.".into()],
            actions: vec![
                Command::Uninstall,
                Command::Update,
                Command::Start,
                Command::ShowInstallFolder,
                Command::Quit,
            ],
        }
    }

    #[test]
    fn confirm_accepts_only_yes() {
        assert!(shell("y\n").confirm("Migration", "Move?"));
        assert!(shell("YES\n").confirm("Migration", "Move?"));
        assert!(!shell("n\n").confirm("Migration", "Move?"));
        assert!(!shell("").confirm("Migration", "Move?"));
    }

    #[test]
    fn render_lists_numbered_actions() {
        let mut sh = shell("");
        sh.render(&view());
        let out = String::from_utf8(sh.into_output()).unwrap();
        assert!(out.contains("Demo Updater"));
        assert!(out.contains("An update is available."));
        assert!(out.contains("2) Update"));
        assert!(out.contains("4) Show install folder"));
    }

    #[test]
    fn next_command_resolves_numbers_and_names_within_view() {
        let mut sh = shell("9\ninstall\n2\nstart\n");
        sh.render(&view());
        // 9번과 install은 현재 화면에 없음
        assert_eq!(sh.next_command(), Some(Command::Update));
        assert_eq!(sh.next_command(), Some(Command::Start));
        assert_eq!(sh.next_command(), None);
    }

    #[test]
    fn commands_wait_while_triggers_disabled() {
        let mut sh = shell("1\n");
        sh.render(&view());
        sh.set_triggers_enabled(false);
        assert_eq!(sh.next_command(), None);
    }

    #[test]
    fn progress_events_are_drawn() {
        let mut sh = shell("");
        sh.on_event(&ControllerEvent::OperationStarted {
            kind: OperationKind::Install,
            status: "Installing...".into(),
        });
        sh.on_event(&ControllerEvent::Progress { kind: OperationKind::Install, percent: 50 });
        sh.on_event(&ControllerEvent::OperationFinished { kind: OperationKind::Install, success: true });
        let out = String::from_utf8(sh.into_output()).unwrap();
        assert!(out.contains("Installing..."));
        assert!(out.contains(" 50%"));
        assert!(out.contains("install done"));
    }

    #[test]
    fn minimized_flag_is_respected() {
        let sh = ConsoleShell::new(&b""[..], Vec::new(), true);
        assert!(sh.is_minimized());
    }
}
