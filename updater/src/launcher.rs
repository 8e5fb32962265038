//! 설치된 애플리케이션 실행기

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// 실행기 협력자 계약: 앱을 독립 프로세스로 띄움
pub trait Launcher: Send + Sync {
    fn start(&self, args: &[String]) -> Result<()>;
}

/// `<install_dir>/<executable>`을 분리된 프로세스로 실행
pub struct ProcessLauncher {
    executable: PathBuf,
}

impl ProcessLauncher {
    pub fn new(install_dir: impl Into<PathBuf>, executable: &str) -> Self {
        let mut name = executable.to_string();
        if cfg!(target_os = "windows") && !name.to_lowercase().ends_with(".exe") {
            name.push_str(".exe");
        }
        Self {
            executable: install_dir.into().join(name),
        }
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }
}

impl Launcher for ProcessLauncher {
    fn start(&self, args: &[String]) -> Result<()> {
        if !self.executable.is_file() {
            anyhow::bail!("Executable not found: {}", self.executable.display());
        }

        let mut cmd = Command::new(&self.executable);
        cmd.args(args);
        if let Some(dir) = self.executable.parent() {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // DETACHED_PROCESS | CREATE_BREAKAWAY_FROM_JOB | CREATE_NEW_PROCESS_GROUP
            cmd.creation_flags(0x00000008 | 0x01000000 | 0x00000200);
        }

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.executable.display()))?;

        tracing::info!(
            "[Launcher] Started {} (pid {}) with {:?}",
            self.executable.display(),
            child.id(),
            args
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_executable_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(tmp.path(), "nope");
        let err = launcher.start(&[]).unwrap_err();
        assert!(err.to_string().contains("Executable not found"));
    }

    #[cfg(unix)]
    #[test]
    fn spawns_with_forwarded_args() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("args.txt");
        let script = tmp.path().join("app");
        std::fs::write(&script, format!("#!/bin/sh\necho \"$@\" > '{}'\n", out.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let launcher = ProcessLauncher::new(tmp.path(), "app");
        launcher
            .start(&["--minimized".to_string(), "x".to_string()])
            .unwrap();

        for _ in 0..50 {
            if let Ok(s) = std::fs::read_to_string(&out) {
                if !s.is_empty() {
                    assert_eq!(s.trim(), "--minimized x");
                    return;
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        panic!("launched process never wrote its arguments");
    }
}
