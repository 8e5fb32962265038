//! 컨트롤러 세션: 프로세스 하나 동안만 유지되는 상태
//!
//! 프로세스 시작 시 한 번 만들고 재사용하지 않습니다.

use crate::launch::{LaunchIntent, MINIMIZED_FLAG, UNINSTALL_FLAG};

/// 자동 실행을 끄는 컨트롤러 전용 플래그
pub const NO_AUTOSTART_FLAG: &str = "--no-autostart";

#[derive(Debug, Clone)]
pub struct ControllerSession {
    /// 원래 명령줄 인자 (프로그램 이름 제외, 그대로 앱에 전달)
    args: Vec<String>,
    uninstall_requested: bool,
    autostart_enabled: bool,
    /// 컨트롤러 자체 업데이트 안내를 이미 보여줬는지
    shown_self_update_prompt: bool,
}

impl ControllerSession {
    pub fn new(args: Vec<String>) -> Self {
        let uninstall_requested = args.iter().any(|a| a == UNINSTALL_FLAG);
        let autostart_enabled = !args.iter().any(|a| a == NO_AUTOSTART_FLAG);
        Self {
            args,
            uninstall_requested,
            autostart_enabled,
            shown_self_update_prompt: false,
        }
    }

    pub fn uninstall_requested(&self) -> bool {
        self.uninstall_requested
    }

    pub fn autostart_enabled(&self) -> bool {
        self.autostart_enabled
    }

    /// 명령줄에 `--minimized`가 있었는지
    pub fn started_minimized(&self) -> bool {
        self.args.iter().any(|a| a == MINIMIZED_FLAG)
    }

    pub fn self_update_prompt_shown(&self) -> bool {
        self.shown_self_update_prompt
    }

    /// 안내 표시 기록. 처음이면 true
    pub fn mark_self_update_prompt_shown(&mut self) -> bool {
        !std::mem::replace(&mut self.shown_self_update_prompt, true)
    }

    pub fn launch_intent(&self, autostart: bool, minimized: bool) -> LaunchIntent {
        LaunchIntent {
            autostart: autostart && self.autostart_enabled,
            minimized,
            extra_args: self.args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(args: &[&str]) -> ControllerSession {
        ControllerSession::new(args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn parses_flags() {
        let s = session(&["--uninstall"]);
        assert!(s.uninstall_requested());
        assert!(s.autostart_enabled());
        assert!(!s.started_minimized());

        let s = session(&["--minimized", "--no-autostart"]);
        assert!(!s.uninstall_requested());
        assert!(!s.autostart_enabled());
        assert!(s.started_minimized());
    }

    #[test]
    fn self_update_prompt_marked_once() {
        let mut s = session(&[]);
        assert!(!s.self_update_prompt_shown());
        assert!(s.mark_self_update_prompt_shown());
        assert!(!s.mark_self_update_prompt_shown());
        assert!(s.self_update_prompt_shown());
    }

    #[test]
    fn launch_intent_respects_no_autostart() {
        let s = session(&["--no-autostart", "x"]);
        let intent = s.launch_intent(true, false);
        assert!(!intent.autostart);
        assert_eq!(intent.extra_args, vec!["--no-autostart", "x"]);
    }
}
