//! 실행 결정: 설치된 앱을 자동 실행할지, 컨트롤러를 보여줄지 결정
//!
//! 순수 함수만 있어 창 시스템 없이 테스트할 수 있습니다.

/// 컨트롤러 자체 제거 플래그
pub const UNINSTALL_FLAG: &str = "--uninstall";
/// 최소화 플래그 (실행되는 앱으로 전달)
pub const MINIMIZED_FLAG: &str = "--minimized";

/// 결정 입력
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchState {
    pub installed: bool,
    pub update: bool,
    pub autostart: bool,
}

/// 결정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchAction {
    /// 앱을 실행하고 컨트롤러 종료
    Launch,
    /// 업데이트 대기: 컨트롤러를 보이고 사용자 입력 대기
    ShowForUpdate,
    /// 상태와 가능한 작업을 보여주며 대기
    Remain,
}

/// 실행 인텐트 (저장하지 않고 매번 유도)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchIntent {
    pub autostart: bool,
    pub minimized: bool,
    pub extra_args: Vec<String>,
}

impl LaunchIntent {
    /// 앱에 넘길 최종 인자
    pub fn forwarded_args(&self) -> Vec<String> {
        forward_args(&self.extra_args, self.minimized)
    }
}

pub fn decide(state: LaunchState) -> LaunchAction {
    if state.autostart && state.installed && !state.update {
        LaunchAction::Launch
    } else if state.update {
        LaunchAction::ShowForUpdate
    } else {
        LaunchAction::Remain
    }
}

/// 원래 인자를 순서대로 넘기고, 최소화 상태면 `--minimized`를 한 번만 덧붙임
pub fn forward_args(original: &[String], minimized: bool) -> Vec<String> {
    let mut args = original.to_vec();
    if minimized && !args.iter().any(|a| a == MINIMIZED_FLAG) {
        args.push(MINIMIZED_FLAG.to_string());
    }
    args
}
