//! 컨트롤러 이벤트와 진행률 채널
//!
//! 설치기(Installer)는 어떤 실행 컨텍스트에서든 `ProgressReporter`로 진행률을 보내고,
//! 오케스트레이터가 채널을 비우면서 `ControllerEvent`로 브로드캐스트합니다.
//! UI 셸은 이벤트를 구독만 하고 상태를 직접 쓰지 않습니다.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::guard::OperationKind;

/// 설치기 → 오케스트레이터 진행률 송신자 (0.0 ~ 1.0)
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<f64>>,
}

impl ProgressReporter {
    /// 송신자와 수신자 쌍 생성
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<f64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// 아무 곳에도 보고하지 않는 리포터
    pub fn noop() -> Self {
        Self { tx: None }
    }

    /// 진행률 보고. 범위를 벗어난 값은 잘라냄
    pub fn report(&self, fraction: f64) {
        if let Some(ref tx) = self.tx {
            let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
            // 수신자가 이미 사라졌으면 무시
            let _ = tx.send(fraction);
        }
    }
}

/// 0.0 ~ 1.0 진행률을 0 ~ 100 퍼센트로 변환
pub fn to_percent(fraction: f64) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// 알림 수준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// 사용자에게 보여줄 메시지 (메시지 박스에 해당)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: &str, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, title: title.to_string(), message: message.into() }
    }

    pub fn warning(title: &str, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, title: title.to_string(), message: message.into() }
    }

    pub fn error(title: &str, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, title: title.to_string(), message: message.into() }
    }
}

/// 오케스트레이터가 발행하는 이벤트 (셸에 전달)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum ControllerEvent {
    /// 작업 시작 ("Installing..." 등)
    OperationStarted { kind: OperationKind, status: String },
    /// 진행률 (0 ~ 100)
    Progress { kind: OperationKind, percent: u8 },
    /// 작업 종료
    OperationFinished { kind: OperationKind, success: bool },
    /// 사용자 알림
    Notice(Notice),
}
