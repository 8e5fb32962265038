//! 작업 가드: 설치/제거/업데이트 중 한 번에 하나만 실행
//!
//! 잠금을 잡고 있는 동안 충돌하는 트리거(버튼 등)는 비활성화되고,
//! 잠금이 해제되면 결과와 상관없이 무조건 다시 활성화됩니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::error::AlreadyRunning;

/// 설치 디렉터리를 변경하는 작업 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Install,
    Update,
    Uninstall,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Install => "install",
            OperationKind::Update => "update",
            OperationKind::Uninstall => "uninstall",
        };
        f.write_str(s)
    }
}

/// 작업 가드 (복제해도 같은 잠금을 공유)
#[derive(Clone)]
pub struct OperationGuard {
    current: Arc<Mutex<Option<OperationKind>>>,
    triggers: Arc<watch::Sender<bool>>,
}

impl OperationGuard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self {
            current: Arc::new(Mutex::new(None)),
            triggers: Arc::new(tx),
        }
    }

    /// 잠금 획득. 다른 작업이 진행 중이면 `AlreadyRunning`
    pub fn acquire(&self, kind: OperationKind) -> Result<OperationLock, AlreadyRunning> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = *current {
            tracing::warn!("[Guard] Refusing {}: {} is still running", kind, running);
            return Err(AlreadyRunning { running });
        }
        *current = Some(kind);
        drop(current);

        self.triggers.send_replace(false);
        tracing::debug!("[Guard] Acquired for {}", kind);

        Ok(OperationLock {
            kind,
            current: self.current.clone(),
            triggers: self.triggers.clone(),
        })
    }

    /// 현재 진행 중인 작업
    pub fn running(&self) -> Option<OperationKind> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 충돌 트리거 활성화 여부 (true면 버튼 사용 가능)
    pub fn triggers_enabled(&self) -> bool {
        *self.triggers.borrow()
    }

    /// 트리거 활성 상태 구독
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.triggers.subscribe()
    }
}

impl Default for OperationGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// 잡고 있는 동안 작업 하나가 진행 중임을 나타내는 토큰. drop 시 해제
#[must_use = "the operation is only guarded while the lock is held"]
pub struct OperationLock {
    kind: OperationKind,
    current: Arc<Mutex<Option<OperationKind>>>,
    triggers: Arc<watch::Sender<bool>>,
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.triggers.send_replace(true);
        tracing::debug!("[Guard] Released after {}", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let guard = OperationGuard::new();
        let lock = guard.acquire(OperationKind::Install).unwrap();

        for kind in [OperationKind::Install, OperationKind::Update, OperationKind::Uninstall] {
            let err = guard.acquire(kind).err().unwrap();
            assert_eq!(err.running, OperationKind::Install);
        }

        drop(lock);
        assert!(guard.acquire(OperationKind::Uninstall).is_ok());
    }

    #[test]
    fn triggers_disabled_only_while_held() {
        let guard = OperationGuard::new();
        let mut rx = guard.subscribe();
        assert!(guard.triggers_enabled());

        let lock = guard.acquire(OperationKind::Update).unwrap();
        assert!(!guard.triggers_enabled());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert_eq!(guard.running(), Some(OperationKind::Update));

        drop(lock);
        assert!(guard.triggers_enabled());
        assert!(*rx.borrow_and_update());
        assert_eq!(guard.running(), None);
    }

    #[test]
    fn clones_share_the_same_lock() {
        let guard = OperationGuard::new();
        let other = guard.clone();
        let _lock = guard.acquire(OperationKind::Uninstall).unwrap();
        assert!(other.acquire(OperationKind::Install).is_err());
        assert!(!other.triggers_enabled());
    }

    #[test]
    fn released_when_scope_unwinds() {
        let guard = OperationGuard::new();
        let g = guard.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _lock = g.acquire(OperationKind::Install).unwrap();
            panic!("installer blew up");
        }));
        assert!(result.is_err());
        assert!(guard.triggers_enabled());
        assert!(guard.acquire(OperationKind::Install).is_ok());
    }
}
