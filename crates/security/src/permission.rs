//! Permission manager: decides whether a side-effecting tool may run.
//!
//! One instance is created per session and handed to the tools that need
//! it. Approvals granted "for this session" are cached on the instance,
//! never in process-wide state.

use codeloop_core::AutonomyLevel;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};

/// A side-effecting operation that needs approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    WriteFile,
    ExecuteCommand,
}

impl Operation {
    pub fn describe(&self) -> &'static str {
        match self {
            Operation::WriteFile => "write to file",
            Operation::ExecuteCommand => "run command",
        }
    }
}

/// What the agent wants to do, and to what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub operation: Operation,
    pub target: String,
}

/// An approver's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    AllowOnce,
    AllowSession,
    Deny,
}

/// Asks someone (a person, a policy) whether a request may proceed.
pub trait Approver: Send + Sync {
    fn decide(&self, request: &PermissionRequest) -> Decision;
}

/// Approves everything.
pub struct AutoApprove;

impl Approver for AutoApprove {
    fn decide(&self, _request: &PermissionRequest) -> Decision {
        Decision::AllowOnce
    }
}

/// Denies everything.
pub struct DenyAll;

impl Approver for DenyAll {
    fn decide(&self, _request: &PermissionRequest) -> Decision {
        Decision::Deny
    }
}

pub struct PermissionManager {
    level: AutonomyLevel,
    approver: Box<dyn Approver>,
    session: Mutex<HashSet<(Operation, String)>>,
}

impl std::fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionManager")
            .field("level", &self.level)
            .field("session_grants", &self.session_grants())
            .finish()
    }
}

impl PermissionManager {
    /// `approver` is only consulted at the `Supervised` level.
    pub fn new(level: AutonomyLevel, approver: Box<dyn Approver>) -> Self {
        Self {
            level,
            approver,
            session: Mutex::new(HashSet::new()),
        }
    }

    /// A manager that approves everything (tests, `full` autonomy).
    pub fn permissive() -> Self {
        Self::new(AutonomyLevel::Full, Box::new(AutoApprove))
    }

    pub fn level(&self) -> AutonomyLevel {
        self.level
    }

    /// Check a request, consulting the session cache and then the approver.
    pub fn check(&self, operation: Operation, target: &str) -> bool {
        match self.level {
            AutonomyLevel::Full => return true,
            AutonomyLevel::ReadOnly => {
                info!(operation = operation.describe(), target, "Denied in read-only mode");
                return false;
            }
            AutonomyLevel::Supervised => {}
        }

        let key = (operation, target.to_string());
        if self.lock().contains(&key) {
            debug!(operation = operation.describe(), target, "Session grant reused");
            return true;
        }

        let request = PermissionRequest {
            operation,
            target: target.to_string(),
        };
        match self.approver.decide(&request) {
            Decision::AllowOnce => true,
            Decision::AllowSession => {
                self.lock().insert(key);
                true
            }
            Decision::Deny => {
                info!(operation = operation.describe(), target, "Permission denied");
                false
            }
        }
    }

    /// Grant a request for the rest of the session without asking.
    pub fn grant_session(&self, operation: Operation, target: &str) {
        self.lock().insert((operation, target.to_string()));
    }

    pub fn clear_session(&self) {
        self.lock().clear();
    }

    pub fn session_grants(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<(Operation, String)>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        answer: Decision,
        calls: Arc<AtomicUsize>,
    }

    impl Approver for Counting {
        fn decide(&self, _request: &PermissionRequest) -> Decision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn supervised(answer: Decision) -> (PermissionManager, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = PermissionManager::new(
            AutonomyLevel::Supervised,
            Box::new(Counting {
                answer,
                calls: calls.clone(),
            }),
        );
        (manager, calls)
    }

    #[test]
    fn full_autonomy_never_asks() {
        let manager = PermissionManager::new(AutonomyLevel::Full, Box::new(DenyAll));
        assert!(manager.check(Operation::WriteFile, "a.txt"));
    }

    #[test]
    fn read_only_always_denies() {
        let manager = PermissionManager::new(AutonomyLevel::ReadOnly, Box::new(AutoApprove));
        assert!(!manager.check(Operation::ExecuteCommand, "ls"));
    }

    #[test]
    fn session_grant_is_cached() {
        let (manager, calls) = supervised(Decision::AllowSession);
        assert!(manager.check(Operation::WriteFile, "a.txt"));
        assert!(manager.check(Operation::WriteFile, "a.txt"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.session_grants(), 1);

        manager.clear_session();
        assert!(manager.check(Operation::WriteFile, "a.txt"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn allow_once_asks_every_time() {
        let (manager, calls) = supervised(Decision::AllowOnce);
        manager.check(Operation::ExecuteCommand, "cargo test");
        manager.check(Operation::ExecuteCommand, "cargo test");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn grants_are_per_target() {
        let (manager, _) = supervised(Decision::Deny);
        manager.grant_session(Operation::WriteFile, "a.txt");
        assert!(manager.check(Operation::WriteFile, "a.txt"));
        assert!(!manager.check(Operation::WriteFile, "b.txt"));
        assert!(!manager.check(Operation::ExecuteCommand, "a.txt"));
    }
}
