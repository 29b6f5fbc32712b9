//! Process blocking via sysinfo: graceful terminate first, escalate to kill
//! when the process lingers. A blocked-pid set makes the operation
//! idempotent and keeps the action history free of duplicates.

use super::{ActionError, ActionOutcome, BlockMethod, ProcessBlocker};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, Signal, System};
use tracing::{info, warn};

const TERMINATE_GRACE: Duration = Duration::from_secs(1);

pub struct SystemProcessBlocker {
    sys: Mutex<System>,
    blocked: Mutex<HashMap<u32, ActionOutcome>>,
}

impl SystemProcessBlocker {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
            blocked: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SystemProcessBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessBlocker for SystemProcessBlocker {
    fn block(&self, pid: u32, name: &str, reason: &str) -> Result<ActionOutcome, ActionError> {
        if let Some(prior) = self.blocked.lock().expect("blocked lock").get(&pid) {
            info!(pid, name, "process already blocked");
            let mut outcome = prior.clone();
            outcome.method = BlockMethod::AlreadyBlocked;
            return Ok(outcome);
        }

        let mut sys = self.sys.lock().expect("sysinfo lock");
        let target = Pid::from_u32(pid);
        sys.refresh_processes();
        let Some(proc_) = sys.process(target) else {
            warn!(pid, "process not found for blocking");
            return Err(ActionError::ProcessNotFound(pid));
        };

        info!(pid, name, reason, "terminating process");
        let terminated = proc_.kill_with(Signal::Term).unwrap_or(false);

        // give it a moment to exit before escalating
        let deadline = Instant::now() + TERMINATE_GRACE;
        let mut gone = false;
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
            sys.refresh_processes();
            if sys.process(target).is_none() {
                gone = true;
                break;
            }
        }

        let method = if gone && terminated {
            BlockMethod::Terminated
        } else {
            match sys.process(target) {
                Some(p) => {
                    warn!(pid, name, "graceful terminate failed, killing");
                    if !p.kill() {
                        return Err(ActionError::AccessDenied(pid));
                    }
                    BlockMethod::Killed
                }
                None => BlockMethod::Terminated,
            }
        };
        drop(sys);

        let outcome = ActionOutcome {
            pid,
            name: name.to_string(),
            method,
            timestamp: Utc::now(),
        };
        self.blocked
            .lock()
            .expect("blocked lock")
            .insert(pid, outcome.clone());
        Ok(outcome)
    }

    fn history(&self) -> Vec<ActionOutcome> {
        let mut v: Vec<ActionOutcome> = self
            .blocked
            .lock()
            .expect("blocked lock")
            .values()
            .cloned()
            .collect();
        v.sort_by_key(|o| o.timestamp);
        v
    }
}

/// Records blocks without touching real processes. Used by demo deployments
/// (the dashboard's block form) and by tests exercising the idempotency
/// contract.
pub struct SimulatedProcessBlocker {
    blocked: Mutex<HashMap<u32, ActionOutcome>>,
}

impl SimulatedProcessBlocker {
    pub fn new() -> Self {
        Self {
            blocked: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SimulatedProcessBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessBlocker for SimulatedProcessBlocker {
    fn block(&self, pid: u32, name: &str, _reason: &str) -> Result<ActionOutcome, ActionError> {
        let mut blocked = self.blocked.lock().expect("blocked lock");
        if let Some(prior) = blocked.get(&pid) {
            let mut outcome = prior.clone();
            outcome.method = BlockMethod::AlreadyBlocked;
            return Ok(outcome);
        }
        let outcome = ActionOutcome {
            pid,
            name: name.to_string(),
            method: BlockMethod::Simulated,
            timestamp: Utc::now(),
        };
        blocked.insert(pid, outcome.clone());
        Ok(outcome)
    }

    fn history(&self) -> Vec<ActionOutcome> {
        let mut v: Vec<ActionOutcome> = self
            .blocked
            .lock()
            .expect("blocked lock")
            .values()
            .cloned()
            .collect();
        v.sort_by_key(|o| o.timestamp);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_twice_succeeds_without_duplicating_the_record() {
        let blocker = SimulatedProcessBlocker::new();
        let first = blocker.block(1234, "ransom.exe", "encryption burst").unwrap();
        let second = blocker.block(1234, "ransom.exe", "encryption burst").unwrap();
        assert_eq!(first.method, BlockMethod::Simulated);
        assert_eq!(second.method, BlockMethod::AlreadyBlocked);
        assert_eq!(blocker.history().len(), 1);
    }

    #[test]
    fn missing_process_is_an_error_for_the_real_blocker() {
        let blocker = SystemProcessBlocker::new();
        // pid very unlikely to exist
        let err = blocker.block(u32::MAX - 7, "ghost", "test").unwrap_err();
        assert!(matches!(err, ActionError::ProcessNotFound(_)));
        assert!(blocker.history().is_empty());
    }
}
