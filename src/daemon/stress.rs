//! Daemon-side stressor processes.
//!
//! `exec` forks stress-ng (or a substitute program) into its own process
//! group and remembers the child under a uuid; `cancel` kills the whole group.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::RpcError;

pub const STRESS_NG: &str = "stress-ng";

pub struct StressorRegistry {
    program: String,
    processes: Mutex<HashMap<String, Child>>,
}

impl Default for StressorRegistry {
    fn default() -> Self {
        Self::new(STRESS_NG)
    }
}

impl StressorRegistry {
    pub fn new(program: impl Into<String>) -> Self {
        StressorRegistry {
            program: program.into(),
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn the program with whitespace-split `args`. An empty `uuid` gets a
    /// fresh one. Returns the uuid the process is registered under.
    pub async fn exec(&self, args: &str, uuid: &str) -> Result<String, RpcError> {
        let id = if uuid.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            uuid.to_string()
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(args.split_whitespace())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| RpcError::Status {
            method: "ExecStressors".to_string(),
            message: format!("failed to start {}: {}", self.program, e),
        })?;
        log::info!(
            "[Stressor] Started {} {} as {} (pid {:?})",
            self.program,
            args,
            id,
            child.id()
        );

        let mut processes = self.processes.lock().await;
        if let Some(mut previous) = processes.insert(id.clone(), child) {
            log::warn!("[Stressor] Replacing running instance {}", id);
            let _ = previous.start_kill();
        }
        Ok(id)
    }

    /// Kill the process group for `uuid`. Unknown ids are ignored.
    pub async fn cancel(&self, uuid: &str) -> Result<(), RpcError> {
        let child = self.processes.lock().await.remove(uuid);
        let Some(mut child) = child else {
            log::debug!("[Stressor] No running instance {}", uuid);
            return Ok(());
        };

        if let Some(pid) = child.id() {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => {
                    log::warn!("[Stressor] killpg {} failed: {}", pid, e);
                    let _ = child.start_kill();
                }
            }
        }
        // Reap; the exit status of a killed stressor is not interesting.
        let _ = child.wait().await;
        log::info!("[Stressor] Cancelled {}", uuid);
        Ok(())
    }

    /// Whether the instance is registered and has not exited yet.
    pub async fn is_running(&self, uuid: &str) -> bool {
        let mut processes = self.processes.lock().await;
        match processes.get_mut(uuid) {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub async fn instances(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.processes.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
