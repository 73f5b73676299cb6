//! The process-launching seam: [`ServerLauncher`] abstracts over actually
//! spawning an inference-server binary so the supervisor's restart/backoff
//! logic can be exercised without a real model or binary present.

use async_trait::async_trait;
use orc_kernel::model::DiscoveredModel;
use orc_kernel::server::{SupervisorError, SupervisorResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::process::Child;

/// A running (or recently-terminated) process, opaque to callers beyond its
/// pid.
pub enum ProcessHandle {
    Real { pid: u32, child: Child },
    Mock { pid: u32 },
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        match self {
            ProcessHandle::Real { pid, .. } => *pid,
            ProcessHandle::Mock { pid } => *pid,
        }
    }
}

#[async_trait]
pub trait ServerLauncher: Send + Sync {
    /// Start an inference-server process bound to `model.port`. Must not
    /// block until the server is ready; that is `probe_ready`'s job.
    async fn spawn(&self, model: &DiscoveredModel) -> SupervisorResult<ProcessHandle>;

    /// Non-blocking single readiness check against `port`.
    async fn probe_ready(&self, port: u16) -> bool;

    /// Stop the process, SIGTERM-then-wait semantics for real processes.
    async fn terminate(&self, handle: ProcessHandle) -> SupervisorResult<()>;
}

/// Real launcher: spawns `binary_path --model <path> --port <port> [...extra
/// args from RuntimeOverrides]` and probes readiness over HTTP.
pub struct ProcessLauncher {
    pub binary_path: String,
    client: reqwest::Client,
}

impl ProcessLauncher {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(1500))
                .build()
                .expect("client builds"),
        }
    }
}

#[async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn spawn(&self, model: &DiscoveredModel) -> SupervisorResult<ProcessHandle> {
        let port = model
            .port
            .ok_or_else(|| SupervisorError::UnknownModel(model.model_id.clone()))?;

        // A port already bound by some other process is a terminal
        // condition (spec §4.B) rather than a transient failure worth
        // restarting into: fail fast before spawning anything.
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_err() {
            return Err(SupervisorError::PortBusy(port));
        }

        let mut cmd = tokio::process::Command::new(&self.binary_path);
        cmd.arg("--model")
            .arg(&model.path)
            .arg("--port")
            .arg(port.to_string());
        if let Some(gpu_layers) = model.overrides.gpu_layers {
            cmd.arg("--n-gpu-layers").arg(gpu_layers.to_string());
        }
        if let Some(ctx_size) = model.overrides.ctx_size {
            cmd.arg("--ctx-size").arg(ctx_size.to_string());
        }
        if let Some(threads) = model.overrides.threads {
            cmd.arg("--threads").arg(threads.to_string());
        }
        if let Some(batch_size) = model.overrides.batch_size {
            cmd.arg("--batch-size").arg(batch_size.to_string());
        }
        cmd.kill_on_drop(true);

        let child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        Ok(ProcessHandle::Real { pid, child })
    }

    async fn probe_ready(&self, port: u16) -> bool {
        let url = format!("http://127.0.0.1:{port}/health");
        matches!(self.client.get(url).send().await, Ok(resp) if resp.status().is_success())
    }

    async fn terminate(&self, handle: ProcessHandle) -> SupervisorResult<()> {
        if let ProcessHandle::Real { mut child, .. } = handle {
            child.start_kill().ok();
            let _ = child.wait().await;
        }
        Ok(())
    }
}

/// In-memory launcher for tests: simulates readiness after a configured
/// number of probes, never spawns a real process.
pub struct MockLauncher {
    ready_after_probes: u32,
    probe_counts: dashmap::DashMap<u16, AtomicU32>,
    next_pid: AtomicU32,
    pub fail_spawn: HashMap<String, ()>,
    pub port_busy: HashMap<String, ()>,
}

impl MockLauncher {
    pub fn new(ready_after_probes: u32) -> Self {
        Self {
            ready_after_probes,
            probe_counts: dashmap::DashMap::new(),
            next_pid: AtomicU32::new(1000),
            fail_spawn: HashMap::new(),
            port_busy: HashMap::new(),
        }
    }

    /// Make `spawn` report the given model's port as bound by another
    /// process, exercising the terminal `PortBusy` path.
    pub fn with_port_busy(mut self, model_id: impl Into<String>) -> Self {
        self.port_busy.insert(model_id.into(), ());
        self
    }
}

#[async_trait]
impl ServerLauncher for MockLauncher {
    async fn spawn(&self, model: &DiscoveredModel) -> SupervisorResult<ProcessHandle> {
        if self.port_busy.contains_key(&model.model_id) {
            return Err(SupervisorError::PortBusy(model.port.unwrap_or(0)));
        }
        if self.fail_spawn.contains_key(&model.model_id) {
            return Err(SupervisorError::Failed(model.model_id.clone()));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessHandle::Mock { pid })
    }

    async fn probe_ready(&self, port: u16) -> bool {
        let counter = self
            .probe_counts
            .entry(port)
            .or_insert_with(|| AtomicU32::new(0));
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        count >= self.ready_after_probes
    }

    async fn terminate(&self, _handle: ProcessHandle) -> SupervisorResult<()> {
        Ok(())
    }
}
