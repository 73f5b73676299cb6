//! Supervises one inference-server process per enabled model: start/stop,
//! readiness probing, crash detection and bounded restart-with-backoff.

pub mod launcher;

pub use launcher::{MockLauncher, ProcessHandle, ProcessLauncher, ServerLauncher};

use dashmap::DashMap;
use orc_kernel::model::DiscoveredModel;
use orc_kernel::server::{ServerState, ServerStatus, SupervisorError, SupervisorResult};
use orc_kernel::settings::SupervisorSettings;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct Managed {
    handle: Option<ProcessHandle>,
    state: ServerState,
    port: u16,
    started_at: Option<Instant>,
    consecutive_failures: u32,
    restart_count: u32,
    /// Set once the launcher reports the port is bound by another process.
    /// Terminal: the supervisor never retries past this (spec §4.B).
    port_busy: bool,
}

impl Managed {
    fn stopped(port: u16) -> Self {
        Self {
            handle: None,
            state: ServerState::Stopped,
            port,
            started_at: None,
            consecutive_failures: 0,
            restart_count: 0,
            port_busy: false,
        }
    }
}

/// Supervises a fleet of model processes. One [`Managed`] entry exists per
/// model that has ever been started; each entry is guarded by its own lock
/// so concurrent start/stop calls for different models never contend.
pub struct Supervisor<L: ServerLauncher> {
    launcher: Arc<L>,
    settings: SupervisorSettings,
    default_ctx_size: u32,
    models: DashMap<String, Arc<Mutex<Managed>>>,
}

impl<L: ServerLauncher> Supervisor<L> {
    /// `default_ctx_size` feeds [`DiscoveredModel::estimated_vram_gb`] for
    /// models with no per-model `ctx_size` override (the runtime-wide
    /// default, spec §6).
    pub fn new(launcher: L, settings: SupervisorSettings, default_ctx_size: u32) -> Self {
        Self {
            launcher: Arc::new(launcher),
            settings,
            default_ctx_size,
            models: DashMap::new(),
        }
    }

    fn entry(&self, model: &DiscoveredModel) -> Arc<Mutex<Managed>> {
        self.models
            .entry(model.model_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Managed::stopped(model.port.unwrap_or(0)))))
            .clone()
    }

    /// Start one model's process and poll until ready or the readiness
    /// timeout elapses.
    pub async fn start(&self, model: &DiscoveredModel) -> SupervisorResult<()> {
        let entry = self.entry(model);
        let mut managed = entry.lock().await;
        if managed.state == ServerState::Ready || managed.state == ServerState::Starting {
            return Ok(());
        }

        managed.state = ServerState::Starting;
        let handle = match self.launcher.spawn(model).await {
            Ok(handle) => handle,
            Err(err @ SupervisorError::PortBusy(_)) => {
                managed.state = ServerState::Failed;
                managed.port_busy = true;
                return Err(err);
            }
            Err(err) => {
                managed.state = ServerState::Failed;
                managed.consecutive_failures += 1;
                return Err(err);
            }
        };
        managed.handle = Some(handle);
        managed.started_at = Some(Instant::now());

        let deadline =
            Instant::now() + std::time::Duration::from_millis(self.settings.readiness_timeout_ms);
        loop {
            if self.launcher.probe_ready(managed.port).await {
                managed.state = ServerState::Ready;
                managed.consecutive_failures = 0;
                info!(model_id = %model.model_id, port = managed.port, "model ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                managed.state = ServerState::Failed;
                managed.consecutive_failures += 1;
                return Err(SupervisorError::ReadinessTimeout(
                    model.model_id.clone(),
                    self.settings.readiness_timeout_ms,
                ));
            }
            tokio::time::sleep(std::time::Duration::from_millis(
                self.settings.readiness_poll_interval_ms,
            ))
            .await;
        }
    }

    pub async fn stop(&self, model_id: &str) -> SupervisorResult<()> {
        let Some(entry) = self.models.get(model_id).map(|e| e.clone()) else {
            return Err(SupervisorError::UnknownModel(model_id.to_string()));
        };
        let mut managed = entry.lock().await;
        managed.state = ServerState::Draining;
        if let Some(handle) = managed.handle.take() {
            self.launcher.terminate(handle).await?;
        }
        managed.state = ServerState::Stopped;
        managed.started_at = None;
        Ok(())
    }

    pub async fn status(&self, model_id: &str) -> SupervisorResult<ServerStatus> {
        let Some(entry) = self.models.get(model_id).map(|e| e.clone()) else {
            return Err(SupervisorError::UnknownModel(model_id.to_string()));
        };
        let managed = entry.lock().await;
        Ok(ServerStatus {
            model_id: model_id.to_string(),
            state: managed.state,
            port: managed.port,
            pid: managed.handle.as_ref().map(|h| h.pid()),
            uptime_ms: managed.started_at.map(|t| t.elapsed().as_millis() as u64),
            consecutive_failures: managed.consecutive_failures,
            restart_count: managed.restart_count,
        })
    }

    /// Restart a failed model. The first consecutive failure restarts
    /// immediately; subsequent failures back off exponentially capped at
    /// `restart_backoff_max_ms`; past `max_consecutive_failures` the server
    /// is left `Failed` and not retried until an operator intervenes (spec
    /// §4.B). A port the launcher reports as bound by another process is
    /// terminal and is never retried regardless of failure count.
    pub async fn restart(&self, model: &DiscoveredModel) -> SupervisorResult<()> {
        let entry = self.entry(model);
        let (failures, port_busy) = {
            let managed = entry.lock().await;
            (managed.consecutive_failures, managed.port_busy)
        };
        if port_busy {
            return Err(SupervisorError::PortBusy(model.port.unwrap_or(0)));
        }
        if failures >= self.settings.max_consecutive_failures {
            return Err(SupervisorError::Failed(model.model_id.clone()));
        }
        let backoff = if failures <= 1 {
            0
        } else {
            (self.settings.restart_backoff_base_ms * 2u64.pow(failures - 2))
                .min(self.settings.restart_backoff_max_ms)
        };
        if backoff > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
        }
        self.start(model).await?;
        let mut managed = entry.lock().await;
        managed.restart_count += 1;
        Ok(())
    }

    /// Start every enabled model, sequencing launches so the running total
    /// of estimated VRAM never exceeds `vram_budget_gb`. Models that would
    /// exceed the budget are skipped and reported, not silently dropped.
    pub async fn start_all(
        &self,
        models: &[DiscoveredModel],
    ) -> Vec<(String, SupervisorResult<()>)> {
        let mut running_total = 0.0f64;
        let mut results = Vec::with_capacity(models.len());
        for model in models {
            let estimate = model.estimated_vram_gb(self.default_ctx_size);
            if running_total + estimate > self.settings.vram_budget_gb {
                warn!(
                    model_id = %model.model_id,
                    estimate,
                    running_total,
                    budget = self.settings.vram_budget_gb,
                    "skipping start: would exceed vram budget"
                );
                results.push((
                    model.model_id.clone(),
                    Err(SupervisorError::VramBudgetExceeded(model.model_id.clone())),
                ));
                continue;
            }
            let outcome = self.start(model).await;
            if outcome.is_ok() {
                running_total += estimate;
            }
            results.push((model.model_id.clone(), outcome));
        }
        results
    }

    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Err(err) = self.stop(&id).await {
                warn!(model_id = %id, %err, "error stopping model during stop_all");
            }
        }
    }
}
