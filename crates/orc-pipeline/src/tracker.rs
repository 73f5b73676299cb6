//! Per-query pipeline state machine: tracks which stage a query is in,
//! rejects backwards transitions, and periodically sweeps stale entries.

use crate::bus::EventBus;
use dashmap::DashMap;
use orc_kernel::event::{Event, EventType, Severity};
use orc_kernel::model::Tier;
use orc_kernel::pipeline::{
    OverallStatus, Pipeline, PipelineError, PipelineResult, Stage, StageName, StageStatus,
};
use std::collections::HashMap;
use std::sync::Arc;

pub struct PipelineTracker {
    pipelines: DashMap<String, Pipeline>,
    bus: Arc<EventBus>,
}

fn new_stage(name: StageName) -> Stage {
    Stage {
        name,
        status: StageStatus::Active,
        start: chrono::Utc::now(),
        end: None,
        duration_ms: None,
        metadata: HashMap::new(),
    }
}

impl PipelineTracker {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            pipelines: DashMap::new(),
            bus,
        }
    }

    /// Open a new pipeline at [`StageName::Input`]. Errors if `query_id` is
    /// already tracked.
    pub fn open(&self, query_id: impl Into<String>) -> PipelineResult<()> {
        let query_id = query_id.into();
        if self.pipelines.contains_key(&query_id) {
            return Err(PipelineError::AlreadyExists(query_id));
        }
        let pipeline = Pipeline {
            query_id: query_id.clone(),
            stages: vec![new_stage(StageName::Input)],
            current_stage: StageName::Input,
            overall_status: OverallStatus::Processing,
            model_selected: None,
            tier: None,
            cgrag_artifacts_count: None,
            created_at: chrono::Utc::now(),
            error: None,
        };
        self.pipelines.insert(query_id.clone(), pipeline);
        self.bus.publish(
            Event::new(
                EventType::PipelineStageStart,
                Severity::Info,
                format!("pipeline {query_id} opened"),
            )
            .with_metadata("query_id", query_id)
            .with_metadata("stage", "input"),
        );
        Ok(())
    }

    /// Transition into `stage`. Completes the current stage, appends the
    /// new one as `Active`. Entering a stage whose rank is behind the
    /// current one is rejected; entering the same stage twice or skipping
    /// ahead is allowed (stages can be bypassed, e.g. CGRAG disabled).
    pub fn enter(&self, query_id: &str, stage: StageName) -> PipelineResult<()> {
        let mut pipeline = self
            .pipelines
            .get_mut(query_id)
            .ok_or_else(|| PipelineError::NotFound(query_id.to_string()))?;

        if pipeline.overall_status != OverallStatus::Processing {
            return Err(PipelineError::NotProcessing(query_id.to_string()));
        }
        if stage.rank() < pipeline.current_stage.rank() {
            return Err(PipelineError::BackwardsTransition {
                current: pipeline.current_stage,
                attempted: stage,
            });
        }

        let now = chrono::Utc::now();
        if let Some(last) = pipeline.stages.last_mut() {
            if last.status == StageStatus::Active {
                last.status = StageStatus::Completed;
                last.end = Some(now);
                last.duration_ms = Some((now - last.start).num_milliseconds().max(0) as u64);
            }
        }
        pipeline.stages.push(new_stage(stage));
        pipeline.current_stage = stage;
        drop(pipeline);

        self.bus.publish(
            Event::new(
                EventType::PipelineStageComplete,
                Severity::Info,
                format!("pipeline {query_id} entered stage {stage:?}"),
            )
            .with_metadata("query_id", query_id)
            .with_metadata("stage", format!("{stage:?}")),
        );
        Ok(())
    }

    pub fn set_routing_result(&self, query_id: &str, model_id: String, tier: Tier) -> PipelineResult<()> {
        let mut pipeline = self
            .pipelines
            .get_mut(query_id)
            .ok_or_else(|| PipelineError::NotFound(query_id.to_string()))?;
        pipeline.model_selected = Some(model_id);
        pipeline.tier = Some(tier);
        Ok(())
    }

    pub fn set_cgrag_artifacts(&self, query_id: &str, count: usize) -> PipelineResult<()> {
        let mut pipeline = self
            .pipelines
            .get_mut(query_id)
            .ok_or_else(|| PipelineError::NotFound(query_id.to_string()))?;
        pipeline.cgrag_artifacts_count = Some(count);
        Ok(())
    }

    pub fn complete(&self, query_id: &str) -> PipelineResult<()> {
        let mut pipeline = self
            .pipelines
            .get_mut(query_id)
            .ok_or_else(|| PipelineError::NotFound(query_id.to_string()))?;
        if pipeline.overall_status != OverallStatus::Processing {
            return Err(PipelineError::NotProcessing(query_id.to_string()));
        }
        let now = chrono::Utc::now();
        if let Some(last) = pipeline.stages.last_mut() {
            last.status = StageStatus::Completed;
            last.end = Some(now);
            last.duration_ms = Some((now - last.start).num_milliseconds().max(0) as u64);
        }
        pipeline.overall_status = OverallStatus::Completed;
        drop(pipeline);

        self.bus.publish(
            Event::new(
                EventType::PipelineComplete,
                Severity::Info,
                format!("pipeline {query_id} completed"),
            )
            .with_metadata("query_id", query_id),
        );
        Ok(())
    }

    pub fn fail(&self, query_id: &str, error: impl Into<String>) -> PipelineResult<()> {
        let error = error.into();
        let mut pipeline = self
            .pipelines
            .get_mut(query_id)
            .ok_or_else(|| PipelineError::NotFound(query_id.to_string()))?;
        let now = chrono::Utc::now();
        if let Some(last) = pipeline.stages.last_mut() {
            last.status = StageStatus::Failed;
            last.end = Some(now);
            last.duration_ms = Some((now - last.start).num_milliseconds().max(0) as u64);
        }
        pipeline.overall_status = OverallStatus::Failed;
        pipeline.error = Some(error.clone());
        drop(pipeline);

        self.bus.publish(
            Event::new(
                EventType::PipelineFailed,
                Severity::Error,
                format!("pipeline {query_id} failed: {error}"),
            )
            .with_metadata("query_id", query_id)
            .with_metadata("error", error),
        );
        Ok(())
    }

    pub fn get(&self, query_id: &str) -> PipelineResult<Pipeline> {
        self.pipelines
            .get(query_id)
            .map(|p| p.clone())
            .ok_or_else(|| PipelineError::NotFound(query_id.to_string()))
    }

    pub fn stats(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for entry in self.pipelines.iter() {
            let key = format!("{:?}", entry.overall_status);
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Remove stale pipelines (spec §3: 1h for completed/failed, 15m for
    /// orphaned `processing`). Returns the number removed.
    pub fn sweep(&self, now: chrono::DateTime<chrono::Utc>) -> usize {
        let stale_ids: Vec<String> = self
            .pipelines
            .iter()
            .filter(|entry| entry.is_stale(now))
            .map(|entry| entry.key().clone())
            .collect();
        for id in &stale_ids {
            self.pipelines.remove(id);
        }
        stale_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LagPolicy;

    fn tracker() -> PipelineTracker {
        PipelineTracker::new(Arc::new(EventBus::new(64, LagPolicy::SkipAndContinue)))
    }

    #[test]
    fn open_then_enter_advances_stage() {
        let t = tracker();
        t.open("q1").unwrap();
        t.enter("q1", StageName::Complexity).unwrap();
        let p = t.get("q1").unwrap();
        assert_eq!(p.current_stage, StageName::Complexity);
        assert_eq!(p.stages[0].status, StageStatus::Completed);
    }

    #[test]
    fn backwards_transition_is_rejected() {
        let t = tracker();
        t.open("q1").unwrap();
        t.enter("q1", StageName::Routing).unwrap();
        let result = t.enter("q1", StageName::Complexity);
        assert!(matches!(result, Err(PipelineError::BackwardsTransition { .. })));
    }

    #[test]
    fn opening_duplicate_query_id_errors() {
        let t = tracker();
        t.open("q1").unwrap();
        assert!(matches!(t.open("q1"), Err(PipelineError::AlreadyExists(_))));
    }

    #[test]
    fn complete_sets_overall_status() {
        let t = tracker();
        t.open("q1").unwrap();
        t.complete("q1").unwrap();
        let p = t.get("q1").unwrap();
        assert_eq!(p.overall_status, OverallStatus::Completed);
    }

    #[test]
    fn fail_records_error_message() {
        let t = tracker();
        t.open("q1").unwrap();
        t.fail("q1", "no model available").unwrap();
        let p = t.get("q1").unwrap();
        assert_eq!(p.overall_status, OverallStatus::Failed);
        assert_eq!(p.error.as_deref(), Some("no model available"));
    }

    #[test]
    fn entering_after_completion_is_rejected() {
        let t = tracker();
        t.open("q1").unwrap();
        t.complete("q1").unwrap();
        let result = t.enter("q1", StageName::Response);
        assert!(matches!(result, Err(PipelineError::NotProcessing(_))));
    }

    #[test]
    fn sweep_removes_old_completed_pipelines() {
        let t = tracker();
        t.open("q1").unwrap();
        t.complete("q1").unwrap();
        let removed = t.sweep(chrono::Utc::now() + chrono::Duration::hours(2));
        assert_eq!(removed, 1);
        assert!(t.get("q1").is_err());
    }
}
