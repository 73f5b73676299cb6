//! Selects a ready model for a requested tier: round-robin among equally
//! loaded candidates, tie-broken by lowest in-flight count, escalating to
//! neighboring tiers when the requested tier has nothing ready.

use dashmap::DashMap;
use orc_kernel::model::Tier;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouterError {
    #[error("no ready model available for tier {0} or its escalation chain")]
    NoModelAvailable(Tier),
}

pub type RouterResult<T> = Result<T, RouterError>;

/// The subset of a model's state the router needs: which tier it's in and
/// whether it is currently routable (supervisor state == Ready and
/// registry state == enabled).
#[derive(Debug, Clone)]
pub struct RoutableModel {
    pub model_id: String,
    pub tier: Tier,
}

/// A guard returned by [`Router::select`]; dropping it decrements the
/// model's in-flight counter. Engine code should hold this for the
/// duration of the generation call.
pub struct InFlightGuard<'a> {
    router: &'a Router,
    model_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.router.in_flight.get(&self.model_id) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct Router {
    cursors: [AtomicUsize; 3],
    in_flight: DashMap<String, AtomicU32>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn tier_slot(tier: Tier) -> usize {
    match tier {
        Tier::Fast => 0,
        Tier::Balanced => 1,
        Tier::Powerful => 2,
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            cursors: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            in_flight: DashMap::new(),
        }
    }

    fn in_flight_count(&self, model_id: &str) -> u32 {
        self.in_flight
            .get(model_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn pick_from_tier<'a>(&self, tier: Tier, candidates: &'a [RoutableModel]) -> Option<&'a RoutableModel> {
        let in_tier: Vec<&RoutableModel> = candidates.iter().filter(|m| m.tier == tier).collect();
        if in_tier.is_empty() {
            return None;
        }

        let min_load = in_tier
            .iter()
            .map(|m| self.in_flight_count(&m.model_id))
            .min()
            .unwrap();
        let least_loaded: Vec<&&RoutableModel> =
            in_tier.iter().filter(|m| self.in_flight_count(&m.model_id) == min_load).collect();

        let cursor = &self.cursors[tier_slot(tier)];
        let idx = cursor.fetch_add(1, Ordering::SeqCst) % least_loaded.len();
        Some(*least_loaded[idx])
    }

    /// Select a model for `requested_tier`, escalating through
    /// [`Tier::escalation_order`] if nothing in that tier is available.
    pub fn select<'a>(
        &'a self,
        requested_tier: Tier,
        candidates: &[RoutableModel],
    ) -> RouterResult<(String, InFlightGuard<'a>)> {
        let mut tiers_to_try = vec![requested_tier];
        tiers_to_try.extend(requested_tier.escalation_order());

        for tier in tiers_to_try {
            if let Some(chosen) = self.pick_from_tier(tier, candidates) {
                let model_id = chosen.model_id.clone();
                self.in_flight
                    .entry(model_id.clone())
                    .or_insert_with(|| AtomicU32::new(0))
                    .fetch_add(1, Ordering::SeqCst);
                debug!(
                    requested_tier = ?requested_tier,
                    selected_tier = ?tier,
                    model_id = %model_id,
                    escalated = tier != requested_tier,
                    "routed query to model"
                );
                return Ok((
                    model_id.clone(),
                    InFlightGuard {
                        router: self,
                        model_id,
                    },
                ));
            }
        }

        warn!(requested_tier = ?requested_tier, "no ready model for tier or its escalation chain");
        Err(RouterError::NoModelAvailable(requested_tier))
    }
}
