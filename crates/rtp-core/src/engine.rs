use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rtp_contracts::{DriftMode, DriftState, EngineConfig, EngineSnapshot, GameKey};

use crate::clock::{Clock, SystemClock};
use crate::sampler::{DriftSampler, StdSampler};

/// Hard band for the simulated metric.
const VALUE_FLOOR: f64 = 0.0;
const VALUE_CEILING: f64 = 98.5;

/// Fresh entities seed inside the normal band.
const SEED_LOW: f64 = 95.0;
const SEED_HIGH: f64 = 98.5;

/// Floor-bounce restart band.
const BOUNCE_LOW: f64 = 88.0;
const BOUNCE_HIGH: f64 = 92.0;

/// Recovery climbs slowly until it re-enters the normal band at 95.
const RECOVERY_EXIT: f64 = 95.0;
const CLIMB_LOW: f64 = 0.01;
const CLIMB_HIGH: f64 = 0.03;

/// Normal drift: downward with probability 0.65, else upward.
const DOWN_PROBABILITY: f64 = 0.65;
const DOWN_DELTA_LOW: f64 = 0.005;
const DOWN_DELTA_HIGH: f64 = 0.03;
const UP_DELTA_LOW: f64 = 0.005;
const UP_DELTA_HIGH: f64 = 0.02;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One transition of the two-regime walk. Draw order is fixed: the branch
/// draw (if any) precedes the delta draw, so scripted samplers replay exactly.
fn step_update(state: &mut DriftState, sampler: &mut dyn DriftSampler) {
    let mut value = state.value;
    let mut mode = state.mode;

    if value <= VALUE_FLOOR {
        // Soft restart: the metric never stays pinned at zero.
        value = sampler.next_range(BOUNCE_LOW, BOUNCE_HIGH);
        mode = DriftMode::Recovery;
    } else if mode == DriftMode::Recovery {
        if value < RECOVERY_EXIT {
            value += sampler.next_range(CLIMB_LOW, CLIMB_HIGH);
        } else {
            // The flip back to normal applies no drift in the same step.
            mode = DriftMode::Normal;
        }
    } else {
        let u = sampler.next_unit();
        if u < DOWN_PROBABILITY {
            value -= sampler.next_range(DOWN_DELTA_LOW, DOWN_DELTA_HIGH);
        } else {
            value += sampler.next_range(UP_DELTA_LOW, UP_DELTA_HIGH);
        }
    }

    state.value = round2(value.clamp(VALUE_FLOOR, VALUE_CEILING));
    state.mode = mode;
}

/// Owns every namespace's drift table and advances it by elapsed whole steps.
/// There is no ambient singleton: the host constructs one engine and passes it
/// around.
pub struct RtpEngine {
    config: EngineConfig,
    namespaces: BTreeMap<String, BTreeMap<GameKey, DriftState>>,
    clock: Arc<dyn Clock>,
    sampler: Box<dyn DriftSampler>,
}

impl std::fmt::Debug for RtpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpEngine")
            .field("config", &self.config)
            .field("namespaces", &self.namespaces.len())
            .finish()
    }
}

impl RtpEngine {
    pub fn from_config(config: EngineConfig) -> Self {
        let sampler = StdSampler::seed_from_u64(config.seed);
        Self::with_parts(config, Arc::new(SystemClock), Box::new(sampler))
    }

    pub fn with_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        sampler: Box<dyn DriftSampler>,
    ) -> Self {
        Self {
            config,
            namespaces: BTreeMap::new(),
            clock,
            sampler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    pub fn namespace_len(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn peek(&self, namespace: &str, key: &GameKey) -> Option<&DriftState> {
        self.namespaces.get(namespace)?.get(key)
    }

    /// Ensure state for every catalog key, replay elapsed whole steps, prune
    /// keys the catalog no longer lists, and return the namespace table.
    ///
    /// Never fails: unknown keys are new entities, an empty catalog clears
    /// the namespace. Calls inside the same step window apply nothing.
    pub fn advance(
        &mut self,
        namespace: &str,
        catalog_keys: &[GameKey],
    ) -> &BTreeMap<GameKey, DriftState> {
        let now = self.clock.now_ms();
        let step_ms = self.config.step_ms.max(1);
        let replay_cap = u64::from(self.config.max_replay_steps.max(1));

        let states = self.namespaces.entry(namespace.to_string()).or_default();

        for key in catalog_keys {
            if !states.contains_key(key) {
                // Seeds round like stepped values so one-step deltas stay
                // whole hundredths, bounded by the max per-step drift.
                states.insert(
                    key.clone(),
                    DriftState {
                        value: round2(self.sampler.next_range(SEED_LOW, SEED_HIGH)),
                        mode: DriftMode::Normal,
                        last_advanced_at: now,
                    },
                );
            }
        }

        for key in catalog_keys {
            let Some(state) = states.get_mut(key) else {
                continue;
            };
            let elapsed = now.saturating_sub(state.last_advanced_at);
            let steps = elapsed / step_ms;
            if steps == 0 {
                continue;
            }
            // The whole backlog is consumed even when the replay is capped, so
            // a long-idle namespace costs one bounded pass instead of
            // drip-replaying thousands of transitions.
            for _ in 0..steps.min(replay_cap) {
                step_update(state, self.sampler.as_mut());
            }
            state.last_advanced_at += steps * step_ms;
        }

        let valid: BTreeSet<&GameKey> = catalog_keys.iter().collect();
        states.retain(|key, _| valid.contains(key));

        &*states
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::new(self.namespaces.clone())
    }

    /// Replace all namespace state, e.g. from a persisted snapshot at boot.
    pub fn restore(&mut self, snapshot: EngineSnapshot) {
        self.namespaces = snapshot.namespaces;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sampler::ScriptedSampler;
    use rtp_contracts::STEP_MS;

    fn engine_with(clock: Arc<ManualClock>, script: Vec<f64>) -> RtpEngine {
        RtpEngine::with_parts(
            EngineConfig::default(),
            clock,
            Box::new(ScriptedSampler::new(script)),
        )
    }

    fn key(provider: &str, code: &str) -> GameKey {
        GameKey::new(provider, code)
    }

    fn seeded_state(value: f64, mode: DriftMode, last_advanced_at: u64) -> DriftState {
        DriftState {
            value,
            mode,
            last_advanced_at,
        }
    }

    fn inject(engine: &mut RtpEngine, namespace: &str, key: &GameKey, state: DriftState) {
        let mut namespaces = engine.snapshot().namespaces;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.clone(), state);
        engine.restore(EngineSnapshot::new(namespaces));
    }

    #[test]
    fn fresh_entities_seed_in_band_and_normal() {
        let clock = Arc::new(ManualClock::new(0));
        // 0.0 and ~1.0 hit both ends of the seeding range.
        let mut engine = engine_with(clock, vec![0.0, 0.999_999]);
        let a = key("PP", "g1");
        let b = key("PP", "g2");

        let states = engine.advance("ns1", &[a.clone(), b.clone()]);
        for k in [&a, &b] {
            let state = &states[k];
            assert!((95.0..=98.5).contains(&state.value), "value {}", state.value);
            assert_eq!(state.mode, DriftMode::Normal);
            assert_eq!(state.last_advanced_at, 0);
        }
    }

    #[test]
    fn no_step_applies_within_one_window() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.5]);
        let g = key("PP", "g1");

        let first = engine.advance("ns1", &[g.clone()]).clone();
        clock.set(STEP_MS - 1);
        let second = engine.advance("ns1", &[g.clone()]).clone();
        assert_eq!(first, second);

        // Repeating the call with no time passage is also a no-op.
        let third = engine.advance("ns1", &[g]).clone();
        assert_eq!(second, third);
    }

    #[test]
    fn elapsed_steps_quantize_to_whole_windows() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.5]);
        let g = key("PP", "g1");
        engine.advance("ns1", &[g.clone()]);

        // 7.5 windows elapse; exactly 7 transitions apply.
        clock.set(STEP_MS * 15 / 2);
        engine.advance("ns1", &[g.clone()]);
        let state = engine.peek("ns1", &g).expect("state");
        assert_eq!(state.last_advanced_at, 7 * STEP_MS);
    }

    #[test]
    fn partial_interval_is_not_double_counted() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.5]);
        let g = key("PP", "g1");
        engine.advance("ns1", &[g.clone()]);

        clock.set(STEP_MS + 5_000);
        engine.advance("ns1", &[g.clone()]);
        assert_eq!(
            engine.peek("ns1", &g).expect("state").last_advanced_at,
            STEP_MS
        );

        // The dangling 5s joins the next window instead of being lost.
        clock.set(2 * STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        assert_eq!(
            engine.peek("ns1", &g).expect("state").last_advanced_at,
            2 * STEP_MS
        );
    }

    #[test]
    fn floor_bounce_enters_recovery_in_restart_band() {
        let clock = Arc::new(ManualClock::new(0));
        // Single draw 0.5 -> bounce lands at 90.0.
        let mut engine = engine_with(clock.clone(), vec![0.5]);
        let g = key("PP", "g1");
        inject(&mut engine, "ns1", &g, seeded_state(0.0, DriftMode::Normal, 0));

        clock.set(STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        let state = engine.peek("ns1", &g).expect("state");
        assert_eq!(state.mode, DriftMode::Recovery);
        assert!((88.0..=92.0).contains(&state.value), "value {}", state.value);
        assert_eq!(state.value, 90.0);
    }

    #[test]
    fn recovery_climb_is_slow_and_bounded() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.0]);
        let g = key("PP", "g1");
        inject(
            &mut engine,
            "ns1",
            &g,
            seeded_state(90.0, DriftMode::Recovery, 0),
        );

        clock.set(STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        let state = engine.peek("ns1", &g).expect("state");
        assert_eq!(state.mode, DriftMode::Recovery);
        assert!(
            (90.01..=90.03).contains(&state.value),
            "value {}",
            state.value
        );
    }

    #[test]
    fn recovery_exits_at_95_without_drifting_in_the_same_step() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.9]);
        let g = key("PP", "g1");
        inject(
            &mut engine,
            "ns1",
            &g,
            seeded_state(95.0, DriftMode::Recovery, 0),
        );

        clock.set(STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        let state = engine.peek("ns1", &g).expect("state");
        assert_eq!(state.mode, DriftMode::Normal);
        assert_eq!(state.value, 95.0);
    }

    #[test]
    fn normal_drift_is_downward_biased_and_bounded() {
        let clock = Arc::new(ManualClock::new(0));
        // u=0.64 (down branch), delta draw 1.0-ish -> max downward delta.
        let mut engine = engine_with(clock.clone(), vec![0.64, 0.999_999_9]);
        let g = key("PP", "g1");
        inject(
            &mut engine,
            "ns1",
            &g,
            seeded_state(96.0, DriftMode::Normal, 0),
        );

        clock.set(STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        let down = engine.peek("ns1", &g).expect("state").value;
        assert!((95.97..96.0).contains(&down), "value {down}");

        // u=0.65 sits on the boundary and takes the up branch.
        let mut engine = engine_with(Arc::new(ManualClock::new(STEP_MS)), vec![0.65, 0.999_999_9]);
        inject(&mut engine, "ns1", &g, seeded_state(96.0, DriftMode::Normal, 0));
        engine.advance("ns1", &[g.clone()]);
        let up = engine.peek("ns1", &g).expect("state").value;
        assert!((96.0..=96.02).contains(&up), "value {up}");
    }

    #[test]
    fn value_clamps_to_ceiling() {
        let clock = Arc::new(ManualClock::new(0));
        // Up branch with max delta from just under the ceiling.
        let mut engine = engine_with(clock.clone(), vec![0.99, 0.999_999_9]);
        let g = key("PP", "g1");
        inject(
            &mut engine,
            "ns1",
            &g,
            seeded_state(98.49, DriftMode::Normal, 0),
        );

        clock.set(STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        assert_eq!(engine.peek("ns1", &g).expect("state").value, 98.5);
    }

    #[test]
    fn values_are_rounded_to_two_decimals() {
        let clock = Arc::new(ManualClock::new(0));
        // Recovery climb draw 0.123 -> delta 0.01246, rounds away.
        let mut engine = engine_with(clock.clone(), vec![0.123]);
        let g = key("PP", "g1");
        inject(
            &mut engine,
            "ns1",
            &g,
            seeded_state(90.0, DriftMode::Recovery, 0),
        );

        clock.set(STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        let value = engine.peek("ns1", &g).expect("state").value;
        assert_eq!(value, round2(value));
    }

    #[test]
    fn stale_keys_are_pruned() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock, vec![0.5]);
        let a = key("PP", "g1");
        let b = key("JILI", "g2");
        engine.advance("ns1", &[a.clone(), b.clone()]);
        assert_eq!(engine.namespace_len("ns1"), 2);

        let states = engine.advance("ns1", &[a.clone()]);
        assert_eq!(states.len(), 1);
        assert!(states.contains_key(&a));
        assert!(engine.peek("ns1", &b).is_none());
    }

    #[test]
    fn empty_catalog_clears_the_namespace() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock, vec![0.5]);
        let g = key("PP", "g1");
        engine.advance("ns1", &[g]);

        let states = engine.advance("ns1", &[]);
        assert!(states.is_empty());
        // The namespace itself survives for process lifetime.
        assert_eq!(engine.namespace_count(), 1);
    }

    #[test]
    fn namespaces_are_independent() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.1, 0.2, 0.3, 0.4]);
        let g = key("PP", "g1");
        engine.advance("https://wegobet.asia", &[g.clone()]);
        engine.advance("https://i88sg.com", &[g.clone()]);

        clock.set(STEP_MS);
        engine.advance("https://wegobet.asia", &[g.clone()]);

        let advanced = engine.peek("https://wegobet.asia", &g).expect("state");
        let untouched = engine.peek("https://i88sg.com", &g).expect("state");
        assert_eq!(advanced.last_advanced_at, STEP_MS);
        assert_eq!(untouched.last_advanced_at, 0);
    }

    #[test]
    fn replay_is_capped_but_backlog_is_consumed() {
        let clock = Arc::new(ManualClock::new(0));
        let mut config = EngineConfig::default();
        config.max_replay_steps = 4;
        let mut engine = RtpEngine::with_parts(
            config,
            clock.clone(),
            // Recovery climbs of exactly 0.01 make applied steps countable.
            Box::new(ScriptedSampler::new(vec![0.0])),
        );
        let g = key("PP", "g1");
        inject(
            &mut engine,
            "ns1",
            &g,
            seeded_state(90.0, DriftMode::Recovery, 0),
        );

        clock.set(10 * STEP_MS);
        engine.advance("ns1", &[g.clone()]);
        let state = engine.peek("ns1", &g).expect("state");
        // 4 of 10 steps applied, all 10 consumed.
        assert_eq!(state.value, 90.04);
        assert_eq!(state.last_advanced_at, 10 * STEP_MS);

        // An immediate follow-up call has no backlog left.
        engine.advance("ns1", &[g.clone()]);
        assert_eq!(engine.peek("ns1", &g).expect("state").value, 90.04);
    }

    #[test]
    fn concrete_scenario_one_step_at_185s() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.3, 0.5]);
        let g = key("PP", "g1");

        let value0 = engine.advance("ns1", &[g.clone()])[&g].value;
        assert!((95.0..=98.5).contains(&value0));

        clock.set(185_000);
        let state = engine.advance("ns1", &[g.clone()])[&g];
        assert_eq!(state.last_advanced_at, 180_000);
        assert!(
            (state.value - value0).abs() <= 0.03 + 1e-9,
            "delta {} too large",
            (state.value - value0).abs()
        );
    }

    #[test]
    fn snapshot_restore_round_trips_state() {
        let clock = Arc::new(ManualClock::new(0));
        let mut engine = engine_with(clock.clone(), vec![0.5]);
        let g = key("PP", "g1");
        engine.advance("ns1", &[g.clone()]);

        let snapshot = engine.snapshot();
        let mut restored = engine_with(Arc::new(ManualClock::new(0)), vec![0.5]);
        restored.restore(snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.namespace_len("ns1"), 1);
    }
}
