//! The decision engine.
//!
//! Single composition point for the whole pipeline: score, featurize,
//! discretize, decide, constrain, execute, reward, update, record. Every
//! collaborator failure degrades rather than aborts: a dead classifier
//! yields the neutral score, an unreadable checkpoint yields an empty
//! table, a failed forward is scored as if the request had been allowed.
//!
//! `process` takes `&self` and is safe to call from many threads at
//! once; all mutable state lives behind the sharded value table and
//! atomic counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{ConfigError, EngineConfig, Mode};
use crate::executor::{ActionExecutor, NullUpstream, Upstream};
use crate::features::{extract, Discretizer};
use crate::mode::ModeController;
use crate::policy::{Action, PolicyAgent};
use crate::record::{DecisionRecord, DecisionSink, JsonlSink, NullSink};
use crate::request::Request;
use crate::reward::RewardCalculator;
use crate::safety::SafetyLayer;
use crate::scorer::{AttackScorer, HeuristicScorer};

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    pub mode: Mode,
    pub requests_processed: u64,
    pub states_learned: usize,
    pub total_updates: u64,
    pub exploration_ratio: f64,
    pub exploration_rate: f32,
    pub learning_rate: f32,
    pub execution_counts: BTreeMap<&'static str, u64>,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    discretizer: Discretizer,
    agent: Arc<PolicyAgent>,
    safety: SafetyLayer,
    mode: Arc<ModeController>,
    executor: ActionExecutor,
    rewards: RewardCalculator,
    scorer: Arc<dyn AttackScorer>,
    sink: Arc<dyn DecisionSink>,
    checkpoints: Arc<CheckpointStore>,
    requests_processed: Arc<AtomicU64>,
    checkpoint_in_flight: Arc<AtomicBool>,
}

impl Engine {
    /// Build an engine with the default collaborators: heuristic scorer,
    /// no real upstream, and a JSONL sink when `decision_log_dir` is set.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_parts(
            config,
            Arc::new(NullUpstream),
            Arc::new(HeuristicScorer::new()),
            None,
        )
    }

    /// Build with explicit upstream and scorer. `sink` overrides the
    /// config-driven choice when given.
    pub fn with_parts(
        config: EngineConfig,
        upstream: Arc<dyn Upstream>,
        scorer: Arc<dyn AttackScorer>,
        sink: Option<Arc<dyn DecisionSink>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let discretizer = Discretizer::new(config.bins.clone()).map_err(ConfigError::Bins)?;
        let safety = SafetyLayer::new(&config.safety).map_err(ConfigError::Safety)?;
        let agent = Arc::new(PolicyAgent::new(
            config.exploration_rate,
            config.learning_rate,
            config.initial_value,
        ));
        let executor = ActionExecutor::new(upstream, config.executor.clone());
        let rewards = RewardCalculator::new(config.reward.clone());
        let mode = Arc::new(ModeController::new(config.mode));

        let sink: Arc<dyn DecisionSink> = match sink {
            Some(s) => s,
            None => match &config.decision_log_dir {
                Some(dir) => match JsonlSink::new(dir.clone()) {
                    Ok(s) => Arc::new(s),
                    Err(e) => {
                        warn!("decision log sink unavailable ({}), recording disabled", e);
                        Arc::new(NullSink)
                    }
                },
                None => Arc::new(NullSink),
            },
        };

        let checkpoints = Arc::new(CheckpointStore::new(config.checkpoint_path.clone()));
        let requests_processed = Arc::new(AtomicU64::new(0));

        // resume from the last checkpoint if one is compatible
        if checkpoints.exists() {
            match checkpoints.load() {
                Ok(cp) => {
                    agent.restore(&cp.table, cp.counters);
                    requests_processed.store(cp.total_requests, Ordering::Relaxed);
                    info!(
                        "restored checkpoint: {} states, {} updates, saved {}",
                        cp.table.entries.len(),
                        cp.counters.total_updates,
                        cp.saved_at
                    );
                }
                Err(e) => {
                    warn!("checkpoint unusable ({}), starting from empty table", e);
                }
            }
        }

        info!(
            "engine ready: mode={}, epsilon={}, alpha={}",
            config.mode, config.exploration_rate, config.learning_rate
        );

        Ok(Self {
            config,
            discretizer,
            agent,
            safety,
            mode,
            executor,
            rewards,
            scorer,
            sink,
            checkpoints,
            requests_processed,
            checkpoint_in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Run one request through the full pipeline and return its trace.
    pub fn process(&self, request: &Request) -> DecisionRecord {
        let attack_score = match self.scorer.score(request) {
            Ok(s) if s.is_finite() => s.clamp(0.0, 1.0),
            Ok(s) => {
                warn!("scorer returned non-finite score {}, using neutral", s);
                self.config.neutral_score
            }
            Err(e) => {
                warn!("scorer failed ({}), using neutral score", e);
                self.config.neutral_score
            }
        };

        let vector = extract::build(request, attack_score);
        let state = self.discretizer.discretize(&vector);

        let proposed = self.agent.decide(&state);
        let safety_adjusted = self.safety.adjust(request, proposed);
        let effective = self.mode.apply(safety_adjusted);

        let outcome = self.executor.execute(request, effective);

        // the reward judges the policy's own proposal, so learning
        // continues at full fidelity in passive mode
        let reward = self.rewards.reward(proposed, attack_score, &outcome);
        self.agent.update(&state, proposed, reward);

        debug!(
            "{} {} from {}: score={:.2} state={} proposed={} effective={} reward={:+.2}",
            request.method, request.path, request.source,
            attack_score, state, proposed, effective, reward
        );

        let record = DecisionRecord {
            request_id: request.id,
            timestamp: chrono::Utc::now(),
            method: request.method.clone(),
            path: request.path.clone(),
            source: request.source.clone(),
            state,
            attack_score,
            proposed,
            safety_adjusted,
            effective,
            outcome,
            reward,
            mode: self.mode.mode(),
        };

        if let Err(e) = self.sink.emit(&record) {
            warn!("decision sink emit failed: {}", e);
        }

        let processed = self.requests_processed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.checkpoint_interval > 0 && processed % self.config.checkpoint_interval == 0 {
            self.checkpoint_in_background(processed);
        }

        record
    }

    /// Snapshot and save off the decision path. Skipped when a previous
    /// save is still running.
    fn checkpoint_in_background(&self, processed: u64) {
        if self
            .checkpoint_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("checkpoint already in flight, skipping");
            return;
        }

        let agent = Arc::clone(&self.agent);
        let store = Arc::clone(&self.checkpoints);
        let in_flight = Arc::clone(&self.checkpoint_in_flight);

        std::thread::spawn(move || {
            let checkpoint = Checkpoint::new(agent.table_snapshot(), agent.counters(), processed);
            match store.save(&checkpoint) {
                Ok(()) => debug!(
                    "checkpoint saved: {} states at request {}",
                    checkpoint.table.entries.len(),
                    processed
                ),
                Err(e) => warn!("checkpoint save failed: {}", e),
            }
            in_flight.store(false, Ordering::Release);
        });
    }

    /// Synchronous save, for shutdown.
    pub fn save_checkpoint(&self) -> Result<(), crate::checkpoint::CheckpointError> {
        let checkpoint = Checkpoint::new(
            self.agent.table_snapshot(),
            self.agent.counters(),
            self.requests_processed.load(Ordering::Relaxed),
        );
        self.checkpoints.save(&checkpoint)
    }

    pub fn statistics(&self) -> EngineStatistics {
        let agent = self.agent.statistics();
        let counts = self.executor.execution_counts();
        let mut execution_counts = BTreeMap::new();
        for action in Action::ALL {
            execution_counts.insert(action.as_str(), counts[action.index()]);
        }
        EngineStatistics {
            mode: self.mode.mode(),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            states_learned: agent.table_size,
            total_updates: agent.total_updates,
            exploration_ratio: agent.exploration_ratio,
            exploration_rate: agent.exploration_rate,
            learning_rate: agent.learning_rate,
            execution_counts,
        }
    }

    pub fn mode_controller(&self) -> &ModeController {
        &self.mode
    }

    pub fn agent(&self) -> &PolicyAgent {
        &self.agent
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Outcome, UpstreamError};
    use crate::record::MemorySink;
    use crate::scorer::ScorerError;
    use std::time::Duration;

    struct FixedScorer(f32);

    impl AttackScorer for FixedScorer {
        fn score(&self, _request: &Request) -> Result<f32, ScorerError> {
            Ok(self.0)
        }
    }

    struct BrokenScorer;

    impl AttackScorer for BrokenScorer {
        fn score(&self, _request: &Request) -> Result<f32, ScorerError> {
            Err(ScorerError::Backend("model unavailable".into()))
        }
    }

    struct FailingUpstream;

    impl Upstream for FailingUpstream {
        fn forward(&self, _request: &Request, _timeout: Duration) -> Result<u16, UpstreamError> {
            Err(UpstreamError::Timeout)
        }
    }

    fn test_config(dir: &std::path::Path, mode: Mode) -> EngineConfig {
        EngineConfig {
            mode,
            // greedy so pipeline tests are deterministic after warmup
            exploration_rate: 0.0,
            checkpoint_interval: 0,
            checkpoint_path: dir.join("cp.json"),
            ..EngineConfig::default()
        }
    }

    fn engine_with(
        config: EngineConfig,
        upstream: Arc<dyn Upstream>,
        scorer: Arc<dyn AttackScorer>,
    ) -> (Engine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let dyn_sink: Arc<dyn DecisionSink> = sink.clone();
        let engine = Engine::with_parts(config, upstream, scorer, Some(dyn_sink)).unwrap();
        (engine, sink)
    }

    fn attack_request() -> Request {
        Request::new("GET", "/search", "203.0.113.50")
            .with_query("q=' OR '1'='1' UNION SELECT * FROM users --")
    }

    #[test]
    fn test_passive_mode_never_enforces_but_still_learns() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Passive);
        let (engine, sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(HeuristicScorer::new()),
        );

        for _ in 0..50 {
            let record = engine.process(&attack_request());
            assert_eq!(record.effective, Action::LogOnly);
        }
        assert!(engine.agent().statistics().total_updates >= 50);
        assert_eq!(sink.len(), 50);
    }

    #[test]
    fn test_repeated_attacks_converge_to_restrictive_action() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), Mode::Enforcing);
        config.exploration_rate = 0.3;
        let (engine, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.95)),
        );

        let req = Request::new("GET", "/search", "203.0.113.50").with_query("q=payload");
        for _ in 0..400 {
            engine.process(&req);
        }
        engine.agent().set_exploration_rate(0.0);
        let record = engine.process(&req);
        assert!(
            record.proposed.is_restrictive(),
            "converged to {} instead of a restrictive action",
            record.proposed
        );
    }

    #[test]
    fn test_repeated_benign_traffic_converges_to_allow() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), Mode::Enforcing);
        config.exploration_rate = 0.3;
        let (engine, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.05)),
        );

        let req = Request::new("GET", "/products", "198.51.100.7");
        for _ in 0..400 {
            engine.process(&req);
        }
        engine.agent().set_exploration_rate(0.0);
        let record = engine.process(&req);
        assert!(
            matches!(record.proposed, Action::Allow | Action::LogOnly | Action::Sanitize),
            "converged to {} for benign traffic",
            record.proposed
        );
    }

    #[test]
    fn test_safety_layer_downgrades_block_on_admin_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Enforcing);
        let (engine, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.99)),
        );

        let req = Request::new("POST", "/admin/users", "203.0.113.50");
        // push the policy toward Block first
        let state = engine.process(&req).state;
        for _ in 0..20 {
            engine.agent().update(&state, Action::Block, 1.0);
        }
        let record = engine.process(&req);
        assert_eq!(record.proposed, Action::Block);
        assert_eq!(record.safety_adjusted, Action::Challenge);
    }

    #[test]
    fn test_health_check_always_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Enforcing);
        let (engine, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.99)),
        );

        let record = engine.process(&Request::new("GET", "/health", "203.0.113.50"));
        assert_eq!(record.safety_adjusted, Action::Allow);
        assert_eq!(record.effective, Action::Allow);
    }

    #[test]
    fn test_scorer_failure_uses_neutral_score() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Passive);
        let (engine, _sink) = engine_with(config, Arc::new(NullUpstream), Arc::new(BrokenScorer));

        let record = engine.process(&Request::new("GET", "/products", "198.51.100.7"));
        assert_eq!(record.attack_score, 0.5);
    }

    #[test]
    fn test_upstream_failure_is_fail_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Enforcing);
        let (engine, _sink) = engine_with(
            config,
            Arc::new(FailingUpstream),
            Arc::new(FixedScorer(0.05)),
        );

        // seed the state so the next decision deterministically exploits Allow
        let req = Request::new("GET", "/products", "198.51.100.7");
        let vector = extract::build(&req, 0.05);
        let discretizer = Discretizer::new(crate::features::discretize::BinConfig::default()).unwrap();
        let state = discretizer.discretize(&vector);
        engine.agent().update(&state, Action::Allow, 1.0);

        let record = engine.process(&req);
        assert_eq!(record.proposed, Action::Allow);
        assert!(matches!(record.outcome, Outcome::Failed { .. }));
        // a request that failed to forward is scored as if it had been
        // allowed, never as a block
        assert!(record.reward > 0.0);
    }

    #[test]
    fn test_checkpoint_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Passive);

        let (engine, _sink) = engine_with(
            config.clone(),
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.95)),
        );
        let req = attack_request();
        for _ in 0..30 {
            engine.process(&req);
        }
        let before = engine.agent().statistics();
        engine.save_checkpoint().unwrap();

        let (reborn, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.95)),
        );
        let after = reborn.agent().statistics();
        assert_eq!(after.table_size, before.table_size);
        assert_eq!(after.total_updates, before.total_updates);
        assert_eq!(reborn.statistics().requests_processed, 30);
    }

    #[test]
    fn test_benign_request_allowed_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Enforcing);
        let (engine, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.0)),
        );

        let req = Request::new("GET", "/api/user", "198.51.100.7").with_query("id=123");
        let state = engine.process(&req).state;
        for _ in 0..20 {
            engine.agent().update(&state, Action::Allow, 1.0);
        }
        let record = engine.process(&req);
        assert_eq!(record.proposed, Action::Allow);
        assert_eq!(record.safety_adjusted, Action::Allow);
        assert_eq!(record.effective, Action::Allow);
        assert!(matches!(record.outcome, Outcome::Forwarded { status: 200 }));
        assert!(record.reward > 0.0);
    }

    #[test]
    fn test_passive_reward_judges_proposed_block() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Passive);
        let (engine, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.85)),
        );

        let req = Request::new("GET", "/login", "203.0.113.50").with_query("id=1' OR 1=1");
        let state = engine.process(&req).state;
        for _ in 0..20 {
            engine.agent().update(&state, Action::Block, 1.0);
        }
        let record = engine.process(&req);
        assert_eq!(record.proposed, Action::Block);
        // passive mode only logs, but the policy is credited for the block
        assert_eq!(record.effective, Action::LogOnly);
        assert!(record.reward > 0.0);
    }

    #[test]
    fn test_mode_flip_at_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), Mode::Passive);
        let (engine, _sink) = engine_with(
            config,
            Arc::new(NullUpstream),
            Arc::new(FixedScorer(0.05)),
        );

        assert!(!engine.mode_controller().is_enforcing());
        engine.mode_controller().set_enforcing(true);
        let record = engine.process(&Request::new("GET", "/products", "198.51.100.7"));
        assert_eq!(record.mode, Mode::Enforcing);
    }
}
