//! Adaptive WAF decision core.
//!
//! An inline, self-adapting request-filtering engine: each intercepted HTTP
//! request is summarized into a discrete state, a contextual-bandit policy
//! proposes an enforcement action, a rule-based safety layer applies hard
//! constraints the policy can never override, a mode controller downgrades
//! the action in passive deployments, the executor applies the result to the
//! traffic path, and the policy learns online from the scored outcome.
//!
//! ## Pipeline
//!
//! ```text
//! Request -> features -> policy -> safety -> mode -> executor
//!                          ^                            |
//!                          +-- update <- reward <-------+
//! ```
//!
//! Every stage fails open: a broken classifier, a stalled upstream or a bad
//! checkpoint degrade to allowing traffic and logging, never to dropping
//! requests or crashing the interception path.

pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod engine;
pub mod executor;
pub mod features;
pub mod mode;
pub mod policy;
pub mod record;
pub mod request;
pub mod reward;
pub mod safety;
pub mod scorer;

pub use config::{EngineConfig, Mode};
pub use engine::{Engine, EngineStatistics};
pub use executor::{ActionExecutor, HttpUpstream, NullUpstream, Outcome, Upstream};
pub use features::{Discretizer, FeatureVector, State};
pub use mode::ModeController;
pub use policy::{Action, PolicyAgent};
pub use record::{DecisionRecord, DecisionSink, JsonlSink, NullSink};
pub use request::Request;
pub use scorer::{AttackScorer, HeuristicScorer};
