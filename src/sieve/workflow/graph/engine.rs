// SPDX-License-Identifier: MIT

//! Execution engine
//!
//! Drives a run: entry stage -> executor -> resolver -> next stage, until a
//! terminal directive, the step budget, or cancellation. Exactly one stage
//! runs at a time and every path returns a usable state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::sieve::config::EngineConfig;
use crate::sieve::stages::Stage;
use crate::sieve::workflow::state::{merge, StateUpdate, WorkflowState};

use super::executor::StageExecutor;
use super::routing::{RouteTarget, Router};

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A terminal directive was resolved
    Completed,
    /// The step budget ran out; the review stage got its one forced run
    BudgetExhausted,
    /// Cancelled or past the run deadline
    Cancelled,
}

/// Final state of a run and how it ended
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: WorkflowState,
    pub termination: Termination,
}

/// Progress events emitted by [`ExecutionEngine::run_stream`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    StageStarted { stage: String, step: usize },
    StageCompleted { stage: String, description: String },
    StageFailed { stage: String, error: String },
    Routed {
        from: String,
        directive: Option<String>,
        to: String,
    },
    BudgetExhausted { steps: usize, review_stage: String },
    Cancelled { reason: String },
    Finished { termination: Termination, steps: usize },
}

/// Cyclic workflow engine over a set of stages and their routing tables
pub struct ExecutionEngine {
    name: String,
    entry: String,
    stages: HashMap<String, Arc<dyn Stage>>,
    router: Router,
    executor: StageExecutor,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create an engine. Prefer [`crate::sieve::workflow::Builder`], which
    /// validates the topology first.
    pub fn new(
        name: impl Into<String>,
        entry: impl Into<String>,
        stages: HashMap<String, Arc<dyn Stage>>,
        router: Router,
        config: EngineConfig,
    ) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            stages,
            router,
            executor: StageExecutor::new(config.stage_timeout()),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage ids in sorted order
    pub fn stage_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.stages.keys().map(|s| s.as_str()).collect();
        ids.sort();
        ids
    }

    /// Run to termination
    pub async fn run(&self, state: WorkflowState) -> RunOutcome {
        self.drive(state, &CancellationToken::new(), None).await
    }

    /// Run until termination or until `token` is cancelled
    pub async fn run_until(&self, state: WorkflowState, token: &CancellationToken) -> RunOutcome {
        self.drive(state, token, None).await
    }

    /// Run with progress events sent on `tx`. A dropped receiver does not
    /// affect the run.
    pub async fn run_stream(
        &self,
        state: WorkflowState,
        token: &CancellationToken,
        tx: mpsc::Sender<EngineEvent>,
    ) -> RunOutcome {
        self.drive(state, token, Some(&tx)).await
    }

    async fn drive(
        &self,
        mut state: WorkflowState,
        token: &CancellationToken,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) -> RunOutcome {
        let deadline = self.config.run_timeout().map(|d| Instant::now() + d);
        let mut next = RouteTarget::Stage(self.entry.clone());

        log::info!(
            "Starting workflow {} for document {} at {}",
            self.name,
            state.document_id,
            self.entry
        );

        loop {
            let stage_id = match next {
                RouteTarget::Terminal => {
                    return self.finish(state, Termination::Completed, events).await
                }
                RouteTarget::Stage(id) => id,
            };

            if let Some(reason) = cancellation_reason(token, deadline) {
                log::warn!("Run cancelled before stage {}: {}", stage_id, reason);
                state = merge(
                    &state,
                    StateUpdate::new().error(format!(
                        "[engine] run ended early before '{}' after {} steps: {}",
                        stage_id,
                        state.step_count(),
                        reason
                    )),
                );
                emit(events, EngineEvent::Cancelled { reason }).await;
                return self.finish(state, Termination::Cancelled, events).await;
            }

            let forced = state.step_count() >= self.config.step_budget;
            let stage_id = if forced {
                log::warn!(
                    "Step budget {} exhausted, forcing {}",
                    self.config.step_budget,
                    self.config.review_stage
                );
                emit(
                    events,
                    EngineEvent::BudgetExhausted {
                        steps: state.step_count(),
                        review_stage: self.config.review_stage.clone(),
                    },
                )
                .await;
                self.config.review_stage.clone()
            } else {
                stage_id
            };

            let Some(stage) = self.stages.get(&stage_id) else {
                log::error!("Stage {} is not part of workflow {}", stage_id, self.name);
                let termination = if forced {
                    Termination::BudgetExhausted
                } else {
                    Termination::Completed
                };
                return self.finish(state, termination, events).await;
            };

            let step = state.step_count() + 1;
            log::info!("Executing stage {} (step {})", stage_id, step);
            emit(
                events,
                EngineEvent::StageStarted {
                    stage: stage_id.clone(),
                    step,
                },
            )
            .await;

            let run = self.executor.execute(stage.as_ref(), &state).await;
            state = run.state;
            let event = match run.failure {
                Some(error) => EngineEvent::StageFailed {
                    stage: stage_id.clone(),
                    error,
                },
                None => EngineEvent::StageCompleted {
                    stage: stage_id.clone(),
                    description: run.description,
                },
            };
            emit(events, event).await;

            if forced {
                return self.finish(state, Termination::BudgetExhausted, events).await;
            }

            next = self.router.resolve(&stage_id, &state);
            emit(
                events,
                EngineEvent::Routed {
                    from: stage_id,
                    directive: state.directive.clone(),
                    to: next.to_string(),
                },
            )
            .await;
            state = merge(&state, StateUpdate::new().clear_directive());
        }
    }

    async fn finish(
        &self,
        state: WorkflowState,
        termination: Termination,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) -> RunOutcome {
        log::info!(
            "Workflow {} finished ({:?}) after {} steps, {} errors",
            self.name,
            termination,
            state.step_count(),
            state.errors.len()
        );
        emit(
            events,
            EngineEvent::Finished {
                termination,
                steps: state.step_count(),
            },
        )
        .await;
        RunOutcome { state, termination }
    }
}

fn cancellation_reason(token: &CancellationToken, deadline: Option<Instant>) -> Option<String> {
    if token.is_cancelled() {
        return Some("cancelled".to_string());
    }
    match deadline {
        Some(at) if Instant::now() >= at => Some("run timeout elapsed".to_string()),
        _ => None,
    }
}

async fn emit(events: Option<&mpsc::Sender<EngineEvent>>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::StageError;
    use crate::sieve::stages::StageOutput;
    use crate::sieve::workflow::graph::routing::RoutingTable;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stage that always writes the same directive and counts invocations
    struct MockStage {
        name: String,
        directive: Option<String>,
        calls: AtomicUsize,
    }

    impl MockStage {
        fn new(name: &str, directive: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                directive: directive.map(|d| d.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Stage for MockStage {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process(&self, _state: &WorkflowState) -> Result<StageOutput, StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut update = StateUpdate::new();
            if let Some(d) = &self.directive {
                update = update.directive(d.as_str());
            }
            Ok(StageOutput::new(update, "ran"))
        }
    }

    fn stage(id: &str) -> RouteTarget {
        RouteTarget::Stage(id.to_string())
    }

    fn engine(
        stages: Vec<Arc<MockStage>>,
        routes: Vec<(&str, RoutingTable)>,
        config: EngineConfig,
    ) -> ExecutionEngine {
        let entry = stages[0].name.clone();
        let stages: HashMap<String, Arc<dyn Stage>> = stages
            .into_iter()
            .map(|s| (s.name.clone(), s as Arc<dyn Stage>))
            .collect();
        let mut router = Router::new();
        for (id, table) in routes {
            router.insert(id, table);
        }
        ExecutionEngine::new("test", entry, stages, router, config)
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let a = MockStage::new("a", Some("next"));
        let b = MockStage::new("b", Some("complete"));
        let engine = engine(
            vec![a.clone(), b.clone()],
            vec![
                ("a", RoutingTable::new(RouteTarget::Terminal).with_route("next", stage("b"))),
                ("b", RoutingTable::new(RouteTarget::Terminal)),
            ],
            EngineConfig::default(),
        );

        let outcome = engine.run(WorkflowState::default()).await;

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.state.steps, vec!["[a] ran", "[b] ran"]);
        assert_eq!(outcome.state.directive, None);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_self_loop_forces_review_once() {
        let looping = MockStage::new("loop", Some("again"));
        let review = MockStage::new("quality_gate", Some("again"));
        let config = EngineConfig {
            step_budget: 5,
            rework_ceiling: 3,
            ..Default::default()
        };
        let engine = engine(
            vec![looping.clone(), review.clone()],
            vec![
                ("loop", RoutingTable::new(stage("loop"))),
                ("quality_gate", RoutingTable::new(stage("loop"))),
            ],
            config,
        );

        let outcome = engine.run(WorkflowState::default()).await;

        assert_eq!(outcome.termination, Termination::BudgetExhausted);
        assert_eq!(outcome.state.step_count(), 6);
        assert_eq!(looping.calls.load(Ordering::SeqCst), 5);
        assert_eq!(review.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_review_stage_stops_at_budget() {
        let looping = MockStage::new("loop", None);
        let config = EngineConfig {
            step_budget: 3,
            rework_ceiling: 1,
            ..Default::default()
        };
        let engine = engine(
            vec![looping.clone()],
            vec![("loop", RoutingTable::new(stage("loop")))],
            config,
        );

        let outcome = engine.run(WorkflowState::default()).await;
        assert_eq!(outcome.termination, Termination::BudgetExhausted);
        assert_eq!(outcome.state.step_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_token_returns_partial_state() {
        let a = MockStage::new("a", None);
        let engine = engine(
            vec![a.clone()],
            vec![("a", RoutingTable::new(RouteTarget::Terminal))],
            EngineConfig::default(),
        );
        let token = CancellationToken::new();
        token.cancel();

        let mut initial = WorkflowState::new("doc", "text");
        initial.payload.insert("kept".to_string(), serde_json::json!(true));
        let outcome = engine.run_until(initial, &token).await;

        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.state.errors.len(), 1);
        assert!(outcome.state.errors[0].contains("cancelled"));
        assert_eq!(outcome.state.payload["kept"], serde_json::json!(true));
    }

    fn expired_engine(a: Arc<MockStage>) -> ExecutionEngine {
        let config = EngineConfig {
            run_timeout_secs: Some(0),
            ..Default::default()
        };
        engine(
            vec![a],
            vec![("a", RoutingTable::new(RouteTarget::Terminal))],
            config,
        )
    }

    #[tokio::test]
    async fn test_run_timeout_returns_partial_state() {
        let a = MockStage::new("a", Some("complete"));
        let engine = expired_engine(a.clone());

        let mut initial = WorkflowState::new("doc", "text");
        initial.payload.insert("total".to_string(), serde_json::json!("$50"));
        initial.steps.push("[upstream] text read".to_string());
        initial.confidence = 0.4;
        let outcome = engine.run(initial).await;

        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.state.payload["total"], serde_json::json!("$50"));
        assert_eq!(outcome.state.steps, vec!["[upstream] text read"]);
        assert_eq!(outcome.state.confidence, 0.4);
        assert_eq!(outcome.state.errors.len(), 1);
        assert!(outcome.state.errors[0].starts_with("[engine]"));
        assert!(outcome.state.errors[0].contains("run timeout elapsed"));
    }

    #[tokio::test]
    async fn test_run_timeout_streams_cancelled_event() {
        let engine = expired_engine(MockStage::new("a", None));
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = engine
            .run_stream(WorkflowState::default(), &CancellationToken::new(), tx)
            .await;
        assert_eq!(outcome.termination, Termination::Cancelled);

        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                EngineEvent::Cancelled {
                    reason: "run timeout elapsed".to_string()
                },
                EngineEvent::Finished {
                    termination: Termination::Cancelled,
                    steps: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_events() {
        let a = MockStage::new("a", Some("bogus"));
        let engine = engine(
            vec![a],
            vec![("a", RoutingTable::new(RouteTarget::Terminal))],
            EngineConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = engine
            .run_stream(WorkflowState::default(), &CancellationToken::new(), tx)
            .await;
        assert_eq!(outcome.termination, Termination::Completed);

        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                EngineEvent::StageStarted {
                    stage: "a".to_string(),
                    step: 1
                },
                EngineEvent::StageCompleted {
                    stage: "a".to_string(),
                    description: "ran".to_string()
                },
                EngineEvent::Routed {
                    from: "a".to_string(),
                    directive: Some("bogus".to_string()),
                    to: "complete".to_string()
                },
                EngineEvent::Finished {
                    termination: Termination::Completed,
                    steps: 1
                },
            ]
        );
    }
}
