// SPDX-License-Identifier: MIT

//! Workflow builder - orchestrates engine construction
//!
//! This module provides the high-level Builder that validates a topology
//! definition, resolves its stages in the registry and constructs an
//! executable [`ExecutionEngine`].

use crate::adk::error::{SieveError, WorkflowError};
use crate::sieve::stages::Stage;
use crate::sieve::workflow::graph::{
    normalize_directive, ExecutionEngine, RouteTarget, Router, RoutingTable, WorkflowDefinition,
};
use crate::sieve::workflow::registry::StageRegistry;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// High-level builder for constructing engines from topology definitions
pub struct Builder {
    registry: StageRegistry,
}

impl Builder {
    pub fn new(registry: StageRegistry) -> Self {
        Self { registry }
    }

    /// Build an engine from a parsed definition
    pub async fn build_from_def(
        &self,
        def: &WorkflowDefinition,
    ) -> Result<ExecutionEngine, SieveError> {
        Self::validate(def)?;

        let mut stages: HashMap<String, Arc<dyn Stage>> = HashMap::new();
        for node in &def.stages {
            let stage = self
                .registry
                .get(&node.id)
                .await
                .ok_or_else(|| WorkflowError::UnknownStage(node.id.clone()))?;
            stages.insert(node.id.clone(), stage);
        }
        let router = Self::router(def);

        if !stages.contains_key(&def.engine.review_stage) {
            log::warn!(
                "Workflow '{}' has no '{}' stage; budget exhaustion will stop without review",
                def.name,
                def.engine.review_stage
            );
        }

        log::info!(
            "Built workflow '{}' with {} stages, entry '{}'",
            def.name,
            stages.len(),
            def.entry
        );

        Ok(ExecutionEngine::new(
            def.name.clone(),
            def.entry.clone(),
            stages,
            router,
            def.engine.clone(),
        ))
    }

    /// Routing tables of every stage in `def`
    pub fn router(def: &WorkflowDefinition) -> Router {
        let mut router = Router::new();
        for node in &def.stages {
            let table = node.routes.iter().fold(
                RoutingTable::new(RouteTarget::parse(&node.default)),
                |table, (directive, target)| table.with_route(directive, RouteTarget::parse(target)),
            );
            router.insert(node.id.clone(), table);
        }
        router
    }

    /// Structural checks that need no registry: budgets, stage ids in
    /// directive form, duplicate stages, known entry, and route targets that
    /// exist or are terminal.
    pub fn validate(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
        def.engine.validate()?;

        let mut ids = HashSet::new();
        for node in &def.stages {
            // Route targets are normalized, so ids must match that form
            let normalized = normalize_directive(&node.id);
            if normalized != node.id {
                return Err(WorkflowError::InvalidStageId {
                    id: node.id.clone(),
                    normalized,
                });
            }
            if !ids.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateStage(node.id.clone()));
            }
        }

        if !ids.contains(def.entry.as_str()) {
            return Err(WorkflowError::UnknownStage(def.entry.clone()));
        }

        for node in &def.stages {
            let routes = node
                .routes
                .iter()
                .map(|(d, t)| (d.as_str(), t.as_str()))
                .chain(std::iter::once(("default", node.default.as_str())));
            for (directive, target) in routes {
                if let RouteTarget::Stage(id) = RouteTarget::parse(target) {
                    if !ids.contains(id.as_str()) {
                        return Err(WorkflowError::UnknownRouteTarget {
                            from: node.id.clone(),
                            directive: directive.to_string(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::StageError;
    use crate::sieve::workflow::loader::WorkflowLoader;
    use crate::sieve::stages::StageOutput;
    use crate::sieve::workflow::state::{StateUpdate, WorkflowState};
    use async_trait::async_trait;

    struct NamedStage(&'static str);

    #[async_trait]
    impl Stage for NamedStage {
        fn name(&self) -> &str {
            self.0
        }

        async fn process(&self, _state: &WorkflowState) -> Result<StageOutput, StageError> {
            Ok(StageOutput::new(StateUpdate::new().directive("next"), "ok"))
        }
    }

    async fn registry(names: &[&'static str]) -> StageRegistry {
        let registry = StageRegistry::new();
        for name in names {
            registry.register(Arc::new(NamedStage(*name))).await;
        }
        registry
    }

    fn parse(yaml: &str) -> WorkflowDefinition {
        WorkflowLoader::parse_yaml(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_build_and_run() {
        let def = parse(
            r#"
name: pair
entry: a
stages:
  - id: a
    routes:
      next: b
  - id: b
"#,
        );
        let builder = Builder::new(registry(&["a", "b"]).await);
        let engine = builder.build_from_def(&def).await.unwrap();
        assert_eq!(engine.stage_ids(), vec!["a", "b"]);

        let outcome = engine.run(WorkflowState::default()).await;
        assert_eq!(outcome.state.steps, vec!["[a] ok", "[b] ok"]);
    }

    #[tokio::test]
    async fn test_unregistered_stage() {
        let def = parse("name: x\nentry: ocr\nstages:\n  - id: ocr\n");
        let err = Builder::new(StageRegistry::new())
            .build_from_def(&def)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SieveError::Workflow(WorkflowError::UnknownStage(ref s)) if s == "ocr"
        ));
    }

    #[test]
    fn test_validate_unknown_route_target() {
        let def = parse(
            r#"
name: bad
entry: a
stages:
  - id: a
    routes:
      next: ghost
"#,
        );
        assert_eq!(
            Builder::validate(&def),
            Err(WorkflowError::UnknownRouteTarget {
                from: "a".to_string(),
                directive: "next".to_string(),
                target: "ghost".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_unknown_default_target() {
        let def = parse("name: bad\nentry: a\nstages:\n  - id: a\n    default: ghost\n");
        assert!(matches!(
            Builder::validate(&def),
            Err(WorkflowError::UnknownRouteTarget { ref directive, .. }) if directive == "default"
        ));
    }

    #[test]
    fn test_validate_duplicate_and_entry() {
        let dup = parse("name: d\nentry: a\nstages:\n  - id: a\n  - id: a\n");
        assert_eq!(
            Builder::validate(&dup),
            Err(WorkflowError::DuplicateStage("a".to_string()))
        );

        let no_entry = parse("name: e\nentry: z\nstages:\n  - id: a\n");
        assert_eq!(
            Builder::validate(&no_entry),
            Err(WorkflowError::UnknownStage("z".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_non_canonical_stage_id() {
        let def = parse(
            r#"
name: cased
entry: Quality-Gate
stages:
  - id: Quality-Gate
    routes:
      again: Quality-Gate
"#,
        );
        assert_eq!(
            Builder::validate(&def),
            Err(WorkflowError::InvalidStageId {
                id: "Quality-Gate".to_string(),
                normalized: "quality_gate".to_string(),
            })
        );
    }

    #[test]
    fn test_router_normalizes_targets() {
        let def = parse(
            r#"
name: r
entry: a
stages:
  - id: a
    routes:
      Next-Step: b
    default: Complete
  - id: b
"#,
        );
        let router = Builder::router(&def);
        let table = router.table("a").unwrap();
        assert_eq!(
            table.sorted_routes(),
            vec![("next_step", &RouteTarget::Stage("b".to_string()))]
        );
        assert_eq!(table.default_target(), &RouteTarget::Terminal);
        assert!(router.table("b").is_some());
    }

    #[test]
    fn test_validate_budget() {
        let def = parse(
            "name: b\nentry: a\nengine:\n  step_budget: 3\n  rework_ceiling: 4\nstages:\n  - id: a\n",
        );
        assert!(matches!(
            Builder::validate(&def),
            Err(WorkflowError::InvalidBudget { .. })
        ));
    }

    #[test]
    fn test_builtin_topologies_validate() {
        let loader = WorkflowLoader::new();
        for name in WorkflowLoader::BUILTIN {
            assert_eq!(Builder::validate(&loader.builtin(name).unwrap()), Ok(()));
        }
    }
}
