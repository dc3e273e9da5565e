// SPDX-License-Identifier: MIT

use crate::adk::oracle::Oracle;
use crate::sieve::config::EngineConfig;
use crate::sieve::stages::{
    ClassifyStage, CoordinatorStage, ExtractStage, PlannerStage, QualityGateStage, Stage,
    TablesStage,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stages available to topologies, by name
#[derive(Clone)]
pub struct StageRegistry {
    stages: Arc<RwLock<HashMap<String, Arc<dyn Stage>>>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            stages: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry holding every built-in stage, all sharing `oracle`
    pub async fn with_builtin_stages(oracle: Arc<dyn Oracle>, config: &EngineConfig) -> Self {
        let registry = Self::new();
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(PlannerStage::new(oracle.clone())),
            Arc::new(ClassifyStage::new(oracle.clone())),
            Arc::new(ExtractStage::new(oracle.clone())),
            Arc::new(TablesStage::new(oracle.clone())),
            Arc::new(CoordinatorStage::new(oracle.clone(), config.table_step_limit)),
            Arc::new(QualityGateStage::new(
                oracle,
                config.rework_ceiling,
                config.correction_threshold,
            )),
        ];
        for stage in stages {
            registry.register(stage).await;
        }
        registry
    }

    pub async fn register(&self, stage: Arc<dyn Stage>) {
        let mut stages = self.stages.write().await;
        stages.insert(stage.name().to_string(), stage);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        let stages = self.stages.read().await;
        stages.get(name).cloned()
    }

    /// Registered names in sorted order
    pub async fn names(&self) -> Vec<String> {
        let stages = self.stages.read().await;
        let mut names: Vec<String> = stages.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
