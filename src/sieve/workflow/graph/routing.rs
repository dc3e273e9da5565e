// SPDX-License-Identifier: MIT

//! Routing resolver
//!
//! Maps the directive a stage left in the state to the next stage through
//! that stage's routing table. Resolution never fails: unknown directives
//! fall back to the table's default entry.

use std::collections::HashMap;

use crate::sieve::workflow::state::WorkflowState;

/// Reserved directive that ends the run
pub const TERMINAL: &str = "complete";

/// Canonical form of a directive: trimmed, lower-cased, `-` and spaces as `_`
pub fn normalize_directive(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['-', ' '], "_")
}

/// Where a route leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Stage(String),
    Terminal,
}

impl RouteTarget {
    pub fn parse(target: &str) -> Self {
        let normalized = normalize_directive(target);
        if normalized == TERMINAL {
            RouteTarget::Terminal
        } else {
            RouteTarget::Stage(normalized)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RouteTarget::Stage(id) => id,
            RouteTarget::Terminal => TERMINAL,
        }
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static TERMINAL_TARGET: RouteTarget = RouteTarget::Terminal;

/// Routing table of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    routes: HashMap<String, RouteTarget>,
    default: RouteTarget,
}

impl RoutingTable {
    pub fn new(default: RouteTarget) -> Self {
        Self {
            routes: HashMap::new(),
            default,
        }
    }

    pub fn with_route(mut self, directive: &str, target: RouteTarget) -> Self {
        self.routes.insert(normalize_directive(directive), target);
        self
    }

    pub fn default_target(&self) -> &RouteTarget {
        &self.default
    }

    /// Routes sorted by directive, for display
    pub fn sorted_routes(&self) -> Vec<(&str, &RouteTarget)> {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|(d, t)| (d.as_str(), t))
            .collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        routes
    }

    /// Look up a directive. `None` means no directive was written.
    pub fn lookup(&self, directive: Option<&str>) -> Lookup<'_> {
        let Some(raw) = directive else {
            return Lookup::Default(&self.default);
        };
        let normalized = normalize_directive(raw);
        if normalized == TERMINAL {
            return Lookup::Matched(&TERMINAL_TARGET);
        }
        match self.routes.get(&normalized) {
            Some(target) => Lookup::Matched(target),
            None => Lookup::Unknown(&self.default),
        }
    }
}

/// How a directive was resolved
#[derive(Debug, PartialEq)]
pub enum Lookup<'a> {
    /// The directive had an entry (or was the terminal directive)
    Matched(&'a RouteTarget),
    /// No directive; default entry used
    Default(&'a RouteTarget),
    /// Unrecognised directive; default entry used
    Unknown(&'a RouteTarget),
}

impl<'a> Lookup<'a> {
    pub fn target(&self) -> &'a RouteTarget {
        match self {
            Lookup::Matched(t) | Lookup::Default(t) | Lookup::Unknown(t) => t,
        }
    }
}

/// Routing tables for every stage of a topology
#[derive(Debug, Clone, Default)]
pub struct Router {
    tables: HashMap<String, RoutingTable>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: impl Into<String>, table: RoutingTable) {
        self.tables.insert(stage.into(), table);
    }

    pub fn table(&self, stage: &str) -> Option<&RoutingTable> {
        self.tables.get(stage)
    }

    /// Next target after `stage` ran, given the directive in `state`
    pub fn resolve(&self, stage: &str, state: &WorkflowState) -> RouteTarget {
        let directive = state.directive.as_deref();
        let Some(table) = self.tables.get(stage) else {
            log::warn!("No routing table for stage '{}', ending run", stage);
            return RouteTarget::Terminal;
        };

        let lookup = table.lookup(directive);
        if let Lookup::Unknown(target) = &lookup {
            log::warn!(
                "Stage '{}' emitted unknown directive '{}', using default '{}'",
                stage,
                directive.unwrap_or_default(),
                target
            );
        }
        lookup.target().clone()
    }
}
