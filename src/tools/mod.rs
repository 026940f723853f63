// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool registry
//!
//! Holds tool definitions, their executors, and per-tool enablement.
//! Tools register under a source tag grouping everything one provider
//! contributes, and start disabled until the user opts in. Enablement
//! is remembered across an unregister/register cycle for the same
//! (name, source) pair, so a provider resync neither re-enables a tool
//! the user turned off nor loses a choice they made.
//!
//! The registry never runs tools on its own initiative; it only
//! forwards dispatch calls from the session loop to the executor.

pub mod definition;

pub use definition::{SchemaBuilder, ToolDefinition, ToolInputSchema};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Outcome of a tool invocation, as reported back to the model
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success { data: Value },
    Failure { error: String },
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The payload to store on the tool-call content part
    pub fn into_value(self) -> Value {
        match self {
            Self::Success { data } => data,
            Self::Failure { error } => Value::String(error),
        }
    }
}

/// Executes one tool's invocations
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, args: Value) -> ToolOutcome;
}

struct RegisteredTool {
    definition: ToolDefinition,
    executor: Arc<dyn ToolExecutor>,
    source: String,
    enabled: bool,
}

/// Registry of tools available to the session loop
#[derive(Default)]
pub struct ToolRegistry {
    /// Registration order is preserved; definitions are returned in it
    tools: Vec<RegisteredTool>,
    /// Remembered enablement per (name, source), surviving unregister
    enablement: HashMap<(String, String), bool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one tool under a source tag. New tools start disabled
    /// unless a prior registration of the same (name, source) pair left
    /// a remembered enablement.
    pub fn register(
        &mut self,
        source: impl Into<String>,
        definition: ToolDefinition,
        executor: Arc<dyn ToolExecutor>,
    ) -> crate::error::Result<()> {
        let source = source.into();
        if self.tools.iter().any(|t| t.definition.name == definition.name) {
            return Err(crate::error::DeckError::Tool(format!(
                "tool '{}' is already registered",
                definition.name
            )));
        }

        let enabled = self
            .enablement
            .get(&(definition.name.clone(), source.clone()))
            .copied()
            .unwrap_or(false);

        self.tools.push(RegisteredTool {
            definition,
            executor,
            source,
            enabled,
        });
        Ok(())
    }

    /// Register a provider's full tool set. A tool that fails to
    /// register (duplicate name, usually) is logged and skipped; the
    /// rest of the batch still registers. Returns how many made it in.
    pub fn register_source(
        &mut self,
        source: &str,
        tools: Vec<(ToolDefinition, Arc<dyn ToolExecutor>)>,
    ) -> usize {
        let mut registered = 0;
        for (definition, executor) in tools {
            let name = definition.name.clone();
            match self.register(source, definition, executor) {
                Ok(()) => registered += 1,
                Err(e) => {
                    tracing::warn!(tool = %name, source, error = %e, "skipping tool registration");
                }
            }
        }
        registered
    }

    /// Remove every tool registered under a source tag, remembering
    /// each tool's enablement for a later re-registration.
    pub fn unregister_by_source(&mut self, source: &str) {
        let enablement = &mut self.enablement;
        self.tools.retain(|t| {
            if t.source == source {
                enablement.insert((t.definition.name.clone(), t.source.clone()), t.enabled);
                false
            } else {
                true
            }
        });
    }

    /// Enable a tool by name. Returns false if no such tool.
    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disable a tool by name. Returns false if no such tool.
    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tools.iter_mut().find(|t| t.definition.name == name) {
            Some(tool) => {
                tool.enabled = enabled;
                self.enablement
                    .insert((tool.definition.name.clone(), tool.source.clone()), enabled);
                true
            }
            None => false,
        }
    }

    /// Is the named tool currently enabled? Unknown tools report false.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.tools
            .iter()
            .find(|t| t.definition.name == name)
            .is_some_and(|t| t.enabled)
    }

    /// Enabled tool definitions, in registration order
    pub fn enabled_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.definition.clone())
            .collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Forward a tool call to its executor. Unknown or disabled tools
    /// report a failure outcome instead of an error, so a misbehaving
    /// model sees the problem in-band and the loop keeps running.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolOutcome {
        let Some(tool) = self.tools.iter().find(|t| t.definition.name == name) else {
            return ToolOutcome::failure(format!("unknown tool: {name}"));
        };
        if !tool.enabled {
            return ToolOutcome::failure(format!("tool '{name}' is disabled"));
        }
        tool.executor.execute(args).await
    }
}
