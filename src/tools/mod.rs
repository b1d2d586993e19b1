//! Agent-facing tools built on the evaluator and the lemma index.
//!
//! Each tool takes one text input (Lean source, or a search query) and
//! returns text:
//!
//! - `lean_run`: full result as pretty JSON
//! - `lean_state`: full result as compact JSON
//! - `lean_search`: Loogle hits as JSON
//! - `lean_repl`: plain-text summary (disabled by default)

pub mod adapters;
pub mod search;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::execution::ContainerRuntime;
use crate::verify::Evaluator;

pub use adapters::{repl_tool_output, run_tool_output, state_tool_output};
pub use search::{
    normalize_payload, LemmaSearchClient, SearchHit, SearchResponse, DEFAULT_SEARCH_LIMIT,
    DEFAULT_SEARCH_URL, MAX_SEARCH_LIMIT,
};

/// The tools this crate exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "lean_run")]
    Run,
    #[serde(rename = "lean_state")]
    State,
    #[serde(rename = "lean_search")]
    Search,
    #[serde(rename = "lean_repl")]
    Repl,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [Self::Run, Self::State, Self::Search, Self::Repl];

    /// Stable tool name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Run => "lean_run",
            Self::State => "lean_state",
            Self::Search => "lean_search",
            Self::Repl => "lean_repl",
        }
    }

    /// Whether the tool runs the verifier (and so needs a provisioned runtime).
    pub fn needs_runtime(&self) -> bool {
        !matches!(self, Self::Search)
    }

    /// One-line description for tool listings.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Run => "Check a Lean 4 proof and return the full result as JSON.",
            Self::State => {
                "Check a partial Lean 4 proof and return open goals, completion and errors as JSON."
            }
            Self::Search => "Search Lean/Mathlib lemmas by name or type pattern via Loogle.",
            Self::Repl => "Run a Lean 4 block and report success, open goals or errors as text.",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown tool: {s}"))
    }
}

/// Which tools a [`Toolkit`] exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSelection {
    pub include_run: bool,
    pub include_state: bool,
    pub include_search: bool,
    pub include_repl: bool,
}

impl Default for ToolSelection {
    fn default() -> Self {
        Self {
            include_run: true,
            include_state: true,
            include_search: true,
            include_repl: false,
        }
    }
}

impl ToolSelection {
    /// Every tool enabled.
    pub fn all() -> Self {
        Self {
            include_repl: true,
            ..Self::default()
        }
    }

    /// Enabled tools in listing order.
    pub fn tools(&self) -> Vec<ToolKind> {
        [
            (self.include_run, ToolKind::Run),
            (self.include_state, ToolKind::State),
            (self.include_search, ToolKind::Search),
            (self.include_repl, ToolKind::Repl),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
        .collect()
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        match kind {
            ToolKind::Run => self.include_run,
            ToolKind::State => self.include_state,
            ToolKind::Search => self.include_search,
            ToolKind::Repl => self.include_repl,
        }
    }
}

/// Dispatches tool calls to a shared evaluator and a search client.
pub struct Toolkit<R: ContainerRuntime> {
    evaluator: Arc<Evaluator<R>>,
    search: LemmaSearchClient,
    selection: ToolSelection,
}

impl<R: ContainerRuntime> Toolkit<R> {
    /// Creates a toolkit with the default selection.
    ///
    /// The evaluator's environment may be unprovisioned; it is provisioned on
    /// the first call to a tool that needs it.
    pub fn new(evaluator: Arc<Evaluator<R>>) -> Self {
        Self {
            evaluator,
            search: LemmaSearchClient::new(),
            selection: ToolSelection::default(),
        }
    }

    pub fn with_selection(mut self, selection: ToolSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_search_client(mut self, search: LemmaSearchClient) -> Self {
        self.search = search;
        self
    }

    /// Enabled tools in listing order.
    pub fn tools(&self) -> Vec<ToolKind> {
        self.selection.tools()
    }

    /// Whether `tool` is part of this toolkit's selection.
    pub fn is_enabled(&self, tool: ToolKind) -> bool {
        self.selection.contains(tool)
    }

    /// Runs `tool` on `input` and returns its text output.
    ///
    /// A disabled tool yields a JSON error object without touching the
    /// runtime. So does a failed provisioning.
    pub async fn invoke(&self, tool: ToolKind, input: &str) -> String {
        if !self.is_enabled(tool) {
            return error_json(format!("tool {tool} is not enabled"));
        }

        if tool.needs_runtime() {
            if let Err(e) = self.evaluator.environment().provision().await {
                warn!(tool = %tool, error = %e, "Provisioning failed");
                return error_json(format!("environment provisioning failed: {e}"));
            }
        }

        debug!(tool = %tool, input_len = input.len(), "Invoking tool");
        match tool {
            ToolKind::Run => run_tool_output(&self.evaluator.evaluate_default(input).await),
            ToolKind::State => state_tool_output(&self.evaluator.evaluate_default(input).await),
            ToolKind::Repl => repl_tool_output(&self.evaluator.evaluate_default(input).await),
            ToolKind::Search => self.search.search(input, DEFAULT_SEARCH_LIMIT).await.to_json(),
        }
    }
}

fn error_json(message: String) -> String {
    serde_json::json!({ "error": message }).to_string()
}
