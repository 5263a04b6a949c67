//! Action trait: the abstraction over model-invocable capabilities.
//!
//! Actions are what give the agent the ability to act: the model names an
//! action and its parameters in a structured response, and the
//! [`ActionRegistry`] binds and invokes it.
//!
//! The registry is a hard containment boundary. [`ActionRegistry::invoke`]
//! never returns an error and never unwinds: unknown names, bad arguments,
//! action errors and panics all come back as error-labelled text that is
//! fed to the model on the next turn.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::ActionError;

/// Arguments for an action call, keyed by parameter name.
pub type ActionParams = Map<String, Value>;

/// A declared action parameter, rendered into the action's signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    /// Type hint shown to the model (e.g. `str`, `int`, `list[str]`)
    pub kind: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            required: false,
            default: Some(default),
        }
    }

    fn render(&self) -> String {
        match &self.default {
            Some(default) => format!("{}: {} = {}", self.name, self.kind, default),
            None => format!("{}: {}", self.name, self.kind),
        }
    }
}

/// A request from the model to run an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Name of the action to run
    #[serde(alias = "action")]
    pub name: String,

    /// Named arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ActionParams>,
}

impl ActionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        if let Value::Object(map) = parameters {
            self.parameters = Some(map);
        }
        self
    }
}

/// An action call paired with what came of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFeedback {
    pub call: ActionCall,
    /// The action's text result, or an error-labelled message
    pub output: String,
    pub success: bool,
}

/// The core Action trait.
///
/// Implementations declare their name, documentation and parameters so
/// the registry can describe them to the model and bind arguments before
/// invoking them.
#[async_trait]
pub trait Action: Send + Sync {
    /// Unique name the model uses to call this action.
    fn name(&self) -> &str;

    /// Documentation shown to the model.
    fn description(&self) -> &str;

    /// Declared parameters, in signature order.
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// Whether arguments not named in [`Action::parameters`] are rejected.
    fn strict_parameters(&self) -> bool {
        true
    }

    /// Run the action with bound arguments.
    async fn invoke(&self, params: ActionParams) -> Result<String, ActionError>;

    /// Parameter signature, e.g. `(path: str, limit: int = 10)`.
    fn signature(&self) -> String {
        let params: Vec<String> = self.parameters().iter().map(ParamSpec::render).collect();
        format!("({})", params.join(", "))
    }
}

type Handler = dyn Fn(&ActionParams) -> Result<String, ActionError> + Send + Sync;

/// An action backed by a closure.
pub struct FnAction {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    strict: bool,
    handler: Box<Handler>,
}

impl FnAction {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ActionParams) -> Result<String, ActionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            strict: true,
            handler: Box::new(handler),
        }
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Accept arguments that are not declared.
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }
}

#[async_trait]
impl Action for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.params.clone()
    }

    fn strict_parameters(&self) -> bool {
        self.strict
    }

    async fn invoke(&self, params: ActionParams) -> Result<String, ActionError> {
        (self.handler)(&params)
    }
}

/// Registry of the actions available for a run.
///
/// Iteration follows registration order. Registering a name twice keeps
/// the original position and replaces the action (last registration wins).
/// The registry is read-only once a run starts; share it with `Arc`.
#[derive(Default)]
pub struct ActionRegistry {
    actions: Vec<Arc<dyn Action>>,
    index: HashMap<String, usize>,
    output_limit: Option<usize>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a collection of actions.
    pub fn from_actions(actions: impl IntoIterator<Item = Arc<dyn Action>>) -> Self {
        let mut registry = Self::new();
        for action in actions {
            registry.register(action);
        }
        registry
    }

    /// Truncate action outputs longer than `max_chars`, appending `...`.
    pub fn with_output_limit(mut self, max_chars: usize) -> Self {
        self.output_limit = Some(max_chars);
        self
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        let name = action.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => {
                debug!(action = %name, "Replacing previously registered action");
                self.actions[slot] = action;
            }
            None => {
                self.index.insert(name, self.actions.len());
                self.actions.push(action);
            }
        }
    }

    /// Get an action by name.
    pub fn get(&self, name: &str) -> Option<&dyn Action> {
        self.index.get(name).map(|&slot| self.actions[slot].as_ref())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// One `name(signature): description` line per action.
    pub fn describe(&self) -> String {
        self.actions
            .iter()
            .map(|a| format!("{}{}: {}", a.name(), a.signature(), a.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run an action call. Never fails: every failure becomes feedback text.
    pub async fn invoke(&self, call: &ActionCall) -> ActionFeedback {
        let start = Instant::now();
        let result = self.try_invoke(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                debug!(action = %call.name, duration_ms, "Action succeeded");
                ActionFeedback {
                    call: call.clone(),
                    output: self.truncate(output),
                    success: true,
                }
            }
            Err(e) => {
                warn!(action = %call.name, duration_ms, error = %e, "Action failed");
                ActionFeedback {
                    call: call.clone(),
                    output: format!("{}: {}", e.kind(), e),
                    success: false,
                }
            }
        }
    }

    async fn try_invoke(&self, call: &ActionCall) -> Result<String, ActionError> {
        let action = self
            .get(&call.name)
            .ok_or_else(|| ActionError::NotFound(call.name.clone()))?;
        let params = bind_parameters(action, call.parameters.clone().unwrap_or_default())?;

        match AssertUnwindSafe(action.invoke(params)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ActionError::Panicked {
                action: call.name.clone(),
                reason: panic_message(payload.as_ref()),
            }),
        }
    }

    fn truncate(&self, output: String) -> String {
        match self.output_limit {
            Some(limit) if output.chars().count() > limit => {
                let mut truncated: String = output.chars().take(limit).collect();
                truncated.push_str("...");
                truncated
            }
            _ => output,
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .field("output_limit", &self.output_limit)
            .finish()
    }
}

/// Check call arguments against the declared parameters and fill defaults.
fn bind_parameters(action: &dyn Action, mut params: ActionParams) -> Result<ActionParams, ActionError> {
    let specs = action.parameters();

    if action.strict_parameters()
        && let Some(unknown) = params.keys().find(|k| !specs.iter().any(|s| &s.name == *k))
    {
        return Err(ActionError::InvalidArguments {
            action: action.name().to_string(),
            reason: format!("got an unexpected parameter '{unknown}'"),
        });
    }

    for spec in &specs {
        if params.contains_key(&spec.name) {
            continue;
        }
        match (&spec.default, spec.required) {
            (Some(default), _) => {
                params.insert(spec.name.clone(), default.clone());
            }
            (None, true) => {
                return Err(ActionError::InvalidArguments {
                    action: action.name().to_string(),
                    reason: format!("missing required parameter '{}'", spec.name),
                });
            }
            (None, false) => {}
        }
    }

    Ok(params)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
