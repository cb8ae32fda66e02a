//! Registration-time adapter for tools with older calling conventions.
//!
//! Some tools were written against looser interfaces: a map-style invoke,
//! a single positional argument, a JSON-encoded string, or keyword
//! arguments. [`ToolAdapter`] wraps such a tool once, at registration,
//! and exposes it through the canonical [`Tool`] trait. It tries the
//! conventions in a fixed order and the first one that does not fail
//! wins. If every convention fails the errors are aggregated into
//! [`ToolError::AllMethodsFailed`].

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::action::Parameters;
use crate::error::ToolError;
use crate::tool::{Tool, ToolResult};

/// A tool that returns plain text and implements any subset of the
/// legacy calling conventions. Unimplemented conventions report
/// [`ToolError::Unsupported`].
#[async_trait]
pub trait LegacyTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Map-style invocation with the full parameter object.
    async fn invoke_map(&self, _parameters: &Parameters) -> Result<String, ToolError> {
        Err(ToolError::Unsupported("invoke".into()))
    }

    /// A single positional argument; only tried when exactly one parameter exists.
    async fn call_single(&self, _value: &Value) -> Result<String, ToolError> {
        Err(ToolError::Unsupported("single argument".into()))
    }

    /// The whole parameter object encoded as a JSON string.
    async fn call_json(&self, _encoded: &str) -> Result<String, ToolError> {
        Err(ToolError::Unsupported("json argument".into()))
    }

    /// Keyword-expansion call.
    async fn call_kwargs(&self, _parameters: &Parameters) -> Result<String, ToolError> {
        Err(ToolError::Unsupported("keyword arguments".into()))
    }
}

/// Wraps a [`LegacyTool`] so it can live in a [`crate::ToolRegistry`].
pub struct ToolAdapter<T> {
    inner: T,
}

impl<T: LegacyTool> ToolAdapter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    async fn run_ladder(&self, parameters: &Parameters) -> Result<String, ToolError> {
        let mut attempts = Vec::new();

        match self.inner.invoke_map(parameters).await {
            Ok(out) => return Ok(out),
            Err(e) => {
                debug!(tool = self.inner.name(), error = %e, "Map invocation failed, trying next convention");
                attempts.push(format!("invoke: {e}"));
            }
        }

        if parameters.len() == 1
            && let Some(value) = parameters.values().next()
        {
            match self.inner.call_single(value).await {
                Ok(out) => return Ok(out),
                Err(e) => attempts.push(format!("single: {e}")),
            }
        }

        let encoded = serde_json::to_string(parameters)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        match self.inner.call_json(&encoded).await {
            Ok(out) => return Ok(out),
            Err(e) => attempts.push(format!("json: {e}")),
        }

        match self.inner.call_kwargs(parameters).await {
            Ok(out) => Ok(out),
            Err(e) => {
                attempts.push(format!("kwargs: {e}"));
                debug!(tool = self.inner.name(), ?attempts, "Every calling convention failed");
                Err(ToolError::AllMethodsFailed {
                    tool_name: self.inner.name().to_string(),
                    attempts,
                })
            }
        }
    }
}

#[async_trait]
impl<T: LegacyTool> Tool for ToolAdapter<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let parameters = match arguments {
            Value::Object(map) => map,
            Value::Null => Parameters::new(),
            other => {
                let mut map = Parameters::new();
                map.insert("input".into(), other);
                map
            }
        };
        let output = self.run_ladder(&parameters).await?;
        // Legacy tools signal failure in-band; the dispatcher screens the text.
        Ok(ToolResult::ok(output))
    }
}
