//! Action dispatcher: executes a parsed batch in order.
//!
//! Control actions (announce, terminal, delegation) are handled here and
//! never reach the tool registry. Every other action is looked up by exact
//! name and run through its [`Tool`](codeloop_core::Tool). A failing action
//! degrades into an [`ActionResult`]; it never aborts the batch.
//!
//! After a successful file or directory tool, the dispatcher updates the
//! shared context store and exploration record, so tools stay unaware of
//! the bookkeeping.

use chrono::Utc;
use codeloop_core::action::{
    Action, ActionOutput, ActionProtocol, ActionResult, ActionRole, ActionStatus, ControlAction,
    Parameters,
};
use codeloop_core::agent::AgentRole;
use codeloop_core::error::ToolError;
use codeloop_core::event::{DomainEvent, EventBus};
use codeloop_core::tool::{ToolRegistry, ToolResult};
use codeloop_tools::file_write::split_path_content;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::context::AccessType;
use crate::sink::{TracingSink, UiSink};
use crate::state::TurnState;

/// Message used when the terminal action carries none.
pub const DEFAULT_COMPLETION_MESSAGE: &str = "Task completed.";

/// Substrings that mark a tool's text output as a failure.
const ERROR_MARKERS: [&str; 7] = [
    "Error:",
    "Failed:",
    "Permission denied:",
    "does not exist",
    "is not a file",
    "is not a directory",
    "timed out after",
];

/// Called with `(action_name, parameters)` before each tool action.
/// An `Err` is logged and otherwise ignored.
pub type PreExecuteHook = Arc<dyn Fn(&str, &Parameters) -> Result<(), String> + Send + Sync>;

pub struct ActionDispatcher {
    tools: Arc<ToolRegistry>,
    protocol: ActionProtocol,
    sink: Arc<dyn UiSink>,
    events: Arc<EventBus>,
    pre_execute: Option<PreExecuteHook>,
    interrupt: Option<watch::Receiver<bool>>,
}

impl ActionDispatcher {
    pub fn new(tools: Arc<ToolRegistry>, protocol: ActionProtocol) -> Self {
        Self {
            tools,
            protocol,
            sink: Arc::new(TracingSink),
            events: Arc::new(EventBus::default()),
            pre_execute: None,
            interrupt: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn UiSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_pre_execute(mut self, hook: PreExecuteHook) -> Self {
        self.pre_execute = Some(hook);
        self
    }

    /// Cancel the running tool whenever the watched value becomes `true`.
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn protocol(&self) -> &ActionProtocol {
        &self.protocol
    }

    /// Execute `actions` strictly in order, one at a time.
    ///
    /// Each result is attributed to the agent that was in control when the
    /// action ran. The results are returned, not recorded; the caller hands
    /// them to [`TurnState::record_action_results`].
    pub async fn execute(&self, actions: &[Action], state: &mut TurnState) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            let started = Instant::now();
            let agent = state.current_agent();
            let role = action.role(&self.protocol);

            let result = match self.protocol.classify(action) {
                ControlAction::Tool => self.execute_tool(action, agent, state).await,
                control => self.execute_control(action, role, agent, control, state),
            };

            let duration_ms = started.elapsed().as_millis() as u64;
            debug!(
                action = %action.name,
                agent = %agent,
                status = result.status.label(),
                duration_ms,
                "Action executed"
            );
            self.events.publish(DomainEvent::ActionExecuted {
                action: action.name.clone(),
                agent,
                status: result.status,
                duration_ms,
                timestamp: Utc::now(),
            });
            results.push(result);
        }

        results
    }

    fn execute_control(
        &self,
        action: &Action,
        role: ActionRole,
        agent: AgentRole,
        control: ControlAction,
        state: &mut TurnState,
    ) -> ActionResult {
        let succeeded = |output: &str| ActionResult::new(action, role, agent, ActionStatus::Succeeded, output);
        let errored = |output: String| {
            warn!(action = %action.name, error = %output, "Control action rejected");
            ActionResult::new(action, role, agent, ActionStatus::Errored, output)
        };

        match control {
            ControlAction::Announce { message } => {
                self.sink.announce(agent, &message);
                succeeded("Message displayed to user").with_extra("message", message)
            }
            ControlAction::Terminal { message } => {
                let message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_COMPLETION_MESSAGE.to_string());
                state.mark_task_complete();
                info!(agent = %agent, "Task marked complete");
                succeeded("Turn ended successfully").with_extra("message", message)
            }
            ControlAction::InvokeAgent { agent_type, prompt } => {
                if agent == AgentRole::Sub {
                    return errored("Error: A sub-agent cannot invoke another agent".into());
                }
                let target = if agent_type.trim().is_empty() {
                    Some(AgentRole::Sub)
                } else {
                    AgentRole::from_agent_type(&agent_type)
                };
                match target {
                    Some(AgentRole::Sub) => {}
                    Some(AgentRole::Main) => {
                        return errored("Error: The main agent is already in control".into());
                    }
                    None => return errored(format!("Error: Unknown agent type: {agent_type}")),
                }
                if prompt.trim().is_empty() {
                    return errored(format!("Error: {} requires a prompt", action.name));
                }

                state.begin_sub_agent(&prompt);
                self.publish_switch(agent, AgentRole::Sub);
                succeeded("Sub-agent invoked")
                    .with_extra("agent_type", "sub_agent")
                    .with_extra("prompt", prompt)
            }
            ControlAction::ReturnToMain { response } => {
                if agent == AgentRole::Main {
                    return errored("Error: The main agent cannot return to itself".into());
                }
                state.return_to_main(&response);
                self.publish_switch(agent, AgentRole::Main);
                succeeded("Returned to main agent").with_extra("response", response)
            }
            ControlAction::Tool => errored(format!("Error: Unknown action: {}", action.name)),
        }
    }

    fn publish_switch(&self, from: AgentRole, to: AgentRole) {
        self.events.publish(DomainEvent::AgentSwitched {
            from,
            to,
            timestamp: Utc::now(),
        });
    }

    async fn execute_tool(&self, action: &Action, agent: AgentRole, state: &mut TurnState) -> ActionResult {
        let name = action.name.as_str();

        if !self.tools.contains(name) {
            warn!(action = %name, "Unknown action");
            return ActionResult::new(
                action,
                ActionRole::Tool,
                agent,
                ActionStatus::Errored,
                format!("Error: Unknown action: {name}"),
            );
        }

        if let Some(hook) = &self.pre_execute
            && let Err(e) = hook(name, &action.parameters)
        {
            warn!(action = %name, error = %e, "Pre-execute callback failed");
        }

        self.sink.action_started(&action_summary(action));
        let arguments = Value::Object(action.parameters.clone());

        let result = match self.run_tool(name, arguments).await {
            Ok(output) => {
                let status = classify_tool_result(&output);
                if status != ActionStatus::Succeeded {
                    warn!(action = %name, "Tool reported failure");
                }
                tool_action_result(action, agent, status, output)
            }
            Err(e) if e.is_timeout() => {
                warn!(action = %name, error = %e, "Tool timed out");
                ActionResult::new(action, ActionRole::Tool, agent, ActionStatus::TimedOut, e.to_string())
            }
            Err(e) => {
                warn!(action = %name, error = %e, "Tool execution failed");
                ActionResult::new(
                    action,
                    ActionRole::Tool,
                    agent,
                    ActionStatus::Errored,
                    format!("Error executing {name}: {e}"),
                )
            }
        };

        if result.is_success() {
            self.update_context(&result, state).await;
        }
        self.sink.action_finished(&result);
        result
    }

    /// Run a tool, racing it against the interrupt handle. Losing the race
    /// drops the tool future, which kills any child process it spawned.
    async fn run_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        let call = self.tools.execute(name, arguments);
        let Some(mut interrupt) = self.interrupt.clone() else {
            return call.await;
        };

        tokio::select! {
            result = call => result,
            () = wait_for_interrupt(&mut interrupt) => {
                info!(action = %name, "Tool interrupted");
                Err(ToolError::Interrupted { tool_name: name.to_string() })
            }
        }
    }

    /// Keep the context store and exploration record in step with what a
    /// successful tool did.
    async fn update_context(&self, result: &ActionResult, state: &mut TurnState) {
        let mut evicted = Vec::new();

        match result.action.as_str() {
            "write_file" | "update_file" => {
                let access = if result.action == "write_file" {
                    AccessType::Write
                } else {
                    AccessType::Edit
                };
                if let (Some(path), Some(content)) = (result.extra_str("file_path"), result.extra_str("content")) {
                    evicted.extend(state.context.touch(&context_key(path), content, access).await);
                }
            }
            "read_file" => {
                let files = result.extra.get("files").and_then(Value::as_array);
                for file in files.into_iter().flatten() {
                    if let (Some(path), Some(content)) = (
                        file.get("path").and_then(Value::as_str),
                        file.get("content").and_then(Value::as_str),
                    ) {
                        evicted.extend(state.context.touch(&context_key(path), content, AccessType::Read).await);
                    }
                }
            }
            "list_files" => {
                let directory = result.param_str("directory").unwrap_or(".");
                state.exploration.track_directory(directory);
                state.exploration.rebuild_tree();
            }
            _ => {}
        }

        if !evicted.is_empty() {
            self.events.publish(DomainEvent::FilesEvicted {
                paths: evicted,
                used_bytes: state.context.used_bytes(),
                timestamp: Utc::now(),
            });
        }
    }
}

async fn wait_for_interrupt(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: nobody can interrupt any more.
            std::future::pending::<()>().await;
        }
    }
}

/// Build the result of a tool that returned normally. Structured data is
/// copied into `extra` for the context hooks.
fn tool_action_result(action: &Action, agent: AgentRole, status: ActionStatus, output: ToolResult) -> ActionResult {
    let ToolResult { output, data, .. } = output;
    let text_is_empty = output.trim().is_empty();

    let body = match (&data, text_is_empty) {
        (Some(data), true) => ActionOutput::Structured(data.clone()),
        _ => ActionOutput::Text(output),
    };
    let mut result = ActionResult::new(action, ActionRole::Tool, agent, status, body);
    if let Some(Value::Object(fields)) = data {
        result.extra = fields;
    }
    result
}

/// Classify a tool's normal return.
///
/// `success == false` is a failure. A result carrying structured data has
/// already reported its outcome through `success`; for commands that data
/// holds the exit code, and a completed command is a success whatever it
/// printed. Plain text is screened in full for error markers. Empty text
/// counts as success.
pub fn classify_tool_result(result: &ToolResult) -> ActionStatus {
    if !result.success {
        return ActionStatus::Failed;
    }
    if result.data.is_some() {
        return ActionStatus::Succeeded;
    }
    if ERROR_MARKERS.iter().any(|marker| result.output.contains(marker)) {
        ActionStatus::Failed
    } else {
        ActionStatus::Succeeded
    }
}

/// Paths are tracked the way the model writes them, minus a leading `./`.
fn context_key(path: &str) -> String {
    let trimmed = path.trim();
    trimmed.strip_prefix("./").unwrap_or(trimmed).to_string()
}

/// Short description of a tool action for progress output.
pub fn action_summary(action: &Action) -> String {
    let param = |key: &str| action.str_param(key).unwrap_or_default();
    match action.name.as_str() {
        "read_file" => format!("Reading {}", param("file_path")),
        "write_file" => {
            let path = match action.str_param("file_path_content") {
                Some(raw) => split_path_content(raw).0,
                None => param("file_path").to_string(),
            };
            format!("Writing to {path}")
        }
        "update_file" => format!("Updating {}", param("file_path")),
        "list_files" => format!("Listing files in {}", action.str_param("directory").unwrap_or(".")),
        "grep_files" => format!("Searching for '{}'", param("pattern")),
        "find_files" => format!("Finding files matching '{}'", param("name_pattern")),
        "execute_command" => format!("Running '{}'", param("command")),
        name => format!("Executing {name}({})", action.params_inline()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextStore, ExplorationRecord};
    use async_trait::async_trait;
    use codeloop_core::adapter::{LegacyTool, ToolAdapter};
    use codeloop_core::tool::Tool;
    use codeloop_security::{PermissionManager, ProjectSandbox};
    use codeloop_tools::{ToolContext, default_registry};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn registry(dir: &std::path::Path) -> ToolRegistry {
        let ctx = ToolContext::new(
            Arc::new(ProjectSandbox::new(dir, &[]).unwrap()),
            Arc::new(PermissionManager::permissive()),
        );
        default_registry(ctx)
    }

    fn dispatcher(registry: ToolRegistry) -> ActionDispatcher {
        ActionDispatcher::new(Arc::new(registry), ActionProtocol::default())
    }

    fn state(dir: &std::path::Path) -> TurnState {
        TurnState::new(
            ActionProtocol::default(),
            ContextStore::new(10_000),
            ExplorationRecord::new(dir),
        )
    }

    #[derive(Default)]
    struct RecordingSink {
        announced: Mutex<Vec<String>>,
        started: Mutex<Vec<String>>,
    }

    impl UiSink for RecordingSink {
        fn announce(&self, _agent: AgentRole, message: &str) {
            self.announced.lock().unwrap().push(message.to_string());
        }

        fn action_started(&self, summary: &str) {
            self.started.lock().unwrap().push(summary.to_string());
        }
    }

    #[tokio::test]
    async fn unknown_action_is_a_recoverable_error() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(registry(dir.path()));
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(
                &[
                    Action::from_json("delete_everything", json!({})),
                    Action::from_json("respond", json!({"message": "still here"})),
                ],
                &mut state,
            )
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_error());
        assert!(results[0].output_text().contains("Unknown action"));
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn announce_and_terminal_are_intercepted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher(ToolRegistry::new()).with_sink(sink.clone());
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(
                &[
                    Action::from_json("respond", json!({"message": "Working on it"})),
                    Action::from_json("request_feedback", json!({})),
                ],
                &mut state,
            )
            .await;

        assert_eq!(*sink.announced.lock().unwrap(), vec!["Working on it"]);
        assert_eq!(results[0].output_text(), "Message displayed to user");
        assert_eq!(results[1].output_text(), "Turn ended successfully");
        assert_eq!(results[1].extra_str("message"), Some(DEFAULT_COMPLETION_MESSAGE));
        assert!(state.task_complete());
    }

    #[tokio::test]
    async fn write_then_read_updates_context_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher(registry(dir.path())).with_sink(sink.clone());
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(
                &[
                    Action::from_json("write_file", json!({"file_path_content": "./app.py|print('v1')\n"})),
                    Action::from_json("read_file", json!({"file_path": "app.py"})),
                ],
                &mut state,
            )
            .await;

        assert!(results.iter().all(ActionResult::is_success));
        assert!(results[1].output_text().ends_with("print('v1')\n"));
        let entry = state.context.get("app.py").unwrap();
        assert_eq!(entry.content, "print('v1')\n");
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.access_type, AccessType::Read);
        assert_eq!(
            *sink.started.lock().unwrap(),
            vec!["Writing to ./app.py", "Reading app.py"]
        );
    }

    #[tokio::test]
    async fn multi_file_read_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}\n").unwrap();
        let dispatcher = dispatcher(registry(dir.path()));
        let mut state = state(dir.path());

        dispatcher
            .execute(&[Action::from_json("read_file", json!({"file_path": "a.rs,b.rs"}))], &mut state)
            .await;
        assert_eq!(state.context.active_paths(), vec!["a.rs", "b.rs"]);
    }

    #[tokio::test]
    async fn failed_read_does_not_touch_context() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(registry(dir.path()));
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(&[Action::from_json("read_file", json!({"file_path": "missing.py"}))], &mut state)
            .await;
        assert_eq!(results[0].status, ActionStatus::Failed);
        assert!(!results[0].is_error());
        assert!(state.context.is_empty());
    }

    #[tokio::test]
    async fn list_files_updates_exploration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        let dispatcher = dispatcher(registry(dir.path()));
        let mut state = state(dir.path());

        dispatcher
            .execute(&[Action::from_json("list_files", json!({"directory": "src"}))], &mut state)
            .await;
        assert!(state.exploration.is_explored("src"));
        assert_eq!(state.exploration.children("src").unwrap()[0].name, "main.rs");
    }

    #[tokio::test]
    async fn delegation_switches_agents_and_publishes_events() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventBus::new(32));
        let mut rx = events.subscribe();
        let dispatcher = dispatcher(ToolRegistry::new()).with_event_bus(events);
        let mut state = state(dir.path());
        state.begin_turn("look at foo");

        let results = dispatcher
            .execute(
                &[Action::from_json("invoke_agent", json!({"agent_type": "sub_agent", "prompt": "analyze foo.py"}))],
                &mut state,
            )
            .await;
        assert!(results[0].is_success());
        assert_eq!(results[0].agent, AgentRole::Main);
        assert_eq!(state.current_agent(), AgentRole::Sub);

        let nested = dispatcher
            .execute(&[Action::from_json("invoke_agent", json!({"prompt": "again"}))], &mut state)
            .await;
        assert!(nested[0].is_error());

        dispatcher
            .execute(&[Action::from_json("respond_to_master", json!({"response": "foo is fine"}))], &mut state)
            .await;
        assert_eq!(state.current_agent(), AgentRole::Main);
        assert_eq!(state.task_str("sub_result"), Some("foo is fine"));

        let mut switches = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::AgentSwitched { from, to, .. } = event.as_ref() {
                switches.push((*from, *to));
            }
        }
        assert_eq!(
            switches,
            vec![(AgentRole::Main, AgentRole::Sub), (AgentRole::Sub, AgentRole::Main)]
        );
    }

    #[tokio::test]
    async fn return_from_main_and_unknown_agent_type_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(ToolRegistry::new());
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(
                &[
                    Action::from_json("respond_to_master", json!({"response": "x"})),
                    Action::from_json("invoke_agent", json!({"agent_type": "critic", "prompt": "p"})),
                ],
                &mut state,
            )
            .await;
        assert!(results.iter().all(ActionResult::is_error));
        assert!(results[1].output_text().contains("Unknown agent type: critic"));
        assert_eq!(state.current_agent(), AgentRole::Main);
    }

    #[tokio::test]
    async fn pre_execute_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let dispatcher = dispatcher(registry(dir.path())).with_pre_execute(Arc::new(move |name, _| {
            seen.lock().unwrap().push(name.to_string());
            Err("ui exploded".into())
        }));
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(
                &[
                    Action::from_json("respond", json!({"message": "hi"})),
                    Action::from_json("read_file", json!({"file_path": "a.txt"})),
                ],
                &mut state,
            )
            .await;
        assert!(results[1].is_success());
        assert_eq!(*calls.lock().unwrap(), vec!["read_file"]);
    }

    struct BrokenTool;

    #[async_trait]
    impl LegacyTool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
    }

    struct ScanTool;

    #[async_trait]
    impl LegacyTool for ScanTool {
        fn name(&self) -> &str {
            "scan"
        }

        async fn invoke_map(&self, _parameters: &Parameters) -> Result<String, ToolError> {
            Ok("Scanning project\nError: disk read failed".into())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ToolResult::ok("done"))
        }
    }

    #[tokio::test]
    async fn broken_tool_degrades_one_action() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ToolAdapter::new(BrokenTool)));
        let dispatcher = dispatcher(registry);
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(
                &[
                    Action::from_json("broken", json!({"x": 1})),
                    Action::from_json("respond", json!({"message": "next"})),
                ],
                &mut state,
            )
            .await;
        assert_eq!(results[0].status, ActionStatus::Errored);
        assert!(results[0].output_text().starts_with("Error executing broken: All execution methods failed"));
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn legacy_failure_after_first_line_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ToolAdapter::new(ScanTool)));
        let dispatcher = dispatcher(registry);
        let mut state = state(dir.path());

        let results = dispatcher
            .execute(&[Action::from_json("scan", json!({}))], &mut state)
            .await;
        assert_eq!(results[0].status, ActionStatus::Failed);
        assert!(results[0].output_text().contains("disk read failed"));
    }

    #[tokio::test]
    async fn interrupt_cancels_running_tool() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        let (tx, rx) = watch::channel(false);
        let dispatcher = dispatcher(registry).with_interrupt(rx);
        let mut state = state(dir.path());

        let interrupter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
            tx
        });
        let results = dispatcher
            .execute(&[Action::from_json("slow", json!({}))], &mut state)
            .await;
        interrupter.await.unwrap();

        assert_eq!(results[0].status, ActionStatus::TimedOut);
        assert_eq!(results[0].output_text(), "Interrupted: slow");
    }

    #[test]
    fn classification_markers() {
        let ok = |text: &str| ToolResult::ok(text);
        assert_eq!(classify_tool_result(&ok("Error: boom")), ActionStatus::Failed);
        assert_eq!(classify_tool_result(&ok("path does not exist")), ActionStatus::Failed);
        assert_eq!(classify_tool_result(&ok("all good\nError: in second line")), ActionStatus::Failed);
        assert_eq!(classify_tool_result(&ok("all good")), ActionStatus::Succeeded);
        assert_eq!(classify_tool_result(&ok("")), ActionStatus::Succeeded);
        assert_eq!(classify_tool_result(&ToolResult::failure("whatever")), ActionStatus::Failed);
    }

    #[test]
    fn structured_results_are_not_screened() {
        let read = ToolResult::ok("File: a.py (9 bytes)\n===\n\nError: x")
            .with_data(json!({"files": [{"path": "a.py", "content": "Error: x"}]}));
        assert_eq!(classify_tool_result(&read), ActionStatus::Succeeded);

        let command = ToolResult::ok("Command: grep 'Error:' log\nExit Code: 1")
            .with_data(json!({"command": "grep 'Error:' log", "exit_code": 1}));
        assert_eq!(classify_tool_result(&command), ActionStatus::Succeeded);
    }

    #[test]
    fn structured_only_output_is_kept() {
        let action = Action::from_json("legacy", json!({}));
        let result = tool_action_result(
            &action,
            AgentRole::Main,
            ActionStatus::Succeeded,
            ToolResult::ok("").with_data(json!({"count": 3})),
        );
        assert_eq!(result.output, ActionOutput::Structured(json!({"count": 3})));
        assert_eq!(result.extra.get("count"), Some(&json!(3)));
    }

    #[test]
    fn summaries() {
        let summary = |name: &str, params: Value| action_summary(&Action::from_json(name, params));
        assert_eq!(summary("read_file", json!({"file_path": "a.py"})), "Reading a.py");
        assert_eq!(summary("write_file", json!({"file_path_content": "b.py|x"})), "Writing to b.py");
        assert_eq!(summary("update_file", json!({"file_path": "c.py"})), "Updating c.py");
        assert_eq!(summary("list_files", json!({})), "Listing files in .");
        assert_eq!(summary("grep_files", json!({"pattern": "fn main"})), "Searching for 'fn main'");
        assert_eq!(summary("find_files", json!({"name_pattern": "*.rs"})), "Finding files matching '*.rs'");
        assert_eq!(summary("execute_command", json!({"command": "ls"})), "Running 'ls'");
        assert_eq!(summary("custom", json!({"a": 1, "b": "x"})), "Executing custom(a=1, b=x)");
    }
}
