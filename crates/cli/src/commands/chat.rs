//! `codeloop chat`: interactive or single-message mode.

use anyhow::Context;
use codeloop_agent::{
    ActionDispatcher, ContextStore, ConversationDriver, ProviderSummarizer, TurnState, UiSink,
};
use codeloop_config::AppConfig;
use codeloop_core::{ActionResult, AgentRole, AutonomyLevel, EventBus};
use codeloop_security::{
    Approver, AutoApprove, Decision, DenyAll, PermissionManager, PermissionRequest, ProjectSandbox,
};
use codeloop_tools::{ToolContext, default_registry};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::debug;

pub async fn run(project: &Path, model: Option<String>, message: Option<String>) -> anyhow::Result<()> {
    let root = project
        .canonicalize()
        .with_context(|| format!("Project directory '{}' not found", project.display()))?;
    let mut config = AppConfig::load(&root).context("Failed to load config")?;
    if let Some(model) = model {
        config.default_model = model;
    }

    let input = ConsoleInput::spawn();
    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    let interrupt = Arc::new(interrupt_tx);

    let router = codeloop_providers::router::build_from_config(&config);
    let provider = router
        .default()
        .with_context(|| format!("Provider '{}' is not configured", config.default_provider))?;

    let approver: Box<dyn Approver> = match config.autonomy.autonomy_level()? {
        AutonomyLevel::Supervised => Box::new(ConsoleApprover { input: input.clone() }),
        AutonomyLevel::Full => Box::new(AutoApprove),
        AutonomyLevel::ReadOnly => Box::new(DenyAll),
    };
    let permissions = PermissionManager::new(config.autonomy.autonomy_level()?, approver);
    let sandbox = ProjectSandbox::new(&root, &config.autonomy.forbidden_paths)?;
    let tool_ctx = ToolContext::new(Arc::new(sandbox), Arc::new(permissions))
        .with_allowed_commands(config.autonomy.allowed_commands.clone())
        .with_command_timeout(Duration::from_secs(config.agent.tool_timeout_secs));

    let events = Arc::new(EventBus::default());
    let dispatcher = ActionDispatcher::new(
        Arc::new(default_registry(tool_ctx)),
        config.protocol.to_protocol(),
    )
    .with_sink(Arc::new(ConsoleSink))
    .with_event_bus(events.clone())
    .with_interrupt(interrupt_rx.clone());
    let driver = ConversationDriver::from_config(&config, provider.clone(), dispatcher)
        .with_event_bus(events)
        .with_interrupt(interrupt_rx);

    let mut context = ContextStore::from_config(&config.context);
    if config.context.llm_summaries {
        context = context.with_summarizer(Arc::new(
            ProviderSummarizer::new(provider, config.default_model.clone())
                .with_max_chars(config.context.summary_max_chars),
        ));
    }
    let mut state = driver.new_state(&root, context);

    if let Some(message) = message {
        let reply = run_turn(&driver, &mut state, &interrupt, &message).await;
        println!("{reply}");
        return Ok(());
    }

    println!();
    println!("  codeloop, interactive mode");
    println!();
    println!("  Project:   {}", root.display());
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Autonomy:  {}", config.autonomy.level);
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!("  Type 'exit' or press Ctrl+C to quit.");
    println!();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = input.next_line() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        if let Some(command) = SlashCommand::parse(line) {
            command.apply(&mut state).await;
            continue;
        }

        let reply = run_turn(&driver, &mut state, &interrupt, line).await;
        println!();
        for line in reply.lines() {
            println!("  Assistant > {line}");
        }
        println!();
    }

    Ok(())
}

/// Run one turn with Ctrl+C mapped to the interrupt handle.
async fn run_turn(
    driver: &ConversationDriver,
    state: &mut TurnState,
    interrupt: &Arc<watch::Sender<bool>>,
    text: &str,
) -> String {
    interrupt.send_replace(false);
    let tx = interrupt.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupting...");
            tx.send_replace(true);
        }
    });

    let reply = driver.process_message(state, text).await;
    watcher.abort();
    reply
}

/// Lines typed by the user, read on a dedicated thread so that a pending
/// read never holds up shutdown.
#[derive(Clone)]
struct ConsoleInput {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl ConsoleInput {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(16);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.blocking_send(line.trim_end().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("stdin closed");
        });
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }

    /// For callers on the runtime that cannot await, such as the approver.
    fn blocking_next_line(&self) -> Option<String> {
        tokio::task::block_in_place(|| self.lines.blocking_lock().blocking_recv())
    }
}

/// Asks on the terminal before writes and commands.
struct ConsoleApprover {
    input: ConsoleInput,
}

impl Approver for ConsoleApprover {
    fn decide(&self, request: &PermissionRequest) -> Decision {
        eprint!(
            "\n  Allow codeloop to {} '{}'? [y] once, [a] for this session, [N] deny: ",
            request.operation.describe(),
            request.target
        );
        let _ = std::io::stderr().flush();
        parse_decision(self.input.blocking_next_line().as_deref().unwrap_or_default())
    }
}

fn parse_decision(answer: &str) -> Decision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::AllowOnce,
        "a" | "always" | "s" | "session" => Decision::AllowSession,
        _ => Decision::Deny,
    }
}

/// Prints agent messages and action progress.
struct ConsoleSink;

impl UiSink for ConsoleSink {
    fn announce(&self, agent: AgentRole, message: &str) {
        let tag = match agent {
            AgentRole::Main => "Agent",
            AgentRole::Sub => "Sub-agent",
        };
        for line in message.lines() {
            println!("  {tag} > {line}");
        }
    }

    fn action_started(&self, summary: &str) {
        println!("  ... {summary}");
    }

    fn action_finished(&self, result: &ActionResult) {
        if !result.is_success() {
            let output = result.output_text();
            let first = output.lines().next().unwrap_or_default();
            println!("  [{}] {}: {first}", result.status.label(), result.action);
        }
    }
}

/// Session commands typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum SlashCommand {
    Help,
    Context,
    Pin(String),
    Unpin(String),
    Forget(String),
    Unknown(String),
}

impl SlashCommand {
    fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let with_path = |make: fn(String) -> Self| {
            if arg.is_empty() {
                Self::Unknown(format!("/{name} needs a file path"))
            } else {
                make(arg.to_string())
            }
        };
        Some(match name {
            "help" => Self::Help,
            "context" => Self::Context,
            "pin" => with_path(Self::Pin),
            "unpin" => with_path(Self::Unpin),
            "forget" => with_path(Self::Forget),
            other => Self::Unknown(format!("Unknown command /{other}")),
        })
    }

    async fn apply(self, state: &mut TurnState) {
        match self {
            Self::Help => {
                println!("  /context        show the files and directories the agent knows");
                println!("  /pin <path>     keep a file's full content in context");
                println!("  /unpin <path>   let a pinned file be summarized again");
                println!("  /forget <path>  drop a file from context for this session");
                println!("  exit, quit      leave");
            }
            Self::Context => {
                println!("{}", state.exploration.render());
                println!("{}", state.context.render());
            }
            Self::Pin(path) => {
                let evicted = state.context.pin(&path).await;
                println!("  Pinned {path}");
                report_evicted(&evicted);
            }
            Self::Unpin(path) => match state.context.unpin(&path).await {
                Ok(evicted) => {
                    println!("  Unpinned {path}");
                    report_evicted(&evicted);
                }
                Err(e) => println!("  {e}"),
            },
            Self::Forget(path) => {
                if state.context.forget(&path) {
                    println!("  Forgot {path}");
                } else {
                    println!("  {path} was not in context; it will be ignored from now on");
                }
            }
            Self::Unknown(message) => println!("  {message}"),
        }
    }
}

fn report_evicted(paths: &[String]) {
    if !paths.is_empty() {
        println!("  Summarized to make room: {}", paths.join(", "));
    }
}
