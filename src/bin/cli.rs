//! AgentCore CLI
//!
//! Runs a single prompt through the agent and prints the final response.
//! Exit codes: 0 success, 1 user/validation error, 2 LLM unavailable,
//! 3 timeout, 4 internal error.

use agentcore::agent::{Agent, RunMode, RunResult, RunStatus};
use agentcore::config::{load_config, state_dir, Config};
use agentcore::session::{SessionSnapshot, SessionStore};
use agentcore::tools::{ReadFileTool, TimeTool, Tool, WriteFileTool};
use agentcore::{Error, VERSION};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "agentcore",
    author = "AgentCore Contributors",
    version = VERSION,
    about = "AgentCore - resilient tool-calling agent runtime",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prompt through the agent
    Run {
        /// The prompt to act on
        prompt: String,

        /// Execution mode
        #[arg(long, value_enum, default_value = "act")]
        mode: Mode,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,

        /// Override the sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Override the completion token budget
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Session file to restore from and save to
        #[arg(long)]
        session: Option<PathBuf>,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,

        /// Disable identity sanitisation of the final response
        #[arg(long)]
        no_sanitize: bool,
    },

    /// List the built-in tools
    Tools,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Act,
    Plan,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Act => RunMode::Act,
            Mode::Plan => RunMode::Plan,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    std::process::exit(run_command(cli.command).await);
}

async fn run_command(command: Commands) -> i32 {
    match command {
        Commands::Run {
            prompt,
            mode,
            model,
            temperature,
            max_tokens,
            session,
            debug,
            no_sanitize,
        } => {
            init_tracing(debug);
            match run_prompt(prompt, mode.into(), model, temperature, max_tokens, session, no_sanitize)
                .await
            {
                Ok(result) => {
                    println!("{}", result.response);
                    exit_code_for(&result)
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit_code_for_error(&e)
                }
            }
        }
        Commands::Tools => {
            init_tracing(false);
            for tool in builtin_tools(&Config::default()) {
                println!("{:<12} {}", tool.name(), tool.description());
            }
            0
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "agentcore=debug" } else { "agentcore=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_prompt(
    prompt: String,
    mode: RunMode,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    session: Option<PathBuf>,
    no_sanitize: bool,
) -> agentcore::Result<RunResult> {
    let mut config = load_config()?;

    // CLI flags override the active backend configuration.
    let active = config.active_llm.clone();
    if let Some(backend) = config.llm.get_mut(&active) {
        if let Some(model) = model {
            backend.model = model;
        }
        if let Some(temperature) = temperature {
            backend.temperature = temperature;
        }
        if let Some(max_tokens) = max_tokens {
            backend.max_tokens = max_tokens;
        }
    }
    if no_sanitize {
        config.sanitizer.enabled = false;
    }

    let store = SessionStore::new(session.or_else(|| config.session.file.clone()).unwrap_or_else(
        || state_dir().join("session.json"),
    ));

    let mut agent = Agent::new(config.clone())?;
    agent.register_tools(builtin_tools(&config))?;

    let snapshot = store.load();
    if !snapshot.messages.is_empty() {
        debug!("Restoring {} messages from session", snapshot.messages.len());
        agent.load_messages(snapshot.messages);
    }

    let result = agent.run_with_mode(&prompt, mode).await?;

    store.save(&SessionSnapshot {
        messages: agent.messages(),
        mode,
        system_prompt: agent.system_prompt(),
    })?;

    Ok(result)
}

fn builtin_tools(config: &Config) -> Vec<Arc<dyn Tool>> {
    let workspace = config.security.workspace_dir.clone();
    vec![
        Arc::new(TimeTool),
        Arc::new(ReadFileTool::new(workspace.clone())),
        Arc::new(WriteFileTool::new(workspace)),
    ]
}

fn exit_code_for(result: &RunResult) -> i32 {
    if result.status == RunStatus::Success {
        return 0;
    }
    let kinds: Vec<&str> = result
        .diagnostic_report
        .entries
        .iter()
        .map(|e| e.kind.as_str())
        .collect();
    if kinds.contains(&"model_unavailable") {
        2
    } else if kinds.contains(&"deadline") {
        3
    } else {
        4
    }
}

fn exit_code_for_error(error: &Error) -> i32 {
    match error {
        Error::ModelUnavailable(_) => 2,
        Error::Deadline(_) | Error::ToolTimeout(_) => 3,
        e if e.is_client_error() => 1,
        Error::Config(_) => 1,
        _ => 4,
    }
}
