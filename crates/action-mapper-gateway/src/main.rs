//! ActionMapper gateway entry point.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;

use action_mapper::{EvalMethod, ResponseEnvelope};
use action_mapper_gateway::config::{resolve_rules_dir, GatewayConfig};
use action_mapper_gateway::dispatch::ReqwestDispatcher;
use action_mapper_gateway::executor::ActionExecutor;
use action_mapper_gateway::rest;
use action_mapper_gateway::rules::RuleRegistry;

#[derive(Parser)]
#[command(
    name = "action-gateway",
    about = "Invoke semantic actions against plain REST APIs using declarative mapping rules",
    version
)]
struct Cli {
    /// Directory of action rule files.
    #[arg(short, long, global = true)]
    rules: Option<String>,

    /// Evaluator for `{{ ... }}` expressions (eval, sandbox).
    #[arg(long, global = true)]
    eval: Option<EvalMethod>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API (default).
    Serve {
        /// Listen address (host:port). Overrides gateway.json.
        #[arg(long)]
        addr: Option<String>,
    },

    /// List the actions found in the rules directory.
    List,

    /// Check every action file in the rules directory.
    Validate,

    /// Print the HTTP request an action would send, without sending it.
    Request {
        action: String,

        /// JSON file holding the action; reads stdin when omitted or `-`.
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Map a recorded reply through an action's response rules.
    Response {
        action: String,

        /// JSON file holding `{"headers": {...}, "body": ...}`; stdin when omitted or `-`.
        #[arg(short, long)]
        input: Option<String>,

        /// JSON file holding the object to fold the reply into.
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Invoke an action against its upstream API and print the result.
    Invoke {
        action: String,

        /// JSON file holding the action; reads stdin when omitted or `-`.
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   action-gateway completions bash > ~/.local/share/bash-completion/completions/action-gateway
    ///   action-gateway completions zsh > ~/.zfunc/_action-gateway
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rules_dir = resolve_rules_dir(cli.rules.as_deref());

    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Serve { addr } => {
            let (executor, config) = build_executor(&rules_dir, cli.eval)?;
            let addr = addr.unwrap_or(config.listen_addr);
            rest::start(&addr, Arc::new(executor)).await?;
        }

        Commands::List => {
            let registry = RuleRegistry::load_dir(&rules_dir)?;
            for action in registry.list() {
                println!(
                    "{:<24} {:<7} {}",
                    action.name, action.method, action.url
                );
            }
        }

        Commands::Validate => match RuleRegistry::load_dir(&rules_dir) {
            Ok(registry) => {
                println!("Valid rules directory: {}", rules_dir.display());
                println!("  Actions: {}", registry.len());
                for name in registry.names() {
                    println!("    {name}");
                }
            }
            Err(e) => {
                eprintln!("Invalid rules: {e}");
                std::process::exit(1);
            }
        },

        Commands::Request { action, input } => {
            let (executor, _) = build_executor(&rules_dir, cli.eval)?;
            let invocation = read_json(input.as_deref())?;
            let request = executor.map_request(&action, &invocation)?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }

        Commands::Response {
            action,
            input,
            target,
        } => {
            let (executor, _) = build_executor(&rules_dir, cli.eval)?;
            let response: ResponseEnvelope = serde_json::from_value(read_json(input.as_deref())?)
                .context("reply must look like {\"headers\": {...}, \"body\": ...}")?;
            let target = target.as_deref().map(|t| read_json(Some(t))).transpose()?;
            let result = executor.map_response(&action, &response, target)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Invoke { action, input } => {
            let (executor, _) = build_executor(&rules_dir, cli.eval)?;
            let invocation = read_json(input.as_deref())?;
            let result = executor.invoke(&action, invocation).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "action-gateway", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn build_executor(
    rules_dir: &Path,
    eval: Option<EvalMethod>,
) -> anyhow::Result<(ActionExecutor, GatewayConfig)> {
    let mut config = GatewayConfig::load(rules_dir)?;
    if let Some(eval) = eval {
        config.eval_method = eval;
    }
    let registry = RuleRegistry::load_dir(rules_dir)?;
    let dispatcher = ReqwestDispatcher::new(&config)?;
    let executor = ActionExecutor::new(registry, Arc::new(dispatcher), &config);
    Ok((executor, config))
}

fn read_json(source: Option<&str>) -> anyhow::Result<Value> {
    let raw = match source {
        None | Some("-") => std::io::read_to_string(std::io::stdin())?,
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?
        }
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}
