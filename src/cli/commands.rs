//! CLI command definitions for compose-forge.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::capability::{CapabilityInvoker, LlmCapabilityInvoker, SimulatedInvoker};
use crate::catalog::ExecutorTemplate;
use crate::config::OrchestratorConfig;
use crate::context::TaskContext;
use crate::llm::LiteLlmClient;
use crate::metrics::OrchestratorMetrics;
use crate::orchestrator::MetaOrchestrator;
use crate::plan::{ExecutionPlan, ExecutionResult};

/// Compose and run capability-tagged executor pipelines.
#[derive(Parser, Debug)]
#[command(name = "compose-forge")]
#[command(about = "Analyze tasks, compose executor pipelines and learn reusable compositions")]
#[command(version)]
#[command(
    long_about = "compose-forge turns a task description into an execution plan: it infers the\nrequired capabilities, selects executors from a catalog, picks a composition pattern\nand runs it with cost-tier fallback, recording outcomes for reuse.\n\nExample usage:\n  compose-forge plan \"run security and coverage checks\"\n  compose-forge run --simulate \"fix the crash in the scheduler\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Orchestrator configuration YAML.
    #[arg(long, global = true, env = "COMPOSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Capability catalog YAML (defaults to the built-in catalog).
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Configuration store URL: `memory` or `sqlite://path.db`.
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// Context entries as key=value; values are parsed as JSON when possible.
    #[arg(short = 'c', long = "context", global = true, value_parser = parse_context_arg)]
    pub context: Vec<(String, Value)>,

    /// Print JSON instead of a human-readable summary.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Compose a plan for a task without running it.
    Plan(TaskArgs),

    /// Compose and execute a plan.
    Run(RunArgs),

    /// List the executor templates in the catalog.
    Catalog,

    /// Inspect learned configurations.
    Store(StoreArgs),
}

/// Arguments naming a task.
#[derive(Parser, Debug)]
pub struct TaskArgs {
    /// Natural-language task description.
    pub task: String,
}

/// Arguments for `compose-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Natural-language task description.
    pub task: String,

    /// Use the deterministic offline invoker instead of an LLM.
    #[arg(long)]
    pub simulate: bool,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `compose-forge store`.
#[derive(Parser, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreSubcommand,
}

/// Store subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum StoreSubcommand {
    /// List stored configurations for a task's signature.
    List(TaskArgs),
}

/// Parses a `key=value` context entry.
pub fn parse_context_arg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value.trim()).unwrap_or_else(|_| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let context: TaskContext = cli.context.iter().cloned().collect();

    match &cli.command {
        Commands::Plan(args) => run_plan_command(&config, &context, args, cli.json).await,
        Commands::Run(args) => run_run_command(&config, &context, args, cli.json).await,
        Commands::Catalog => run_catalog_command(&config, cli.json).await,
        Commands::Store(args) => match &args.command {
            StoreSubcommand::List(args) => run_store_list_command(&config, &context, args, cli.json).await,
        },
    }
}

/// File (if any), then environment, then command-line flags.
fn load_config(cli: &Cli) -> anyhow::Result<OrchestratorConfig> {
    let mut config = match &cli.config {
        Some(path) => OrchestratorConfig::from_path(path)?,
        None => OrchestratorConfig::default(),
    }
    .overlay_env()?;

    if let Some(catalog) = &cli.catalog {
        config = config.with_catalog_path(catalog.clone());
    }
    if let Some(store) = &cli.store {
        config = config.with_store_url(store.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn build_orchestrator(
    config: &OrchestratorConfig,
    invoker: Arc<dyn CapabilityInvoker>,
) -> anyhow::Result<MetaOrchestrator> {
    Ok(MetaOrchestrator::from_config(config, invoker).await?)
}

fn build_invoker(config: &OrchestratorConfig, simulate: bool) -> anyhow::Result<Arc<dyn CapabilityInvoker>> {
    if simulate {
        info!("Using simulated invoker");
        return Ok(Arc::new(SimulatedInvoker::new().with_pricing(config.pricing)));
    }

    let client = LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Set LITELLM_API_BASE or rerun with --simulate.",
            e
        )
    })?;
    info!(api_base = %client.api_base(), "Using LiteLLM client from environment");
    Ok(Arc::new(
        LlmCapabilityInvoker::new(Arc::new(client))
            .with_models(config.models.clone())
            .with_pricing(config.pricing),
    ))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_plan_command(
    config: &OrchestratorConfig,
    context: &TaskContext,
    args: &TaskArgs,
    json: bool,
) -> anyhow::Result<()> {
    // Planning never invokes an executor.
    let orchestrator = build_orchestrator(config, Arc::new(SimulatedInvoker::new())).await?;
    let plan = orchestrator.analyze_and_compose(&args.task, context).await?;

    if json {
        return print_json(&plan);
    }
    print_plan(&plan);
    Ok(())
}

async fn run_run_command(
    config: &OrchestratorConfig,
    context: &TaskContext,
    args: &RunArgs,
    json: bool,
) -> anyhow::Result<()> {
    let invoker = build_invoker(config, args.simulate)?;
    let metrics = Arc::new(OrchestratorMetrics::new()?);
    let orchestrator = build_orchestrator(config, invoker)
        .await?
        .with_metrics(metrics.clone());

    let plan = orchestrator.analyze_and_compose(&args.task, context).await?;
    let result = orchestrator.execute(&plan, context).await?;

    if json {
        print_json(&serde_json::json!({ "plan": plan, "result": result }))?;
    } else {
        print_plan(&plan);
        print_result(&result);
    }
    if args.metrics {
        print!("{}", metrics.export());
    }
    Ok(())
}

async fn run_catalog_command(config: &OrchestratorConfig, json: bool) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config, Arc::new(SimulatedInvoker::new())).await?;
    let templates = orchestrator.catalog().templates();

    if json {
        return print_json(&templates);
    }
    println!("{} executor templates", templates.len());
    for template in templates {
        print_template(template);
    }
    Ok(())
}

async fn run_store_list_command(
    config: &OrchestratorConfig,
    context: &TaskContext,
    args: &TaskArgs,
    json: bool,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config, Arc::new(SimulatedInvoker::new())).await?;
    let requirements = orchestrator.analyzer().analyze(&args.task, context)?;
    let signature = requirements.signature();
    let configurations = orchestrator.store().search(&signature, 0.0).await?;

    if json {
        return print_json(&configurations);
    }
    println!("Signature: {}", signature);
    if configurations.is_empty() {
        println!("  (no stored configurations)");
    }
    for stored in &configurations {
        let executors: Vec<String> = stored
            .executors
            .iter()
            .map(|r| format!("{}.{}", r.role, r.tier))
            .collect();
        println!(
            "  {}  {:<11} rate {:.2} ({}/{})  avg quality {:.2}  [{}]",
            stored.id,
            stored.pattern.as_str(),
            stored.success_rate(),
            stored.success_count(),
            stored.usage_count(),
            stored.average_quality(),
            executors.join(", ")
        );
    }
    Ok(())
}

fn print_template(template: &ExecutorTemplate) {
    let capabilities: Vec<&str> = template.capabilities.iter().map(String::as_str).collect();
    println!(
        "  {:<28} {:<5} {:>6}ms {:>6} tok  {}",
        template.id,
        template.cost_tier.as_str(),
        template.limits.timeout_ms,
        template.limits.max_tokens,
        capabilities.join(", ")
    );
}

fn print_plan(plan: &ExecutionPlan) {
    println!("Plan {}", plan.id);
    println!("  Pattern:    {}", plan.pattern);
    println!("  Domain:     {}", plan.requirements.domain);
    println!("  Complexity: {}", plan.requirements.complexity);
    println!("  Signature:  {}", plan.signature.short());
    match plan.reused_configuration() {
        Some(id) => println!("  Source:     reused configuration {}", id),
        None => println!("  Source:     fresh"),
    }
    println!(
        "  Estimate:   ${:.4}, {:.1}s",
        plan.estimated_cost,
        plan.estimated_duration.as_secs_f64()
    );
    println!("  Executors:");
    for (position, template) in plan.executors.iter().enumerate() {
        println!("    {}. {}", position + 1, template.id);
    }
}

fn print_result(result: &ExecutionResult) {
    println!();
    println!(
        "{} {} in {:.2}s, cost ${:.4}",
        if result.success { "✓" } else { "✗" },
        result.pattern,
        result.total_duration.as_secs_f64(),
        result.total_cost
    );
    if let Some(confidence) = result.confidence {
        println!("  Confidence: {:.2}", confidence);
    }
    for slot in &result.executor_results {
        let status = if slot.success { "ok" } else { "failed" };
        let escalation = slot
            .fallback_from
            .map(|from| format!(" (escalated from {})", from))
            .unwrap_or_default();
        println!("  {:<28} {:<6} {}{}", slot.executor_id, status, slot.tier, escalation);
        if let Some(error) = &slot.error {
            println!("    error: {}", error.message);
        }
    }
    for gate in result.failed_gates() {
        println!("  gate failed: {}", gate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_context_arg() {
        assert_eq!(
            parse_context_arg("complexity=complex").expect("pair"),
            ("complexity".to_string(), Value::String("complex".to_string()))
        );
        assert_eq!(
            parse_context_arg("parallelizable=true").expect("pair"),
            ("parallelizable".to_string(), Value::Bool(true))
        );
        assert_eq!(
            parse_context_arg("capabilities=[\"debugging\"]").expect("pair").1,
            serde_json::json!(["debugging"])
        );
        assert!(parse_context_arg("novalue").is_err());
        assert!(parse_context_arg("=x").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "compose-forge",
            "run",
            "--simulate",
            "fix the crash",
            "--store",
            "memory",
            "-c",
            "complexity=simple",
        ])
        .expect("parse");

        assert_eq!(cli.store.as_deref(), Some("memory"));
        assert_eq!(cli.context.len(), 1);
        match cli.command {
            Commands::Run(args) => {
                assert!(args.simulate);
                assert_eq!(args.task, "fix the crash");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_store_list_subcommand() {
        let cli = Cli::try_parse_from(["compose-forge", "store", "list", "audit dependencies"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Store(StoreArgs {
                command: StoreSubcommand::List(_)
            })
        ));
    }
}
