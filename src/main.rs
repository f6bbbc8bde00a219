use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use loan_review_workflow::config::LoanReviewConfig;
use loan_review_workflow::handlers::LoanReviewRouter;
use loan_review_workflow::orchestration::{InMemoryOrchestrator, LocalWorkflowDriver};
use loan_review_workflow::persistence::{InMemoryWorkflowRepository, WorkflowRepository};
use loan_review_workflow::telemetry::{init_telemetry, shutdown_telemetry};
use loan_review_workflow::ReviewCoordinator;

#[derive(Parser)]
#[command(name = "loan-review")]
#[command(about = "Loan review workflow handlers with a synchronous callback bridge")]
#[command(long_about = "Routes loan review events (startPpaReviewApi, loanDecisionUpdateApi, \
                       completionCriteria, ...) through the review coordinator against local \
                       infrastructure: an in-process workflow engine and an in-memory or SQLite store.")]
struct Cli {
    /// Extra configuration file layered over loan-review.toml and defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one JSON event (file path, or - for stdin) and print the response
    Invoke {
        /// Event file, or - to read stdin
        #[arg(long, default_value = "-")]
        event: String,
    },
    /// Run a review end to end against the local engine
    Simulate {
        #[arg(long)]
        request: String,
        #[arg(long)]
        loan: String,
        #[arg(long, default_value = "LDC", help = "LDC, Sec Policy or Conduit")]
        review_type: String,
        /// Attribute to review; starts Pending
        #[arg(long = "attribute")]
        attributes: Vec<String>,
        /// Decision update as NAME=DECISION, applied one call at a time
        #[arg(long = "decide")]
        decisions: Vec<String>,
        /// Reviewer recorded on each update
        #[arg(long, default_value = "reviewer")]
        user: String,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Write it to this file instead of stdout
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => {
            let _ = LoanReviewConfig::load_env_file();
            LoanReviewConfig::load_with(Some(path))?
        }
        None => loan_review_workflow::config()?.clone(),
    };

    match cli.command {
        Commands::Config { write: Some(path) } => {
            config.save_to_file(&path)?;
            println!("Configuration written to {}", path.display());
            Ok(())
        }
        Commands::Config { write: None } => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Invoke { event } => {
            init_telemetry(&config.observability)?;
            let result = tokio::runtime::Runtime::new()?.block_on(invoke_command(&config, &event));
            shutdown_telemetry();
            result
        }
        Commands::Simulate {
            request,
            loan,
            review_type,
            attributes,
            decisions,
            user,
        } => {
            init_telemetry(&config.observability)?;
            let result = tokio::runtime::Runtime::new()?.block_on(simulate_command(
                &config,
                SimulateArgs {
                    request,
                    loan,
                    review_type,
                    attributes,
                    decisions,
                    user,
                },
            ));
            shutdown_telemetry();
            result
        }
    }
}

struct SimulateArgs {
    request: String,
    loan: String,
    review_type: String,
    attributes: Vec<String>,
    decisions: Vec<String>,
    user: String,
}

async fn build_repository(config: &LoanReviewConfig) -> Result<Arc<dyn WorkflowRepository>> {
    #[cfg(feature = "database")]
    {
        if let Some(database) = &config.database {
            let repository =
                loan_review_workflow::persistence::SqliteWorkflowRepository::connect(database).await?;
            return Ok(Arc::new(repository));
        }
    }

    #[cfg(not(feature = "database"))]
    {
        if config.database.is_some() {
            tracing::warn!("Database configured but the binary was built without the database feature");
        }
    }

    Ok(Arc::new(InMemoryWorkflowRepository::new()))
}

/// Router plus a driver playing the workflow engine locally
async fn local_router(config: &LoanReviewConfig) -> Result<LoanReviewRouter> {
    let repository = build_repository(config).await?;
    let engine = Arc::new(InMemoryOrchestrator::new());
    let coordinator = Arc::new(ReviewCoordinator::from_config(config, repository, engine.clone())?);

    let events = engine.subscribe().await;
    LocalWorkflowDriver::new(coordinator.clone(), engine).spawn(events);

    Ok(LoanReviewRouter::new(coordinator))
}

fn read_event(source: &str) -> Result<Value> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read event from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read event file {}", source))?
    };
    serde_json::from_str(&raw).context("Event is not valid JSON")
}

async fn invoke_command(config: &LoanReviewConfig, source: &str) -> Result<()> {
    let event = read_event(source)?;
    let router = local_router(config).await?;
    let response = router.route(event).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn simulate_command(config: &LoanReviewConfig, args: SimulateArgs) -> Result<()> {
    let router = local_router(config).await?;

    let attributes: Vec<Value> = args
        .attributes
        .iter()
        .map(|name| json!({"Name": name, "Decision": "Pending"}))
        .collect();
    let started = router
        .route(json!({
            "handlerType": "startPpaReviewApi",
            "RequestNumber": args.request,
            "LoanNumber": args.loan,
            "ReviewType": args.review_type,
            "ReviewStepUserId": args.user,
            "Attributes": attributes,
        }))
        .await;
    println!("{}", serde_json::to_string_pretty(&started)?);
    if started.get("Success") == Some(&Value::Bool(false)) {
        bail!("Review could not be started");
    }

    for decision in &args.decisions {
        let Some((name, value)) = decision.split_once('=') else {
            bail!("Decision must look like NAME=DECISION, got {}", decision);
        };
        // Let the engine reach its wait step before the next update.
        wait_for_token(&router, &args.request, &args.loan).await;

        let response = router
            .route(json!({
                "handlerType": "loanDecisionUpdateApi",
                "RequestNumber": args.request,
                "LoanNumber": args.loan,
                "ReviewStepUserId": args.user,
                "Attributes": [{"Name": name.trim(), "Decision": value.trim()}],
            }))
            .await;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    let key = loan_review_workflow::WorkflowKey::new(args.request.clone(), args.loan.clone());
    router.coordinator().bridge().log_stats();
    match router.coordinator().get_review(&key).await {
        Ok(record) => println!(
            "Final state: {} ({}), status {}",
            record.workflow_state_name,
            record.current_stage,
            record.status().as_str()
        ),
        Err(e) => bail!("Review disappeared: {}", e),
    }
    Ok(())
}

async fn wait_for_token(router: &LoanReviewRouter, request: &str, loan: &str) {
    let key = loan_review_workflow::WorkflowKey::new(request, loan);
    for _ in 0..100 {
        match router.coordinator().get_review(&key).await {
            Ok(record) if record.resume_token.is_some() || record.is_terminal() => return,
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
}
