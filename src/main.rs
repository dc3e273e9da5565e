// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use dotenv::dotenv;
use sieve_rs::adk::model::{create_model, ModelSettings};
use sieve_rs::adk::oracle::{ModelOracle, Oracle, Prompt};
use sieve_rs::sieve::report::ExtractionReport;
use sieve_rs::sieve::workflow::graph::WorkflowDefinition;
use sieve_rs::sieve::workflow::{
    Builder, EngineEvent, InitialDocument, StageRegistry, WorkflowLoader, WorkflowState,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Where the workflow topology comes from
#[derive(ClapArgs, Debug)]
struct TopologyArgs {
    /// Path to a workflow YAML file
    #[arg(short, long, conflicts_with = "topology")]
    workflow: Option<PathBuf>,

    /// Name of a built-in topology
    #[arg(short, long, default_value = "supervised")]
    topology: String,
}

impl TopologyArgs {
    fn load(&self) -> anyhow::Result<WorkflowDefinition> {
        let loader = WorkflowLoader::new();
        let mut def = match &self.workflow {
            Some(path) => loader.load_workflow(path)?,
            None => loader.builtin(&self.topology)?,
        };
        def.engine = def.engine.with_env_overrides();
        Builder::validate(&def)?;
        Ok(def)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the extraction workflow over a text file
    Extract {
        /// File holding the document text
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        topology: TopologyArgs,

        /// Document id; a UUID is generated when omitted
        #[arg(long)]
        document_id: Option<String>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The model to use
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Send a single prompt to the configured model
    Prompt {
        /// The prompt to send
        #[arg(short, long)]
        prompt: String,

        /// The model to use
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Validate a topology and print its routing tables
    Topology {
        #[command(flatten)]
        topology: TopologyArgs,
    },
}

fn build_oracle(model: Option<String>) -> anyhow::Result<Arc<dyn Oracle>> {
    let settings = ModelSettings::from_env(model)?;
    let model = create_model(&settings)?;
    Ok(Arc::new(ModelOracle::new(model, settings.generation)))
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::StageStarted { stage, step } => log::info!("[{}] step {}", stage, step),
        EngineEvent::StageCompleted { stage, description } => {
            log::info!("[{}] {}", stage, description)
        }
        EngineEvent::StageFailed { stage, error } => log::warn!("[{}] failed: {}", stage, error),
        EngineEvent::Routed { from, directive, to } => log::debug!(
            "{} -> {} (directive: {})",
            from,
            to,
            directive.as_deref().unwrap_or("none")
        ),
        EngineEvent::BudgetExhausted { steps, review_stage } => {
            log::warn!("Budget exhausted after {} steps, forcing {}", steps, review_stage)
        }
        EngineEvent::Cancelled { reason } => log::warn!("Run cancelled: {}", reason),
        EngineEvent::Finished { termination, steps } => {
            log::info!("Finished ({:?}) after {} steps", termination, steps)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Extract {
            input,
            topology,
            document_id,
            output,
            model,
        } => {
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let def = topology.load()?;

            let oracle = build_oracle(model)?;
            let registry = StageRegistry::with_builtin_stages(oracle, &def.engine).await;
            let engine = Builder::new(registry).build_from_def(&def).await?;

            let mut document = InitialDocument::new(content);
            if let Some(id) = document_id {
                document = document.with_document_id(id);
            }
            let state = WorkflowState::from_initial(document);

            let token = CancellationToken::new();
            let ctrl_c = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, stopping after the current stage");
                    ctrl_c.cancel();
                }
            });

            let (tx, mut rx) = mpsc::channel(32);
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    log_event(&event);
                }
            });

            println!("Running workflow: {}", engine.name());
            let outcome = engine.run_stream(state, &token, tx).await;
            printer.await.ok();

            let report = ExtractionReport::from_outcome(&outcome);
            let json = report.to_json_pretty()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Prompt { prompt, model } => {
            let oracle = build_oracle(model)?;
            println!("Sending prompt: {}", prompt);
            let response = oracle
                .invoke(&Prompt::new("prompt", "You are a helpful assistant.", prompt))
                .await?;
            println!("Response: {}", response);
        }
        Commands::Topology { topology } => {
            let def = topology.load()?;
            println!("Workflow: {} (entry: {})", def.name, def.entry);
            if !def.description.is_empty() {
                println!("{}", def.description);
            }
            println!(
                "Budget: {} steps, rework ceiling {}, review stage {}",
                def.engine.step_budget, def.engine.rework_ceiling, def.engine.review_stage
            );
            let router = Builder::router(&def);
            for id in def.stage_ids() {
                let Some(table) = router.table(id) else {
                    continue;
                };
                println!("\n{}:", id);
                for (directive, target) in table.sorted_routes() {
                    println!("  {} -> {}", directive, target);
                }
                println!("  * -> {}", table.default_target());
            }
        }
    }

    Ok(())
}
