// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::PathBuf;

use switchboard_rs::switchboard::checkpoint::Checkpointer;
use switchboard_rs::switchboard::config::EngineConfig;
use switchboard_rs::switchboard::workflow::builder::Builder;
use switchboard_rs::switchboard::workflow::graph::RunConfig;
use switchboard_rs::switchboard::workflow::registry::StepRegistry;
use switchboard_rs::switchboard::workflow::state::PartialState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a graph defined in YAML
    Run {
        /// Path to the graph file
        #[arg(short, long)]
        graph: PathBuf,

        /// Conversation thread; a new one is started when omitted
        #[arg(short, long)]
        thread: Option<String>,

        /// Request text
        #[arg(short, long)]
        input: String,

        /// State key that receives the request text
        #[arg(long, default_value = "query")]
        input_key: String,

        /// Extra initial fields as key=json (bare words are taken as text)
        #[arg(long = "set", value_name = "KEY=JSON")]
        set: Vec<String>,
    },
    /// Print the stored state of a thread
    Show {
        #[arg(short, long)]
        thread: String,
    },
    /// Delete the stored state of a thread
    Forget {
        #[arg(short, long)]
        thread: String,
    },
    /// List threads with stored state
    Threads,
}

fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=json, got '{}'", raw))?;
    if key.is_empty() {
        return Err(anyhow!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    let checkpointer = config.checkpointer();

    match args.command {
        Commands::Run {
            graph,
            thread,
            input,
            input_key,
            set,
        } => {
            let builder = Builder::new(StepRegistry::new(), config).with_checkpointer(checkpointer);
            let compiled = builder
                .build_graph(&graph)
                .await
                .with_context(|| format!("failed to build {}", graph.display()))?;

            let mut update = PartialState::new().set(input_key, input);
            for raw in &set {
                let (key, value) = parse_assignment(raw)?;
                update.insert(key, value);
            }

            let thread_id = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            println!("Running graph '{}' on thread {}", compiled.name(), thread_id);

            let output = compiled
                .invoke_traced(update, &RunConfig::new(thread_id))
                .await?;
            for record in output.degraded() {
                eprintln!(
                    "degraded: {} ({})",
                    record.step,
                    record.degraded.as_deref().unwrap_or("no reason")
                );
            }
            println!("{}", serde_json::to_string_pretty(&output.state)?);
        }
        Commands::Show { thread } => match checkpointer.load(&thread).await? {
            Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
            None => println!("No state stored for thread {}", thread),
        },
        Commands::Forget { thread } => {
            if checkpointer.delete(&thread).await? {
                println!("Forgot thread {}", thread);
            } else {
                println!("No state stored for thread {}", thread);
            }
        }
        Commands::Threads => {
            for thread in checkpointer.list_threads().await? {
                println!("{}", thread);
            }
        }
    }

    Ok(())
}
