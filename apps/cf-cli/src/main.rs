use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod config;
mod demo;
mod error;

use cf_graph::{loop_shape, validate};
use error::CliResult;

#[derive(Parser)]
#[command(name = "cf-cli")]
#[command(about = "cycleflow CLI - build, inspect and run dataflow loops and their gradients", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the step loop with its gradient loops and run it
    Demo {
        /// Demo config YAML file (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List every node of the demo graph
    Describe {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Build the demo graph and check its structure
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write the default demo config
    WriteConfig {
        /// Output YAML path
        path: PathBuf,
    },
}

fn main() -> CliResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { config } => cmd_demo(config.as_deref()),
        Commands::Describe { config } => cmd_describe(config.as_deref()),
        Commands::Validate { config } => cmd_validate(config.as_deref()),
        Commands::WriteConfig { path } => cmd_write_config(&path),
    }
}

fn cmd_demo(config_path: Option<&Path>) -> CliResult<()> {
    let config = config::load(config_path)?;
    println!(
        "Running: x = {}; while x < {}: x += {}  (frame '{}')",
        config.start, config.limit, config.step, config.frame_name
    );

    let graph = demo::build(&config)?;
    let report = demo::run(&graph, &config)?;

    println!("  Final value:  {}", report.final_value);
    println!("  Iterations:   {}", report.iterations);
    println!("  Backprop predicate: {:?}", report.predicates);
    println!(
        "  Gradient:     {} (expected {})",
        report.gradient, report.expected_gradient
    );
    if report.gradient_ok {
        println!("✓ Gradient matches");
    } else {
        println!("✗ Gradient mismatch");
    }
    Ok(())
}

fn cmd_describe(config_path: Option<&Path>) -> CliResult<()> {
    let config = config::load(config_path)?;
    let graph = demo::build(&config)?;
    println!("Graph: {} nodes", graph.graph.node_count());
    for line in demo::describe(&graph.graph) {
        println!("  {line}");
    }
    Ok(())
}

fn cmd_validate(config_path: Option<&Path>) -> CliResult<()> {
    let config = config::load(config_path)?;
    let demo = demo::build(&config)?;
    validate(&demo.graph)?;
    for (id, ctx) in demo.graph.loop_contexts() {
        let shape = loop_shape(&demo.graph, id)?;
        println!(
            "  {id} '{}': {} enter, {} merge, {} switch, {} next iteration, {} exit",
            ctx.frame_name(),
            shape.enters.len(),
            shape.merges.len(),
            shape.switches.len(),
            shape.next_iterations.len(),
            shape.exits.len()
        );
    }
    println!("✓ Graph is valid");
    Ok(())
}

fn cmd_write_config(path: &Path) -> CliResult<()> {
    config::save(path, &config::DemoConfig::default())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
