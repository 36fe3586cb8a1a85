use clap::Parser;
use std::path::PathBuf;

use lifewire::options::AnalysisOptions;
use lifewire::pass::{descriptor, PassId, ALL_PASSES};
use lifewire::pipeline::{run_pipeline, CompilationState};
use lifewire::visit::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Emit {
    Diagnostics,
    Graph,
    Dot,
    Fingerprint,
}

#[derive(Parser, Debug)]
#[command(
    name = "lifewire",
    version,
    about = "Ownership, mutability and lifetime inference for wire-based dataflow graphs"
)]
struct Cli {
    /// Input graph document (JSON)
    graph: PathBuf,

    /// What to print on stdout
    #[arg(long, value_enum, default_value_t = Emit::Diagnostics)]
    emit: Emit,

    /// Stop after this pass (create_facades, determine_variables, auto_borrow,
    /// set_types, validate, explicit_borrow)
    #[arg(long, value_parser = parse_pass)]
    stop_after: Option<PassId>,

    /// Analysis options (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print pass timing and debug logs
    #[arg(long)]
    verbose: bool,
}

fn parse_pass(name: &str) -> Result<PassId, String> {
    PassId::from_name(name).ok_or_else(|| {
        let names: Vec<&str> = ALL_PASSES.iter().map(|&p| descriptor(p).name).collect();
        format!("unknown pass `{name}` (expected one of: {})", names.join(", "))
    })
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        lifewire::logging::init_with_level(log::LevelFilter::Debug);
        eprintln!("lifewire: graph = {}", cli.graph.display());
        eprintln!("lifewire: emit  = {:?}", cli.emit);
    } else {
        lifewire::logging::init_from_env();
    }

    // ── Load configuration ──
    let options = match &cli.config {
        Some(path) => match AnalysisOptions::load(path) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("lifewire: error: {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => AnalysisOptions::default(),
    };

    // ── Load graph document ──
    let doc = match lifewire::document::load(&cli.graph) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("lifewire: error: {}: {}", cli.graph.display(), e);
            std::process::exit(2);
        }
    };

    if cli.verbose {
        eprintln!(
            "lifewire: loaded {} nodes, {} wires, {} structures",
            doc.graph.nodes().len(),
            doc.graph.wires().len(),
            doc.graph.structures().len()
        );
    }

    // ── Run passes ──
    let terminal = cli
        .stop_after
        .unwrap_or(ALL_PASSES[ALL_PASSES.len() - 1]);
    let mut state = CompilationState::new(doc.graph);
    let emit = cli.emit;
    let result = run_pipeline(
        &mut state,
        terminal,
        &options,
        &CancellationToken::new(),
        cli.verbose,
        |_, diags| {
            if emit != Emit::Diagnostics {
                for d in diags {
                    eprintln!("lifewire: {}", d);
                }
            }
        },
    );

    match emit {
        Emit::Diagnostics => {
            for d in &state.diagnostics {
                println!("{}", d);
            }
            println!(
                "{} error(s), {} warning(s)",
                state.diagnostics.error_count(),
                state.diagnostics.len() - state.diagnostics.error_count()
            );
        }
        Emit::Graph => print!("{}", state.graph),
        Emit::Dot => print!("{}", lifewire::dot::emit_dot(&state.graph)),
        Emit::Fingerprint => println!("{}", state.fingerprint()),
    }

    if let Err(e) = result {
        eprintln!("lifewire: error: {}", e);
        std::process::exit(1);
    }
    if state.has_error {
        std::process::exit(1);
    }
}
