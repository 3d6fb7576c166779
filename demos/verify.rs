use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;

use fw_equiv::bdd::Bdd;
use fw_equiv::budget::SessionConfig;
use fw_equiv::checker::Verdict;
use fw_equiv::encoder::encode;
use fw_equiv::packet::declare_packet;
use fw_equiv::parser::{parse_with, ParserConfig};
use fw_equiv::rule::Policy;
use fw_equiv::smtlib::{equivalence_query, to_smtlib};
use fw_equiv::verify::verify_report;

#[derive(Debug, Parser)]
#[command(author, version, about = "Equivalence checking of iptables policies")]
struct Cli {
    /// Table to model.
    #[arg(long, default_value = "filter")]
    table: String,

    /// Entry chain of both policies.
    #[arg(long, default_value = "INPUT")]
    entry: String,

    /// Give up after this many milliseconds.
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Maximum number of diagram nodes.
    #[arg(long, value_name = "INT")]
    max_nodes: Option<usize>,

    /// Log every pipeline step.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check whether two iptables-save files decide every packet alike
    Check {
        left: PathBuf,
        right: PathBuf,
    },

    /// Print the parsed policy back as iptables-save text
    Show { input: PathBuf },

    /// Print the SMT-LIB script of a policy, or the equivalence query of two
    Smtlib {
        left: PathBuf,
        right: Option<PathBuf>,
    },

    /// Print the decision diagram of a policy in DOT format
    Dot { input: PathBuf },
}

fn load(path: &Path, config: &ParserConfig) -> Result<Policy> {
    let text = std::fs::read_to_string(path)?;
    let config = config.clone().with_name(path.display().to_string());
    Ok(parse_with(&text, &config)?)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    let level = if args.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;

    let parser = ParserConfig::default()
        .with_table(args.table.clone())
        .with_entry_chain(args.entry.clone());
    let mut session = SessionConfig::default();
    if let Some(ms) = args.timeout_ms {
        session = session.with_timeout(Duration::from_millis(ms));
    }
    if let Some(max_nodes) = args.max_nodes {
        session = session.with_max_nodes(max_nodes);
    }

    match &args.command {
        Commands::Check { left, right } => {
            let left = load(left, &parser)?;
            let right = load(right, &parser)?;
            let report = verify_report(&left, &right, &session)?;
            println!("{}", report);
            match report.verdict {
                Verdict::Equivalent => {}
                Verdict::Divergent(_) => std::process::exit(1),
                Verdict::Inconclusive(_) => std::process::exit(2),
            }
        }
        Commands::Show { input } => {
            let policy = load(input, &parser)?;
            print!("{}", policy);
        }
        Commands::Smtlib { left, right } => {
            let vars = declare_packet();
            let left = encode(&load(left, &parser)?, &vars)?;
            let script = match right {
                Some(right) => {
                    let right = encode(&load(right, &parser)?, &vars)?;
                    equivalence_query(&left, &right)?
                }
                None => to_smtlib(&left)?,
            };
            print!("{}", script);
        }
        Commands::Dot { input } => {
            let vars = declare_packet();
            let formula = encode(&load(input, &parser)?, &vars)?;
            let bdd = Bdd::new(&session);
            let f = formula
                .compile(&bdd)
                .map_err(|e| eyre!("could not build the diagram: {}", e))?;
            println!("{}", bdd.to_dot(&[("accept", f)], &vars)?);
        }
    }

    Ok(())
}
