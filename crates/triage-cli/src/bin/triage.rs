//! Triage CLI - learn a diagnosis network from a CSV table and query it
//!
//! Usage:
//!   triage learn --data records.csv                       # Learn and summarize
//!   triage query --data records.csv --evidence fever=1    # Diagnosis posterior
//!   triage triage --data records.csv                      # Interactive questions
//!   triage evaluate --data records.csv --test-fraction 0.2
//!   triage export --data records.csv --format dot

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use triage_core::{
    evaluate, learn_model, stratified_split, undersample, Dataset, DiagnosticModel,
    EstimatorKind, Evidence, LearnConfig, Posterior, ScoreKind, TriageAgent, TriageConfig,
    TriageSession,
};

#[derive(Parser)]
#[command(name = "triage")]
#[command(version)]
#[command(about = "Bayesian network diagnosis and symptom triage")]
#[command(long_about = "Learn a Bayesian network from binary symptom records, \
query diagnosis posteriors and pick the most informative next question")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Learn a model and print a summary
    Learn {
        #[command(flatten)]
        learn: LearnArgs,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        output: OutputFormat,
    },
    /// Print the posterior of the diagnosis (or another variable)
    Query {
        #[command(flatten)]
        learn: LearnArgs,
        /// Observed symptoms, e.g. `fever=1,cough=0`
        #[arg(short, long, default_value = "")]
        evidence: String,
        /// Variable to query instead of the diagnosis
        #[arg(long, value_name = "NAME")]
        variable: Option<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        output: OutputFormat,
    },
    /// Ask symptom questions interactively until the diagnosis is confident
    Triage {
        #[command(flatten)]
        learn: LearnArgs,
        #[arg(long, default_value_t = 0.95)]
        threshold: f64,
    },
    /// Train on a stratified split and report held-out metrics
    Evaluate {
        #[command(flatten)]
        learn: LearnArgs,
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Balance training classes by random undersampling
        #[arg(long)]
        undersample: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
        output: OutputFormat,
    },
    /// Print the learned graph with its probability tables
    Export {
        #[command(flatten)]
        learn: LearnArgs,
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
}

#[derive(Args)]
struct LearnArgs {
    /// Input CSV file with a header row
    #[arg(short, long, value_name = "CSV")]
    data: PathBuf,

    /// Diagnosis column
    #[arg(short, long, default_value = "TYPE")]
    target: String,

    /// Maximum number of structure edits
    #[arg(long, default_value_t = 2000)]
    max_iter: usize,

    /// Maximum number of parents per variable
    #[arg(long)]
    max_indegree: Option<usize>,

    /// Equivalent sample size for smoothing and the BDeu score
    #[arg(long, default_value_t = 5.0)]
    ess: f64,

    /// Structure score: bic, aic or bdeu
    #[arg(long, default_value = "bic")]
    score: ScoreKind,

    /// Parameter estimator: bayes or mle
    #[arg(long, default_value = "bayes")]
    estimator: EstimatorKind,
}

impl LearnArgs {
    fn config(&self) -> LearnConfig {
        LearnConfig {
            max_iterations: self.max_iter,
            max_indegree: self.max_indegree,
            score: self.score,
            estimator: self.estimator,
            equivalent_sample_size: self.ess,
        }
    }

    fn load(&self) -> anyhow::Result<Dataset> {
        Dataset::from_csv_path(&self.data, &self.target)
            .with_context(|| format!("loading '{}'", self.data.display()))
    }

    fn learn(&self, data: &Dataset) -> anyhow::Result<DiagnosticModel> {
        learn_model(data, &self.config()).context("learning model")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Json,
    Dot,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Learn { learn, output } => {
            let data = learn.load()?;
            let model = learn.learn(&data)?;
            print_model(&model, output)
        }
        Command::Query {
            learn,
            evidence,
            variable,
            output,
        } => {
            let evidence = parse_evidence(&evidence)?;
            let model = learn.learn(&learn.load()?)?;
            let posterior = match &variable {
                Some(name) => model.query_variable(name, &evidence),
                None => model.query(&evidence),
            }
            .context("query failed")?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&posterior)?),
                OutputFormat::Summary => print_posterior(&posterior),
            }
            Ok(())
        }
        Command::Triage { learn, threshold } => {
            let model = learn.learn(&learn.load()?)?;
            let agent = model.triage_agent(TriageConfig {
                confidence_threshold: threshold,
            })?;
            run_session(&agent)
        }
        Command::Evaluate {
            learn,
            test_fraction,
            seed,
            undersample: balance,
            output,
        } => {
            let data = learn.load()?;
            let (train, test) = stratified_split(&data, test_fraction, seed)?;
            let train = if balance {
                undersample(&train, seed)?
            } else {
                train
            };
            let model = learn.learn(&train)?;
            let report = evaluate(&model, &test)?;
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Summary => print!("{}", report),
            }
            Ok(())
        }
        Command::Export { learn, format } => {
            let model = learn.learn(&learn.load()?)?;
            let export = model.export();
            match format {
                ExportFormat::Json => println!("{}", serde_json::to_string_pretty(&export)?),
                ExportFormat::Dot => print!("{}", export.to_dot()),
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Parses `name=value` pairs separated by commas.
fn parse_evidence(raw: &str) -> anyhow::Result<Evidence> {
    let mut evidence = Evidence::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("evidence '{}' is not of the form name=value", pair);
        };
        let present = parse_answer(value)
            .with_context(|| format!("evidence value for '{}'", name.trim()))?;
        evidence.observe(name.trim(), present);
    }
    Ok(evidence)
}

fn parse_answer(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "true" => Ok(true),
        "0" | "n" | "no" | "false" => Ok(false),
        other => bail!("expected yes/no or 1/0, got '{}'", other),
    }
}

fn print_model(model: &DiagnosticModel, output: OutputFormat) -> anyhow::Result<()> {
    let network = model.network();
    let edges: Vec<(&str, &str)> = network.edges();
    match output {
        OutputFormat::Json => {
            let diagnostics = model.diagnostics().map(|d| {
                serde_json::json!({
                    "iterations": d.iterations_run,
                    "local_optimum": d.local_optimum,
                    "initial_score": d.initial_score,
                    "final_score": d.final_score,
                })
            });
            let summary = serde_json::json!({
                "target": model.target(),
                "diagnoses": model.target_states(),
                "variables": network.variables().len(),
                "parameters": network.num_parameters(),
                "edges": edges,
                "diagnostics": diagnostics,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Summary => {
            println!("✓ Model learned\n");
            println!("Target: {} ({})", model.target(), model.target_states().join(", "));
            println!(
                "Variables: {}, parameters: {}",
                network.variables().len(),
                network.num_parameters()
            );
            if let Some(d) = model.diagnostics() {
                println!(
                    "Search: {} iterations, score {:.3} -> {:.3}{}",
                    d.iterations_run,
                    d.initial_score,
                    d.final_score,
                    if d.local_optimum { " (local optimum)" } else { "" }
                );
            }
            println!("\nEdges ({}):", edges.len());
            for (source, target) in &edges {
                println!("  {} -> {}", source, target);
            }
        }
    }
    Ok(())
}

fn print_posterior(posterior: &Posterior) {
    println!("P({} | evidence):", posterior.variable());
    for (state, p) in posterior.ranked() {
        println!("  {:<20} {:.4}", state, p);
    }
    println!("  entropy: {:.4} bits", posterior.entropy());
}

fn run_session(agent: &TriageAgent) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut session = TriageSession::new();

    while let Some(question) = agent.next_best_question(session.evidence()) {
        print!("{}? [y/n/q] ", question);
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("q") {
            break;
        }
        match parse_answer(answer) {
            Ok(present) => session.record(question, present),
            Err(err) => {
                println!("  {}", err);
                continue;
            }
        }
        if let Some(posterior) = agent.current_posterior(session.evidence()) {
            if let Some((state, p)) = posterior.top() {
                println!("  leading: {} ({:.1}%)", state, p * 100.0);
            }
        }
    }

    println!("\nAnswered {} question(s).", session.len());
    let posterior = agent
        .posterior(session.evidence())
        .context("final diagnosis failed")?;
    print_posterior(&posterior);
    Ok(())
}
