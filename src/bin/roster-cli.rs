#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nurse_roster::{
    io, load_template_from_file, JsonStore, Nurse, Outcome, RequestMap, Roster, RosterSink,
    Scheduler, SolverConfig, StaffSource, StaffingTemplate,
};
use std::path::{Path, PathBuf};
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// Générateur de planning infirmier 9E/10E
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Répertoire de données (nurses.json, requests-YYYY-MM.json, roster-YYYY-MM.json)
    #[arg(long, global = true, default_value = ".")]
    store: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(clap::Args, Debug)]
struct Inputs {
    #[arg(long)]
    year: i32,
    #[arg(long)]
    month: u32,
    /// Fichier d'infirmières (.csv ou .json) à la place de celui du répertoire
    #[arg(long)]
    nurses: Option<PathBuf>,
    /// Fichier de demandes JSON à la place de celui du répertoire
    #[arg(long)]
    requests: Option<PathBuf>,
    /// Modèle d'effectifs JSON (défaut : politique standard)
    #[arg(long)]
    template: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Générer le planning du mois
    Generate {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long)]
        node_budget: Option<u64>,
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Fichier de sortie (défaut : roster-YYYY-MM.json dans le répertoire)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Revalider un planning enregistré
    Check {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long)]
        roster: Option<PathBuf>,
    },

    /// Afficher les effectifs quotidiens et les repos
    Summary {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long)]
        roster: Option<PathBuf>,
        /// Sortie JSON au lieu du tableau
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }

    let store = JsonStore::open(&cli.store)?;

    let code = match cli.cmd {
        Commands::Generate {
            inputs,
            node_budget,
            workers,
            out,
        } => {
            let (nurses, requests) = load_inputs(&store, &inputs)?;
            let mut config = SolverConfig {
                workers: workers.max(1),
                ..SolverConfig::default()
            };
            if let Some(n) = node_budget {
                config.node_budget = n;
            }
            let scheduler = Scheduler::new(config).with_template(load_template(&inputs)?);
            let generation = scheduler.generate(inputs.year, inputs.month, &nurses, &requests)?;
            match &generation.outcome {
                Outcome::Feasible => {
                    let roster = generation
                        .roster
                        .as_ref()
                        .context("feasible generation without roster")?;
                    let path = match out {
                        Some(path) => {
                            io::export_roster_json(&path, roster)?;
                            path
                        }
                        None => store.save_roster(roster)?,
                    };
                    println!(
                        "Roster written to {} (nodes {}, score {:.2} -> {:.2})",
                        path.display(),
                        generation.stats.nodes,
                        generation.stats.initial_score,
                        generation.stats.final_score
                    );
                    0
                }
                Outcome::Infeasible { unmet } => {
                    eprintln!("Infeasible: {} unmet constraint(s)", unmet.len());
                    for c in unmet {
                        eprintln!("  {c}");
                    }
                    2
                }
                Outcome::Timeout { nodes } => {
                    eprintln!("Timeout after {nodes} nodes");
                    3
                }
            }
        }
        Commands::Check { inputs, roster } => {
            let (nurses, requests) = load_inputs(&store, &inputs)?;
            let roster = load_roster(&store, &inputs, roster.as_deref())?;
            let scheduler = Scheduler::default().with_template(load_template(&inputs)?);
            let conflicts = scheduler.check_roster(&roster, &nurses, &requests)?;
            if conflicts.is_empty() {
                println!("OK: no violations");
                0
            } else {
                eprintln!("Found {} violation(s)", conflicts.len());
                for c in &conflicts {
                    eprintln!("  {c}");
                }
                2
            }
        }
        Commands::Summary {
            inputs,
            roster,
            json,
        } => {
            let nurses = match &inputs.nurses {
                Some(path) => load_nurses_file(path)?,
                None => store
                    .load_nurses()
                    .with_context(|| format!("no nurse list in {}", store.dir().display()))?,
            };
            let roster = load_roster(&store, &inputs, roster.as_deref())?;
            let summary = roster.summary(&nurses);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary.render());
            }
            0
        }
    };

    std::process::exit(code);
}

fn load_nurses_file(path: &Path) -> Result<Vec<Nurse>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => io::import_nurses_csv(path),
        _ => io::import_nurses_json(path),
    }
}

fn load_inputs(store: &JsonStore, inputs: &Inputs) -> Result<(Vec<Nurse>, RequestMap)> {
    let nurses = match &inputs.nurses {
        Some(path) => load_nurses_file(path)?,
        None => store
            .load_nurses()
            .with_context(|| format!("no nurse list in {}", store.dir().display()))?,
    };
    let requests = match &inputs.requests {
        Some(path) => io::import_requests_json(path)?,
        None => store.load_requests(inputs.year, inputs.month)?,
    };
    Ok((nurses, requests))
}

fn load_template(inputs: &Inputs) -> Result<StaffingTemplate> {
    match &inputs.template {
        Some(path) => load_template_from_file(path),
        None => Ok(StaffingTemplate::default()),
    }
}

fn load_roster(store: &JsonStore, inputs: &Inputs, path: Option<&Path>) -> Result<Roster> {
    match path {
        Some(path) => io::import_roster_json(path),
        None => store.load_roster(inputs.year, inputs.month),
    }
}
