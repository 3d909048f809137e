//! career-compass CLI: job-market skill demand and gap analysis.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use career_compass::config::EngineConfig;
use career_compass::demand::Period;
use career_compass::engine::Engine;
use career_compass::export::{
    ForecastExport, GapExport, PlanExport, SkillDemandExport, TransitionExport,
};
use career_compass::gap::{GapReport, StudyBudget, UserProfile};
use career_compass::ontology::EdgeKind;
use career_compass::posting::RawPosting;
use career_compass::seeds::{DEFAULT_PACK, SeedRegistry};
use career_compass::skill::SkillId;

/// File name of the configuration inside the data directory.
const CONFIG_FILE: &str = "config.toml";

#[derive(Parser)]
#[command(name = "compass", version, about = "Job-market skill demand and gap analysis")]
struct Cli {
    /// Data directory for persistent storage.
    #[arg(long, global = true, default_value = ".compass")]
    data_dir: PathBuf,

    /// Configuration file. Defaults to `config.toml` in the data directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a data directory and apply a seed pack.
    Init {
        /// Seed pack to apply.
        #[arg(long, default_value = DEFAULT_PACK)]
        seed: String,
    },

    /// Ingest postings from a JSON file (an array of postings).
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },

    /// Close every period up to a date to late postings.
    Close {
        /// Any date inside the last period to close (YYYY-MM-DD).
        #[arg(long)]
        through: NaiveDate,
    },

    /// Most-demanded skills in one period.
    Demand {
        /// Any date inside the period (YYYY-MM-DD). Defaults to the latest period.
        #[arg(long)]
        period: Option<NaiveDate>,
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Forecast demand for one skill, or rank every skill.
    Forecast {
        /// Skill name. All skills when absent.
        #[arg(long)]
        skill: Option<String>,
        /// Number of ranked skills to show.
        #[arg(long, default_value = "20")]
        top: usize,
        /// Any date inside the as-of period (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Rank the skills missing for a target role.
    Gap {
        #[arg(long)]
        role: String,
        /// Held skills, comma-separated, each optionally `name:level`.
        #[arg(long, default_value = "")]
        skills: String,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Schedule the gap for a target role into a weekly time budget.
    Plan {
        #[arg(long)]
        role: String,
        #[arg(long, default_value = "")]
        skills: String,
        #[arg(long, default_value = "8")]
        hours_per_week: f32,
        #[arg(long, default_value = "26")]
        weeks: u32,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Weigh a move from the current role to one or more target roles.
    Transition {
        /// Current role.
        #[arg(long)]
        from: String,
        /// Target roles, comma-separated. A single target also prints its roadmap.
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        skills: String,
        #[arg(long, default_value = "10")]
        hours_per_week: f32,
        #[arg(long, default_value = "52")]
        weeks: u32,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Inspect and curate the skill ontology.
    Ontology {
        #[command(subcommand)]
        action: OntologyAction,
    },

    /// List or apply seed packs.
    Seeds {
        #[command(subcommand)]
        action: SeedAction,
    },

    /// Show engine info and statistics.
    Info,

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Subcommand)]
enum OntologyAction {
    /// List canonical skills.
    List,
    /// Show a skill with its aliases and neighborhood.
    Show {
        name: String,
        /// Traversal depth for prerequisites and next steps.
        #[arg(long, default_value = "2")]
        depth: usize,
    },
    /// Merge the second skill into the first.
    Merge { survivor: String, absorbed: String },
    /// Add or reinforce a typed edge.
    Link {
        from: String,
        to: String,
        /// implies, related or prerequisite.
        #[arg(long, default_value = "related")]
        kind: String,
        #[arg(long, default_value = "0.7")]
        weight: f32,
    },
    /// Cheapest route from known skills to a target skill.
    Path {
        #[arg(long)]
        target: String,
        /// Known skills, comma-separated.
        #[arg(long, default_value = "")]
        known: String,
    },
}

#[derive(Subcommand)]
enum SeedAction {
    /// List bundled and discovered seed packs.
    List,
    /// Apply a seed pack by id.
    Apply { id: String },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let engine = Engine::new(config.clone())?;

    match cli.command {
        Commands::Init { seed } => {
            let config_path = cli.data_dir.join(CONFIG_FILE);
            if !config_path.exists() {
                config.save(&config_path)?;
            }
            let registry = SeedRegistry::discover(&cli.data_dir.join("seeds"));
            let pack = registry.get(&seed)?;
            let report = engine.apply_seed(pack)?;
            engine.persist()?;
            println!("Initialized career-compass at {}", cli.data_dir.display());
            println!(
                "  seed {}: {} skills, {} relations added, {} present",
                report.id, report.skills, report.relations_added, report.relations_present
            );
            println!("{}", engine.info());
        }

        Commands::Ingest { file } => {
            let content = std::fs::read_to_string(&file).into_diagnostic()?;
            let postings: Vec<RawPosting> = serde_json::from_str(&content).into_diagnostic()?;
            let report = engine.ingest_batch(postings)?;
            engine.persist()?;
            println!(
                "Ingested {} from {}: {} recorded, {} duplicates, {} rejected, {} skill mentions",
                report.recorded + report.duplicates + report.rejected,
                file.display(),
                report.recorded,
                report.duplicates,
                report.rejected,
                report.skill_mentions
            );
        }

        Commands::Close { through } => {
            let period = engine.close_through(engine.scheme().period_of_date(through));
            engine.persist()?;
            println!("Closed periods through {}", engine.scheme().label(period));
        }

        Commands::Demand { period, top } => {
            let period = as_of_period(&engine, period).unwrap_or_else(|| engine.default_as_of());
            let rows: Vec<SkillDemandExport> = engine
                .top_skills(period, top)
                .into_iter()
                .map(|(id, count)| {
                    SkillDemandExport::new(id, count, period, engine.ontology(), engine.scheme())
                })
                .collect();
            if cli.json {
                print_json(&rows)?;
            } else {
                println!(
                    "Top skills in {} ({} postings):",
                    engine.scheme().label(period),
                    engine.demand().postings_in(period)
                );
                for (i, row) in rows.iter().enumerate() {
                    println!("  {:>2}. {:<28} {}", i + 1, row.skill, row.count);
                }
            }
        }

        Commands::Forecast { skill, top, as_of } => {
            let as_of = as_of_period(&engine, as_of);
            let results = match skill {
                Some(name) => vec![engine.forecast(skill_by_name(&engine, &name)?, as_of)?],
                None => engine.forecast_all(as_of),
            };
            let rows: Vec<ForecastExport> = results
                .iter()
                .take(top)
                .map(|r| ForecastExport::new(r, engine.ontology(), engine.scheme()))
                .collect();
            if cli.json {
                print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No demand recorded yet.");
            } else {
                println!(
                    "  {:<28} {:<18} {:>8} {:>8} {:>6}",
                    "skill", "trend", "growth", "volume", "conf"
                );
                for row in &rows {
                    println!(
                        "  {:<28} {:<18} {:>+7.1}% {:>8.1} {:>6.2}",
                        row.skill,
                        row.trend,
                        row.growth_rate * 100.0,
                        row.current_volume,
                        row.confidence
                    );
                }
            }
        }

        Commands::Gap { role, skills, as_of } => {
            let report = gap_report(&engine, &role, &skills, as_of)?;
            if cli.json {
                print_json(&GapExport::new(&report, engine.scheme()))?;
            } else {
                print_gap(&engine, &report);
            }
        }

        Commands::Plan {
            role,
            skills,
            hours_per_week,
            weeks,
            as_of,
        } => {
            let report = gap_report(&engine, &role, &skills, as_of)?;
            let plan = engine.learning_plan(&report, hours_per_week, weeks)?;
            let export = PlanExport::new(&plan, engine.ontology());
            if cli.json {
                print_json(&export)?;
            } else {
                println!(
                    "Learning plan for \"{}\" ({} h/week, {} weeks):",
                    export.target_role, export.hours_per_week, export.timeline_weeks
                );
                for step in &export.steps {
                    let after = if step.after.is_empty() {
                        String::new()
                    } else {
                        format!(" (after {})", step.after.join(", "))
                    };
                    println!(
                        "  week {:>5.1} - {:>5.1}  {:<28} {:>5.0} h{after}",
                        step.start_week, step.end_week, step.skill, step.estimated_hours
                    );
                }
                if !export.deferred.is_empty() {
                    println!("  deferred: {}", export.deferred.join(", "));
                }
                println!(
                    "  total: {:.0} h over {:.1} weeks, feasible: {}",
                    export.total_hours, export.total_weeks, export.feasible
                );
            }
        }

        Commands::Transition {
            from,
            to,
            skills,
            hours_per_week,
            weeks,
            as_of,
        } => {
            let targets: Vec<&str> = split_list(&to).collect();
            if targets.is_empty() {
                miette::bail!(
                    help = "Pass at least one role, e.g. --to \"data engineer\".",
                    "no target role given"
                );
            }
            let budget = StudyBudget {
                hours_per_week,
                timeline_weeks: weeks,
            };
            let analyses = engine.compare_transitions(
                &profile(&engine, &skills),
                &from,
                &targets,
                as_of_period(&engine, as_of),
                budget,
            )?;
            let exports: Vec<TransitionExport> = analyses
                .iter()
                .map(|a| TransitionExport::new(a, engine.ontology(), engine.scheme()))
                .collect();
            if cli.json {
                print_json(&exports)?;
            } else {
                print_transitions(&exports);
            }
        }

        Commands::Ontology { action } => match action {
            OntologyAction::List => {
                let mut nodes = engine.ontology().nodes();
                nodes.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));
                if cli.json {
                    print_json(&nodes)?;
                } else {
                    println!("Skills ({}):", nodes.len());
                    for node in &nodes {
                        println!("  {:<28} {} [{}]", node.display_name, node.id, node.category);
                    }
                }
            }
            OntologyAction::Show { name, depth } => {
                let id = skill_by_name(&engine, &name)?;
                let cluster = engine.cluster(id, depth)?;
                let ont = engine.ontology();
                let names = |ids: &[SkillId]| {
                    ids.iter()
                        .map(|id| ont.display_name(*id))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                if let Some(node) = ont.node(cluster.center) {
                    println!("Skill: \"{}\"", node.display_name);
                    println!("  id:            {}", node.id);
                    println!("  category:      {}", node.category);
                    let aliases: Vec<&str> = node.aliases.iter().map(String::as_str).collect();
                    println!("  aliases:       {}", aliases.join(", "));
                }
                println!("  prerequisites: {}", names(&cluster.prerequisites));
                println!("  next steps:    {}", names(&cluster.next_steps));
                println!("  related:       {}", names(&cluster.related));
            }
            OntologyAction::Merge { survivor, absorbed } => {
                let a = skill_by_name(&engine, &survivor)?;
                let b = skill_by_name(&engine, &absorbed)?;
                let outcome = engine.merge_skills(a, b)?;
                engine.persist()?;
                println!(
                    "Merged \"{}\" into \"{}\": {} aliases moved, {} edges reassigned (version {})",
                    absorbed,
                    engine.ontology().display_name(outcome.survivor),
                    outcome.aliases_moved,
                    outcome.edges_reassigned,
                    outcome.version
                );
            }
            OntologyAction::Link {
                from,
                to,
                kind,
                weight,
            } => {
                let Some(kind) = EdgeKind::parse(&kind) else {
                    miette::bail!("unknown edge kind \"{kind}\" (expected implies, related or prerequisite)");
                };
                let a = skill_by_name(&engine, &from)?;
                let b = skill_by_name(&engine, &to)?;
                let edge = engine.add_edge(a, b, kind, weight)?;
                engine.persist()?;
                println!(
                    "{} -{}-> {} (weight {:.2})",
                    engine.ontology().display_name(edge.from),
                    edge.kind,
                    engine.ontology().display_name(edge.to),
                    edge.weight
                );
            }
            OntologyAction::Path { target, known } => {
                let target = skill_by_name(&engine, &target)?;
                let known = split_list(&known)
                    .map(|name| skill_by_name(&engine, name))
                    .collect::<Result<Vec<_>>>()?;
                let path = engine.learning_path(&known, target)?;
                if cli.json {
                    print_json(&path)?;
                } else {
                    let ont = engine.ontology();
                    let steps: Vec<String> = path.steps.iter().map(|id| ont.display_name(*id)).collect();
                    if !path.connected {
                        println!("No known skill leads to the target; prerequisite chain:");
                    }
                    println!("  {}", steps.join(" -> "));
                    println!("  to learn: {} (cost {:.2})", path.to_learn.len(), path.cost);
                }
            }
        },

        Commands::Seeds { action } => {
            let registry = SeedRegistry::discover(&cli.data_dir.join("seeds"));
            match action {
                SeedAction::List => {
                    let packs = registry.list();
                    println!("Seed packs ({}):", packs.len());
                    for pack in packs {
                        println!(
                            "  {} ({}) - {}: {} skills, {} relations",
                            pack.id,
                            pack.version,
                            pack.name,
                            pack.skills.len(),
                            pack.relations.len()
                        );
                    }
                }
                SeedAction::Apply { id } => {
                    let report = engine.apply_seed(registry.get(&id)?)?;
                    engine.persist()?;
                    if report.already_applied {
                        println!("Seed {} already applied.", report.id);
                    } else {
                        println!(
                            "Applied seed {}: {} relations added (ontology version {})",
                            report.id, report.relations_added, report.ontology_version
                        );
                    }
                }
            }
        }

        Commands::Info => {
            println!("{}", engine.info());
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.data_dir.join(CONFIG_FILE));
    let mut config = if path.exists() {
        EngineConfig::load(&path)?
    } else if cli.config.is_some() {
        miette::bail!("config file {} does not exist", path.display());
    } else {
        EngineConfig::default()
    };
    config.data_dir = Some(cli.data_dir.clone());
    Ok(config)
}

fn skill_by_name(engine: &Engine, name: &str) -> Result<SkillId> {
    match engine.skill(name) {
        Some(id) => Ok(id),
        None => miette::bail!(
            help = "List known skills with `compass ontology list`.",
            "unknown skill \"{name}\""
        ),
    }
}

fn as_of_period(engine: &Engine, date: Option<NaiveDate>) -> Option<Period> {
    date.map(|d| engine.scheme().period_of_date(d))
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn gap_report(
    engine: &Engine,
    role: &str,
    skills: &str,
    as_of: Option<NaiveDate>,
) -> Result<GapReport> {
    Ok(engine.analyze_gap(&profile(engine, skills), role, as_of_period(engine, as_of))?)
}

fn profile(engine: &Engine, skills: &str) -> UserProfile {
    let names: Vec<&str> = split_list(skills).collect();
    let (profile, unknown) = UserProfile::resolve(engine.ontology(), &names);
    for name in &unknown {
        tracing::warn!(skill = %name, "skill not in the ontology, ignored");
    }
    profile
}

fn print_transitions(exports: &[TransitionExport]) {
    let Some(first) = exports.first() else {
        return;
    };
    println!("Transitions from \"{}\" ({} postings):", first.current_role, first.current_postings);
    println!(
        "  {:>4} {:<28} {:>6} {:>9} {:>7} {:>6}  verdict",
        "rank", "target", "score", "coverage", "weeks", "market"
    );
    for (rank, t) in exports.iter().enumerate() {
        println!(
            "  {:>4} {:<28} {:>6.1} {:>8.0}% {:>7.1} {:>5.0}%  {}",
            rank + 1,
            t.target_role,
            t.score,
            t.gap.coverage * 100.0,
            t.estimated_weeks,
            t.market_share * 100.0,
            t.verdict
        );
    }
    if let [only] = exports {
        println!("  keeps:  {}", only.shared_skills.join(", "));
        println!("  learns: {}", only.gained_skills.join(", "));
        println!("  drops:  {}", only.dropped_skills.join(", "));
        println!("Roadmap over {} weeks:", only.plan.timeline_weeks);
        for phase in &only.roadmap {
            let skills = if phase.skills.is_empty() {
                String::new()
            } else {
                format!("  {}", phase.skills.join(", "))
            };
            println!(
                "  week {:>5.1} - {:>5.1}  {:<12}{skills}",
                phase.start_week, phase.end_week, phase.focus
            );
        }
        if !only.plan.deferred.is_empty() {
            println!("  deferred: {}", only.plan.deferred.join(", "));
        }
        println!("  on track: {}", only.on_track);
    }
}

fn print_gap(engine: &Engine, report: &GapReport) {
    println!(
        "Skill gap for \"{}\" as of {} ({} postings, {:.0}% covered):",
        report.target_role,
        engine.scheme().label(report.as_of),
        report.total_postings,
        report.coverage * 100.0
    );
    if report.insufficient_market_data {
        println!("  No postings for this role yet; ingest more data first.");
        return;
    }
    if report.missing.is_empty() {
        println!("  Nothing missing.");
        return;
    }
    println!(
        "  {:<28} {:>7} {:<18} {:>8} {:>6} {:>8}",
        "skill", "weight", "trend", "priority", "hours", "roi"
    );
    for e in &report.missing {
        println!(
            "  {:<28} {:>6.0}% {:<18} {:>8.3} {:>6.0} {:>8.4}",
            e.display_name,
            e.required_weight * 100.0,
            e.trend.to_string(),
            e.priority_score,
            e.estimated_hours,
            e.roi
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
