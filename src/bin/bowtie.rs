#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use bowtie_risk::bayes::{
    analyze_problem, preset_evidence, BayesianNetwork, Evidence, NodeType, ScenarioPreset,
};
use bowtie_risk::bowtie::{
    add_default_columns, central_problems, generate_from_links, generate_sample_scenarios,
    read_records_csv, validate, write_records_csv, BowtieRecord,
};
use bowtie_risk::config::{load_config_from_path, BowtieConfig};
use bowtie_risk::linking::{candidates_from_vocabulary, find_links, LinkOptions, SimilarityMethod};
use bowtie_risk::notify::TracingNotifier;
use bowtie_risk::report::{
    build_report, render_report_html, render_report_markdown, ReportOptions, ReportSection,
};
use bowtie_risk::visual::{to_graph, GraphOptions};
use bowtie_risk::vocabulary::{SearchScope, Vocabulary, VocabularyKind, VocabularyStore};

#[derive(Parser)]
#[command(name = "bowtie", version, about = "Bowtie environmental risk CLI")]
struct Cli {
    /// JSON config file (defaults to $BOWTIE_CONFIG, then ./bowtie.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a record CSV and print a summary
    Validate {
        #[arg(long)]
        input: PathBuf,
    },
    /// Write seeded sample scenarios as CSV
    Generate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Suggest causal links between vocabulary items
    Links {
        #[arg(long)]
        vocab_dir: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        max_per_item: Option<usize>,
        /// Comma-separated: lexical, keyword, causal_pattern
        #[arg(long)]
        methods: Option<String>,
        /// Also assemble records for this central problem from the links
        #[arg(long)]
        problem: Option<String>,
        #[arg(long, requires = "problem")]
        records_out: Option<PathBuf>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Export diagram nodes/edges for one central problem
    Graph {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        problem: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        hide_barriers: bool,
        #[arg(long)]
        hide_escalation: bool,
        #[arg(long)]
        color_by_risk: bool,
        #[arg(long, default_value_t = 14)]
        font_size: u32,
    },
    /// Compile a Bayesian network and run a query
    Infer {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        problem: String,
        /// Evidence as node=state (repeatable)
        #[arg(long = "evidence")]
        evidence: Vec<String>,
        /// Query nodes (repeatable; defaults to Problem_Level and Consequence_Level)
        #[arg(long = "query")]
        query: Vec<String>,
        /// baseline, worst_case or best_case; merged under explicit evidence
        #[arg(long)]
        preset: Option<String>,
        /// Estimate CPTs from the records instead of the default kernel
        #[arg(long)]
        use_data: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render a report (md, html or json)
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "md")]
        format: String,
        #[arg(long)]
        title: Option<String>,
        /// Comma-separated section names; all sections when omitted
        #[arg(long)]
        sections: Option<String>,
        #[arg(long)]
        problem: Option<String>,
        #[arg(long)]
        vocab_dir: Option<PathBuf>,
        #[arg(long)]
        use_data: bool,
    },
    /// Search one vocabulary table
    VocabSearch {
        #[arg(long)]
        vocab_dir: Option<PathBuf>,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        query: String,
        /// name, id or both
        #[arg(long, default_value = "name")]
        scope: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Serialize)]
struct ValidationSummary {
    records: usize,
    central_problems: Vec<String>,
    custom_terms: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from_path(path)?,
        None => BowtieConfig::load_or_default()?,
    };

    match cli.command {
        Commands::Validate { input } => {
            let records = read_records_csv(&input)?;
            validate(&records)?;
            let summary = ValidationSummary {
                records: records.len(),
                central_problems: central_problems(&records),
                custom_terms: records.iter().map(|r| r.custom_roles().len()).sum(),
            };
            print_json(&summary)?;
        }
        Commands::Generate { out, seed } => {
            let records = add_default_columns(generate_sample_scenarios(seed), &config.risk);
            write_records_csv(&out, &records)?;
            eprintln!("wrote {} records to {}", records.len(), out.display());
        }
        Commands::Links {
            vocab_dir,
            out,
            threshold,
            max_per_item,
            methods,
            problem,
            records_out,
            seed,
        } => {
            let vocabulary = load_vocabulary(vocab_dir.as_deref(), &config).await?;
            let mut options = LinkOptions::from(config.linking.clone());
            if let Some(t) = threshold {
                if !(0.0..=1.0).contains(&t) {
                    return Err("--threshold must lie in [0, 1]".into());
                }
                options.similarity_threshold = t;
            }
            if let Some(n) = max_per_item {
                options.max_links_per_item = n;
            }
            if let Some(raw) = methods {
                options.methods = parse_methods(&raw)?;
            }
            let candidates = candidates_from_vocabulary(&vocabulary);
            let links = find_links(&candidates, &options);
            write_json(&out, &links)?;
            eprintln!("wrote {} links to {}", links.len(), out.display());

            if let (Some(problem), Some(records_out)) = (problem, records_out) {
                let records = add_default_columns(
                    generate_from_links(&candidates, &links, &problem, seed),
                    &config.risk,
                );
                write_records_csv(&records_out, &records)?;
                eprintln!("wrote {} records to {}", records.len(), records_out.display());
            }
        }
        Commands::Graph {
            input,
            problem,
            out,
            hide_barriers,
            hide_escalation,
            color_by_risk,
            font_size,
        } => {
            let records = load_records(&input, &config)?;
            let options = GraphOptions {
                show_barriers: !hide_barriers,
                show_escalation: !hide_escalation,
                font_size,
                color_by_risk,
                risk: config.risk.clone(),
            };
            let graph = to_graph(&records, &problem, &options);
            if graph.nodes.is_empty() {
                warn!(central_problem = %problem, "no records for central problem");
            }
            write_json(&out, &graph)?;
        }
        Commands::Infer {
            input,
            problem,
            evidence,
            query,
            preset,
            use_data,
            out,
        } => {
            let records = load_records(&input, &config)?;
            let network = BayesianNetwork::build(&records, &problem, use_data, &config.inference)?;
            let mut ev: Evidence = match preset {
                Some(raw) => {
                    let preset = ScenarioPreset::parse(&raw)
                        .ok_or_else(|| format!("unknown preset {raw:?}"))?;
                    preset_evidence(&network.structure, preset)
                }
                None => Evidence::new(),
            };
            for pair in &evidence {
                let (node, state) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("evidence must be node=state, got {pair:?}"))?;
                ev.insert(node.trim().to_string(), state.trim().to_string());
            }
            let query = if query.is_empty() {
                vec![
                    NodeType::Problem.aggregate_name().to_string(),
                    NodeType::Consequence.aggregate_name().to_string(),
                ]
            } else {
                query
            };
            let result = network.infer(&ev, &query)?;
            match out {
                Some(path) => write_json(&path, &result)?,
                None => print_json(&result)?,
            }
        }
        Commands::Report {
            input,
            out,
            format,
            title,
            sections,
            problem,
            vocab_dir,
            use_data,
        } => {
            let records = load_records(&input, &config)?;
            let mut options = ReportOptions {
                central_problem: problem,
                risk: config.risk.clone(),
                ..ReportOptions::default()
            };
            if let Some(title) = title {
                options.title = title;
            }
            if let Some(raw) = sections {
                options.sections = parse_sections(&raw)?;
            }

            let mut analyses = Vec::new();
            if options.sections.contains(&ReportSection::BayesianAnalysis) {
                let problems = match &options.central_problem {
                    Some(p) => vec![p.clone()],
                    None => central_problems(&records),
                };
                for p in problems {
                    match analyze_problem(&records, &p, use_data, &config.inference) {
                        Ok(analysis) => analyses.push(analysis),
                        Err(e) => {
                            warn!(central_problem = %p, error = %e, "bayesian analysis skipped")
                        }
                    }
                }
            }
            // the vocabulary section degrades to "unavailable" without a directory
            let vocab_dir = vocab_dir.or_else(|| config.vocabulary.dir.clone());
            let vocabulary = match vocab_dir {
                Some(dir) if options.sections.contains(&ReportSection::Vocabulary) => {
                    Some(load_vocabulary(Some(&dir), &config).await?)
                }
                _ => None,
            };

            let report = build_report(&records, &options, &analyses, vocabulary.as_ref());
            match format.as_str() {
                "json" => write_json(&out, &report)?,
                "html" => std::fs::write(&out, render_report_html(&report))?,
                "md" | "markdown" => std::fs::write(&out, render_report_markdown(&report))?,
                other => return Err(format!("unknown report format {other:?}").into()),
            }
        }
        Commands::VocabSearch {
            vocab_dir,
            kind,
            query,
            scope,
            limit,
        } => {
            let kind = VocabularyKind::parse(&kind)
                .ok_or_else(|| format!("unknown vocabulary {kind:?}"))?;
            let scope = SearchScope::parse(&scope)
                .ok_or_else(|| format!("unknown search scope {scope:?}"))?;
            let vocabulary = load_vocabulary(vocab_dir.as_deref(), &config).await?;
            let hits: Vec<_> = vocabulary
                .table(kind)
                .search(&query, scope)
                .into_iter()
                .take(limit)
                .cloned()
                .collect();
            print_json(&hits)?;
        }
    }

    Ok(())
}

fn load_records(
    path: &Path,
    config: &BowtieConfig,
) -> Result<Vec<BowtieRecord>, Box<dyn std::error::Error>> {
    let records = read_records_csv(path)?;
    validate(&records)?;
    Ok(add_default_columns(records, &config.risk))
}

/// Load through the store so a slow directory is bounded by the configured
/// timeout. A failed load degrades to an empty vocabulary.
async fn load_vocabulary(
    dir: Option<&Path>,
    config: &BowtieConfig,
) -> Result<Vocabulary, Box<dyn std::error::Error>> {
    let dir = dir
        .map(Path::to_path_buf)
        .or_else(|| config.vocabulary.dir.clone())
        .ok_or("no vocabulary directory: pass --vocab-dir or set vocabulary.dir in config")?;
    let store = VocabularyStore::with_notifier(Vocabulary::empty(), Arc::new(TracingNotifier));
    let timeout = Duration::from_millis(config.vocabulary.load_timeout_ms);
    if let Err(e) = store.reload_with_timeout(dir.clone(), timeout, None).await {
        warn!(dir = %dir.display(), error = %e, "vocabulary unavailable");
    }
    Ok(store.snapshot().vocabulary.clone())
}

fn parse_methods(raw: &str) -> Result<Vec<SimilarityMethod>, Box<dyn std::error::Error>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            SimilarityMethod::parse(s)
                .ok_or_else(|| format!("unknown similarity method {s:?}").into())
        })
        .collect()
}

fn parse_sections(raw: &str) -> Result<Vec<ReportSection>, Box<dyn std::error::Error>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            ReportSection::parse(s).ok_or_else(|| format!("unknown report section {s:?}").into())
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), std::io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}
