use std::collections::BTreeSet;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use kira_metabolic_networks::app::{App, BuildSummary, FusionSummary};
use kira_metabolic_networks::config::{ConfigLoader, ResolvedConfig};
use kira_metabolic_networks::domain::{OrganismCode, OrganismGroup, PathwayId};
use kira_metabolic_networks::error::KiraError;
use kira_metabolic_networks::fetch::KeggHttpClient;
use kira_metabolic_networks::memo::Memoizer;
use kira_metabolic_networks::orthology::{DuplicationModel, NeofunctionalizationFilter};
use kira_metabolic_networks::output::{JsonOutput, LogProgress};
use kira_metabolic_networks::similarity::StaticSimilarity;
use kira_metabolic_networks::store::ContentStore;

#[derive(Parser)]
#[command(name = "kira-mn")]
#[command(about = "Cached KEGG metabolic networks: organism graphs, clade fusion and core metabolism")]
#[command(version, author)]
struct Cli {
    /// Path to kira-mn.json (defaults to ./kira-mn.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build and analyse metabolic graphs")]
    Graph(GraphArgs),
    #[command(about = "Inspect the content store")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct GraphArgs {
    #[command(subcommand)]
    command: GraphCommand,
}

#[derive(Subcommand)]
enum GraphCommand {
    #[command(about = "Build or load the graph of one organism")]
    Build(BuildArgs),
    #[command(about = "Fuse the graphs of several organisms")]
    Fuse(GroupArgs),
    #[command(about = "Core metabolism of a group")]
    Core(CoreArgs),
    #[command(about = "Compare the core metabolism of two groups")]
    Compare(CompareArgs),
    #[command(about = "Robustness and flexibility of a group's core metabolism")]
    Redundancy(GroupArgs),
    #[command(about = "Neofunctionalized enzymes among similar genes of a group")]
    Neofunc(NeofuncArgs),
    #[command(about = "Duplicated enzyme genes of a group")]
    Duplications(DuplicationArgs),
}

#[derive(Args)]
struct BuildArgs {
    organism: String,

    /// Restrict the graph to these pathway numbers, e.g. 00260
    #[arg(long = "pathway")]
    pathways: Vec<String>,
}

#[derive(Args, Clone)]
struct GroupArgs {
    /// Organism codes, e.g. eco ecj
    organisms: Vec<String>,

    /// Named group from the config file or a KEGG lineage rank
    #[arg(long)]
    group: Option<String>,
}

#[derive(Args)]
struct CoreArgs {
    #[command(flatten)]
    members: GroupArgs,

    #[arg(long)]
    threshold: Option<f64>,
}

#[derive(Args)]
struct CompareArgs {
    #[arg(long)]
    parent: String,

    #[arg(long)]
    child: String,
}

#[derive(Args)]
struct NeofuncArgs {
    #[command(flatten)]
    members: GroupArgs,

    /// TSV of gene_a, gene_b, score
    #[arg(long)]
    similarity: Utf8PathBuf,

    #[arg(long)]
    cutoff: Option<f64>,

    /// Only events whose EC numbers differ in at least this many levels
    #[arg(long, default_value_t = 0)]
    min_ec_difference: usize,

    /// Only EC changes seen in at least this many organisms
    #[arg(long, default_value_t = 0)]
    min_organisms: usize,
}

#[derive(Args)]
struct DuplicationArgs {
    #[command(flatten)]
    members: GroupArgs,

    /// TSV of gene_a, gene_b, score
    #[arg(long)]
    similarity: Utf8PathBuf,

    #[arg(long)]
    cutoff: Option<f64>,

    /// Count similar genes of any group member, not only paralogs
    #[arg(long, conflicts_with = "reference")]
    within_group: bool,

    /// Require an ortholog in one of these organisms (chevron duplication)
    #[arg(long = "reference")]
    reference: Vec<String>,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "List entries of a namespace")]
    List { namespace: String },
    #[command(about = "Delete one entry")]
    Delete { namespace: String, identifier: String },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    if error.is_remote() {
        return 3;
    }
    if error.is_corruption() {
        return 4;
    }
    match error {
        KiraError::NotFound(_)
        | KiraError::MissingConfig
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_)
        | KiraError::Taxonomy(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let store = ContentStore::new(config.cache.clone());
    let memo = Memoizer::new(store);
    let fetcher = KeggHttpClient::new()?;
    let mut analysis = config.analysis.clone();

    match cli.command {
        Commands::Graph(args) => {
            if let GraphCommand::Build(build) = &args.command
                && !build.pathways.is_empty()
            {
                let pathways = build
                    .pathways
                    .iter()
                    .map(|value| value.parse::<PathwayId>())
                    .collect::<Result<BTreeSet<_>, KiraError>>()?;
                analysis.build.pathways = Some(pathways);
            }
            let app = App::new(memo, fetcher, analysis);
            run_graph(args.command, &app, &config)?;
            debug!(stats = ?app.memo().stats(), "memoization");
            Ok(())
        }
        Commands::Cache(args) => {
            let app = App::new(memo, fetcher, analysis);
            run_cache(args.command, &app)
        }
    }
}

fn load_config(path: Option<&str>) -> miette::Result<ResolvedConfig> {
    match ConfigLoader::resolve(path) {
        Ok(config) => Ok(config),
        Err(KiraError::MissingConfig) => Ok(ResolvedConfig::defaults()?),
        Err(err) => Err(err.into()),
    }
}

fn run_graph(
    command: GraphCommand,
    app: &App<KeggHttpClient>,
    config: &ResolvedConfig,
) -> miette::Result<()> {
    let sink = LogProgress;
    match command {
        GraphCommand::Build(args) => {
            let organism = args.organism.parse::<OrganismCode>()?;
            let outcome = app.organism_graph(&organism, &sink)?;
            JsonOutput::print_build(&BuildSummary::from(&outcome)).into_diagnostic()
        }
        GraphCommand::Fuse(args) => {
            let group = resolve_members(&args, app, config)?;
            let fused = app.fuse_group(&group, &sink)?;
            JsonOutput::print_fusion(&FusionSummary::new(&group.name, &fused)?).into_diagnostic()
        }
        GraphCommand::Core(args) => {
            let group = resolve_members(&args.members, app, config)?;
            let summary = app.core_summary(&group, args.threshold, &sink)?;
            JsonOutput::print_core(&summary).into_diagnostic()
        }
        GraphCommand::Compare(args) => {
            let taxonomy = config.taxonomy();
            let parent = app.resolve_group(&args.parent, &taxonomy)?;
            let child = app.resolve_group(&args.child, &taxonomy)?;
            let summary = app.clade_summary(&parent, &child, &sink)?;
            JsonOutput::print_clades(&summary).into_diagnostic()
        }
        GraphCommand::Redundancy(args) => {
            let group = resolve_members(&args, app, config)?;
            let report = app.redundancy(&group, &sink)?;
            JsonOutput::print_redundancy(&report).into_diagnostic()
        }
        GraphCommand::Neofunc(args) => {
            let group = resolve_members(&args.members, app, config)?;
            let similarity = StaticSimilarity::from_tsv(&args.similarity)?;
            let filter = NeofunctionalizationFilter {
                min_ec_difference: args.min_ec_difference,
                min_organisms: args.min_organisms,
            };
            let report =
                app.neofunctionalizations(&group, &similarity, args.cutoff, &filter, &sink)?;
            JsonOutput::print_neofunctionalizations(&report).into_diagnostic()
        }
        GraphCommand::Duplications(args) => {
            let group = resolve_members(&args.members, app, config)?;
            let similarity = StaticSimilarity::from_tsv(&args.similarity)?;
            let model = if !args.reference.is_empty() {
                let reference = args
                    .reference
                    .iter()
                    .map(|code| code.parse::<OrganismCode>())
                    .collect::<Result<BTreeSet<_>, KiraError>>()?;
                DuplicationModel::Chevron(reference)
            } else if args.within_group {
                DuplicationModel::SameGroup
            } else {
                DuplicationModel::Simple
            };
            let report = app.gene_duplications(&group, &similarity, args.cutoff, &model, &sink)?;
            JsonOutput::print_duplications(&report).into_diagnostic()
        }
    }
}

fn run_cache(command: CacheCommand, app: &App<KeggHttpClient>) -> miette::Result<()> {
    match command {
        CacheCommand::List { namespace } => {
            JsonOutput::print_cache_list(&app.cache_list(&namespace)?).into_diagnostic()
        }
        CacheCommand::Delete {
            namespace,
            identifier,
        } => JsonOutput::print_cache_delete(&app.cache_delete(&namespace, &identifier)?)
            .into_diagnostic(),
    }
}

fn resolve_members(
    args: &GroupArgs,
    app: &App<KeggHttpClient>,
    config: &ResolvedConfig,
) -> miette::Result<OrganismGroup> {
    if let Some(name) = &args.group {
        return Ok(app.resolve_group(name, &config.taxonomy())?);
    }
    if args.organisms.is_empty() {
        return Err(miette::Report::msg(
            "pass organism codes or --group (try `kira-mn graph --help`)",
        ));
    }
    let organisms = args
        .organisms
        .iter()
        .map(|code| code.parse::<OrganismCode>())
        .collect::<Result<Vec<_>, KiraError>>()?;
    Ok(OrganismGroup::new(args.organisms.join("+"), organisms))
}
