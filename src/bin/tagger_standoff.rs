use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tagger_standoff::app::{App, ConvertResult, Inputs};
use tagger_standoff::compare::{self, CompareOptions, CompareReport, MatchPolicy, RetypeRule, Stats};
use tagger_standoff::config::{self, ConfigLoader, ResolvedConfig};
use tagger_standoff::dicts;
use tagger_standoff::error::StandoffError;
use tagger_standoff::extend::ExtendOptions;
use tagger_standoff::fs_util;
use tagger_standoff::kvstore::KvStore;
use tagger_standoff::lookup::{CombinedTable, EntityTable, IdSource, NameSource, NameTable};
use tagger_standoff::output::{
    ConsoleSink, DirectorySink, JsonOutput, KvSink, LogProgress, OutputMode, StandoffSink,
};
use tagger_standoff::popup;
use tagger_standoff::resolver::LazyTaxonomy;

#[derive(Parser)]
#[command(name = "tagger-standoff")]
#[command(about = "Convert tagger output to brat standoff and compare standoff annotation sets")]
#[command(version, author)]
struct Cli {
    /// JSON config file (default: tagger-standoff.json if present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert documents and tagger output to standoff")]
    Convert(ConvertArgs),
    #[command(about = "Print tagger output extended with types, ids and context")]
    Extend(ExtendArgs),
    #[command(about = "Compare two standoff files or directories")]
    Compare(CompareArgs),
    #[command(about = "Combine name and entity tables into one dictionary")]
    Combine(CombineArgs),
    #[command(about = "Map tagger output to names and ids from a combined dictionary")]
    Map(MapArgs),
    #[command(about = "Build a key-value store from a key-value TSV")]
    Makedb(MakedbArgs),
    #[command(about = "Convert EXTRACT popup markup to standoff")]
    Popup(PopupArgs),
}

#[derive(Args, Clone)]
struct LookupArgs {
    /// serial → name TSV or key-value store
    #[arg(long)]
    names: Option<PathBuf>,

    /// serial → type → id TSV or key-value store
    #[arg(long)]
    entities: Option<PathBuf>,

    /// taxonomy id → species name TSV
    #[arg(long)]
    taxnames: Option<PathBuf>,
}

#[derive(Args)]
struct ConvertArgs {
    docs: PathBuf,
    tags: PathBuf,

    #[command(flatten)]
    lookups: LookupArgs,

    /// Output directory (default stdout)
    #[arg(short, long, conflicts_with = "store")]
    directory: Option<Utf8PathBuf>,

    /// Write documents into a key-value store instead
    #[arg(long)]
    store: Option<PathBuf>,

    /// Shard output directories by this many leading id characters
    #[arg(long)]
    shard: Option<usize>,

    #[arg(short, long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct ExtendArgs {
    docs: PathBuf,
    tags: PathBuf,

    #[command(flatten)]
    lookups: LookupArgs,

    /// Include entity names in output
    #[arg(long)]
    with_names: bool,

    /// Number of context words to include
    #[arg(short, long)]
    words: Option<usize>,

    #[arg(short, long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct CompareArgs {
    set1: PathBuf,
    set2: PathBuf,

    /// Filter out annotations by type (TYPE[,TYPE ...])
    #[arg(short, long)]
    filter_types: Option<String>,

    /// Apply mapping to type names when matching
    #[arg(short, long)]
    map_types: bool,

    /// Always map types when mapping exists
    #[arg(short = 'M', long)]
    force_map: bool,

    /// Retype annotations with norm id in file (FROM:TO:FILE[;FROM:TO:FILE ...])
    #[arg(short, long)]
    retype: Option<String>,

    /// Suffix of files to compare
    #[arg(short, long, value_parser = parse_suffix)]
    suffix: Option<String>,

    #[arg(long, value_enum)]
    policy: Option<MatchPolicy>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CombineArgs {
    /// Preferred entity names
    preferred: PathBuf,
    /// All entity names
    names: PathBuf,
    /// Entity identifiers
    entities: PathBuf,
}

#[derive(Args)]
struct MapArgs {
    /// Combined dictionary (output of `combine`)
    dict: PathBuf,
    /// Tagger output
    tagged: PathBuf,
}

#[derive(Args)]
struct MakedbArgs {
    /// Key-value TSV with integer keys
    dict: PathBuf,
    /// Output database
    dbname: PathBuf,
}

#[derive(Args)]
struct PopupArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output directory (default stdout)
    #[arg(short, long)]
    directory: Option<Utf8PathBuf>,
}

fn parse_suffix(value: &str) -> Result<String, String> {
    config::validate_suffix(value).map_err(|err| err.to_string())?;
    Ok(value.to_string())
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<StandoffError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &StandoffError) -> u8 {
    match error {
        StandoffError::Format { .. }
        | StandoffError::InvalidField { .. }
        | StandoffError::TextMismatch { .. }
        | StandoffError::UnexpectedType(_)
        | StandoffError::InvalidRetype(_) => 2,
        StandoffError::Filesystem(_) | StandoffError::Store(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert(args) => run_convert(args, &config),
        Commands::Extend(args) => run_extend(args, &config),
        Commands::Compare(args) => run_compare(args, &config),
        Commands::Combine(args) => run_combine(args),
        Commands::Map(args) => run_map(args),
        Commands::Makedb(args) => run_makedb(args),
        Commands::Popup(args) => run_popup(args),
    }
}

fn build_app(
    lookups: &LookupArgs,
    config: &ResolvedConfig,
) -> miette::Result<App<NameSource, IdSource, LazyTaxonomy>> {
    let names = NameSource::open(lookups.names.as_deref())?;
    let ids = IdSource::open(lookups.entities.as_deref())?;
    let taxnames = lookups
        .taxnames
        .clone()
        .unwrap_or_else(|| config.taxnames_path.clone());
    Ok(App::new(names, ids, LazyTaxonomy::new(taxnames)))
}

fn run_convert(args: ConvertArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let mut app = build_app(&args.lookups, config)?;
    let inputs = Inputs::open(&args.docs, &args.tags)?;
    let shard = args.shard.or(config.shard_prefix_len);

    let mut sink: Box<dyn StandoffSink> = match (&args.directory, &args.store) {
        (Some(directory), _) => Box::new(DirectorySink::new(directory.clone(), shard)),
        (None, Some(store)) => Box::new(KvSink::new(KvStore::open(store)?)),
        (None, None) => Box::new(ConsoleSink::stdout()),
    };
    let result = app.convert(inputs, sink.as_mut(), &LogProgress, args.limit)?;
    log_summary("converted", &result);
    Ok(())
}

fn run_extend(args: ExtendArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let mut app = build_app(&args.lookups, config)?;
    let inputs = Inputs::open(&args.docs, &args.tags)?;
    let options = ExtendOptions {
        names: args.with_names,
        words: args.words,
        limit: args.limit,
    };
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let result = app.extend(inputs, &mut out, &options, &LogProgress)?;
    out.flush().into_diagnostic()?;
    log_summary("extended", &result);
    Ok(())
}

fn log_summary(action: &str, result: &ConvertResult) {
    tracing::info!(
        "{action} {} documents, {} mentions ({} textbounds, {} normalizations)",
        result.documents,
        result.mentions,
        result.textbounds,
        result.normalizations
    );
    if result.skipped_lines > 0 || result.extra_lines > 0 {
        tracing::warn!(
            "skipped {} tagger lines, {} extra tagger lines after the last document",
            result.skipped_lines,
            result.extra_lines
        );
    }
}

fn run_compare(args: CompareArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let output_mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let filter_types: BTreeSet<String> = args
        .filter_types
        .as_deref()
        .map(|types| {
            types
                .split(',')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let retype = match args.retype.as_deref() {
        Some(rules) => RetypeRule::parse_list(rules)?,
        None => Vec::new(),
    };
    let options = CompareOptions {
        filter_types,
        map_types: args.map_types,
        force_map: args.force_map,
        retype,
        suffix: args.suffix.unwrap_or_else(|| config.suffix.clone()),
        policy: args.policy.unwrap_or(config.match_policy),
        aliases: config.type_aliases.clone(),
    };

    let mut stats = Stats::default();
    let mut on_file = |path: &std::path::Path, outcome: &compare::FileOutcome| {
        if matches!(output_mode, OutputMode::Text) {
            for event in &outcome.events {
                println!("{event}");
            }
            println!("SCORE {}\t{}", outcome.score, path.display());
        }
    };
    compare::compare_paths(&args.set1, &args.set2, &options, &mut stats, &mut on_file)?;

    let report = CompareReport::from_stats(&stats);
    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Text => print!("{}", report.render_text()),
    }
    Ok(())
}

fn run_combine(args: CombineArgs) -> miette::Result<()> {
    let mut names = NameTable::load(&args.preferred)?;
    names.load_more(&args.names)?;
    let entities = EntityTable::load(&args.entities)?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for row in dicts::combine(&names, &entities) {
        writeln!(out, "{row}").into_diagnostic()?;
    }
    out.flush().into_diagnostic()?;
    Ok(())
}

fn run_map(args: MapArgs) -> miette::Result<()> {
    let dictionary = CombinedTable::load(&args.dict)?;
    let reader = fs_util::open_reader(&args.tagged)?;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let report = dicts::map_tagged(
        reader,
        &args.tagged.display().to_string(),
        &dictionary,
        &mut out,
    )?;
    out.flush().into_diagnostic()?;
    tracing::info!(
        "mapped {} mentions, {} not in dictionary",
        report.mentions,
        report.unmapped
    );
    Ok(())
}

fn run_makedb(args: MakedbArgs) -> miette::Result<()> {
    let reader = fs_util::open_reader(&args.dict)?;
    let mut store = KvStore::open(&args.dbname)?;
    store.build_from_tsv(reader, &args.dict.display().to_string())?;
    Ok(())
}

fn run_popup(args: PopupArgs) -> miette::Result<()> {
    let mut sink: Box<dyn StandoffSink> = match args.directory {
        Some(directory) => Box::new(DirectorySink::new(directory, None)),
        None => Box::new(ConsoleSink::stdout()),
    };
    for path in &args.files {
        popup::convert_file(path, sink.as_mut())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_suffix_needs_dot() {
        assert!(Cli::try_parse_from(["tagger-standoff", "compare", "a", "b", "-s", "ann"]).is_err());
        let cli = Cli::try_parse_from(["tagger-standoff", "compare", "a", "b", "-s", ".a1"]).unwrap();
        let Commands::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.suffix.as_deref(), Some(".a1"));
    }
}
