use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use env_logger::{Env, Target};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use nmt_datagen::config::available_workers;
use nmt_datagen::dataset::DEFAULT_PREPROCESS_PROGRAM;
use nmt_datagen::{
    DatagenConfig, LanguagePair, Pipeline, PreprocessCommand, Stage, SubwordVocabularyBuilder,
};

const DEFAULT_TASK: &str = "mmt_translation";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Encode parallel corpora and generate a binarized NMT training dataset",
    long_about = None
)]
struct Cli {
    /// Comma separated language pairs, e.g. "en:it,it:en"
    #[arg(value_name = "LANGUAGE_PAIRS")]
    lang_pairs: String,

    /// Destination folder
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Corpus roots holding `<a>__<b>/{train,dev}` directories
    #[arg(value_name = "INPUT_PATHS", required = true)]
    inputs: Vec<PathBuf>,

    /// Working directory for checkpoints and intermediate files
    #[arg(short = 'w', long, value_name = "WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Keep the working directory after a successful run
    #[arg(short = 'd', long, requires = "working_dir")]
    debug: bool,

    /// Vocabulary size
    #[arg(short = 's', long = "voc-size", value_name = "SIZE", default_value_t = nmt_datagen::config::DEFAULT_VOCAB_SIZE)]
    voc_size: usize,

    /// Threads used for vocabulary training
    #[arg(short = 'T', long, value_name = "N", default_value_t = 2)]
    threads: usize,

    /// Minimum pair count for a merge
    #[arg(long, value_name = "COUNT")]
    count_threshold: Option<u64>,

    /// Reuse an existing vocabulary instead of training one
    #[arg(long = "vocabulary", value_name = "VOCABULARY_PATH")]
    vocabulary_path: Option<PathBuf>,

    /// Write the log to a file instead of stderr
    #[arg(long = "log", value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Task identifier forwarded to the preprocessing tool
    #[arg(long, value_name = "TASK", default_value = DEFAULT_TASK)]
    task: String,

    /// Tell the preprocessing tool that factor streams are meaningful
    #[arg(long)]
    with_factors: bool,

    /// Tokenization worker threads (defaults to available parallelism)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Aligned lines per tokenization batch (defaults to 100 per worker)
    #[arg(long, value_name = "LINES")]
    batch_size: Option<usize>,

    /// Program building the binarized dataset
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_PREPROCESS_PROGRAM)]
    preprocess_cmd: String,

    /// Re-run the pipeline starting at this stage (vocabulary, encode, datagen)
    #[arg(long, value_name = "STAGE")]
    start_stage: Option<Stage>,

    /// Disable the progress spinner
    #[arg(long)]
    no_progress: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, action = ArgAction::Count)]
    quiet: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_file.as_ref())?;
    run(cli)
}

fn init_logging(verbose: u8, quiet: u8, log_file: Option<&PathBuf>) -> Result<()> {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            0 => LevelFilter::Info,
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("unable to create log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    let _ = builder.try_init();
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let lang_pairs =
        LanguagePair::parse_list(&cli.lang_pairs).context("invalid language pairs")?;
    let cfg = DatagenConfig::builder(lang_pairs, cli.inputs, &cli.output)
        .working_dir(cli.working_dir.as_ref())
        .keep_working_dir(cli.debug)
        .vocab_size(cli.voc_size)
        .vocab_threads(cli.threads)
        .count_threshold(cli.count_threshold)
        .vocabulary_path(cli.vocabulary_path.as_ref())
        .task(Some(cli.task))
        .with_factors(cli.with_factors)
        .workers(cli.workers.unwrap_or_else(available_workers))
        .batch_size(cli.batch_size)
        .start_stage(cli.start_stage)
        .build()
        .context("invalid configuration")?;

    let vocabulary = SubwordVocabularyBuilder::from_config(&cfg);
    let dataset = PreprocessCommand::new(&cli.preprocess_cmd);
    let pipeline = Pipeline::new(cfg, &vocabulary, &dataset);
    info!(
        "preparing {} directions in {}",
        pipeline.config().lang_pairs.len(),
        pipeline.working_dir().display()
    );

    let spinner = if cli.no_progress {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} generating dataset... {elapsed}")
            .context("invalid progress template")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    };

    let start = Instant::now();
    let result = pipeline.run();
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let report = result.context("data generation failed")?;
    let elapsed = start.elapsed();

    if let Some(metrics) = &report.metrics {
        println!(
            "   encoded train {} | dev {} | dropped {}",
            metrics.lines_written(nmt_datagen::CorpusSplit::Train),
            metrics.lines_written(nmt_datagen::CorpusSplit::Dev),
            metrics.lines_dropped()
        );
    }
    println!(
        "✅ dataset ready in {} ({} stages run, {} resumed) | duration {:.2?}",
        report.output_path.display(),
        report.executed.len(),
        report.skipped.len(),
        elapsed
    );
    println!("   vocabulary {}", report.vocabulary.display());
    println!("   length statistics {}", report.lengths.display());
    Ok(())
}
