// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};

use subtran::app_config::{BackendKind, Config, LogLevel};
use subtran::backends::create_backend;
use subtran::cache::TranslationCache;
use subtran::cancellation::CancellationToken;
use subtran::errors::{AppError, BackendError};
use subtran::file_utils::FileManager;
use subtran::glossary::GlossaryStore;
use subtran::pipeline::{Orchestrator, Scheduler};
use subtran::progress::{BarReporter, ProgressReporter};

/// CLI wrapper for BackendKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliBackendKind {
    LocalLlm,
    CloudLlm,
    Deepl,
    Google,
    Libretranslate,
}

impl From<CliBackendKind> for BackendKind {
    fn from(kind: CliBackendKind) -> Self {
        match kind {
            CliBackendKind::LocalLlm => BackendKind::LocalLlm,
            CliBackendKind::CloudLlm => BackendKind::CloudLlm,
            CliBackendKind::Deepl => BackendKind::Deepl,
            CliBackendKind::Google => BackendKind::Google,
            CliBackendKind::Libretranslate => BackendKind::Libretranslate,
        }
    }
}

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LevelFilter {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => LevelFilter::Error,
            CliLogLevel::Warn => LevelFilter::Warn,
            CliLogLevel::Info => LevelFilter::Info,
            CliLogLevel::Debug => LevelFilter::Debug,
            CliLogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate subtitle files (default command)
    #[command(alias = "translate")]
    Translate(TranslateArgs),

    /// Cache maintenance operations
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Generate shell completions for subtran
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Remove entries older than the given number of days
    Cleanup {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Remove bad entries, expire old ones and vacuum the database
    Optimize,
    /// Delete every cached translation
    Clear,
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Subtitle file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Translate files whose output already exists
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation backend to use
    #[arg(short, long, value_enum)]
    backend: Option<CliBackendKind>,

    /// Model name for LLM backends
    #[arg(short, long)]
    model: Option<String>,

    /// Backend endpoint URL
    #[arg(long)]
    base_url: Option<String>,

    /// API key for hosted backends
    #[arg(long, env = "SUBTRAN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Source language code or 'auto'
    #[arg(short, long)]
    source_lang: Option<String>,

    /// Target language code (e.g. 'pt-BR')
    #[arg(short, long)]
    target_lang: Option<String>,

    /// Files translated in parallel (1 or 2)
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Series id for the persistent glossary
    #[arg(long)]
    series_id: Option<i64>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// subtran - batch subtitle translation engine
///
/// Translates SRT/ASS subtitle files using a local LLM server, a cloud
/// LLM, DeepL, Google Translate or LibreTranslate, with a persistent
/// translation cache and per-series glossaries.
#[derive(Parser, Debug)]
#[command(name = "subtran")]
#[command(version = "0.1.0")]
#[command(about = "Batch subtitle translation engine")]
#[command(long_about = "subtran translates subtitle files using AI or MT backends.

EXAMPLES:
    subtran episode.srt                          # Translate one file to pt-BR
    subtran -t es /series/season-1/              # Translate a directory to Spanish
    subtran -b deepl --api-key KEY movie.ass     # Use DeepL
    subtran --series-id 42 episode.srt           # Use the series glossary
    subtran cache stats                          # Show cache statistics
    subtran completions bash > subtran.bash      # Generate bash completions")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Subtitle file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Translate files whose output already exists
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation backend to use
    #[arg(short, long, value_enum)]
    backend: Option<CliBackendKind>,

    /// Model name for LLM backends
    #[arg(short, long)]
    model: Option<String>,

    /// Backend endpoint URL
    #[arg(long)]
    base_url: Option<String>,

    /// API key for hosted backends
    #[arg(long, env = "SUBTRAN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Source language code or 'auto'
    #[arg(short, long)]
    source_lang: Option<String>,

    /// Target language code (e.g. 'pt-BR')
    #[arg(short, long)]
    target_lang: Option<String>,

    /// Files translated in parallel (1 or 2)
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Series id for the persistent glossary
    #[arg(long)]
    series_id: Option<i64>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

impl CommandLineOptions {
    /// Fold the top-level arguments into translate arguments
    fn into_translate_args(self) -> Option<TranslateArgs> {
        Some(TranslateArgs {
            input_path: self.input_path?,
            force_overwrite: self.force_overwrite,
            backend: self.backend,
            model: self.model,
            base_url: self.base_url,
            api_key: self.api_key,
            source_lang: self.source_lang,
            target_lang: self.target_lang,
            parallelism: self.parallelism,
            series_id: self.series_id,
            config_path: self.config_path,
            log_level: self.log_level,
        })
    }
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level }))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = chrono::Local::now().format("%H:%M:%S%.3f");
        let color = match record.level() {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        };
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", color, now, record.level(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut options = CommandLineOptions::parse();

    match options.command.take() {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "subtran", &mut std::io::stdout());
            ExitCode::SUCCESS
        }
        Some(Commands::Cache { action }) => {
            let _ = CustomLogger::init(LevelFilter::Info);
            run_cache_action(action)
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => match options.into_translate_args() {
            Some(args) => run_translate(args).await,
            None => {
                let _ = CommandLineOptions::command().print_help();
                ExitCode::from(2)
            }
        },
    }
}

fn run_cache_action(action: CacheAction) -> ExitCode {
    let config = Config::default_config();
    let cache = TranslationCache::open(config.cache_file_path());
    if !cache.has_disk() {
        error!("Cache database is not available at {:?}", config.cache_file_path());
        return ExitCode::from(4);
    }

    match action {
        CacheAction::Stats => {
            println!("{}", cache.stats().summary());
        }
        CacheAction::Cleanup { days } => {
            let removed = cache.cleanup_old(days);
            println!("Removed {} entries older than {} days", removed, days);
        }
        CacheAction::Optimize => {
            cache.optimize();
            println!("{}", cache.stats().summary());
        }
        CacheAction::Clear => {
            cache.clear_all();
            println!("Cache cleared");
        }
    }

    ExitCode::SUCCESS
}

async fn run_translate(args: TranslateArgs) -> ExitCode {
    let log_level = args
        .log_level
        .clone()
        .map(LevelFilter::from)
        .unwrap_or(LevelFilter::Info);
    if CustomLogger::init(log_level).is_err() {
        eprintln!("warning: logger already initialized");
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let files = match collect_files(&args.input_path, &config) {
        Ok(files) if files.is_empty() => {
            warn!("No subtitle files found under {:?}", args.input_path);
            return ExitCode::SUCCESS;
        }
        Ok(files) => files,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(2);
        }
    };

    let cache = Arc::new(TranslationCache::open(config.cache_file_path()));
    // Identical-pair rows from older runs poison dedupe; sweep them now
    let bad = cache.cleanup_bad();
    if bad > 0 {
        info!("Removed {} bad cache entries", bad);
    }

    let glossary = Arc::new(GlossaryStore::new(config.glossary_dir_path()));

    let backend = match create_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Could not initialize backend: {}", e);
            return ExitCode::from(3);
        }
    };

    let scheduler = Arc::new(Scheduler::new(
        config.max_parallelism,
        config.translation.srt_batch_size,
        config.translation.ass_batch_size,
    ));

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });
    }

    let reporter: Arc<dyn ProgressReporter> = Arc::new(BarReporter::new());
    let series_id = args.series_id;

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        cache.clone(),
        glossary,
        backend,
        scheduler,
        token.clone(),
        reporter,
    ));

    let work: Vec<_> = files.into_iter().map(|path| (path, series_id, None)).collect();
    let total = work.len();
    let outcomes = orchestrator.run(work).await;

    // Give in-flight workers a moment on cancellation
    if token.is_cancelled() {
        token.wait_for_workers(std::time::Duration::from_secs(30)).await;
    }

    let mut translated = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    let mut backend_unreachable = 0usize;

    for outcome in &outcomes {
        match outcome {
            Ok(outcome) if outcome.skipped => skipped += 1,
            Ok(_) => translated += 1,
            Err(AppError::Backend(BackendError::Unavailable(_))) => {
                failed += 1;
                backend_unreachable += 1;
            }
            Err(AppError::Cancelled) => failed += 1,
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    info!(
        "Done: {} translated, {} skipped, {} failed ({} files total)",
        translated, skipped, failed, total
    );
    info!("{}", cache.stats().summary());

    if translated == 0 && backend_unreachable > 0 && backend_unreachable == failed {
        return ExitCode::from(3);
    }
    if failed > 0 && translated == 0 && skipped == 0 {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Load the config file (when present) and apply CLI overrides
fn build_config(args: &TranslateArgs) -> Result<Config> {
    let mut config = if std::path::Path::new(&args.config_path).exists() {
        Config::from_file(&args.config_path)
            .with_context(|| format!("Failed to load config {:?}", args.config_path))?
    } else {
        Config::default_config()
    };

    if let Some(ref backend) = args.backend {
        config.backend.kind = backend.clone().into();
    }
    if let Some(ref model) = args.model {
        config.backend.model = model.clone();
    }
    if let Some(ref base_url) = args.base_url {
        config.backend.base_url = base_url.clone();
    }
    if let Some(ref api_key) = args.api_key {
        config.backend.api_key = api_key.clone();
    }
    if let Some(ref source) = args.source_lang {
        config.source_lang = source.clone();
    }
    if let Some(ref target) = args.target_lang {
        config.target_lang = target.clone();
    }
    if let Some(parallelism) = args.parallelism {
        config.max_parallelism = parallelism;
    }
    if args.force_overwrite {
        config.skip_existing = false;
    }

    config.validate()?;
    Ok(config)
}

/// Expand the input path into the list of subtitle files to process
fn collect_files(input: &PathBuf, config: &Config) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.clone()]);
    }
    if input.is_dir() {
        return FileManager::find_subtitle_files(input, &config.target_lang);
    }
    anyhow::bail!("Input path does not exist: {:?}", input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> TranslateArgs {
        TranslateArgs {
            input_path: PathBuf::from("x.srt"),
            force_overwrite: false,
            backend: None,
            model: None,
            base_url: None,
            api_key: None,
            source_lang: None,
            target_lang: None,
            parallelism: None,
            series_id: None,
            config_path: "/nonexistent/conf.json".to_string(),
            log_level: None,
        }
    }

    #[test]
    fn test_buildConfig_defaults() {
        let config = build_config(&base_args()).unwrap();
        assert_eq!(config.target_lang, "pt-BR");
        assert!(config.skip_existing);
    }

    #[test]
    fn test_buildConfig_overrides() {
        let mut args = base_args();
        args.target_lang = Some("es".to_string());
        args.force_overwrite = true;
        args.parallelism = Some(2);

        let config = build_config(&args).unwrap();
        assert_eq!(config.target_lang, "es");
        assert!(!config.skip_existing);
        assert_eq!(config.max_parallelism, 2);
    }

    #[test]
    fn test_buildConfig_invalidParallelism_shouldError() {
        let mut args = base_args();
        args.parallelism = Some(5);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_cliArgs_parse() {
        let options =
            CommandLineOptions::try_parse_from(["subtran", "dir/", "-t", "es", "-p", "2"]).unwrap();
        let translate = options.into_translate_args().unwrap();
        assert_eq!(translate.target_lang.as_deref(), Some("es"));
        assert_eq!(translate.parallelism, Some(2));
        assert_eq!(translate.input_path, PathBuf::from("dir/"));
    }
}
