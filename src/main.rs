//! FastConvert CLI - Batch Image Format Converter
//!
//! Converts files, directories and `@listfile` inputs to JPEG, PNG, WebP or
//! AVIF on a bounded worker pool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use tracing::{debug, info, warn};

use fastconvert::parallel::{ConsoleReporter, JsonLinesReporter, ProgressReporter};
use fastconvert::processing::{supported_input_formats, OutputResolver};
use fastconvert::{
    can_decode, init_with_config, BatchScheduler, ConversionEngine, ConversionOptions,
    PathExpander, Settings, TargetFormat,
};

/// FastConvert - Batch Image Format Converter
#[derive(Parser)]
#[command(
    name = "fastconvert",
    version,
    about = "Batch image converter to JPEG, PNG, WebP and AVIF",
    long_about = "FastConvert converts batches of images to JPEG, PNG, WebP or AVIF. Inputs can be \
                  files, directories (walked recursively) or @listfile references. Images can be \
                  shrunk to height/width bounds and sharpened, timestamps can be kept and originals \
                  moved to the trash. Each file is retried a few times before it counts as failed."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input files, directories or @listfile references
    #[arg(short, long, value_name = "PATH", num_args = 1..)]
    input: Vec<String>,

    /// Output directory (default: next to each source)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Target format (required unless a config file sets it)
    #[arg(short, long, value_enum, value_name = "FORMAT")]
    format: Option<CliFormat>,

    /// Quality 1-100, mapped per format (default: per-format)
    #[arg(short, long, value_name = "QUALITY", value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Maximum width in pixels
    #[arg(short = 'W', long, value_name = "PIXELS", value_parser = clap::value_parser!(u32).range(1..))]
    width: Option<u32>,

    /// Maximum height in pixels
    #[arg(short = 'H', long, value_name = "PIXELS", value_parser = clap::value_parser!(u32).range(1..))]
    height: Option<u32>,

    /// Sharpness factor, 1.0 leaves the image untouched [default: 1.0]
    #[arg(short, long, value_name = "FACTOR")]
    sharpness: Option<f32>,

    /// Number of parallel workers (default: available parallelism)
    #[arg(short, long, value_name = "COUNT")]
    threads: Option<usize>,

    /// Copy access and modification times onto the output
    #[arg(long)]
    keep_timestamps: bool,

    /// Move each source to the trash after a successful conversion
    #[arg(long)]
    delete_source: bool,

    /// WebP encoder effort 0-6
    #[arg(long, value_name = "METHOD", value_parser = clap::value_parser!(u8).range(0..=6))]
    webp_method: Option<u8>,

    /// AVIF encoder speed 0-10, higher is faster
    #[arg(long, value_name = "SPEED", value_parser = clap::value_parser!(u8).range(0..=10))]
    avif_speed: Option<u8>,

    /// Settings file (TOML or YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the effective settings to FILE
    #[arg(long, value_name = "FILE")]
    save_config: Option<PathBuf>,

    /// Show what would be converted without converting
    #[arg(long)]
    dry_run: bool,

    /// Output outcomes as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Validate a settings file
    Config {
        /// Settings file to validate
        file: PathBuf,
    },
    /// Generate an example settings file
    ExampleConfig {
        /// Output file path
        #[arg(short, long, default_value = "fastconvert.toml")]
        output: PathBuf,
        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,
    },
    /// Show supported formats and system information
    Info,
}

/// CLI-compatible target format enum
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliFormat {
    #[value(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl From<CliFormat> for TargetFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Jpeg => TargetFormat::Jpeg,
            CliFormat::Png => TargetFormat::Png,
            CliFormat::Webp => TargetFormat::WebP,
            CliFormat::Avif => TargetFormat::Avif,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            2
        }
    };
    process::exit(code);
}

/// Returns the process exit code
async fn run(cli: Cli) -> anyhow::Result<i32> {
    if let Some(command) = cli.command {
        return handle_subcommand(command);
    }

    let (settings, settings_warnings) = effective_settings(&cli)?;
    init_with_config(&settings).context("Failed to initialize FastConvert")?;
    for warning in &settings_warnings {
        warn!("{}", warning);
    }
    debug!("Effective settings: {:?}", settings);

    if let Some(path) = &cli.save_config {
        settings.save(path)?;
        if !cli.quiet {
            println!(
                "{}: Saved settings to {}",
                style("Success").green().bold(),
                path.display()
            );
        }
    }

    if cli.input.is_empty() {
        if cli.save_config.is_some() {
            return Ok(0);
        }
        bail!("No inputs given. Run with --help for usage information");
    }

    let files = PathExpander::new().expand(&cli.input)?;
    let options = ConversionOptions::from_settings(&settings.conversion);
    options.validate()?;

    if cli.dry_run {
        print_dry_run(&files, &options);
        return Ok(0);
    }

    let show_text = !cli.json && !cli.quiet;
    if show_text {
        print_header(files.len(), &options);
    }

    let reporter: Arc<dyn ProgressReporter> = if cli.json {
        Arc::new(JsonLinesReporter::stdout())
    } else {
        Arc::new(ConsoleReporter::new(show_text && Term::stderr().is_term(), show_text))
    };

    let handle = BatchScheduler::new(ConversionEngine::new())
        .workers(settings.processing.worker_count())
        .reporter(reporter)
        .start(files, options)?;

    let control = handle.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && control.stop() {
            eprintln!("{}: stopping after the files in progress", style("Interrupted").yellow().bold());
        }
    });

    let report = handle.finished().await?;
    let summary = report.summary;

    if !cli.json {
        if summary.failed > 0 || summary.stopped > 0 {
            eprintln!(
                "{}: {} failed, {} stopped",
                style("Incomplete").red().bold(),
                summary.failed,
                summary.stopped
            );
        }
        println!("{}", summary.summary_line());
    }
    info!("Finished in {:.2}s", summary.elapsed.as_secs_f64());

    Ok(if summary.all_succeeded() { 0 } else { 1 })
}

/// Settings file (if any) with command-line values laid over it.
///
/// Also returns warnings about the settings file. Logging is not set up yet
/// at this point, so the caller emits them.
fn effective_settings(cli: &Cli) -> anyhow::Result<(Settings, Vec<String>)> {
    let (mut settings, warnings) = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("Settings file {} does not exist", path.display());
            }
            Settings::load(path)
        }
        None => {
            // Without a settings file only -W/-H bound the output
            let mut settings = Settings::default();
            settings.conversion.enforce_height = false;
            settings.conversion.enforce_width = false;
            (settings, Vec::new())
        }
    };

    let conversion = &mut settings.conversion;
    match cli.format {
        Some(format) => conversion.format = format.into(),
        None if cli.config.is_none() && !cli.input.is_empty() => {
            bail!("--format is required (jpeg, png, webp or avif)")
        }
        None => {}
    }

    if cli.quality.is_some() {
        conversion.quality = cli.quality;
    }
    if cli.output.is_some() {
        conversion.output_dir = cli.output.clone();
    }
    if let Some(width) = cli.width {
        conversion.max_width = width;
        conversion.enforce_width = true;
    }
    if let Some(height) = cli.height {
        conversion.max_height = height;
        conversion.enforce_height = true;
    }
    if let Some(sharpness) = cli.sharpness {
        conversion.sharpness = sharpness;
    }
    conversion.keep_timestamps |= cli.keep_timestamps;
    conversion.delete_source |= cli.delete_source;
    if let Some(method) = cli.webp_method {
        conversion.webp_method = method;
    }
    if let Some(speed) = cli.avif_speed {
        conversion.avif_speed = speed;
    }

    if cli.threads.is_some() {
        settings.processing.threads = cli.threads;
    }

    if cli.quiet {
        settings.logging.level = "error".to_string();
    } else if cli.verbose {
        settings.logging.level = "debug".to_string();
    }

    settings.validate()?;
    Ok((settings, warnings))
}

fn print_header(total: usize, options: &ConversionOptions) {
    println!(
        "Converting {} file(s) to {}",
        style(total).bold(),
        style(options.target_format).cyan()
    );
    match &options.output_dir {
        Some(dir) => println!("Output directory: {}", dir.display()),
        None => println!("Output: next to each source"),
    }
}

fn print_dry_run(files: &[PathBuf], options: &ConversionOptions) {
    let resolver = OutputResolver::new(options.output_dir.clone(), options.target_format);

    println!(
        "{} files would be converted to {}:",
        style(files.len()).bold(),
        options.target_format
    );
    for file in files {
        println!("  {} -> {}", file.display(), resolver.destination(file).display());
    }
}

/// Handle subcommands
fn handle_subcommand(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Config { file } => validate_config_file(&file),
        Commands::ExampleConfig { output, yaml } => {
            generate_example_config(&output, yaml)?;
            Ok(0)
        }
        Commands::Info => {
            show_system_info();
            Ok(0)
        }
    }
}

/// Validate a settings file, listing every field that would fall back
fn validate_config_file(file_path: &Path) -> anyhow::Result<i32> {
    let (settings, issues) = Settings::load_with_report(file_path)?;

    for issue in &issues {
        println!("{}: {}", style("Invalid").yellow().bold(), issue);
    }
    settings.validate()?;

    if issues.is_empty() {
        println!("{}: Settings file is valid", style("Success").green().bold());
        println!("Format: {}", settings.conversion.format);
        println!("Workers: {}", settings.processing.worker_count());
        Ok(0)
    } else {
        println!("{} field(s) would use their defaults", issues.len());
        Ok(1)
    }
}

/// Generate example settings file
fn generate_example_config(output_path: &Path, use_yaml: bool) -> anyhow::Result<()> {
    let mut output_path = output_path.to_path_buf();
    let is_yaml_path = output_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if use_yaml && !is_yaml_path {
        output_path.set_extension("yaml");
    }

    Settings::default().save(&output_path)?;

    let format = if use_yaml { "YAML" } else { "TOML" };
    println!(
        "{}: Generated example {} settings: {}",
        style("Success").green().bold(),
        format,
        output_path.display()
    );

    Ok(())
}

/// Show system information
fn show_system_info() {
    use sysinfo::{CpuExt, System, SystemExt};

    println!("{}", style("FastConvert System Information").bold());
    println!();
    println!("{}: {}", style("Version").bold(), env!("CARGO_PKG_VERSION"));
    println!();

    let mut system = System::new_all();
    system.refresh_all();

    println!("{}", style("System:").bold());
    if let Some(name) = system.name() {
        println!("  OS: {}", name);
    }
    if let Some(version) = system.os_version() {
        println!("  Version: {}", version);
    }
    if let Some(cpu) = system.cpus().first() {
        println!("  CPU: {}", cpu.brand());
    }
    println!("  Parallelism: {}", num_cpus::get());
    println!(
        "  Memory: {:.2} GB total, {:.2} GB available",
        system.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0,
        system.available_memory() as f64 / 1024.0 / 1024.0 / 1024.0
    );
    println!();

    println!("{}", style("Supported Formats:").bold());
    println!("  Input extensions: {}", supported_input_formats().join(", "));
    for format in TargetFormat::ALL {
        let decode = if can_decode(format) { "decode+encode" } else { "encode only" };
        println!(
            "  {:<5} {:<11} {:<14} default quality {}",
            format.to_string(),
            format.mime_type(),
            decode,
            format.default_quality()
        );
    }
}
