//! gridwork CLI - parallel map algebra on grids and point layers

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use gridwork_algorithms::global::{DistanceMetric, global_sum, min_distance, min_distance_index};
use gridwork_algorithms::local::{local_binary, local_mult, local_sin, local_sum, LocalOp};
use gridwork_algorithms::statistics::{FocalParams, FocalStatistic, ZonalStatistic, focal_statistics, zonal_statistics};
use gridwork_algorithms::terrain::{AspectOutput, CostDistanceParams, HillshadeParams, aspect, cost_distance, hillshade};
use gridwork_core::Domain;
use gridwork_core::io::{read_domain, write_domain};
use gridwork_parallel::{Decomposition, EngineConfig, ExecutionMode, OperationSpec, RunOutput, RunReport, run_with_report};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "gridwork")]
#[command(author, version, about = "Parallel map algebra on tiled grids", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Engine settings; flags override the config file and `GRIDWORK_*` variables
#[derive(Args)]
struct EngineArgs {
    /// JSON engine configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Worker threads (1 runs serially)
    #[arg(short, long, global = true)]
    workers: Option<usize>,
    /// Run on the calling thread only
    #[arg(long, global = true)]
    serial: bool,
    /// Rows or columns per tile
    #[arg(short, long, global = true)]
    granularity: Option<usize>,
    /// Tile layout: rows or columns
    #[arg(long, global = true, default_value = "rows")]
    decomposition: String,
    /// Decimals written to ASCII grids
    #[arg(long, global = true)]
    precision: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a layer file
    Info {
        /// Input file (.asc, .tif or .json)
        input: PathBuf,
    },
    /// Cell-by-cell operations between layers
    Local {
        #[command(subcommand)]
        operation: LocalCommands,
    },
    /// Neighborhood statistics and terrain analysis
    Focal {
        #[command(subcommand)]
        operation: FocalCommands,
    },
    /// Statistic of the values sharing a zone
    Zonal {
        /// Value layer
        values: PathBuf,
        /// Zone layer
        zones: PathBuf,
        /// Output file
        output: PathBuf,
        /// Statistic: sum, mean, min, max, majority, minority
        #[arg(short, long, default_value = "mean")]
        statistic: String,
    },
    /// Accumulated travel cost from source cells
    CostDistance {
        /// Source layer (cells equal to 0 are sources)
        sources: PathBuf,
        /// Cost surface
        costs: PathBuf,
        /// Output file
        output: PathBuf,
        /// Extra cost value treated as impassable
        #[arg(short, long)]
        barrier: Option<f64>,
    },
    /// Distance from every cell to the nearest point
    Distance {
        /// Reference grid
        grid: PathBuf,
        /// Point layer (.json)
        points: PathBuf,
        /// Output file
        output: PathBuf,
        /// Metric: euclidean or manhattan
        #[arg(short, long, default_value = "euclidean")]
        metric: String,
        /// Write the index of the nearest point instead of the distance
        #[arg(long)]
        index: bool,
    },
    /// Sum of all valid cells of a layer
    GlobalSum {
        /// Input file
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum LocalCommands {
    /// Sum of two or more layers
    Sum {
        /// Input files followed by the output file
        #[arg(num_args = 3.., required = true)]
        files: Vec<PathBuf>,
    },
    /// Product of two or more layers
    Mult {
        /// Input files followed by the output file
        #[arg(num_args = 3.., required = true)]
        files: Vec<PathBuf>,
    },
    /// Binary operation between two layers
    Math {
        /// First input
        a: PathBuf,
        /// Second input
        b: PathBuf,
        /// Output file
        output: PathBuf,
        /// Operation: add, subtract, multiply, divide
        #[arg(short, long)]
        op: String,
    },
    /// Sine of every cell
    Sin {
        input: PathBuf,
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum FocalCommands {
    /// Statistic over a square or circular window
    Stats {
        input: PathBuf,
        output: PathBuf,
        /// Statistic: mean, sum, min, max, majority
        #[arg(short, long, default_value = "mean")]
        statistic: String,
        /// Window radius in cells
        #[arg(short, long, default_value = "1")]
        radius: usize,
        /// Circular instead of square window
        #[arg(long)]
        circular: bool,
    },
    /// Aspect of a DEM
    Aspect {
        input: PathBuf,
        output: PathBuf,
        /// Output format: degrees, radians, compass
        #[arg(short, long, default_value = "degrees")]
        format: String,
    },
    /// Hillshade of a DEM
    Hillshade {
        input: PathBuf,
        output: PathBuf,
        /// Sun azimuth in degrees (0=North, clockwise)
        #[arg(short, long, default_value = "315")]
        azimuth: f64,
        /// Sun altitude in degrees above horizon
        #[arg(short = 'l', long, default_value = "45")]
        altitude: f64,
        /// Z-factor for vertical exaggeration
        #[arg(short, long, default_value = "1.0")]
        z_factor: f64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Defaults, then the config file, then the environment, then flags
fn resolve_config(args: &EngineArgs) -> Result<EngineConfig> {
    let base = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = base.with_env().context("Invalid GRIDWORK_* variable")?;

    if let Some(workers) = args.workers {
        config.workers = workers;
        config.mode = if workers <= 1 { ExecutionMode::Serial } else { ExecutionMode::WorkerPool };
    }
    if args.serial {
        config.mode = ExecutionMode::Serial;
    }
    if let Some(granularity) = args.granularity {
        config.granularity = granularity;
    }
    if let Some(precision) = args.precision {
        config.value_precision = precision;
    }
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

fn read_layer(path: &Path) -> Result<Domain> {
    let pb = spinner(&format!("Reading {}...", path.display()));
    let domain = read_domain(path).with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    Ok(domain)
}

fn write_layer(domain: &Domain, path: &Path, precision: usize) -> Result<()> {
    let pb = spinner("Writing output...");
    write_domain(path, domain, precision).with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "  Tasks: {}, executions: {}, requeues: {}, waves: {}",
        report.tasks, report.executions, report.requeues, report.waves
    );
    if report.unset_cells > 0 {
        println!("  Cells left at their initial value: {}", report.unset_cells);
    }
    if !report.is_complete() {
        warn!("{} task(s) failed; affected tiles keep their initial values", report.failures);
    }
}

/// Engine that runs every spec with the resolved settings
struct Engine {
    config: EngineConfig,
    decomposition: Decomposition,
}

impl Engine {
    fn execute(&self, spec: OperationSpec) -> Result<(RunOutput, RunReport)> {
        let spec = spec.with_decomposition(self.decomposition.clone());
        let pb = spinner(&format!("Running {}...", spec.name()));
        let start = Instant::now();
        let result = run_with_report(&spec, &self.config).with_context(|| format!("Operation '{}' failed", spec.name()));
        pb.finish_and_clear();
        let (output, report) = result?;
        info!("{} finished in {:.2?}", spec.name(), start.elapsed());
        Ok((output, report))
    }

    /// Run a layer-producing operation and write its result
    fn run_to_file(&self, spec: OperationSpec, output: &Path) -> Result<()> {
        let (result, report) = self.execute(spec)?;
        let domain = result.into_domain().context("Operation did not produce a layer")?;
        write_layer(&domain, output, self.config.value_precision)?;
        println!("Output: {}", output.display());
        print_report(&report);
        Ok(())
    }
}

/// Split `inputs... output` into the inputs and the output
fn split_output(files: &[PathBuf]) -> Result<(&[PathBuf], &Path)> {
    match files.split_last() {
        Some((output, inputs)) if inputs.len() >= 2 => Ok((inputs, output.as_path())),
        _ => bail!("Expected at least two inputs and one output"),
    }
}

fn parse_local_op(s: &str) -> Result<LocalOp> {
    match s.to_lowercase().as_str() {
        "add" | "+" => Ok(LocalOp::Add),
        "subtract" | "sub" | "-" => Ok(LocalOp::Subtract),
        "multiply" | "mul" | "*" => Ok(LocalOp::Multiply),
        "divide" | "div" | "/" => Ok(LocalOp::Divide),
        _ => bail!("Unknown operation: {}. Use add, subtract, multiply, divide", s),
    }
}

fn parse_aspect_format(s: &str) -> Result<AspectOutput> {
    match s.to_lowercase().as_str() {
        "degrees" | "deg" => Ok(AspectOutput::Degrees),
        "radians" | "rad" => Ok(AspectOutput::Radians),
        "compass" => Ok(AspectOutput::Compass),
        _ => bail!("Unknown format: {}. Use degrees, radians, compass", s),
    }
}

fn parse_metric(s: &str) -> Result<DistanceMetric> {
    match s.to_lowercase().as_str() {
        "euclidean" => Ok(DistanceMetric::Euclidean),
        "manhattan" => Ok(DistanceMetric::Manhattan),
        _ => bail!("Unknown metric: {}. Use euclidean, manhattan", s),
    }
}

fn info_command(input: &Path) -> Result<()> {
    let domain = read_layer(input)?;
    let extent = domain.extent();

    println!("File: {}", input.display());
    println!("Title: {}", domain.title());
    println!(
        "Extent: y {:.6} - {:.6}, x {:.6} - {:.6}",
        extent.y,
        extent.y_end(),
        extent.x,
        extent.x_end()
    );
    if let Some(cs) = domain.cell_size() {
        println!("Cell size: {}", cs);
    }
    if let Some(nodata) = domain.nodata() {
        println!("NoData: {}", nodata);
    }
    if let Some(points) = domain.points() {
        println!("Points: {}", points.len());
        return Ok(());
    }
    if let Some(view) = domain.grid() {
        let (rows, cols) = view.shape();
        let stats = view.statistics(domain.nodata());
        println!("Dimensions: {} x {} ({} cells)", cols, rows, view.len());
        println!("\nStatistics:");
        if let Some(min) = stats.min {
            println!("  Min: {:.4}", min);
        }
        if let Some(max) = stats.max {
            println!("  Max: {:.4}", max);
        }
        if let Some(mean) = stats.mean {
            println!("  Mean: {:.4}", mean);
        }
        println!(
            "  Valid cells: {} ({:.1}%)",
            stats.valid_count,
            100.0 * stats.valid_count as f64 / view.len().max(1) as f64
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let engine = Engine {
        config: resolve_config(&cli.engine)?,
        decomposition: cli.engine.decomposition.parse().context("Invalid --decomposition")?,
    };
    info!(
        "Engine: {:?} with {} worker(s), granularity {}",
        engine.config.mode, engine.config.workers, engine.config.granularity
    );

    match cli.command {
        Commands::Info { input } => info_command(&input)?,

        // ── Local ────────────────────────────────────────────────────
        Commands::Local { operation } => match operation {
            LocalCommands::Sum { files } => {
                let (inputs, output) = split_output(&files)?;
                let layers = inputs.iter().map(|p| read_layer(p)).collect::<Result<Vec<_>>>()?;
                engine.run_to_file(local_sum(layers)?, output)?;
            }
            LocalCommands::Mult { files } => {
                let (inputs, output) = split_output(&files)?;
                let layers = inputs.iter().map(|p| read_layer(p)).collect::<Result<Vec<_>>>()?;
                engine.run_to_file(local_mult(layers)?, output)?;
            }
            LocalCommands::Math { a, b, output, op } => {
                let op = parse_local_op(&op)?;
                let spec = local_binary(read_layer(&a)?, read_layer(&b)?, op)?;
                engine.run_to_file(spec, &output)?;
            }
            LocalCommands::Sin { input, output } => {
                engine.run_to_file(local_sin(read_layer(&input)?)?, &output)?;
            }
        },

        // ── Focal ────────────────────────────────────────────────────
        Commands::Focal { operation } => match operation {
            FocalCommands::Stats {
                input,
                output,
                statistic,
                radius,
                circular,
            } => {
                let statistic: FocalStatistic = statistic.parse()?;
                let params = FocalParams {
                    radius,
                    statistic,
                    circular,
                };
                engine.run_to_file(focal_statistics(read_layer(&input)?, params)?, &output)?;
            }
            FocalCommands::Aspect { input, output, format } => {
                let format = parse_aspect_format(&format)?;
                engine.run_to_file(aspect(read_layer(&input)?, format)?, &output)?;
            }
            FocalCommands::Hillshade {
                input,
                output,
                azimuth,
                altitude,
                z_factor,
            } => {
                let params = HillshadeParams {
                    azimuth,
                    altitude,
                    z_factor,
                    normalized: false,
                };
                engine.run_to_file(hillshade(read_layer(&input)?, params)?, &output)?;
            }
        },

        // ── Zonal / iterative / global ───────────────────────────────
        Commands::Zonal {
            values,
            zones,
            output,
            statistic,
        } => {
            let statistic: ZonalStatistic = statistic.parse()?;
            let spec = zonal_statistics(read_layer(&values)?, read_layer(&zones)?, statistic)?;
            engine.run_to_file(spec, &output)?;
        }
        Commands::CostDistance {
            sources,
            costs,
            output,
            barrier,
        } => {
            let spec = cost_distance(read_layer(&sources)?, read_layer(&costs)?, CostDistanceParams { barrier })?;
            engine.run_to_file(spec, &output)?;
        }
        Commands::Distance {
            grid,
            points,
            output,
            metric,
            index,
        } => {
            let metric = parse_metric(&metric)?;
            let (grid, points) = (read_layer(&grid)?, read_layer(&points)?);
            let spec = if index {
                min_distance_index(grid, points, metric)?
            } else {
                min_distance(grid, points, metric)?
            };
            engine.run_to_file(spec, &output)?;
        }
        Commands::GlobalSum { input } => {
            let (result, report) = engine.execute(global_sum(read_layer(&input)?)?)?;
            let total = result.scalar().context("Operation did not produce a scalar")?;
            println!("Sum: {}", total);
            print_report(&report);
        }
    }

    Ok(())
}
