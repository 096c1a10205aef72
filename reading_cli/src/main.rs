use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use reading_core::catalog::CatalogCache;
use reading_core::custom::generate_custom_schedule;
use reading_core::recreate::recreate_in_store;
use reading_core::store::{ScheduleRow, ScheduleSource};
use reading_core::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

static CATALOG_CACHE: CatalogCache = CatalogCache::new();

#[derive(Parser)]
#[command(name = "rplan")]
#[command(about = "Multi-year Bible reading schedule planner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Load the verse catalog from this directory instead of the built-in one
    #[arg(long, global = true)]
    catalog_dir: Option<PathBuf>,
}

/// Parameters shared by commands that generate a verse schedule
#[derive(Args, Clone)]
struct GenerateArgs {
    /// Schedule type (sequential, chronological, thematic)
    #[arg(long = "type")]
    schedule_type: Option<ScheduleType>,

    /// Duration in years, fractions allowed
    #[arg(long)]
    years: Option<f64>,

    /// Starting verse, e.g. "Matthew 1:1"
    #[arg(long)]
    start: Option<String>,

    /// First day of the schedule (YYYY-MM-DD, default today)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Reading days: all, weekdays, mon,wed,fri or a 7-digit mask
    #[arg(long)]
    active_days: Option<ActiveDays>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a verse schedule and store it
    Create {
        name: String,
        #[command(flatten)]
        generate: GenerateArgs,
    },

    /// Generate a custom numeric schedule and store it
    Custom {
        name: String,

        /// Label printed before the numbers
        #[arg(long, default_value = "Portion")]
        description: String,

        #[arg(long)]
        from: f64,

        #[arg(long)]
        to: f64,

        #[arg(long)]
        per_day: f64,

        #[arg(long)]
        start_date: Option<NaiveDate>,

        #[arg(long)]
        active_days: Option<ActiveDays>,
    },

    /// Print the rows of a stored schedule
    Show {
        name: String,

        /// First row to print
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Maximum number of rows to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List stored schedules
    List,

    /// Mark a row range finished
    Finish {
        name: String,
        from: usize,
        /// Last row (inclusive); defaults to FROM
        to: Option<usize>,

        /// Clear the finished flag instead
        #[arg(long)]
        undo: bool,
    },

    /// Regenerate a schedule with new parameters, keeping finished progress
    Recreate {
        name: String,
        #[command(flatten)]
        generate: GenerateArgs,
    },

    /// Write a stored schedule to CSV
    Export {
        name: String,

        #[arg(long, short)]
        output: PathBuf,
    },

    /// Generate a schedule and print it without storing
    Preview {
        #[command(flatten)]
        generate: GenerateArgs,

        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    // Quiet by default; RUST_LOG still overrides
    reading_core::logging::init_with_level("warn");

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    let catalog_dir = cli.catalog_dir.clone().or_else(|| config.catalog.dir.clone());

    let external: Arc<Catalog>;
    let catalog: &Catalog = match catalog_dir {
        Some(ref dir) => {
            external = CATALOG_CACHE.get_or_load(dir)?;
            external.as_ref()
        }
        None => Catalog::builtin(),
    };

    tracing::debug!(
        "Using data dir {:?} with {} catalog verses",
        data_dir,
        catalog.len()
    );
    let mut store = JsonScheduleStore::new(data_dir);

    match cli.command {
        Commands::Create { name, generate } => {
            cmd_create(&mut store, catalog, &config, name, generate)
        }
        Commands::Custom {
            name,
            description,
            from,
            to,
            per_day,
            start_date,
            active_days,
        } => {
            let request = CustomScheduleRequest {
                description,
                starting_portion: from,
                max_portion: to,
                portions_per_day: per_day,
                start_date: start_date.unwrap_or_else(today),
                active_days: active_days.unwrap_or(config.schedule.active_days),
            };
            cmd_custom(&mut store, name, request)
        }
        Commands::Show { name, from, limit } => cmd_show(&store, &name, from, limit),
        Commands::List => cmd_list(&store),
        Commands::Finish {
            name,
            from,
            to,
            undo,
        } => {
            let changed = store.set_finished(&name, from, to.unwrap_or(from), !undo)?;
            let state = if undo { "unfinished" } else { "finished" };
            println!("Marked {} row(s) of '{}' {}", changed, name, state);
            Ok(())
        }
        Commands::Recreate { name, generate } => {
            cmd_recreate(&mut store, catalog, &config, name, generate)
        }
        Commands::Export { name, output } => cmd_export(&store, &name, &output),
        Commands::Preview { generate, limit } => cmd_preview(catalog, &config, generate, limit),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Build a request from command-line values, falling back to `base`
fn build_request(
    catalog: &Catalog,
    args: GenerateArgs,
    base: ScheduleRequest,
) -> Result<ScheduleRequest> {
    let start = match args.start {
        Some(text) => catalog.parse_reference(&text).ok_or_else(|| {
            Error::InvalidRequest(format!("cannot read verse reference '{}'", text))
        })?,
        None => base.start,
    };
    Ok(ScheduleRequest {
        schedule_type: args.schedule_type.unwrap_or(base.schedule_type),
        years: args.years.unwrap_or(base.years),
        start,
        start_date: args.start_date.unwrap_or(base.start_date),
        active_days: args.active_days.unwrap_or(base.active_days),
    })
}

fn default_request(config: &Config) -> ScheduleRequest {
    ScheduleRequest {
        schedule_type: config.schedule.schedule_type,
        years: config.schedule.years,
        start: VerseRef::new(1, 1, 1),
        start_date: today(),
        active_days: config.schedule.active_days,
    }
}

fn print_adjustment(adjustment: &Option<VerseAdjustment>) {
    if let Some(adjustment) = adjustment {
        println!("Note: {}", adjustment.message);
    }
}

fn cmd_create(
    store: &mut JsonScheduleStore,
    catalog: &Catalog,
    config: &Config,
    name: String,
    args: GenerateArgs,
) -> Result<()> {
    if store.exists(&name)? {
        return Err(Error::NameTaken(name));
    }
    let request = build_request(catalog, args, default_request(config))?;
    let generated = generate_with_options(catalog, &request, &config.generation_options(), None)?;
    print_adjustment(&generated.adjustment);
    if generated.truncated {
        println!("Warning: generation stopped at its day ceiling");
    }

    let schedule = StoredSchedule::from_generated(name, request, generated);
    store.create(&schedule)?;
    println!(
        "Created {} schedule '{}' with {} rows",
        schedule.kind_label(),
        schedule.name,
        schedule.rows.len()
    );
    Ok(())
}

fn cmd_custom(
    store: &mut JsonScheduleStore,
    name: String,
    request: CustomScheduleRequest,
) -> Result<()> {
    if store.exists(&name)? {
        return Err(Error::NameTaken(name));
    }
    let rows = generate_custom_schedule(&request)?;
    let schedule = StoredSchedule::from_custom(name, request, rows);
    store.create(&schedule)?;
    println!(
        "Created custom schedule '{}' with {} rows",
        schedule.name,
        schedule.rows.len()
    );
    Ok(())
}

fn cmd_show(store: &JsonScheduleStore, name: &str, from: usize, limit: Option<usize>) -> Result<()> {
    let schedule = store.load(name)?;
    println!(
        "{} ({}, {} of {} finished)",
        schedule.name,
        schedule.kind_label(),
        schedule.finished_count(),
        schedule.rows.len()
    );
    if let Some(ref note) = schedule.adjustment {
        println!("Note: {}", note);
    }

    let limit = limit.unwrap_or(usize::MAX);
    for (index, row) in schedule.rows.iter().enumerate().skip(from).take(limit) {
        let mark = if row.finished { "x" } else { " " };
        let extra = match &row.content {
            ScheduleRow::Verses(p) if p.key != PartitionKey::SINGLE => format!("  [{}]", p.key),
            _ => String::new(),
        };
        println!(
            "{:>5} [{}] {}  {}{}",
            index,
            mark,
            row.content.date(),
            row.content.description(),
            extra
        );
    }
    Ok(())
}

fn cmd_list(store: &JsonScheduleStore) -> Result<()> {
    let summaries = store.list()?;
    if summaries.is_empty() {
        println!("No schedules stored");
        return Ok(());
    }
    for s in summaries {
        println!(
            "{}  {}  {}/{} finished  created {}",
            s.name,
            s.kind,
            s.finished,
            s.rows,
            s.created_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

fn cmd_recreate(
    store: &mut JsonScheduleStore,
    catalog: &Catalog,
    config: &Config,
    name: String,
    args: GenerateArgs,
) -> Result<()> {
    let old = store.load(&name)?;
    let base = match old.source {
        ScheduleSource::Verses(request) => request,
        ScheduleSource::Custom(_) => {
            return Err(Error::InvalidRequest(format!(
                "'{}' is a custom schedule and cannot be recreated",
                name
            )))
        }
    };
    let request = build_request(catalog, args, base)?;

    let outcome = recreate_in_store(store, catalog, &name, request, &config.recreate_options())?;
    print_adjustment(&outcome.adjustment);
    for span in &outcome.plan.rejected {
        println!(
            "Warning: finished rows {}-{} could not be carried over safely",
            span.start_index, span.end_index
        );
    }
    println!(
        "Recreated '{}' with {} rows ({} finished); previous schedule kept as '{}'",
        name,
        outcome.schedule.rows.len(),
        outcome.schedule.finished_count(),
        outcome.archived_as
    );
    Ok(())
}

fn cmd_export(store: &JsonScheduleStore, name: &str, output: &Path) -> Result<()> {
    let schedule = store.load(name)?;
    let written = export_csv(&schedule, output)?;
    println!("Exported {} rows to {}", written, output.display());
    Ok(())
}

fn cmd_preview(
    catalog: &Catalog,
    config: &Config,
    args: GenerateArgs,
    limit: Option<usize>,
) -> Result<()> {
    let request = build_request(catalog, args, default_request(config))?;
    let generated = generate_with_options(catalog, &request, &config.generation_options(), None)?;
    print_adjustment(&generated.adjustment);

    let limit = limit.unwrap_or(usize::MAX);
    for (index, portion) in generated.portions.iter().enumerate().take(limit) {
        println!("{:>5} {}  {}", index, portion.date, portion.description);
    }
    println!("{} rows", generated.portions.len());
    Ok(())
}
