use catalog_extract::config::{self, Group};
use catalog_extract::orchestrate::{self, Selection};
use catalog_extract::output;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "catalog-extract")]
#[command(about = "Extract product catalogs into static JSON")]
#[command(long_about = "\
Extract product catalogs into static JSON

Catalog sources are declarative TypeScript modules (or .json/.toml data)
that build asset URLs through helper functions. Each source is parsed, its
imports are stripped, the helpers are replaced by stubs, and the exported
records are written as JSON files the site reads at build time.

Site layout (stock catalogs):

  site/
  ├── catalogs.toml                        # Optional overrides
  └── src/app/
      ├── products/
      │   ├── trinnov/data.ts             → trinnov/content.json
      │   ├── amina/data.ts               → amina/content/{edge,mobius,...}.json
      │   └── k-array/data/*.ts           → k-array/content/*.json
      ├── events/data.ts                  → events/content.json
      └── projects/project-data.ts        → projects/content.json

Running without a subcommand extracts every catalog.
Set RUST_LOG=catalog_extract=debug for detailed logs.

Run 'catalog-extract gen-config' to print a documented catalogs.toml.")]
#[command(version)]
struct Cli {
    /// Site root; catalog paths are relative to it
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Configuration file [default: <root>/catalogs.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Flags selecting which catalogs to act on.
#[derive(clap::Args, Clone, Default)]
struct SelectArgs {
    /// Only catalogs of this group
    #[arg(long, value_enum)]
    group: Option<Group>,

    /// Only the named catalog (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,
}

impl From<SelectArgs> for Selection {
    fn from(args: SelectArgs) -> Self {
        Selection {
            group: args.group,
            only: args.only,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Extract catalogs and write their JSON files (the default)
    Build(SelectArgs),
    /// Parse every source and report missing stubs without writing
    Check(SelectArgs),
    /// Print what each catalog reads and writes
    List(SelectArgs),
    /// Print a stock catalogs.toml with all options documented
    GenConfig,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_extract=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let command = cli.command.unwrap_or(Command::Build(SelectArgs::default()));
    if let Command::GenConfig = command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.root, cli.config.as_deref())?;

    match command {
        Command::Build(select) => {
            println!("==> Extracting catalogs in {}", cli.root.display());
            let report = orchestrate::run(&cli.root, &config, &select.into())?;
            output::print_run_output(&report);
        }
        Command::Check(select) => {
            println!("==> Checking catalogs in {}", cli.root.display());
            let report = orchestrate::check(&cli.root, &config, &select.into())?;
            output::print_check_output(&report);
            if report.errors() > 0 {
                return Err(format!("check found {} error(s)", report.errors()).into());
            }
            println!("==> Catalogs are valid");
        }
        Command::List(select) => {
            let catalogs = orchestrate::selected(&config, &select.into())?;
            output::print_plan(&catalogs);
        }
        Command::GenConfig => {}
    }

    Ok(())
}
