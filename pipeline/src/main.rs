//! Disaster ETL CLI - decompose disaster CSV files into a star schema
//!
//! # Main Commands
//!
//! ```bash
//! disaster-etl run emdat.csv                # CSV → fact + dimension tables
//! disaster-etl plan show                    # Print the built-in plan
//! disaster-etl plan validate my-plan.json   # Check a plan file
//! disaster-etl template list                # Manage stored plans
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! disaster-etl parse emdat.csv             # Just parse CSV to JSON
//! ```

use clap::{Parser, Subcommand};
use disaster_etl::{
    clean, disaster_plan, export_bundle, parse_csv_file_auto, run_file, DecompositionPlan, EtlConfig, ParentPolicy,
    PipelineOptions, PlanError, PlanRegistry,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "disaster-etl")]
#[command(about = "Decompose disaster-event CSV files into fact and dimension tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: CSV → clean → decompose → export
    Run {
        /// Input CSV file
        input: PathBuf,

        /// Use this plan file instead of stored or built-in plans
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Output directory (default: $DISASTER_ETL_OUTPUT_DIR or ./warehouse)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Don't look for stored plans
        #[arg(long)]
        no_cache: bool,

        /// Keep the first parent assigned to a repeated hierarchy value
        #[arg(long)]
        first_parent_wins: bool,

        /// Store the plan that was used under this name
        #[arg(long)]
        save_plan: Option<String>,
    },

    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect decomposition plans
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Manage stored plans
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum PlanAction {
    /// Print a plan as JSON (the built-in plan by default)
    Show {
        /// Plan file
        file: Option<PathBuf>,
    },

    /// Validate a plan file, optionally against a CSV file's columns
    Validate {
        /// Plan file
        file: PathBuf,

        /// CSV file whose cleaned columns the plan must find
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List all stored plans
    List,

    /// Import a plan JSON file
    Import {
        /// Plan JSON file to import
        file: PathBuf,
        /// Name for the stored plan
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a stored plan
    Show {
        /// Stored plan ID
        id: String,
    },

    /// Delete a stored plan
    Delete {
        /// Stored plan ID
        id: String,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = EtlConfig::from_env();

    let result = match cli.command {
        Commands::Run {
            input,
            plan,
            output,
            no_cache,
            first_parent_wins,
            save_plan,
        } => cmd_run(
            &config,
            &input,
            RunArgs {
                plan,
                output,
                no_cache,
                first_parent_wins,
                save_plan,
            },
        ),

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Plan { action } => cmd_plan(&config, action),

        Commands::Template { action } => cmd_template(&config, action),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

struct RunArgs {
    plan: Option<PathBuf>,
    output: Option<PathBuf>,
    no_cache: bool,
    first_parent_wins: bool,
    save_plan: Option<String>,
}

fn cmd_run(config: &EtlConfig, input: &Path, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let options = PipelineOptions {
        plan_path: args.plan,
        registry_dir: config.registry_dir.clone(),
        no_cache: args.no_cache,
        clean: config.clean_options(),
        parent_policy: if args.first_parent_wins {
            ParentPolicy::FirstWriteWins
        } else {
            ParentPolicy::LastWriteWins
        },
    };

    let result = run_file(input, &options)?;

    if let Some(ref info) = result.csv_info {
        eprintln!("   Encoding: {}", info.encoding);
        eprintln!("   Delimiter: '{}'", format_delimiter(info.delimiter));
        eprintln!("   Rows: {}", info.row_count);
    }
    if let Some(ref tid) = result.template_id {
        eprintln!("   Stored plan: {}", tid);
    }

    let report = &result.bundle.report;
    eprintln!("\n⚙️  Decomposed {} rows into {} fact rows", report.input_rows, report.fact_rows);
    for step in &report.steps {
        eprintln!("   {} ({}): {} rows", step.dimension, step.kind, step.dimension_rows);
    }
    if report.dropped_date_rows > 0 {
        eprintln!("   ⚠️  {} rows dropped for unresolvable dates", report.dropped_date_rows);
    }
    if report.ambiguous_parents() > 0 {
        eprintln!("   ⚠️  {} ambiguous hierarchy parents", report.ambiguous_parents());
    }

    let output_dir = args.output.unwrap_or_else(|| config.output_dir.clone());
    let manifest = export_bundle(&result.bundle, Some(&result.clean_report), &result.log, &output_dir)?;
    eprintln!("\n💾 {} tables written to {}", manifest.tables.len(), output_dir.display());
    eprintln!("   Run: {}", manifest.run_id);

    if let Some(name) = args.save_plan {
        let mut registry = PlanRegistry::with_dir(&config.registry_dir);
        let id = registry.save(result.plan, &name)?;
        eprintln!("   Plan saved as: {}", id);
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = parse_csv_file_auto(input)?;
    eprintln!("   Encoding: {}", result.encoding);
    eprintln!("   Delimiter: '{}' (auto-detected)", format_delimiter(result.delimiter));
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Parsed {} rows", result.table.len());

    let json = serde_json::to_string_pretty(&result.table)?;
    write_output(&json, output)?;

    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

fn cmd_plan(config: &EtlConfig, action: PlanAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PlanAction::Show { file } => {
            let plan = match file {
                Some(path) => DecompositionPlan::load_file(&path)?,
                None => disaster_plan(),
            };
            println!("{}", plan.to_json()?);
        }

        PlanAction::Validate { file, csv } => {
            let plan = DecompositionPlan::load_file(&file)?;
            eprintln!("✅ {} is a valid plan ({} steps)", file.display(), plan.steps.len());

            if let Some(csv) = csv {
                let parsed = parse_csv_file_auto(&csv)?;
                let (cleaned, _) = clean(parsed.table, &config.clean_options())?;
                plan.validate_headers(cleaned.columns()).map_err(PlanError::MissingColumns)?;
                eprintln!("✅ All {} source columns found in {}", plan.source_columns().len(), csv.display());
            }
        }
    }
    Ok(())
}

fn cmd_template(config: &EtlConfig, action: TemplateAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = PlanRegistry::with_dir(&config.registry_dir);

    match action {
        TemplateAction::List => {
            let plans = registry.list();
            if plans.is_empty() {
                eprintln!("📋 No plans stored yet.");
                eprintln!("   Use 'disaster-etl template import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored plans ({}):\n", plans.len());
            for p in plans {
                println!("  📄 {} ({})", p.name, p.id);
                println!("     Columns: {}", p.source_columns.join(", "));
                println!("     Success rate: {:.0}%", p.success_rate * 100.0);
                println!("     Uses: {}", p.use_count);
                if let Some(ref last) = p.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        TemplateAction::Import { file, name } => {
            eprintln!("📥 Importing plan from: {}", file.display());
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Plan saved with ID: {}", id);
        }

        TemplateAction::Show { id } => {
            let p = registry.get(&id).ok_or_else(|| format!("Stored plan not found: {}", id))?;
            println!("📄 Plan: {} ({})\n", p.name, p.id);
            println!("Source columns: {}", p.source_columns.join(", "));
            println!("Created: {}", p.created_at);
            println!("Success rate: {:.0}%", p.success_rate * 100.0);
            println!("Uses: {}", p.use_count);
            println!("\nPlan:");
            println!("{}", p.plan.to_json()?);
        }

        TemplateAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Plan deleted: {}", id);
        }
    }

    Ok(())
}
