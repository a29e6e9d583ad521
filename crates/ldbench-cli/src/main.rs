use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use ldbench_runner::{
    export, summary, GnuTimeCapturer, ResultStore, RunOptions, RunPlan, RunSummary,
    ScheduledItem, DEFAULT_PRELOAD_VAR,
};
use serde_json::{json, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ldbench", version, about = "Manage LD_PRELOAD experiments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run COMMAND under each preload experiment until every experiment has
    /// the requested number of results in the database.
    ///
    /// ldbench run --verbose --repetitions 5 --database results.json \
    ///     --preload none '' \
    ///     --preload shadow 'bin/malloc-shadow.so' \
    ///     --preload shadow-usb 'bin/malloc-shadow.so SHADOWHEAP_DISABLE_USBCHECKS=0' \
    ///     -- bin/some-program --with arguments
    Run {
        /// Show progress messages during execution.
        #[arg(long)]
        verbose: bool,
        /// Declare an experiment preloading LIBRARY... and setting ENV=VALUE...
        #[arg(
            long,
            num_args = 2,
            value_names = ["NAME", "LIBRARY... [ENV=VALUE...]"],
            required = true
        )]
        preload: Vec<String>,
        /// Repeat each experiment N times.
        #[arg(long, value_name = "N", default_value_t = 1)]
        repetitions: usize,
        /// Store experiment results in this file, allows resumption.
        #[arg(long, value_name = "FILE")]
        database: PathBuf,
        /// Add environment variables to every run.
        #[arg(short = 'e', long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,
        /// Put the library list in NAME instead of LD_PRELOAD.
        #[arg(long = "envvar-instead-of-ld-preload", value_name = "NAME")]
        preload_var: Option<String>,
        /// Seed for the execution order shuffle.
        #[arg(long)]
        seed: Option<u64>,
        /// GNU time executable used for measuring.
        #[arg(long, default_value = "time")]
        time_program: String,
        /// Print the pending schedule without running anything.
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
        #[arg(
            value_name = "COMMAND",
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },
    /// Convert the JSON database to CSV.
    ///
    /// Columns: name, real (s), user (s), sys (s), mem_total_avg (KB,
    /// unreliable), mem_max (KB), exit.
    ConvertToCsv {
        #[arg(value_name = "DATABASE")]
        database: PathBuf,
        #[arg(value_name = "OUTPUT", default_value = "-")]
        output: String,
    },
    /// Delete results for the given experiments. Names may use `*`, so
    /// "foo-*" also deletes "foo-bar".
    DeleteExperiment {
        #[arg(long, value_name = "FILE")]
        database: PathBuf,
        #[arg(long)]
        verbose: bool,
        #[arg(long)]
        json: bool,
        #[arg(value_name = "NAME", required = true)]
        experiments: Vec<String>,
    },
    /// Draw box plots of one or more COLUMNS and print summary statistics.
    Plot {
        /// Write an SVG plot to this file.
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, value_name = "DATABASE")]
        database: PathBuf,
        #[arg(required = true)]
        columns: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(command_verbose(&cli.command));
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "info" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .try_init()
        .ok();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            verbose: _,
            preload,
            repetitions,
            database,
            env,
            preload_var,
            seed,
            time_program,
            dry_run,
            json,
            command,
        } => {
            let options = RunOptions {
                configurations: preload_pairs(&preload)?,
                repetitions,
                env,
                preload_var: preload_var.unwrap_or_else(|| DEFAULT_PRELOAD_VAR.to_string()),
                seed,
                command,
            };
            if dry_run {
                let store = ResultStore::open(&database)?;
                let plan = RunPlan::from_options(&options, &store)?;
                if json {
                    let schedule: Vec<Value> = plan
                        .schedule
                        .iter()
                        .map(|item| scheduled_item_to_json(item, &plan.preload_var))
                        .collect();
                    return Ok(Some(json!({
                        "ok": true,
                        "command": "run",
                        "dry_run": true,
                        "in_database": store.len(),
                        "schedule": schedule,
                    })));
                }
                println!("in_database: {}", store.len());
                println!("scheduled: {}", plan.schedule.len());
                for item in &plan.schedule {
                    println!("{}", describe_item(item, &plan.preload_var));
                }
                return Ok(None);
            }

            let mut capturer = GnuTimeCapturer::new(time_program);
            let summary = ldbench_runner::run_experiments(&options, &database, &mut capturer)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "database": database.display().to_string(),
                    "run": run_summary_to_json(&summary),
                })));
            }
            print_run_summary(&summary);
        }
        Commands::ConvertToCsv { database, output } => {
            let store = open_existing(&database)?;
            if output == "-" {
                export::write_csv(&store, io::stdout().lock())?;
            } else {
                export::write_csv(&store, fs::File::create(&output)?)?;
            }
        }
        Commands::DeleteExperiment {
            database,
            verbose: _,
            json,
            experiments,
        } => {
            let count = ldbench_runner::delete_experiments(&database, &experiments)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "delete-experiment",
                    "database": database.display().to_string(),
                    "patterns": experiments,
                    "deleted": count,
                })));
            }
            println!("deleted: {}", count);
        }
        Commands::Plot {
            output,
            database,
            columns,
        } => {
            let store = open_existing(&database)?;
            let text = summary::plot(&store, &columns, &output)?;
            print!("{}", text);
            println!("plot: {}", output.display());
        }
    }
    Ok(None)
}

fn open_existing(database: &Path) -> Result<ResultStore> {
    if !database.exists() {
        return Err(anyhow!("database not found: {}", database.display()));
    }
    Ok(ResultStore::open(database)?)
}

fn preload_pairs(values: &[String]) -> Result<Vec<(String, String)>> {
    if values.len() % 2 != 0 {
        return Err(anyhow!("--preload expects NAME and SPEC"));
    }
    Ok(values
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

fn describe_item(item: &ScheduledItem, preload_var: &str) -> String {
    let mut parts = vec![
        item.name.clone(),
        format!("{}={}", preload_var, item.spec.preload_value()),
    ];
    parts.extend(item.spec.env.iter().map(|(k, v)| format!("{}={}", k, v)));
    parts.join("\t")
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::DeleteExperiment { json, .. } => *json,
        _ => false,
    }
}

fn command_verbose(command: &Commands) -> bool {
    match command {
        Commands::Run { verbose, .. } | Commands::DeleteExperiment { verbose, .. } => *verbose,
        _ => false,
    }
}

fn scheduled_item_to_json(item: &ScheduledItem, preload_var: &str) -> Value {
    json!({
        "name": item.name,
        "libraries": item.spec.libraries,
        "env": item.spec.env,
        "preload_var": preload_var,
    })
}

fn run_summary_to_json(summary: &RunSummary) -> Value {
    json!({
        "scheduled": summary.scheduled,
        "executed": summary.executed,
        "nonzero_exits": summary.nonzero_exits,
        "stored": summary.stored,
    })
}

fn print_run_summary(summary: &RunSummary) {
    println!("scheduled: {}", summary.scheduled);
    println!("executed: {}", summary.executed);
    println!("nonzero_exits: {}", summary.nonzero_exits);
    println!("stored: {}", summary.stored);
}
