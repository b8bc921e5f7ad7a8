use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{LevelFilter, debug, error, info, warn};

use plassembler::cli::{self, Arguments};
use plassembler::config::defs::{
    Module, PipelineError, RunConfig, CHOPPER_TAG, FASTP_TAG, FLYE_TAG, LOG_DIR, MASH_TAG,
    MINIMAP2_TAG, RAVEN_TAG, SAMTOOLS_TAG, UNICYCLER_TAG,
};
use plassembler::pipelines::{db, plassembler as assembly};
use plassembler::utils::command::check_dependencies;
use plassembler::utils::system::resolve_threads;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = cli::parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Plassembler\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    if let Err(e) = dispatch(args, dir).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn dispatch(args: Arguments, cwd: PathBuf) -> Result<(), PipelineError> {
    let module = Module::from_name(&args.module)?;

    if module == Module::CheckDeps {
        return check_dependencies(&[
            FLYE_TAG, RAVEN_TAG, UNICYCLER_TAG, MINIMAP2_TAG, SAMTOOLS_TAG, MASH_TAG, CHOPPER_TAG, FASTP_TAG,
        ])
        .await;
    }

    let out_dir = match module {
        Module::Run | Module::Long => setup_output_dir(&args, &cwd)?,
        _ => cwd.clone(),
    };
    let threads = resolve_threads(args.threads);
    debug!("Using {} threads", threads);

    let run_config = Arc::new(RunConfig {
        cwd,
        log_dir: out_dir.join(LOG_DIR),
        out_dir,
        threads,
        args,
    });

    match module {
        Module::Run => assembly::run(run_config).await,
        Module::Long => assembly::run_long(run_config).await,
        Module::CheckDb => db::check_db(run_config).await,
        Module::CheckDeps => Ok(()),
    }
}


/// Sets up output directory
/// Relative paths are resolved against the working directory. An existing non-empty
/// directory is only reused with `--force`, in which case it is emptied first.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the output directory.
fn setup_output_dir(args: &Arguments, cwd: &Path) -> Result<PathBuf, PipelineError> {
    let path = PathBuf::from(&args.out_dir);
    let out_dir = if path.is_absolute() { path } else { cwd.join(path) };

    if out_dir.exists() && fs::read_dir(&out_dir)?.next().is_some() {
        if !args.force {
            return Err(PipelineError::InvalidConfig(format!(
                "Output directory {} already exists and is not empty; use --force to overwrite",
                out_dir.display()
            )));
        }
        warn!("Removing existing output directory {}", out_dir.display());
        fs::remove_dir_all(&out_dir)?;
    }
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}
