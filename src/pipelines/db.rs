use std::path::PathBuf;
use std::sync::Arc;
use log::info;
use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::db::check_db_installation;


/// Validates the database given with `-d` without running anything else.
pub async fn check_db(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Check DB\n-------------\n");

    let db = run_config
        .args
        .database
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidConfig("--database is required for module check_db".to_string()))?;
    let db = PathBuf::from(db);
    let db = if db.is_absolute() { db } else { run_config.cwd.join(db) };

    check_db_installation(&db)?;
    info!("Database check passed");
    Ok(())
}
