// src/utils/system.rs: System functions

use log::warn;
use sysinfo::System;


/// Determines number of threads handed to the external tools.
///
/// # Arguments
///
/// * `requested` - Threads asked for on the command line.
///
/// # Returns
///
/// usize: `requested` capped at the physical core count, never below 1.
pub fn resolve_threads(requested: usize) -> usize {
    let physical_cores = System::physical_core_count().unwrap_or(requested.max(1));
    cap_threads(requested, physical_cores)
}

fn cap_threads(requested: usize, physical_cores: usize) -> usize {
    let requested = requested.max(1);
    if requested > physical_cores {
        warn!(
            "Requested {} threads but only {} physical cores were detected; using {}",
            requested, physical_cores, physical_cores
        );
        return physical_cores.max(1);
    }
    requested
}
