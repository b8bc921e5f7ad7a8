use std::path::PathBuf;
use crate::cli::Arguments;
use crate::utils::external_tools::TokenizeError;
use lazy_static::lazy_static;
use std::collections::HashMap;
use thiserror::Error;

// External software
pub const GZIP_EXT: &str = "gz";
pub const FLYE_TAG: &str = "flye";
pub const RAVEN_TAG: &str = "raven";
pub const UNICYCLER_TAG: &str = "unicycler";
pub const MINIMAP2_TAG: &str = "minimap2";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const MASH_TAG: &str = "mash";
pub const CHOPPER_TAG: &str = "chopper";
pub const FASTP_TAG: &str = "fastp";


lazy_static! {
    /// Oldest release of each tool the pipeline is known to work with.
    pub static ref TOOL_VERSIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(FLYE_TAG, "2.9");
        m.insert(RAVEN_TAG, "1.8");
        m.insert(UNICYCLER_TAG, "0.4.8");
        m.insert(MINIMAP2_TAG, "2.11");
        m.insert(SAMTOOLS_TAG, "1.15");
        m.insert(MASH_TAG, "2.2");
        m.insert(CHOPPER_TAG, "0.7");
        m.insert(FASTP_TAG, "0.23");
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Module {
    Run,
    Long,
    CheckDb,
    CheckDeps,
}

impl Module {
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        match name {
            "run" => Ok(Module::Run),
            "long" => Ok(Module::Long),
            "check_db" => Ok(Module::CheckDb),
            "check_deps" => Ok(Module::CheckDeps),
            _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", name))),
        }
    }
}

// Static Filenames
pub const LOG_DIR: &str = "logs";
pub const CHOPPER_FASTQ: &str = "chopper_long_reads.fastq";
pub const TRIMMED_R1: &str = "trimmed_R1.fastq";
pub const TRIMMED_R2: &str = "trimmed_R2.fastq";
pub const FLYE_DIR: &str = "flye_output";
pub const ASSEMBLY_FASTA: &str = "assembly.fasta";
pub const CHROMOSOME_FASTA: &str = "chromosome.fasta";
pub const LONG_SAM: &str = "long_read.sam";
pub const SHORT_SAM: &str = "short_read.sam";
pub const LONG_BAM: &str = "long_read.bam";
pub const SHORT_BAM: &str = "short_read.bam";
pub const PLASMID_LONG_FASTQ: &str = "plasmid_long.fastq";
pub const PLASMID_SHORT_R1: &str = "short_read_concat_R1.fastq";
pub const PLASMID_SHORT_R2: &str = "short_read_concat_R2.fastq";
pub const UNICYCLER_DIR: &str = "unicycler_output";
pub const MASH_TSV: &str = "mash.tsv";

// Database
pub const PLSDB_SKETCH: &str = "plsdb_2023_11_03_v2.msh";
pub const PLSDB_METADATA: &str = "plsdb_2023_11_03_v2.tsv";
pub const DB_CHECKSUMS: &str = "md5sums.txt";
pub const DB_FILES: &[&str] = &[PLSDB_SKETCH, PLSDB_METADATA];

// Static Parameters
pub const MASH_MAX_DIST: f64 = 0.1;
pub const MASH_MAX_PVALUE: f64 = 0.1;

pub const FASTA_EXTS: &[&'static str] = &["fasta", "fa", "fna", "faa", "ffn", "frn"];
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


pub struct RunConfig {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub log_dir: PathBuf,
    pub threads: usize,
    pub args: Arguments,
}

impl RunConfig {
    pub fn out_path(&self, name: &str) -> PathBuf {
        self.out_dir.join(name)
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed parameters for {tool}: {source}")]
    Tokenize {
        tool: String,
        #[source]
        source: TokenizeError,
    },

    #[error("Failed to spawn {tool}: {error}")]
    ToolSpawn { tool: String, error: String },

    #[error("{tool} exited with {}; see {} and {}", exit_code.map(|c| format!("code {}", c)).unwrap_or_else(|| "a signal".to_string()), out_log.display(), err_log.display())]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        out_log: PathBuf,
        err_log: PathBuf,
    },

    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Missing or outdated dependencies: {0}")]
    MissingDependency(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database not found or incomplete: {0}")]
    MissingDatabase(String),

    #[error("Checksum mismatch for {file}: expected {expected}, found {found}")]
    ChecksumMismatch {
        file: PathBuf,
        expected: String,
        found: String,
    },

    #[error("No chromosome contig of at least {min_length} bp was assembled; depth is likely insufficient")]
    NoChromosome { min_length: u64 },

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_from_name() {
        assert_eq!(Module::from_name("run").unwrap(), Module::Run);
        assert_eq!(Module::from_name("check_deps").unwrap(), Module::CheckDeps);
        assert!(matches!(Module::from_name("assemble"), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_tool_failed_display() {
        let err = PipelineError::ToolFailed {
            tool: "flye".to_string(),
            exit_code: Some(2),
            out_log: PathBuf::from("logs/flye_abc.out"),
            err_log: PathBuf::from("logs/flye_abc.err"),
        };
        assert_eq!(err.to_string(), "flye exited with code 2; see logs/flye_abc.out and logs/flye_abc.err");

        let killed = PipelineError::ToolFailed {
            tool: "flye".to_string(),
            exit_code: None,
            out_log: PathBuf::from("a.out"),
            err_log: PathBuf::from("a.err"),
        };
        assert!(killed.to_string().contains("a signal"));
    }
}
