use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, ValueEnum, PartialEq)]
pub enum PacbioModel {
    #[value(name = "pacbio-raw")]
    PacbioRaw,
    #[value(name = "pacbio-corr")]
    PacbioCorr,
    #[value(name = "pacbio-hifi")]
    PacbioHifi,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "plassembler", version, about = "Automated bacterial plasmid assembly from long and short reads")]
pub struct Arguments {

    #[arg(short, long, help = "One of: run, long, check_db, check_deps")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'd', long = "database", help = "Directory holding the PLSDB sketch and metadata")]
    pub database: Option<String>,

    #[arg(short = 'l', long = "longreads", help = "Long read FASTQ (optionally gzipped)")]
    pub longreads: Option<String>,

    #[arg(short = '1', long = "short_one", help = "R1 short read FASTQ")]
    pub short_one: Option<String>,

    #[arg(short = '2', long = "short_two", help = "R2 short read FASTQ")]
    pub short_two: Option<String>,

    #[arg(short = 'o', long = "outdir", default_value = "plassembler_output")]
    pub out_dir: String,

    #[arg(short = 't', long, default_value_t = 1)]
    pub threads: usize,

    #[arg(short = 'c', long, default_value_t = 1_000_000, help = "Approximate lower bound on chromosome length in bp")]
    pub chromosome: u64,

    #[arg(short = 'p', long, default_value = "plassembler")]
    pub prefix: String,

    #[arg(long = "min_length", default_value_t = 500)]
    pub min_length: usize,

    #[arg(long = "min_quality", default_value_t = 9)]
    pub min_quality: u8,

    #[arg(short = 'f', long, action, help = "Overwrite an existing output directory")]
    pub force: bool,

    #[arg(long = "use_raven", action, help = "Assemble long reads with raven instead of flye")]
    pub use_raven: bool,

    #[arg(long = "pacbio_model", value_enum, help = "Long reads are PacBio of the given kind instead of ONT")]
    pub pacbio_model: Option<PacbioModel>,

    #[arg(long = "raw_flag", action, help = "Treat ONT reads as raw (flye --nano-raw)")]
    pub raw_flag: bool,

    #[arg(long = "skip_qc", action)]
    pub skip_qc: bool,

    #[arg(long = "keep_fastqs", action)]
    pub keep_fastqs: bool,

    #[arg(long = "keep_chromosome", action)]
    pub keep_chromosome: bool,

    #[arg(long = "flye_opts", default_value = "", allow_hyphen_values = true, help = "Extra options passed to flye, quoted as one string")]
    pub flye_opts: String,

    #[arg(long = "unicycler_opts", default_value = "", allow_hyphen_values = true, help = "Extra options passed to unicycler, quoted as one string")]
    pub unicycler_opts: String,
}
