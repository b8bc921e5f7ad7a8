//! Builders for every external tool the pipeline calls, and dependency checks.
//!
//! Each builder only assembles an `ExternalTool`; running it is the caller's job.
//! Paths are quoted with `quote_path` so they survive tokenization intact.

use std::path::Path;
use std::process::Stdio;
use log::{debug, info};
use tokio::process::Command;
use crate::config::defs::{PipelineError, TOOL_VERSIONS};


pub mod chopper {
    use std::path::Path;
    use crate::config::defs::{PipelineError, CHOPPER_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    /// Length and quality filtering of long reads. chopper writes reads to stdout,
    /// which ends up in `output`.
    pub fn build(
        input: &Path,
        output: &Path,
        min_length: usize,
        min_quality: u8,
        threads: usize,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            CHOPPER_TAG,
            &format!("--input {}", quote_path(input)),
            "",
            &format!("-q {} -l {} -t {}", min_quality, min_length, threads),
            logdir,
            Some(output.to_path_buf()),
        )
    }
}

pub mod fastp {
    use std::path::Path;
    use crate::config::defs::{PipelineError, FASTP_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    pub fn build(
        short_one: &Path,
        short_two: &Path,
        out_one: &Path,
        out_two: &Path,
        report_dir: &Path,
        threads: usize,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            FASTP_TAG,
            &format!("-i {} -I {}", quote_path(short_one), quote_path(short_two)),
            &format!("-o {} -O {}", quote_path(out_one), quote_path(out_two)),
            &format!(
                "-w {} -j {} -h {}",
                threads,
                quote_path(&report_dir.join("fastp.json")),
                quote_path(&report_dir.join("fastp.html"))
            ),
            logdir,
            None,
        )
    }
}

pub mod flye {
    use std::path::Path;
    use crate::cli::PacbioModel;
    use crate::config::defs::{PipelineError, FLYE_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    pub fn read_type_flag(raw_flag: bool, pacbio_model: Option<&PacbioModel>) -> &'static str {
        match pacbio_model {
            Some(PacbioModel::PacbioRaw) => "--pacbio-raw",
            Some(PacbioModel::PacbioCorr) => "--pacbio-corr",
            Some(PacbioModel::PacbioHifi) => "--pacbio-hifi",
            None if raw_flag => "--nano-raw",
            None => "--nano-hq",
        }
    }

    /// # Arguments
    ///
    /// * `extra` - Freeform extra options from `--flye_opts`, placed right after the tool.
    pub fn build(
        reads: &Path,
        out_dir: &Path,
        threads: usize,
        raw_flag: bool,
        pacbio_model: Option<&PacbioModel>,
        extra: &str,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            FLYE_TAG,
            &format!("{} {}", read_type_flag(raw_flag, pacbio_model), quote_path(reads)),
            &format!("--out-dir {}", quote_path(out_dir)),
            &format!("{} --threads {}", extra, threads),
            logdir,
            None,
        )
    }
}

pub mod raven {
    use std::path::Path;
    use crate::config::defs::{PipelineError, ASSEMBLY_FASTA, RAVEN_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    /// raven prints the assembly on stdout; it is copied to `<out_dir>/assembly.fasta`.
    pub fn build(
        reads: &Path,
        out_dir: &Path,
        threads: usize,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            RAVEN_TAG,
            &quote_path(reads),
            &format!("--graphical-fragment-assembly {}", quote_path(&out_dir.join("assembly_graph.gfa"))),
            &format!("-t {} --disable-checkpoints", threads),
            logdir,
            Some(out_dir.join(ASSEMBLY_FASTA)),
        )
    }
}

pub mod minimap2 {
    use std::path::Path;
    use crate::cli::PacbioModel;
    use crate::config::defs::{PipelineError, MINIMAP2_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    pub fn long_preset(pacbio_model: Option<&PacbioModel>) -> &'static str {
        match pacbio_model {
            Some(PacbioModel::PacbioHifi) => "map-hifi",
            Some(_) => "map-pb",
            None => "map-ont",
        }
    }

    pub fn build_long(
        reference: &Path,
        reads: &Path,
        sam: &Path,
        threads: usize,
        pacbio_model: Option<&PacbioModel>,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            MINIMAP2_TAG,
            &format!("{} {}", quote_path(reference), quote_path(reads)),
            &format!("-o {}", quote_path(sam)),
            &format!("-ax {} -t {}", long_preset(pacbio_model), threads),
            logdir,
            None,
        )
    }

    pub fn build_short(
        reference: &Path,
        short_one: &Path,
        short_two: &Path,
        sam: &Path,
        threads: usize,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            MINIMAP2_TAG,
            &format!("{} {} {}", quote_path(reference), quote_path(short_one), quote_path(short_two)),
            &format!("-o {}", quote_path(sam)),
            &format!("-ax sr -t {}", threads),
            logdir,
            None,
        )
    }
}

pub mod samtools {
    use std::path::Path;
    use crate::config::defs::{PipelineError, SAMTOOLS_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    pub fn sam_to_bam(
        sam: &Path,
        bam: &Path,
        threads: usize,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            SAMTOOLS_TAG,
            &quote_path(sam),
            &format!("-o {}", quote_path(bam)),
            &format!("view -h -b -@ {}", threads),
            logdir,
            None,
        )
    }
}

pub mod unicycler {
    use std::path::Path;
    use crate::config::defs::{PipelineError, UNICYCLER_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    /// Hybrid assembly when both read sets are given, otherwise whichever one is.
    ///
    /// # Arguments
    ///
    /// * `extra` - Freeform extra options from `--unicycler_opts`.
    pub fn build(
        short_reads: Option<(&Path, &Path)>,
        long_reads: Option<&Path>,
        out_dir: &Path,
        threads: usize,
        extra: &str,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        let mut input = Vec::new();
        if let Some((short_one, short_two)) = short_reads {
            input.push(format!("-1 {} -2 {}", quote_path(short_one), quote_path(short_two)));
        }
        if let Some(long_reads) = long_reads {
            input.push(format!("-l {}", quote_path(long_reads)));
        }
        if input.is_empty() {
            return Err(PipelineError::InvalidInput("unicycler needs short or long reads".to_string()));
        }
        let input = input.join(" ");

        ExternalTool::new(
            UNICYCLER_TAG,
            &input,
            &format!("-o {}", quote_path(out_dir)),
            &format!("{} -t {}", extra, threads),
            logdir,
            None,
        )
    }
}

pub mod mash {
    use std::path::Path;
    use crate::config::defs::{PipelineError, MASH_MAX_DIST, MASH_MAX_PVALUE, MASH_TAG};
    use crate::utils::external_tools::{quote_path, ExternalTool};

    /// Sketches each sequence individually; mash writes `<prefix>.msh`.
    pub fn sketch(fasta: &Path, prefix: &Path, logdir: &Path) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            MASH_TAG,
            &quote_path(fasta),
            &format!("-o {}", quote_path(prefix)),
            "sketch -i",
            logdir,
            None,
        )
    }

    /// Distance table on stdout, copied to `output`.
    pub fn dist(
        db_sketch: &Path,
        query_sketch: &Path,
        output: &Path,
        logdir: &Path,
    ) -> Result<ExternalTool, PipelineError> {
        ExternalTool::new(
            MASH_TAG,
            &format!("{} {}", quote_path(db_sketch), quote_path(query_sketch)),
            "",
            &format!("dist -v {} -d {} -i", MASH_MAX_PVALUE, MASH_MAX_DIST),
            logdir,
            Some(output.to_path_buf()),
        )
    }
}


/// Picks the first dotted version number out of a tool's version banner,
/// e.g. `Unicycler v0.5.0` or `2.9.3-b1797`.
pub fn parse_version(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|word| word.trim_start_matches(['v', 'V']))
        .filter_map(|word| {
            let version: String = word
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            let version = version.trim_end_matches('.').to_string();
            let dotted = version.contains('.');
            let starts_with_digit = version.chars().next().is_some_and(|c| c.is_ascii_digit());
            (dotted && starts_with_digit).then_some(version)
        })
        .next()
}

/// Numeric component-wise comparison; missing components count as zero.
pub fn version_at_least(found: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> { v.split('.').map(|p| p.parse().unwrap_or(0)).collect() };
    let (found, minimum) = (parse(found), parse(minimum));
    let len = found.len().max(minimum.len());
    for i in 0..len {
        let f = found.get(i).copied().unwrap_or(0);
        let m = minimum.get(i).copied().unwrap_or(0);
        if f != m {
            return f > m;
        }
    }
    true
}


/// Runs `<tool> --version` and checks the reported version against `TOOL_VERSIONS`.
///
/// # Returns
/// Result<String, PipelineError>: the version found.
pub async fn check_version(tool: &str) -> Result<String, PipelineError> {
    let minimum = TOOL_VERSIONS
        .get(tool)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("Unknown tool: {}", tool)))?;
    version_of(tool, Path::new(tool), minimum).await
}

async fn version_of(tool: &str, program: &Path, minimum: &str) -> Result<String, PipelineError> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PipelineError::MissingDependency(format!("{} could not be run ({}). Is it installed?", tool, e)))?;

    // fastp and a few others print their banner on stderr
    let banner = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let version = parse_version(&banner).ok_or_else(|| PipelineError::ToolExecution {
        tool: tool.to_string(),
        error: format!("no version number in: {}", banner.trim()),
    })?;
    debug!("{} reports version {}", tool, version);

    if !version_at_least(&version, minimum) {
        return Err(PipelineError::MissingDependency(format!(
            "{} {} is older than the required {}",
            tool, version, minimum
        )));
    }
    Ok(version)
}

/// Checks every tool and reports all problems at once.
pub async fn check_dependencies(tools: &[&str]) -> Result<(), PipelineError> {
    let mut problems = Vec::new();
    for tool in tools {
        match check_version(tool).await {
            Ok(version) => info!("{} version {} is ok", tool, version),
            Err(e) => problems.push(e.to_string()),
        }
    }
    if !problems.is_empty() {
        return Err(PipelineError::MissingDependency(problems.join("; ")));
    }
    Ok(())
}

/// True when `path` exists and is non-empty.
pub fn produced(path: &Path) -> bool {
    path.metadata().map(|m| m.len() > 0).unwrap_or(false)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::cli::PacbioModel;
    use crate::config::defs::FLYE_TAG;

    fn logdir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_chopper_command() {
        let logs = logdir();
        let tool = chopper::build(
            Path::new("in/long reads.fastq"),
            Path::new("out/chopped.fastq"),
            500,
            9,
            4,
            logs.path(),
        )
        .unwrap();
        assert_eq!(tool.command_as_str(), "chopper -q 9 -l 500 -t 4 --input in/long reads.fastq");
        assert_eq!(tool.command().last().unwrap(), "in/long reads.fastq");
        assert_eq!(tool.outfile(), Some(Path::new("out/chopped.fastq")));
    }

    #[test]
    fn test_flye_command_order_and_extra_opts() {
        let logs = logdir();
        let tool = flye::build(
            Path::new("reads.fastq"),
            Path::new("out/flye_output"),
            8,
            false,
            None,
            "--meta --extra-params 'a=1 b=2'",
            logs.path(),
        )
        .unwrap();
        let expected: Vec<String> = [
            "flye", "--meta", "--extra-params", "a=1 b=2", "--threads", "8",
            "--out-dir", "out/flye_output", "--nano-hq", "reads.fastq",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(tool.command(), expected.as_slice());
    }

    #[test]
    fn test_flye_bad_extra_opts() {
        let logs = logdir();
        let result = flye::build(Path::new("r.fq"), Path::new("o"), 1, false, None, "--meta 'x", logs.path());
        assert!(matches!(result, Err(PipelineError::Tokenize { .. })));
    }

    #[test]
    fn test_read_type_flags() {
        assert_eq!(flye::read_type_flag(false, None), "--nano-hq");
        assert_eq!(flye::read_type_flag(true, None), "--nano-raw");
        assert_eq!(flye::read_type_flag(true, Some(&PacbioModel::PacbioHifi)), "--pacbio-hifi");
        assert_eq!(minimap2::long_preset(None), "map-ont");
        assert_eq!(minimap2::long_preset(Some(&PacbioModel::PacbioCorr)), "map-pb");
        assert_eq!(minimap2::long_preset(Some(&PacbioModel::PacbioHifi)), "map-hifi");
    }

    #[test]
    fn test_raven_and_mash_capture_stdout() {
        let logs = logdir();
        let raven = raven::build(Path::new("reads.fq"), Path::new("out"), 2, logs.path()).unwrap();
        assert_eq!(
            raven.command_as_str(),
            "raven -t 2 --disable-checkpoints --graphical-fragment-assembly out/assembly_graph.gfa reads.fq"
        );
        assert_eq!(raven.outfile(), Some(PathBuf::from("out/assembly.fasta").as_path()));

        let dist = mash::dist(Path::new("db/plsdb.msh"), Path::new("p.msh"), Path::new("mash.tsv"), logs.path()).unwrap();
        assert_eq!(dist.command_as_str(), "mash dist -v 0.1 -d 0.1 -i db/plsdb.msh p.msh");
        assert!(dist.outfile().is_some());
    }

    #[test]
    fn test_minimap2_and_samtools_commands() {
        let logs = logdir();
        let long = minimap2::build_long(
            Path::new("assembly.fasta"), Path::new("long.fq"), Path::new("long.sam"), 3, None, logs.path(),
        )
        .unwrap();
        assert_eq!(long.command_as_str(), "minimap2 -ax map-ont -t 3 -o long.sam assembly.fasta long.fq");

        let short = minimap2::build_short(
            Path::new("assembly.fasta"), Path::new("R1.fq"), Path::new("R2.fq"), Path::new("short.sam"), 3, logs.path(),
        )
        .unwrap();
        assert_eq!(short.command_as_str(), "minimap2 -ax sr -t 3 -o short.sam assembly.fasta R1.fq R2.fq");

        let bam = samtools::sam_to_bam(Path::new("a.sam"), Path::new("a.bam"), 2, logs.path()).unwrap();
        assert_eq!(bam.command_as_str(), "samtools view -h -b -@ 2 -o a.bam a.sam");
    }

    #[test]
    fn test_unicycler_hybrid_and_long_only() {
        let logs = logdir();
        let hybrid = unicycler::build(
            Some((Path::new("R1.fq"), Path::new("R2.fq"))),
            Some(Path::new("long.fq")),
            Path::new("uni"),
            4,
            "--mode bold",
            logs.path(),
        )
        .unwrap();
        assert_eq!(
            hybrid.command_as_str(),
            "unicycler --mode bold -t 4 -o uni -1 R1.fq -2 R2.fq -l long.fq"
        );

        let long_only = unicycler::build(None, Some(Path::new("long.fq")), Path::new("uni"), 4, "", logs.path()).unwrap();
        assert_eq!(long_only.command_as_str(), "unicycler -t 4 -o uni -l long.fq");

        let short_only = unicycler::build(Some((Path::new("R1.fq"), Path::new("R2.fq"))), None, Path::new("uni"), 4, "", logs.path()).unwrap();
        assert_eq!(short_only.command_as_str(), "unicycler -t 4 -o uni -1 R1.fq -2 R2.fq");

        assert!(matches!(
            unicycler::build(None, None, Path::new("uni"), 4, "", logs.path()),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fastp_command() {
        let logs = logdir();
        let tool = fastp::build(
            Path::new("R1.fq"), Path::new("R2.fq"), Path::new("t1.fq"), Path::new("t2.fq"), Path::new("out"), 2, logs.path(),
        )
        .unwrap();
        assert_eq!(
            tool.command_as_str(),
            "fastp -w 2 -j out/fastp.json -h out/fastp.html -o t1.fq -O t2.fq -i R1.fq -I R2.fq"
        );
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("Unicycler v0.5.0").as_deref(), Some("0.5.0"));
        assert_eq!(parse_version("2.9.3-b1797").as_deref(), Some("2.9.3"));
        assert_eq!(parse_version("samtools 1.17\nUsing htslib 1.17").as_deref(), Some("1.17"));
        assert_eq!(parse_version("\nfastp 0.23.4").as_deref(), Some("0.23.4"));
        assert_eq!(parse_version("no version here 42"), None);
    }

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("2.9.3", "2.9"));
        assert!(version_at_least("0.5.0", "0.4.8"));
        assert!(version_at_least("2.9", "2.9.0"));
        assert!(!version_at_least("0.4.7", "0.4.8"));
        assert!(!version_at_least("1.9", "1.15"));
    }

    #[tokio::test]
    async fn test_check_version_unknown_tool() {
        assert!(matches!(check_version("not_a_tool").await, Err(PipelineError::InvalidConfig(_))));
    }

    fn version_script(dir: &Path, banner: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake_tool");
        std::fs::write(&path, format!("#!/bin/sh\necho '{}'\n", banner)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_version_of_missing_binary() {
        let tmp = logdir();
        let missing = tmp.path().join("no_such_binary");
        let result = version_of(FLYE_TAG, &missing, "2.9").await;
        assert!(matches!(result, Err(PipelineError::MissingDependency(msg)) if msg.contains("could not be run")));
    }

    #[tokio::test]
    async fn test_version_of_old_and_current() {
        let tmp = logdir();
        let old = version_script(tmp.path(), "flye 2.8.1");
        assert!(matches!(version_of(FLYE_TAG, &old, "2.9").await, Err(PipelineError::MissingDependency(msg)) if msg.contains("older")));

        let current = version_script(tmp.path(), "2.9.3-b1797");
        assert_eq!(version_of(FLYE_TAG, &current, "2.9").await.unwrap(), "2.9.3");
    }
}
