use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::defs::{
    PipelineError, RunConfig, ASSEMBLY_FASTA, CHOPPER_FASTQ, CHOPPER_TAG, CHROMOSOME_FASTA,
    FASTP_TAG, FLYE_DIR, FLYE_TAG, LONG_BAM, LONG_SAM, MASH_TAG, MASH_TSV, MINIMAP2_TAG,
    PLASMID_LONG_FASTQ, PLASMID_SHORT_R1, PLASMID_SHORT_R2, PLSDB_SKETCH, RAVEN_TAG, SAMTOOLS_TAG,
    SHORT_BAM, SHORT_SAM, TRIMMED_R1, TRIMMED_R2, UNICYCLER_DIR, UNICYCLER_TAG,
};
use crate::utils::command::{
    check_dependencies, chopper, fastp, flye, mash, minimap2, produced, raven, samtools, unicycler,
};
use crate::utils::db::check_db_installation;
use crate::utils::external_tools::ExternalTool;
use crate::utils::fastx::{
    parse_unicycler_header, partition_contigs, read_contigs, write_contigs, write_plasmids, Contig,
};
use crate::utils::file::{compress_file, has_fastx_extension, remove_directory, remove_file};
use crate::utils::mash::{best_hits, parse_mash_output, MashHit};
use crate::utils::sambam::{extract_long_plasmid_reads, extract_short_plasmid_reads};


/// Long and short read inputs after QC.
struct Reads {
    long: PathBuf,
    short: Option<(PathBuf, PathBuf)>,
}

/// Files produced along the way that may be removed at the end.
#[derive(Default)]
struct Intermediates {
    fastqs: Vec<PathBuf>,
    chromosome: Option<PathBuf>,
    other: Vec<PathBuf>,
}


/// Hybrid mode: long reads for the backbone assembly, short reads to recover plasmids.
pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Plassembler run\n-------------\n");
    assemble(config, true).await
}

/// Long-read only mode.
pub async fn run_long(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Plassembler long\n-------------\n");
    assemble(config, false).await
}


async fn assemble(config: Arc<RunConfig>, hybrid: bool) -> Result<(), PipelineError> {
    let args = &config.args;
    let mut intermediates = Intermediates::default();

    // Inputs and environment
    let long_reads = input_path(&config, &args.longreads, "--longreads")?;
    let short_reads = if hybrid {
        Some((
            input_path(&config, &args.short_one, "--short_one")?,
            input_path(&config, &args.short_two, "--short_two")?,
        ))
    } else {
        None
    };
    let db_dir = input_path(&config, &args.database, "--database")?;

    check_dependencies(&required_tools(&config, hybrid)).await?;
    check_db_installation(&db_dir)?;

    // QC
    let reads = quality_control(&config, long_reads, short_reads, &mut intermediates).await?;

    // Long read assembly
    let assembly = assemble_long_reads(&config, &reads.long, &mut intermediates).await?;
    let chromosome_ids = classify_assembly(&config, &assembly, &mut intermediates)?;

    // Pull out everything that is not chromosomal
    let plasmid_reads = extract_plasmid_reads(&config, &assembly, &reads, &chromosome_ids, &mut intermediates).await?;

    let plasmids = match plasmid_reads {
        Some(plasmid_reads) => assemble_plasmids(&config, &plasmid_reads).await?,
        None => Vec::new(),
    };

    // Outputs
    let plasmid_fasta = config.out_path(&format!("{}_plasmids.fasta", args.prefix));
    let plasmid_ids = write_plasmids(&plasmids, &plasmid_fasta)?;

    let hits = if plasmids.is_empty() {
        warn!("No plasmids were assembled");
        HashMap::new()
    } else {
        info!("Assembled {} plasmid contig(s)", plasmids.len());
        type_plasmids(&config, &plasmid_fasta, &db_dir.join(PLSDB_SKETCH), &mut intermediates).await?
    };

    let summary = config.out_path(&format!("{}_summary.tsv", args.prefix));
    write_summary(&summary, &plasmids, &plasmid_ids, &hits)?;
    info!("Plasmids written to {}", plasmid_fasta.display());
    info!("Summary written to {}", summary.display());

    cleanup(&config, intermediates)?;
    Ok(())
}


/// Resolves a required input path against the working directory and checks it exists.
fn input_path(config: &RunConfig, value: &Option<String>, flag: &str) -> Result<PathBuf, PipelineError> {
    let value = value
        .as_ref()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("{} is required for module {}", flag, config.args.module)))?;
    let path = PathBuf::from(value);
    let path = if path.is_absolute() { path } else { config.cwd.join(path) };
    if !path.exists() {
        return Err(PipelineError::InvalidInput(format!("{} does not exist: {}", flag, path.display())));
    }
    if path.is_file() && !has_fastx_extension(&path, false) {
        warn!("{} does not look like a FASTQ file: {}", flag, path.display());
    }
    Ok(path)
}

fn required_tools(config: &RunConfig, hybrid: bool) -> Vec<&'static str> {
    let mut tools = vec![
        if config.args.use_raven { RAVEN_TAG } else { FLYE_TAG },
        MINIMAP2_TAG,
        SAMTOOLS_TAG,
        UNICYCLER_TAG,
        MASH_TAG,
    ];
    if !config.args.skip_qc {
        tools.push(CHOPPER_TAG);
        if hybrid {
            tools.push(FASTP_TAG);
        }
    }
    tools
}


async fn quality_control(
    config: &RunConfig,
    long_reads: PathBuf,
    short_reads: Option<(PathBuf, PathBuf)>,
    intermediates: &mut Intermediates,
) -> Result<Reads, PipelineError> {
    if config.args.skip_qc {
        info!("Skipping read QC");
        return Ok(Reads { long: long_reads, short: short_reads });
    }

    let chopped = config.out_path(CHOPPER_FASTQ);
    chopper::build(
        &long_reads,
        &chopped,
        config.args.min_length,
        config.args.min_quality,
        config.threads,
        &config.log_dir,
    )?
    .run()
    .await?;
    intermediates.fastqs.push(chopped.clone());
    if !produced(&chopped) {
        return Err(PipelineError::InvalidInput(format!(
            "No long reads passed --min_length {} and --min_quality {}",
            config.args.min_length, config.args.min_quality
        )));
    }

    let short = match short_reads {
        Some((short_one, short_two)) => {
            let (trimmed_one, trimmed_two) = (config.out_path(TRIMMED_R1), config.out_path(TRIMMED_R2));
            fastp::build(
                &short_one,
                &short_two,
                &trimmed_one,
                &trimmed_two,
                &config.out_dir,
                config.threads,
                &config.log_dir,
            )?
            .run()
            .await?;
            intermediates.fastqs.push(trimmed_one.clone());
            intermediates.fastqs.push(trimmed_two.clone());
            Some((trimmed_one, trimmed_two))
        }
        None => None,
    };

    Ok(Reads { long: chopped, short })
}


async fn assemble_long_reads(
    config: &RunConfig,
    reads: &Path,
    intermediates: &mut Intermediates,
) -> Result<PathBuf, PipelineError> {
    let args = &config.args;
    let assembly = if args.use_raven {
        let tool = raven::build(reads, &config.out_dir, config.threads, &config.log_dir)?;
        tool.run().await?;
        intermediates.other.push(config.out_path("assembly_graph.gfa"));
        config.out_path(ASSEMBLY_FASTA)
    } else {
        let flye_dir = config.out_path(FLYE_DIR);
        let tool = flye::build(
            reads,
            &flye_dir,
            config.threads,
            args.raw_flag,
            args.pacbio_model.as_ref(),
            &args.flye_opts,
            &config.log_dir,
        )?;
        tool.run().await?;
        flye_dir.join(ASSEMBLY_FASTA)
    };

    if !produced(&assembly) {
        return Err(PipelineError::NoChromosome { min_length: args.chromosome });
    }
    Ok(assembly)
}


/// Writes the chromosome contigs out and returns their names.
fn classify_assembly(
    config: &RunConfig,
    assembly: &Path,
    intermediates: &mut Intermediates,
) -> Result<HashSet<String>, PipelineError> {
    let contigs = read_contigs(assembly)
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
    let total = contigs.len();
    let (chromosomes, others) = partition_contigs(contigs, config.args.chromosome);
    info!(
        "Long read assembly has {} contig(s): {} chromosomal, {} other",
        total,
        chromosomes.len(),
        others.len()
    );
    if chromosomes.is_empty() {
        return Err(PipelineError::NoChromosome { min_length: config.args.chromosome });
    }

    let chromosome_fasta = config.out_path(CHROMOSOME_FASTA);
    write_contigs(&chromosomes, &chromosome_fasta)?;
    intermediates.chromosome = Some(chromosome_fasta);

    Ok(chromosomes.into_iter().map(|c| c.id).collect())
}


/// Maps reads back to the long read assembly and keeps those not on a chromosome.
///
/// # Returns
/// Ok(None) when nothing is left to assemble.
async fn extract_plasmid_reads(
    config: &RunConfig,
    assembly: &Path,
    reads: &Reads,
    chromosome_ids: &HashSet<String>,
    intermediates: &mut Intermediates,
) -> Result<Option<Reads>, PipelineError> {
    let long_sam = config.out_path(LONG_SAM);
    minimap2::build_long(
        assembly,
        &reads.long,
        &long_sam,
        config.threads,
        config.args.pacbio_model.as_ref(),
        &config.log_dir,
    )?
    .run()
    .await?;

    let plasmid_long = config.out_path(PLASMID_LONG_FASTQ);
    let long_count = extract_long_plasmid_reads(&long_sam, chromosome_ids, &plasmid_long)
        .map_err(|e| PipelineError::ToolExecution { tool: MINIMAP2_TAG.to_string(), error: e.to_string() })?;
    intermediates.fastqs.push(plasmid_long.clone());
    info!("{} long read(s) did not map to the chromosome", long_count);
    sam_to_bam(config, &long_sam, &config.out_path(LONG_BAM)).await?;

    let short = match &reads.short {
        Some((short_one, short_two)) => {
            let short_sam = config.out_path(SHORT_SAM);
            minimap2::build_short(assembly, short_one, short_two, &short_sam, config.threads, &config.log_dir)?
                .run()
                .await?;

            let (plasmid_one, plasmid_two) = (config.out_path(PLASMID_SHORT_R1), config.out_path(PLASMID_SHORT_R2));
            let pair_count = extract_short_plasmid_reads(&short_sam, chromosome_ids, &plasmid_one, &plasmid_two)
                .map_err(|e| PipelineError::ToolExecution { tool: MINIMAP2_TAG.to_string(), error: e.to_string() })?;
            intermediates.fastqs.push(plasmid_one.clone());
            intermediates.fastqs.push(plasmid_two.clone());
            info!("{} short read pair(s) did not map to the chromosome", pair_count);
            sam_to_bam(config, &short_sam, &config.out_path(SHORT_BAM)).await?;

            if pair_count == 0 {
                warn!("No short reads left after removing chromosomal reads");
                return Ok(None);
            }
            Some((plasmid_one, plasmid_two))
        }
        None => None,
    };

    if long_count == 0 && short.is_none() {
        warn!("No long reads left after removing chromosomal reads");
        return Ok(None);
    }
    Ok(Some(Reads { long: plasmid_long, short }))
}

async fn sam_to_bam(config: &RunConfig, sam: &Path, bam: &Path) -> Result<(), PipelineError> {
    samtools::sam_to_bam(sam, bam, config.threads, &config.log_dir)?.run().await?;
    remove_file(sam)?;
    debug!("Converted {} to {}", sam.display(), bam.display());
    Ok(())
}


async fn assemble_plasmids(
    config: &RunConfig,
    reads: &Reads,
) -> Result<Vec<Contig>, PipelineError> {
    let unicycler_dir = config.out_path(UNICYCLER_DIR);
    // unicycler refuses to write into a non-empty directory
    remove_directory(&unicycler_dir)?;

    let short = reads.short.as_ref().map(|(one, two)| (one.as_path(), two.as_path()));
    let long = produced(&reads.long).then_some(reads.long.as_path());
    let tool = unicycler::build(
        short,
        long,
        &unicycler_dir,
        config.threads,
        &config.args.unicycler_opts,
        &config.log_dir,
    )?;
    tool.run().await?;

    let unicycler_fasta = unicycler_dir.join(ASSEMBLY_FASTA);
    if !produced(&unicycler_fasta) {
        warn!("unicycler produced no contigs; see {}", tool.out_log().display());
        return Ok(Vec::new());
    }
    let contigs = read_contigs(&unicycler_fasta)
        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

    // chromosomal leftovers can reassemble; they are not plasmids
    let (chromosomal, plasmids) = partition_contigs(contigs, config.args.chromosome);
    if !chromosomal.is_empty() {
        warn!("Discarding {} chromosome-sized contig(s) from the plasmid assembly", chromosomal.len());
    }
    Ok(plasmids)
}


/// Finds the closest PLSDB entry for each plasmid with mash.
async fn type_plasmids(
    config: &RunConfig,
    plasmid_fasta: &Path,
    db_sketch: &Path,
    intermediates: &mut Intermediates,
) -> Result<HashMap<String, MashHit>, PipelineError> {
    let sketch_prefix = config.out_path("plasmids_sketch");
    let mut sketch_file = sketch_prefix.clone().into_os_string();
    sketch_file.push(".msh");
    let sketch_file = PathBuf::from(sketch_file);
    let mash_tsv = config.out_path(MASH_TSV);

    let tools: Vec<ExternalTool> = vec![
        mash::sketch(plasmid_fasta, &sketch_prefix, &config.log_dir)?,
        mash::dist(db_sketch, &sketch_file, &mash_tsv, &config.log_dir)?,
    ];
    ExternalTool::run_tools(&tools).await?;
    intermediates.other.push(sketch_file);

    let hits = parse_mash_output(&mash_tsv)
        .map_err(|e| PipelineError::ToolExecution { tool: MASH_TAG.to_string(), error: e.to_string() })?;
    info!("mash found {} PLSDB hit(s) within distance", hits.len());
    Ok(best_hits(hits))
}


pub fn write_summary(
    path: &Path,
    plasmids: &[Contig],
    plasmid_ids: &[String],
    hits: &HashMap<String, MashHit>,
) -> Result<(), PipelineError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "contig\tlength\tdepth\tcircular\tplsdb_hit\tmash_distance\tmash_shared_hashes")?;
    for (contig, id) in plasmids.iter().zip(plasmid_ids) {
        let info = contig.desc.as_deref().map(parse_unicycler_header).unwrap_or_default();
        let depth = info.depth.map(|d| format!("{:.2}", d)).unwrap_or_else(|| "NA".to_string());
        let (accession, distance, shared) = match hits.get(id) {
            Some(hit) => (
                hit.accession().to_string(),
                format!("{}", hit.distance),
                format!("{}/{}", hit.shared_hashes, hit.total_hashes),
            ),
            None => ("none".to_string(), "NA".to_string(), "NA".to_string()),
        };
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            id,
            contig.len(),
            depth,
            info.circular,
            accession,
            distance,
            shared
        )?;
    }
    writer.flush()?;
    Ok(())
}


fn cleanup(config: &RunConfig, intermediates: Intermediates) -> Result<(), PipelineError> {
    for fastq in &intermediates.fastqs {
        if !fastq.exists() {
            continue;
        }
        if config.args.keep_fastqs {
            compress_file(fastq)?;
        } else {
            remove_file(fastq)?;
        }
    }
    if let Some(chromosome) = &intermediates.chromosome {
        if !config.args.keep_chromosome {
            remove_file(chromosome)?;
        }
    }
    for path in &intermediates.other {
        remove_file(path)?;
    }
    Ok(())
}
