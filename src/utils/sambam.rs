// SAM reading through htslib and plasmid read extraction.
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use anyhow::{Result, anyhow};
use log::debug;
use rust_htslib::bam::{self, Read, record::Record};
use crate::utils::file::write_fastq_record;

/// htslib's 4-bit nucleotide alphabet. A, C, G and T are single bits, so the
/// complement of any code (IUPAC included) is its bit reversal.
const NT16: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

const PHRED_OFFSET: u8 = 33;
const MISSING_QUAL: u8 = 0xff;
const FILLER_QUAL: u8 = b'I';


/// A primary alignment reduced to what the FASTQ writers need.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRead {
    pub name: Vec<u8>,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub plasmid: bool,
}

impl ExtractedRead {
    /// Sequence and qualities as sequenced, undoing the aligner's reverse complement.
    fn from_record(record: &Record, chromosome_tids: &[bool]) -> Self {
        let len = record.seq_len();
        let seq = record.seq();
        let raw_qual = record.qual();

        let (seq, mut qual): (Vec<u8>, Vec<u8>) = if record.is_reverse() {
            (
                (0..len).rev().map(|i| complement_base(seq.encoded_base(i))).collect(),
                raw_qual.iter().rev().copied().collect(),
            )
        } else {
            (seq.as_bytes(), raw_qual.to_vec())
        };

        if qual.first().is_none_or(|q| *q == MISSING_QUAL) {
            qual = vec![FILLER_QUAL; len];
        } else {
            qual.iter_mut().for_each(|q| *q += PHRED_OFFSET);
        }

        Self {
            name: record.qname().to_vec(),
            seq,
            qual,
            plasmid: is_plasmid_record(record, chromosome_tids),
        }
    }

    fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write_fastq_record(writer, &String::from_utf8_lossy(&self.name), &self.seq, &self.qual)
    }
}


fn complement_base(code: u8) -> u8 {
    NT16[((code & 0xf).reverse_bits() >> 4) as usize]
}

/// Unmapped, or aligned to something other than a chromosome contig.
fn is_plasmid_record(record: &Record, chromosome_tids: &[bool]) -> bool {
    if record.is_unmapped() || record.tid() < 0 {
        return true;
    }
    !chromosome_tids.get(record.tid() as usize).copied().unwrap_or(false)
}


/// Opens a SAM/BAM and flags which reference ids are chromosome contigs.
fn open_alignments(sam: &Path, chromosome_ids: &HashSet<String>) -> Result<(bam::Reader, Vec<bool>)> {
    let reader = bam::Reader::from_path(sam)
        .map_err(|e| anyhow!("Cannot open {}: {}", sam.display(), e))?;
    let chromosome_tids = reader
        .header()
        .target_names()
        .iter()
        .map(|name| chromosome_ids.contains(String::from_utf8_lossy(name).as_ref()))
        .collect();
    Ok((reader, chromosome_tids))
}

/// Calls `f` on every primary alignment record.
fn for_each_primary<F>(sam: &Path, chromosome_ids: &HashSet<String>, mut f: F) -> Result<u64>
where
    F: FnMut(&Record, &[bool]) -> Result<()>,
{
    let (mut reader, chromosome_tids) = open_alignments(sam, chromosome_ids)?;
    let mut record = Record::new();
    let mut primary: u64 = 0;
    while let Some(result) = reader.read(&mut record) {
        result.map_err(|e| anyhow!("Failed to parse SAM record in {}: {}", sam.display(), e))?;
        if record.is_secondary() || record.is_supplementary() {
            continue;
        }
        primary += 1;
        f(&record, &chromosome_tids)?;
    }
    Ok(primary)
}


/// Writes long reads that did not land on a chromosome contig to a FASTQ.
///
/// # Arguments
///
/// * `sam` - Long reads aligned to the long-read assembly.
/// * `chromosome_ids` - Contig names considered chromosomal.
/// * `fastq` - Output FASTQ.
///
/// # Returns
/// Result<u64>: number of reads written.
///
pub fn extract_long_plasmid_reads(
    sam: &Path,
    chromosome_ids: &HashSet<String>,
    fastq: &Path,
) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(fastq)?);
    let mut written: u64 = 0;

    let primary = for_each_primary(sam, chromosome_ids, |record, chromosome_tids| {
        if record.seq_len() > 0 && is_plasmid_record(record, chromosome_tids) {
            ExtractedRead::from_record(record, chromosome_tids).write(&mut writer)?;
            written += 1;
        }
        Ok(())
    })?;

    writer.flush()?;
    debug!("Extracted {} of {} long reads from {}", written, primary, sam.display());
    Ok(written)
}


/// Writes short read pairs where either mate did not land on a chromosome contig
/// to an R1/R2 FASTQ pair.
///
/// A mate waits until its partner shows up and is then written or dropped, so memory
/// only grows with the number of mates still unpaired. Pairs are written in the order
/// they complete. Records without the paired flag are ignored.
///
/// # Arguments
///
/// * `sam` - Paired short reads aligned to the long-read assembly.
/// * `chromosome_ids` - Contig names considered chromosomal.
/// * `r1` - Output FASTQ for first mates.
/// * `r2` - Output FASTQ for second mates.
///
/// # Returns
/// Result<u64>: number of pairs written.
///
pub fn extract_short_plasmid_reads(
    sam: &Path,
    chromosome_ids: &HashSet<String>,
    r1: &Path,
    r2: &Path,
) -> Result<u64> {
    let mut writer1 = BufWriter::new(File::create(r1)?);
    let mut writer2 = BufWriter::new(File::create(r2)?);
    let mut pending: HashMap<Vec<u8>, (bool, ExtractedRead)> = HashMap::new();
    let mut written: u64 = 0;

    let primary = for_each_primary(sam, chromosome_ids, |record, chromosome_tids| {
        if !record.is_paired() {
            return Ok(());
        }
        let is_first = record.is_first_in_template();
        if !is_first && !record.is_last_in_template() {
            return Ok(());
        }

        let Some((mate_is_first, mate)) = pending.remove(record.qname()) else {
            let read = ExtractedRead::from_record(record, chromosome_tids);
            pending.insert(read.name.clone(), (is_first, read));
            return Ok(());
        };
        if mate_is_first == is_first {
            return Err(anyhow!(
                "Read {} has two mates with the same orientation",
                String::from_utf8_lossy(record.qname())
            ));
        }

        let read = ExtractedRead::from_record(record, chromosome_tids);
        if read.plasmid || mate.plasmid {
            let (first, second) = if is_first { (&read, &mate) } else { (&mate, &read) };
            first.write(&mut writer1)?;
            second.write(&mut writer2)?;
            written += 1;
        }
        Ok(())
    })?;

    if !pending.is_empty() {
        debug!("{} short reads in {} had no mate", pending.len(), sam.display());
    }
    writer1.flush()?;
    writer2.flush()?;
    debug!("Extracted {} short read pairs from {} primary records in {}", written, primary, sam.display());
    Ok(written)
}
