use seq_io::fasta::Reader as FastaReader;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use anyhow::{anyhow, Result};
use crate::utils::file::{open_maybe_gzipped, write_fasta_record};


/// A contig read from an assembly FASTA.
#[derive(Debug, Clone, PartialEq)]
pub struct Contig {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl Contig {
    pub fn len(&self) -> u64 {
        self.seq.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// Per-contig annotations unicycler writes into its headers,
/// e.g. `>1 length=5386 depth=1.22x circular=true`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnicyclerInfo {
    pub length: Option<u64>,
    pub depth: Option<f64>,
    pub circular: bool,
}


/// Splits a FASTA header into the id and optional description.
fn parse_header(head: &[u8]) -> (String, Option<String>) {
    let head = String::from_utf8_lossy(head);
    let mut parts = head.trim_end().splitn(2, char::is_whitespace);
    let id = parts.next().unwrap_or_default().to_string();
    let desc = parts.next().map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    (id, desc)
}


/// Reads every contig from a plain or gzipped FASTA file.
///
/// # Arguments
///
/// * `path` - Assembly FASTA.
///
/// # Returns
/// Result<Vec<Contig>>: contigs in file order. An empty file yields an empty vector.
///
pub fn read_contigs(path: &Path) -> Result<Vec<Contig>> {
    let reader = open_maybe_gzipped(path)
        .map_err(|e| anyhow!("Cannot open {}: {}", path.display(), e))?;
    let mut contigs = Vec::new();
    for record in FastaReader::new(reader).into_records() {
        let record = record.map_err(|e| anyhow!("Invalid FASTA in {}: {}", path.display(), e))?;
        let (id, desc) = parse_header(&record.head);
        contigs.push(Contig { id, desc, seq: record.seq });
    }
    Ok(contigs)
}


/// Splits contigs into chromosomes (at least `chromosome_len` bp) and everything else.
///
/// # Returns
/// (chromosomes, others), each in input order.
pub fn partition_contigs(contigs: Vec<Contig>, chromosome_len: u64) -> (Vec<Contig>, Vec<Contig>) {
    contigs.into_iter().partition(|c| c.len() >= chromosome_len)
}


/// Pulls `length=`, `depth=` and `circular=` out of a unicycler contig description.
pub fn parse_unicycler_header(desc: &str) -> UnicyclerInfo {
    let mut info = UnicyclerInfo::default();
    for field in desc.split_whitespace() {
        match field.split_once('=') {
            Some(("length", value)) => info.length = value.parse().ok(),
            Some(("depth", value)) => info.depth = value.trim_end_matches('x').parse().ok(),
            Some(("circular", value)) => info.circular = value == "true",
            _ => {}
        }
    }
    info
}


pub fn write_contigs(contigs: &[Contig], path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for contig in contigs {
        write_fasta_record(&mut writer, &contig.id, contig.desc.as_deref(), &contig.seq)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes plasmid contigs renamed `plasmid_00001`, `plasmid_00002`, ... in input order,
/// keeping their original descriptions.
///
/// # Returns
/// io::Result<Vec<String>>: the new ids, parallel to `contigs`.
pub fn write_plasmids(contigs: &[Contig], path: &Path) -> io::Result<Vec<String>> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut ids = Vec::with_capacity(contigs.len());
    for (i, contig) in contigs.iter().enumerate() {
        let id = plasmid_id(i + 1);
        write_fasta_record(&mut writer, &id, contig.desc.as_deref(), &contig.seq)?;
        ids.push(id);
    }
    writer.flush()?;
    Ok(ids)
}

pub fn plasmid_id(index: usize) -> String {
    format!("plasmid_{:05}", index)
}
