use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::debug;

use crate::config::defs::{FASTA_EXTS, FASTQ_EXTS, GZIP_EXT};


/// Plain or gzip-compressed file handle, picked by magic bytes.
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(GzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn open_maybe_gzipped(path: &Path) -> io::Result<FileReader> {
    let file = File::open(path)?;
    if is_gzipped(path)? {
        Ok(FileReader::Gzipped(GzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(BufReader::new(file)))
    }
}

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    id: &str,
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    writeln!(writer, "@{}", id)?;
    writer.write_all(seq)?;
    writeln!(writer)?;
    writeln!(writer, "+")?;
    writer.write_all(qual)?;
    writeln!(writer)?;
    Ok(())
}

pub fn write_fasta_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
) -> io::Result<()> {
    if let Some(desc) = desc {
        writeln!(writer, ">{} {}", id, desc)?;
    } else {
        writeln!(writer, ">{}", id)?;
    }
    writer.write_all(seq)?;
    writeln!(writer)?;
    Ok(())
}


/// Checks that a read or contig file name carries a recognised extension,
/// optionally followed by `.gz`.
///
/// # Arguments
///
/// * `path` - File to check.
/// * `fasta` - true for FASTA extensions, false for FASTQ.
///
/// # Returns
/// bool
pub fn has_fastx_extension(path: &Path, fasta: bool) -> bool {
    let exts = if fasta { FASTA_EXTS } else { FASTQ_EXTS };
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_ascii_lowercase(),
        None => return false,
    };
    let name = name
        .strip_suffix(&format!(".{}", GZIP_EXT))
        .unwrap_or(&name);
    match name.rsplit_once('.') {
        Some((_, ext)) => exts.contains(&ext),
        None => false,
    }
}


/// Gzip-compresses `path` to `<path>.gz` and removes the original.
///
/// # Returns
/// io::Result<PathBuf>: the compressed file.
pub fn compress_file(path: &Path) -> io::Result<PathBuf> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(format!(".{}", GZIP_EXT));
    let gz_path = PathBuf::from(gz_name);

    let mut reader = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&gz_path)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;
    fs::remove_file(path)?;
    debug!("Compressed {} to {}", path.display(), gz_path.display());
    Ok(gz_path)
}


/// Removes a file, ignoring one that is already gone.
pub fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Removes a directory tree, ignoring one that is already gone.
pub fn remove_directory(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
