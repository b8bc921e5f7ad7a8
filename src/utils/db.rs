use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use md5::{Digest, Md5};

use crate::config::defs::{PipelineError, DB_CHECKSUMS, DB_FILES};


/// Hex MD5 of a file, read in chunks.
pub fn file_md5(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect())
}


/// Parses `md5sum`-style lines: `<hex>  <file>` (text mode) or `<hex> *<file>` (binary mode).
pub fn parse_checksums(text: &str) -> Result<Vec<(String, String)>, PipelineError> {
    let mut entries = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
        let (hash, file) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| PipelineError::MissingDatabase(format!("Malformed checksum line: {}", line)))?;
        let file = file.trim_start().trim_start_matches('*');
        if hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) || file.is_empty() {
            return Err(PipelineError::MissingDatabase(format!("Malformed checksum line: {}", line)));
        }
        entries.push((hash.to_ascii_lowercase(), file.to_string()));
    }
    Ok(entries)
}


/// Verifies every file listed in `<db_dir>/md5sums.txt`.
///
/// # Returns
/// Result<usize, PipelineError>: number of files verified.
pub fn verify_checksums(db_dir: &Path, manifest: &Path) -> Result<usize, PipelineError> {
    let entries = parse_checksums(&fs::read_to_string(manifest)?)?;
    for (expected, name) in &entries {
        let file = db_dir.join(name);
        if !file.is_file() {
            return Err(PipelineError::MissingDatabase(format!("{} listed in {} is missing", file.display(), DB_CHECKSUMS)));
        }
        let found = file_md5(&file)?;
        if &found != expected {
            return Err(PipelineError::ChecksumMismatch { file, expected: expected.clone(), found });
        }
        debug!("Checksum ok: {}", file.display());
    }
    Ok(entries.len())
}


/// Checks the PLSDB database directory is usable.
///
/// The PLSDB sketch and metadata must be present and non-empty. When the directory
/// carries an `md5sums.txt` manifest, every listed file is also checksummed.
///
/// # Arguments
///
/// * `db_dir` - Database directory given with `-d`.
///
/// # Returns
/// Result<(), PipelineError>: `MissingDatabase` or `ChecksumMismatch` on failure.
///
pub fn check_db_installation(db_dir: &Path) -> Result<(), PipelineError> {
    if !db_dir.is_dir() {
        return Err(PipelineError::MissingDatabase(format!("{} is not a directory", db_dir.display())));
    }

    let missing: Vec<PathBuf> = DB_FILES
        .iter()
        .map(|name| db_dir.join(name))
        .filter(|path| fs::metadata(path).map(|m| !m.is_file() || m.len() == 0).unwrap_or(true))
        .collect();
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
        return Err(PipelineError::MissingDatabase(format!("missing or empty: {}", names.join(", "))));
    }

    let manifest = db_dir.join(DB_CHECKSUMS);
    if manifest.is_file() {
        let verified = verify_checksums(db_dir, &manifest)?;
        info!("Verified {} database checksums", verified);
    }

    info!("Database at {} is installed", db_dir.display());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defs::{PLSDB_METADATA, PLSDB_SKETCH};

    fn fake_db(dir: &Path) {
        fs::write(dir.join(PLSDB_SKETCH), b"sketch").unwrap();
        fs::write(dir.join(PLSDB_METADATA), b"metadata").unwrap();
    }

    #[test]
    fn test_file_md5() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("hello.txt");
        fs::write(&path, b"hello\n")?;
        assert_eq!(file_md5(&path)?, "b1946ac92492d2347c6235b4d2611184");
        Ok(())
    }

    #[test]
    fn test_parse_checksums() {
        let entries = parse_checksums("# db\nB1946AC92492D2347C6235B4D2611184  a.msh\nb1946ac92492d2347c6235b4d2611184 *b.tsv\n").unwrap();
        assert_eq!(entries, vec![
            ("b1946ac92492d2347c6235b4d2611184".to_string(), "a.msh".to_string()),
            ("b1946ac92492d2347c6235b4d2611184".to_string(), "b.tsv".to_string()),
        ]);
        assert!(parse_checksums("nothex  a.msh").is_err());
        assert!(parse_checksums("b1946ac92492d2347c6235b4d2611184").is_err());
    }

    #[test]
    fn test_check_db_installation_good() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        fake_db(tmp.path());
        check_db_installation(tmp.path())?;
        Ok(())
    }

    #[test]
    fn test_check_db_installation_missing_files() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join(PLSDB_SKETCH), b"sketch")?;
        fs::write(tmp.path().join(PLSDB_METADATA), b"")?;
        assert!(matches!(check_db_installation(tmp.path()), Err(PipelineError::MissingDatabase(_))));
        assert!(matches!(
            check_db_installation(&tmp.path().join("nope")),
            Err(PipelineError::MissingDatabase(_))
        ));
        Ok(())
    }

    #[test]
    fn test_check_db_installation_checksums() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        fake_db(tmp.path());
        let good = file_md5(&tmp.path().join(PLSDB_SKETCH))?;
        fs::write(tmp.path().join(DB_CHECKSUMS), format!("{}  {}\n", good, PLSDB_SKETCH))?;
        check_db_installation(tmp.path())?;

        fs::write(
            tmp.path().join(DB_CHECKSUMS),
            format!("{}  {}\n", "0".repeat(32), PLSDB_METADATA),
        )?;
        match check_db_installation(tmp.path()) {
            Err(PipelineError::ChecksumMismatch { file, expected, .. }) => {
                assert_eq!(file, tmp.path().join(PLSDB_METADATA));
                assert_eq!(expected, "0".repeat(32));
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
        Ok(())
    }
}
