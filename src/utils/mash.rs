// Parsing for `mash dist` tabular output against the PLSDB sketch.
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use anyhow::{Result, anyhow};


#[derive(Debug, Clone, PartialEq)]
pub struct MashHit {
    pub reference: String,
    pub query: String,
    pub distance: f64,
    pub p_value: f64,
    pub shared_hashes: u32,
    pub total_hashes: u32,
}

impl MashHit {
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut fields = line.split('\t');
        let reference = fields.next().ok_or_else(|| anyhow!("Missing reference"))?.to_string();
        let query = fields.next().ok_or_else(|| anyhow!("Missing query"))?.to_string();
        let distance = fields.next().ok_or_else(|| anyhow!("Missing distance"))?.trim().parse()?;
        let p_value = fields.next().ok_or_else(|| anyhow!("Missing p-value"))?.trim().parse()?;
        let hashes = fields.next().ok_or_else(|| anyhow!("Missing shared hashes"))?.trim();
        let (shared, total) = hashes
            .split_once('/')
            .ok_or_else(|| anyhow!("Invalid shared hashes: {}", hashes))?;

        Ok(Self {
            reference,
            query,
            distance,
            p_value,
            shared_hashes: shared.parse()?,
            total_hashes: total.parse()?,
        })
    }

    /// PLSDB sketch entries are named by accession, optionally with a path or extension.
    pub fn accession(&self) -> &str {
        let name = self.reference.rsplit('/').next().unwrap_or(&self.reference);
        name.strip_suffix(".fna")
            .or_else(|| name.strip_suffix(".fasta"))
            .unwrap_or(name)
    }
}


pub fn parse_mash_output(path: &Path) -> Result<Vec<MashHit>> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(MashHit::parse_line)
        .collect()
}

/// Keeps the closest reference for each query: lowest distance, then most shared hashes.
pub fn best_hits(hits: Vec<MashHit>) -> HashMap<String, MashHit> {
    let mut best: HashMap<String, MashHit> = HashMap::new();
    for hit in hits {
        match best.get(&hit.query) {
            Some(current)
                if current.distance < hit.distance
                    || (current.distance == hit.distance && current.shared_hashes >= hit.shared_hashes) => {}
            _ => {
                best.insert(hit.query.clone(), hit);
            }
        }
    }
    best
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() -> Result<()> {
        let hit = MashHit::parse_line("NZ_CP012345.1\tplasmid_00001\t0.0123\t1.5e-200\t870/1000")?;
        assert_eq!(hit.accession(), "NZ_CP012345.1");
        assert_eq!(hit.query, "plasmid_00001");
        assert_eq!(hit.distance, 0.0123);
        assert_eq!((hit.shared_hashes, hit.total_hashes), (870, 1000));
        assert!(MashHit::parse_line("a\tb\t0.1\t0.0").is_err());
        assert!(MashHit::parse_line("a\tb\t0.1\t0.0\t870").is_err());
        Ok(())
    }

    #[test]
    fn test_best_hits() -> Result<()> {
        let hits = vec![
            MashHit::parse_line("ref1\tplasmid_00001\t0.05\t0\t500/1000")?,
            MashHit::parse_line("ref2\tplasmid_00001\t0.01\t0\t900/1000")?,
            MashHit::parse_line("ref3\tplasmid_00001\t0.01\t0\t800/1000")?,
            MashHit::parse_line("ref4\tplasmid_00002\t0.09\t0\t100/1000")?,
        ];
        let best = best_hits(hits);
        assert_eq!(best.len(), 2);
        assert_eq!(best["plasmid_00001"].reference, "ref2");
        assert_eq!(best["plasmid_00002"].reference, "ref4");
        Ok(())
    }

    #[test]
    fn test_parse_empty_output() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("mash.tsv");
        std::fs::write(&path, "")?;
        assert!(parse_mash_output(&path)?.is_empty());
        Ok(())
    }
}
