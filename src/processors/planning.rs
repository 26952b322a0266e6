//! Comparison pair schedules for the chain and hub topologies.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::indexing::FileRecord;

/// How scans are paired for comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Each scan against its immediate successor (frame-to-frame tracking).
    #[default]
    Chain,
    /// Every scan against the first scan (drift-free baseline).
    Hub,
}

impl Topology {
    /// Prefix of result filenames, so runs over one directory stay apart.
    pub fn output_prefix(self) -> &'static str {
        match self {
            Topology::Chain => "Consec",
            Topology::Hub => "Compare",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Chain => write!(f, "chain"),
            Topology::Hub => write!(f, "hub"),
        }
    }
}

/// One scheduled comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair<'a> {
    /// Position in the schedule, starting at 0
    pub index: usize,
    pub source: &'a FileRecord,
    pub target: &'a FileRecord,
}

impl fmt::Display for Pair<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.base_name(), self.target.base_name())
    }
}

/// Build the pair schedule for already ordered records.
///
/// Both topologies yield `n - 1` pairs in record order; fewer than two
/// records yield none.
pub fn plan(records: &[FileRecord], topology: Topology) -> Vec<Pair<'_>> {
    match topology {
        Topology::Chain => records
            .windows(2)
            .enumerate()
            .map(|(index, w)| Pair {
                index,
                source: &w[0],
                target: &w[1],
            })
            .collect(),
        Topology::Hub => match records.split_first() {
            Some((reference, rest)) => rest
                .iter()
                .enumerate()
                .map(|(index, target)| Pair {
                    index,
                    source: reference,
                    target,
                })
                .collect(),
            None => Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn records(n: usize) -> Vec<FileRecord> {
        (0..n)
            .map(|i| FileRecord {
                path: PathBuf::from(format!("scan_{:02}.las", i)),
                numeric_key: i as u64,
            })
            .collect()
    }

    #[test]
    fn test_chain_pairs_are_consecutive() {
        let recs = records(5);
        let pairs = plan(&recs, Topology::Chain);

        assert_eq!(pairs.len(), 4);
        for (i, pair) in pairs.iter().enumerate() {
            assert_eq!(pair.index, i);
            assert_eq!(pair.source, &recs[i]);
            assert_eq!(pair.target, &recs[i + 1]);
        }
    }

    #[test]
    fn test_hub_pairs_share_reference() {
        let recs = records(5);
        let pairs = plan(&recs, Topology::Hub);

        assert_eq!(pairs.len(), 4);
        for (i, pair) in pairs.iter().enumerate() {
            assert_eq!(pair.source, &recs[0]);
            assert_eq!(pair.target, &recs[i + 1]);
        }
    }

    #[test]
    fn test_every_non_reference_record_targeted_once() {
        let recs = records(6);
        for topology in [Topology::Chain, Topology::Hub] {
            let pairs = plan(&recs, topology);
            let targets: Vec<u64> = pairs.iter().map(|p| p.target.numeric_key).collect();
            assert_eq!(targets, vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(plan(&records(0), Topology::Chain).is_empty());
        assert!(plan(&records(0), Topology::Hub).is_empty());
        assert!(plan(&records(1), Topology::Chain).is_empty());
        assert!(plan(&records(1), Topology::Hub).is_empty());
        assert_eq!(plan(&records(2), Topology::Hub).len(), 1);
    }

    #[test]
    fn test_topology_prefix_and_display() {
        assert_eq!(Topology::Chain.output_prefix(), "Consec");
        assert_eq!(Topology::Hub.output_prefix(), "Compare");
        assert_eq!(Topology::Hub.to_string(), "hub");
    }

    #[test]
    fn test_pair_display() {
        let recs = records(2);
        let pairs = plan(&recs, Topology::Chain);
        assert_eq!(pairs[0].to_string(), "scan_00 -> scan_01");
    }
}
