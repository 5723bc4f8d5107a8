//! Post-compilation size validation
//!
//! Every artifact gets a record, whether or not the active network enforces
//! its limit. Enforcement only decides whether an oversize artifact fails the
//! run or merely warns.

use crate::artifacts::CompiledContract;
use crate::environment::NetworkProfile;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome for one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Within the limit
    Pass,
    /// Over the limit on a network that does not enforce it
    Warn,
    /// Over the limit on an enforcing network
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// `path:Contract`
    pub artifact: String,
    pub size: u64,
    pub limit: u64,
    pub verdict: Verdict,
}

/// Records for every artifact, sorted by identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub network: String,
    pub enforced: bool,
    pub records: Vec<ValidationRecord>,
}

impl ValidationReport {
    /// Identifiers of artifacts with a `Fail` verdict
    pub fn offenders(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.verdict == Verdict::Fail)
            .map(|r| r.artifact.clone())
            .collect()
    }

    pub fn warnings(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.verdict == Verdict::Warn)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.records.iter().any(|r| r.verdict == Verdict::Fail)
    }
}

/// Apply the network's size policy to every contract
pub fn validate<'a>(
    contracts: impl IntoIterator<Item = &'a CompiledContract>,
    network: &NetworkProfile,
) -> ValidationReport {
    let limit = network.max_artifact_size;
    let mut records: Vec<ValidationRecord> = contracts
        .into_iter()
        .map(|contract| {
            let size = contract.size();
            let verdict = match (size > limit, network.enforce_size_limit) {
                (false, _) => Verdict::Pass,
                (true, true) => Verdict::Fail,
                (true, false) => {
                    warn!(
                        artifact = %contract.id(),
                        size,
                        limit,
                        network = %network.name,
                        "artifact exceeds size limit"
                    );
                    Verdict::Warn
                }
            };
            ValidationRecord {
                artifact: contract.id(),
                size,
                limit,
                verdict,
            }
        })
        .collect();
    records.sort_by(|a, b| a.artifact.cmp(&b.artifact));

    ValidationReport {
        network: network.name.clone(),
        enforced: network.enforce_size_limit,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn contract(name: &str, size: usize) -> CompiledContract {
        CompiledContract {
            source_path: "src/Big.sol".to_string(),
            name: name.to_string(),
            abi: serde_json::json!([]),
            bytecode: vec![0; size],
            deployed_bytecode: vec![0; size],
        }
    }

    #[rstest]
    #[case(true, 100, Verdict::Pass)]
    #[case(true, 101, Verdict::Fail)]
    #[case(false, 100, Verdict::Pass)]
    #[case(false, 101, Verdict::Warn)]
    fn test_verdicts(#[case] enforce: bool, #[case] size: usize, #[case] expected: Verdict) {
        let network = NetworkProfile::new("test", enforce).with_max_artifact_size(100);
        let report = validate(&[contract("C", size)], &network);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].verdict, expected);
        assert_eq!(report.records[0].limit, 100);
    }

    #[test]
    fn test_report_sorted_with_offenders() {
        let network = NetworkProfile::new("hardhat", true).with_max_artifact_size(10);
        let contracts = vec![contract("Zeta", 50), contract("Alpha", 5), contract("Mid", 11)];
        let report = validate(&contracts, &network);

        let ids: Vec<&str> = report.records.iter().map(|r| r.artifact.as_str()).collect();
        assert_eq!(ids, vec!["src/Big.sol:Alpha", "src/Big.sol:Mid", "src/Big.sol:Zeta"]);
        assert_eq!(report.offenders(), vec!["src/Big.sol:Mid", "src/Big.sol:Zeta"]);
        assert!(report.has_failures());
    }

    #[test]
    fn test_report_json_shape() {
        let network = NetworkProfile::new("devnet", false).with_max_artifact_size(1);
        let report = validate(&[contract("C", 2)], &network);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["records"][0]["verdict"], "warn");
        assert_eq!(json["enforced"], false);
    }
}
