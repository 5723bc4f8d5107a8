/// Compiled contract and artifact metadata types
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::SystemTime;

/// One contract produced by a compile batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledContract {
    /// Source key of the file declaring the contract
    pub source_path: String,
    /// Contract name
    pub name: String,
    /// ABI as emitted by the compiler
    pub abi: serde_json::Value,
    /// Creation bytecode
    #[serde(with = "hex_bytes")]
    pub bytecode: Vec<u8>,
    /// Runtime bytecode, the code that ends up deployed
    #[serde(with = "hex_bytes")]
    pub deployed_bytecode: Vec<u8>,
}

impl CompiledContract {
    /// Artifact identifier, `path:Contract`
    pub fn id(&self) -> String {
        format!("{}:{}", self.source_path, self.name)
    }

    /// Deployed size in bytes, the quantity network size limits apply to
    pub fn size(&self) -> u64 {
        self.deployed_bytecode.len() as u64
    }
}

/// File names written for one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFiles {
    pub abi: String,
    pub bytecode: String,
    pub deployed_bytecode: String,
    pub interface: String,
}

impl ArtifactFiles {
    pub fn for_contract(name: &str) -> Self {
        Self {
            abi: format!("{}.abi.json", name),
            bytecode: format!("{}.bin", name),
            deployed_bytecode: format!("{}.deployed.bin", name),
            interface: format!("I{}.sol", name),
        }
    }
}

/// Metadata recorded for each written artifact in `build-info.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// `path:Contract`
    pub id: String,
    /// Hash of the profile the contract was compiled under
    pub profile_hash: String,
    /// Compiler version used
    pub compiler_version: String,
    /// Deployed bytecode size in bytes
    pub size: u64,
    /// SHA-256 of the creation bytecode
    pub bytecode_sha256: String,
    /// Kiln version
    pub kiln_version: String,
    /// Build timestamp
    #[serde(with = "serde_millis")]
    pub build_time: SystemTime,
}

impl ArtifactMetadata {
    /// Create metadata for a contract compiled under `profile_hash`
    pub fn new(contract: &CompiledContract, profile_hash: &str, compiler_version: &str) -> Self {
        Self {
            id: contract.id(),
            profile_hash: profile_hash.to_string(),
            compiler_version: compiler_version.to_string(),
            size: contract.size(),
            bytecode_sha256: format!("{:x}", Sha256::digest(&contract.bytecode)),
            kiln_version: env!("CARGO_PKG_VERSION").to_string(),
            build_time: SystemTime::now(),
        }
    }
}

/// Bytecode as a hex string without `0x`
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Helper module for serde SystemTime serialization
mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}
