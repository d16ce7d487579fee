use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::header::Header;

/// Factsheet is consumed only to be hashed (spec §4.1); the controller
/// never interprets its contents beyond detecting that it changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactsheetMessage {
    #[serde(flatten)]
    pub header: Header,
    #[serde(flatten)]
    pub body: serde_json::Value,
}

/// SHA-256 hex digest of the factsheet's canonical JSON body (SPEC_FULL §12).
pub fn hash_factsheet(body: &serde_json::Value) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(body)?;
    let digest = Sha256::digest(&canonical);
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn hash_is_stable_for_equal_bodies() {
        let body = json!({"typeSpecification": {"seriesName": "carter"}});
        assert_eq!(hash_factsheet(&body).unwrap(), hash_factsheet(&body).unwrap());
    }

    #[test]
    fn hash_differs_for_different_bodies() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(hash_factsheet(&a).unwrap(), hash_factsheet(&b).unwrap());
    }
}
