//! Extrinsic weights and batch sizing
//!
//! Runtimes report weight either as a bare number (v1) or as a
//! `{ refTime, proofSize }` pair (v2). Only ref-time is used to size batches.

use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};

/// Share of the block's max ref-time a batch may fill.
pub const BATCH_FILL_PERCENT: u64 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Weight {
    V2 {
        #[serde(rename = "refTime")]
        ref_time: u64,
        #[serde(rename = "proofSize", default)]
        proof_size: u64,
    },
    V1 {
        weight: u64,
    },
}

impl Weight {
    pub fn from_ref_time(ref_time: u64) -> Self {
        Weight::V2 {
            ref_time,
            proof_size: 0,
        }
    }

    pub fn ref_time(&self) -> u64 {
        match self {
            Weight::V2 { ref_time, .. } => *ref_time,
            Weight::V1 { weight } => *weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockWeights {
    #[serde(rename = "maxBlock")]
    pub max_block: Weight,
}

/// How many extrinsics of weight `extrinsic` fit in a batch.
pub fn max_batchable_count(extrinsic: Weight, limits: BlockWeights) -> Result<u64> {
    let per_extrinsic = extrinsic.ref_time();
    if per_extrinsic == 0 {
        return Err(ChainError::WeightError(
            "extrinsic reports zero ref time".to_string(),
        ));
    }
    let budget = (limits.max_block.ref_time() as u128 * BATCH_FILL_PERCENT as u128 / 100) as u64;
    Ok(budget / per_extrinsic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_both_weight_versions() {
        let v2: Weight = serde_json::from_str(r#"{"refTime": 1500, "proofSize": 64}"#).unwrap();
        let v1: Weight = serde_json::from_str(r#"{"weight": 900}"#).unwrap();

        assert_eq!(v2.ref_time(), 1500);
        assert_eq!(v1.ref_time(), 900);
    }

    #[test]
    fn test_batch_uses_three_quarters_of_block() {
        let limits = BlockWeights {
            max_block: Weight::from_ref_time(2_000_000_000_000),
        };
        // 1.5e12 usable / 1e9 per extrinsic
        assert_eq!(
            max_batchable_count(Weight::from_ref_time(1_000_000_000), limits).unwrap(),
            1500
        );
        assert_eq!(
            max_batchable_count(Weight::V1 { weight: 700 }, BlockWeights {
                max_block: Weight::V1 { weight: 1000 },
            })
            .unwrap(),
            1
        );
    }

    #[test]
    fn test_zero_weight_is_an_error() {
        let limits = BlockWeights {
            max_block: Weight::from_ref_time(1000),
        };
        assert!(max_batchable_count(Weight::from_ref_time(0), limits).is_err());
    }

    #[test]
    fn test_extrinsic_heavier_than_budget() {
        let limits = BlockWeights {
            max_block: Weight::from_ref_time(1000),
        };
        assert_eq!(max_batchable_count(Weight::from_ref_time(800), limits).unwrap(), 0);
    }
}
