use serde::{Deserialize, Serialize};

use crate::config::{valid_mcc, valid_mnc};
use crate::util::errors::{Result, StdError};

pub const MAX_TAC: u32 = 16_777_215;
pub const MAX_SD: u32 = 16_777_215;

/// Network identifier plus slice selector, as exchanged on relations
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PlmnConfig {
    pub mcc: String,
    pub mnc: String,
    pub sst: u8,
    pub sd: Option<u32>,
}

impl PlmnConfig {
    pub fn new(mcc: &str, mnc: &str, sst: u8, sd: Option<u32>) -> Result<Self> {
        let plmn = PlmnConfig {
            mcc: mcc.to_string(),
            mnc: mnc.to_string(),
            sst,
            sd,
        };
        plmn.validate()?;
        Ok(plmn)
    }

    pub fn validate(&self) -> Result<()> {
        if !valid_mcc(&self.mcc) {
            return Err(invalid(format!("Invalid MCC: {}", self.mcc)));
        }
        if !valid_mnc(&self.mnc) {
            return Err(invalid(format!("Invalid MNC: {}", self.mnc)));
        }
        if let Some(sd) = self.sd {
            if sd > MAX_SD {
                return Err(invalid(format!("Invalid SD: {sd}")));
            }
        }
        Ok(())
    }
}

pub fn validate_tac(tac: u32) -> Result<u32> {
    if (1..=MAX_TAC).contains(&tac) {
        Ok(tac)
    } else {
        Err(invalid(format!("Invalid TAC: {tac}")))
    }
}

/// JSON list form used in relation data
pub fn plmns_to_json(plmns: &[PlmnConfig]) -> Result<String> {
    for plmn in plmns {
        plmn.validate()?;
    }
    serde_json::to_string(plmns).map_err(|e| StdError::JsonSerializationError(e).into())
}

/// Parses and validates a JSON PLMN list; anything malformed reads as absent.
pub fn plmns_from_json(value: &str) -> Option<Vec<PlmnConfig>> {
    let plmns: Vec<PlmnConfig> = serde_json::from_str(value).ok()?;
    if plmns.is_empty() || plmns.iter().any(|plmn| plmn.validate().is_err()) {
        return None;
    }
    Some(plmns)
}

pub(crate) fn invalid(message: String) -> crate::util::errors::Error {
    StdError::InvalidRelationData(message).into()
}
