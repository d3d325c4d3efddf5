//! Provider side of `fiveg_gnb_identity`: announces the gNB name and TAC.

use std::collections::BTreeMap;

use super::plmn::{invalid, validate_tac};
use crate::util::errors::Result;

pub const GNB_IDENTITY_RELATION_NAME: &str = "fiveg_gnb_identity";

pub struct GnbIdentityProvides;

impl GnbIdentityProvides {
    pub fn gnb_identity_data(gnb_name: &str, tac: u32) -> Result<BTreeMap<String, String>> {
        if gnb_name.is_empty() {
            return Err(invalid("Invalid relation data: empty gnb_name".to_string()));
        }
        Ok(BTreeMap::from([
            ("gnb_name".to_string(), gnb_name.to_string()),
            ("tac".to_string(), validate_tac(tac)?.to_string()),
        ]))
    }
}
