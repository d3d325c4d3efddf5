//! Requirer side of `fiveg_core_gnb`: the core hands out TAC and PLMNs in
//! exchange for the gNB name.

use std::collections::BTreeMap;

use super::plmn::{invalid, plmns_from_json, validate_tac, PlmnConfig};
use super::Relation;
use crate::util::errors::Result;

pub const CORE_GNB_RELATION_NAME: &str = "fiveg_core_gnb";
const GNB_NAME_KEY: &str = "gnb-name";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreIdentity {
    pub tac: u32,
    pub plmns: Vec<PlmnConfig>,
}

pub struct CoreGnbRequires<'a> {
    relations: &'a [Relation],
}

impl<'a> CoreGnbRequires<'a> {
    pub fn new(relations: &'a [Relation]) -> Self {
        Self { relations }
    }

    pub fn is_created(&self) -> bool {
        !self.relations.is_empty()
    }

    pub fn tac(&self) -> Option<u32> {
        self.relations.iter().find_map(|relation| {
            let tac = relation.remote_app_data.get("tac")?.parse::<u32>().ok()?;
            validate_tac(tac).ok()
        })
    }

    pub fn plmns(&self) -> Option<Vec<PlmnConfig>> {
        self.relations
            .iter()
            .find_map(|relation| plmns_from_json(relation.remote_app_data.get("plmns")?))
    }

    pub fn identity(&self) -> Option<CoreIdentity> {
        Some(CoreIdentity {
            tac: self.tac()?,
            plmns: self.plmns()?,
        })
    }

    /// gNB name already present in our local bag, on every relation
    pub fn published_gnb_name(&self) -> Option<String> {
        let mut names = self
            .relations
            .iter()
            .map(|relation| relation.local_app_data.get(GNB_NAME_KEY).cloned());
        let first = names.next()??;
        names.all(|name| name.as_deref() == Some(first.as_str())).then_some(first)
    }

    pub fn gnb_name_data(gnb_name: &str) -> Result<BTreeMap<String, String>> {
        if gnb_name.is_empty() {
            return Err(invalid("Invalid relation data: empty gnb-name".to_string()));
        }
        Ok(BTreeMap::from([(GNB_NAME_KEY.to_string(), gnb_name.to_string())]))
    }
}
