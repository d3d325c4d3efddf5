//! Requirer side of the `fiveg_n2` relation, offered by the AMF.

use std::net::IpAddr;

use super::Relation;

pub const N2_RELATION_NAME: &str = "fiveg_n2";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct N2Information {
    pub amf_hostname: String,
    pub amf_port: u16,
    /// Not every AMF publishes an address, only its hostname
    pub amf_ip_address: Option<IpAddr>,
}

impl N2Information {
    fn from_relation(relation: &Relation) -> Option<Self> {
        let data = &relation.remote_app_data;
        let amf_hostname = data.get("amf_hostname").filter(|h| !h.is_empty())?.clone();
        let amf_port = data.get("amf_port")?.parse::<u16>().ok().filter(|p| *p >= 1)?;
        let amf_ip_address = match data.get("amf_ip_address") {
            Some(ip) => Some(ip.parse::<IpAddr>().ok()?),
            None => None,
        };
        Some(N2Information {
            amf_hostname,
            amf_port,
            amf_ip_address,
        })
    }
}

pub struct N2Requires<'a> {
    relations: &'a [Relation],
}

impl<'a> N2Requires<'a> {
    pub fn new(relations: &'a [Relation]) -> Self {
        Self { relations }
    }

    pub fn is_created(&self) -> bool {
        !self.relations.is_empty()
    }

    /// First relation carrying valid AMF data
    pub fn information(&self) -> Option<N2Information> {
        self.relations.iter().find_map(N2Information::from_relation)
    }
}
