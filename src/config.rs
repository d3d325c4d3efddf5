//! Validation of the `RanCentralUnit` spec into a typed [`CuConfig`].
//!
//! A configuration is either fully valid or rejected as a whole, together with
//! the names of every offending field.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use thiserror::Error;

use crate::api::v1alpha1::{CniType, IdentitySource, RanCentralUnitSpec};

const MAX_TAC: i64 = 16_777_215;
const MAX_SD: i64 = 16_777_215;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("The following configurations are not valid: [{}]", quoted(.fields))]
pub struct ConfigInvalid {
    pub fields: Vec<String>,
}

fn quoted(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| format!("'{f}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Debug, PartialEq)]
pub struct CuConfig {
    pub cni_type: CniType,
    pub identity_source: IdentitySource,
    pub f1_interface_name: String,
    pub f1_ip_address: IpNetwork,
    pub f1_port: u16,
    pub n2_interface_name: String,
    pub n2_ip_address: IpNetwork,
    pub n3_interface_name: String,
    pub n3_ip_address: IpNetwork,
    pub n3_gateway_ip: IpAddr,
    pub upf_subnet: IpNetwork,
    pub mcc: String,
    pub mnc: String,
    pub sst: u8,
    pub sd: Option<u32>,
    pub tac: u32,
}

impl CuConfig {
    pub fn from_spec(spec: &RanCentralUnitSpec) -> Result<Self, ConfigInvalid> {
        let mut invalid: Vec<&str> = Vec::new();

        let f1_interface_name = interface_name(&spec.f1_interface_name, "f1InterfaceName", &mut invalid);
        let n2_interface_name = interface_name(&spec.n2_interface_name, "n2InterfaceName", &mut invalid);
        let n3_interface_name = interface_name(&spec.n3_interface_name, "n3InterfaceName", &mut invalid);

        let f1_ip_address = check(parse_interface_address(&spec.f1_ip_address), "f1IpAddress", &mut invalid);
        let n2_ip_address = check(parse_interface_address(&spec.n2_ip_address), "n2IpAddress", &mut invalid);
        let n3_ip_address = check(parse_interface_address(&spec.n3_ip_address), "n3IpAddress", &mut invalid);
        let n3_gateway_ip = check(IpAddr::from_str(&spec.n3_gateway_ip).ok(), "n3GatewayIp", &mut invalid);
        let upf_subnet = check(parse_subnet(&spec.upf_subnet), "upfSubnet", &mut invalid);

        let f1_port = check(
            u16::try_from(spec.f1_port).ok().filter(|port| *port >= 1),
            "f1Port",
            &mut invalid,
        );
        let mcc = check(valid_mcc(&spec.mcc).then(|| spec.mcc.clone()), "mcc", &mut invalid);
        let mnc = check(valid_mnc(&spec.mnc).then(|| spec.mnc.clone()), "mnc", &mut invalid);
        let sst = check(
            u8::try_from(spec.sst).ok().filter(|sst| *sst >= 1),
            "sst",
            &mut invalid,
        );
        let sd = match spec.sd {
            None => Some(None),
            Some(sd) if (0..=MAX_SD).contains(&sd) => Some(u32::try_from(sd).ok()),
            Some(_) => None,
        };
        let sd = check(sd, "sd", &mut invalid);
        let tac = check(
            (1..=MAX_TAC)
                .contains(&spec.tac)
                .then(|| u32::try_from(spec.tac).ok())
                .flatten(),
            "tac",
            &mut invalid,
        );

        match (
            f1_ip_address,
            n2_ip_address,
            n3_ip_address,
            n3_gateway_ip,
            upf_subnet,
            f1_port,
            mcc,
            mnc,
            sst,
            sd,
            tac,
        ) {
            (
                Some(f1_ip_address),
                Some(n2_ip_address),
                Some(n3_ip_address),
                Some(n3_gateway_ip),
                Some(upf_subnet),
                Some(f1_port),
                Some(mcc),
                Some(mnc),
                Some(sst),
                Some(sd),
                Some(tac),
            ) if invalid.is_empty() => Ok(CuConfig {
                cni_type: spec.cni_type,
                identity_source: spec.identity_source,
                f1_interface_name,
                f1_ip_address,
                f1_port,
                n2_interface_name,
                n2_ip_address,
                n3_interface_name,
                n3_ip_address,
                n3_gateway_ip,
                upf_subnet,
                mcc,
                mnc,
                sst,
                sd,
                tac,
            }),
            _ => {
                let mut fields: Vec<String> = invalid.into_iter().map(str::to_string).collect();
                fields.sort();
                Err(ConfigInvalid { fields })
            }
        }
    }
}

fn check<T>(value: Option<T>, field: &'static str, invalid: &mut Vec<&'static str>) -> Option<T> {
    if value.is_none() {
        invalid.push(field);
    }
    value
}

fn interface_name(name: &str, field: &'static str, invalid: &mut Vec<&'static str>) -> String {
    if name.is_empty() {
        invalid.push(field);
    }
    name.to_string()
}

/// Parses `address[/prefix]`; the host part is kept as given.
pub fn parse_interface_address(value: &str) -> Option<IpNetwork> {
    let (address, prefix) = match value.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (value, None),
    };
    let address = IpAddr::from_str(address).ok()?;
    let prefix = match prefix {
        Some(prefix) => prefix.parse::<u8>().ok()?,
        None if address.is_ipv4() => 32,
        None => 128,
    };
    IpNetwork::new(address, prefix).ok()
}

fn parse_subnet(value: &str) -> Option<IpNetwork> {
    let network = parse_interface_address(value)?;
    (network.ip() == network.network()).then_some(network)
}

pub fn valid_mcc(mcc: &str) -> bool {
    mcc.len() == 3 && mcc.chars().all(|c| c.is_ascii_digit())
}

pub fn valid_mnc(mnc: &str) -> bool {
    (2..=3).contains(&mnc.len()) && mnc.chars().all(|c| c.is_ascii_digit())
}

/// Address without its prefix length, as announced to peers and written in the CU config
pub fn host(address: &IpNetwork) -> String {
    address.ip().to_string()
}
