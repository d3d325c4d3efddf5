//! The `fiveg_f1` relation, CU side (provider).

use std::collections::BTreeMap;
use std::net::IpAddr;

use super::plmn::{invalid, plmns_to_json, validate_tac, PlmnConfig};
use super::Relation;
use crate::util::errors::Result;

pub const F1_RELATION_NAME: &str = "fiveg_f1";
pub const DU_F1_DEFAULT_PORT: u16 = 2153;

fn valid_port(port: u16) -> Result<u16> {
    if port == 0 {
        return Err(invalid("Invalid relation data: port 0".to_string()));
    }
    Ok(port)
}

pub struct F1Provides<'a> {
    relations: &'a [Relation],
}

impl<'a> F1Provides<'a> {
    pub fn new(relations: &'a [Relation]) -> Self {
        Self { relations }
    }

    /// Port announced by the DU, if any relation carries a valid one
    pub fn requirer_f1_port(&self) -> Option<u16> {
        self.relations.iter().find_map(|relation| {
            relation
                .remote_app_data
                .get("f1_port")?
                .parse::<u16>()
                .ok()
                .filter(|port| *port >= 1)
        })
    }

    /// Validated local data bag announcing the CU F1 endpoint
    pub fn f1_information_data(
        ip_address: &str,
        port: u16,
        tac: Option<u32>,
        plmns: Option<&[PlmnConfig]>,
    ) -> Result<BTreeMap<String, String>> {
        let ip_address: IpAddr = ip_address
            .parse()
            .map_err(|_| invalid(format!("Invalid relation data: f1_ip_address {ip_address}")))?;
        let mut data = BTreeMap::from([
            ("f1_ip_address".to_string(), ip_address.to_string()),
            ("f1_port".to_string(), valid_port(port)?.to_string()),
        ]);
        if let Some(tac) = tac {
            data.insert("tac".to_string(), validate_tac(tac)?.to_string());
        }
        if let Some(plmns) = plmns {
            data.insert("plmns".to_string(), plmns_to_json(plmns)?);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(remote: &[(&str, &str)]) -> Relation {
        Relation {
            id: "fiveg-f1".to_string(),
            remote_app_data: remote
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn provider_publishes_address_and_port() {
        let data = F1Provides::f1_information_data("1.2.3.4", 1234, None, None).unwrap();
        assert_eq!(
            data,
            BTreeMap::from([
                ("f1_ip_address".to_string(), "1.2.3.4".to_string()),
                ("f1_port".to_string(), "1234".to_string()),
            ])
        );
    }

    #[test]
    fn provider_rejects_invalid_values() {
        let err = F1Provides::f1_information_data("1.2.3.4/24", 1234, None, None).unwrap_err();
        assert!(err.to_string().contains("Invalid relation data"));
        assert!(F1Provides::f1_information_data("1.2.3.4", 0, None, None).is_err());
        assert!(F1Provides::f1_information_data("1.2.3.4", 1234, Some(0), None).is_err());
    }

    #[test]
    fn provider_adds_tac_and_plmns_when_known() {
        let plmns = vec![PlmnConfig::new("001", "01", 1, None).unwrap()];
        let data = F1Provides::f1_information_data("1.2.3.4", 2153, Some(16_777_215), Some(&plmns)).unwrap();
        assert_eq!(data.get("tac").map(String::as_str), Some("16777215"));
        assert_eq!(
            data.get("plmns").map(String::as_str),
            Some(r#"[{"mcc":"001","mnc":"01","sst":1,"sd":null}]"#)
        );
    }

    #[test]
    fn requirer_port_is_read_when_valid() {
        let relations = [relation(&[("f1_port", "1234")])];
        assert_eq!(F1Provides::new(&relations).requirer_f1_port(), Some(1234));

        let relations = [relation(&[("f1_port", "that's wrong")])];
        assert_eq!(F1Provides::new(&relations).requirer_f1_port(), None);
        assert_eq!(F1Provides::new(&[]).requirer_f1_port(), None);
    }
}
