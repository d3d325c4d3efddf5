//! Rendering of the OAI CU configuration file (libconfig syntax).

use std::net::IpAddr;

use crate::relations::PlmnConfig;

/// Everything the configuration file depends on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderInputs {
    pub gnb_name: String,
    pub cu_f1_interface_name: String,
    pub cu_f1_ip_address: String,
    pub cu_f1_port: u16,
    pub du_f1_port: u16,
    pub cu_n2_interface_name: String,
    pub cu_n2_ip_address: String,
    pub cu_n3_interface_name: String,
    pub cu_n3_ip_address: String,
    pub amf_external_address: IpAddr,
    pub tac: u32,
    pub plmns: Vec<PlmnConfig>,
}

fn render_plmn(plmn: &PlmnConfig) -> String {
    let sd = plmn
        .sd
        .map(|sd| format!(" sd = 0x{sd:06x};"))
        .unwrap_or_default();
    format!(
        "{{ mcc = {mcc}; mnc = {mnc}; mnc_length = {mnc_length}; snssaiList = ({{ sst = {sst};{sd} }}) }}",
        mcc = plmn.mcc,
        mnc = plmn.mnc,
        mnc_length = plmn.mnc.len(),
        sst = plmn.sst,
    )
}

pub fn render(inputs: &RenderInputs) -> String {
    let plmn_list = inputs
        .plmns
        .iter()
        .map(render_plmn)
        .collect::<Vec<_>>()
        .join(",\n                  ");

    format!(
        r#"Active_gNBs = ( "{gnb_name}");
# Asn1_verbosity, choice in: none, info, annotation
Asn1_verbosity = "none";
sa = 1;

gNBs =
(
 {{
    ////////// Identification parameters:
    gNB_ID = 0xe00;
    gNB_name = "{gnb_name}";

    // Tracking area code, 0x0000 and 0xfffe are reserved values
    tracking_area_code = {tac};
    plmn_list = ({plmn_list});

    nr_cellid = 12345678L;

    tr_s_preference = "f1";

    local_s_if_name = "{cu_f1_interface_name}";
    local_s_address = "{cu_f1_ip_address}";
    remote_s_address = "0.0.0.0";
    local_s_portc = 501;
    local_s_portd = {cu_f1_port};
    remote_s_portc = 500;
    remote_s_portd = {du_f1_port};

    # ------- SCTP definitions
    SCTP :
    {{
        # Number of streams to use in input/output
        SCTP_INSTREAMS = 2;
        SCTP_OUTSTREAMS = 2;
    }};

    ////////// AMF parameters:
    amf_ip_address = ({{ ipv4 = "{amf_external_address}"; }});

    NETWORK_INTERFACES :
    {{
        GNB_INTERFACE_NAME_FOR_NG_AMF = "{cu_n2_interface_name}";
        GNB_IPV4_ADDRESS_FOR_NG_AMF = "{cu_n2_ip_address}";
        GNB_INTERFACE_NAME_FOR_NGU = "{cu_n3_interface_name}";
        GNB_IPV4_ADDRESS_FOR_NGU = "{cu_n3_ip_address}";
        GNB_PORT_FOR_S1U = 2152;
    }};
 }}
);

security = {{
    # preferred ciphering algorithms
    # the first one of the list that an UE supports in chosen
    # valid values: nea0, nea1, nea2, nea3
    ciphering_algorithms = ( "nea0" );

    # preferred integrity algorithms
    # the first one of the list that an UE supports in chosen
    # valid values: nia0, nia1, nia2, nia3
    integrity_algorithms = ( "nia2", "nia0" );

    # setting 'drb_ciphering' to "no" disables ciphering for DRBs, no matter
    # what 'ciphering_algorithms' configures; same thing for 'drb_integrity'
    drb_ciphering = "yes";
    drb_integrity = "no";
}};

log_config : {{
    global_log_level = "info";
    hw_log_level = "info";
    phy_log_level = "info";
    mac_log_level = "info";
    rlc_log_level = "debug";
    pdcp_log_level = "info";
    rrc_log_level = "info";
    f1ap_log_level = "info";
    ngap_log_level = "debug";
}};
"#,
        gnb_name = inputs.gnb_name,
        tac = inputs.tac,
        plmn_list = plmn_list,
        cu_f1_interface_name = inputs.cu_f1_interface_name,
        cu_f1_ip_address = inputs.cu_f1_ip_address,
        cu_f1_port = inputs.cu_f1_port,
        du_f1_port = inputs.du_f1_port,
        amf_external_address = inputs.amf_external_address,
        cu_n2_interface_name = inputs.cu_n2_interface_name,
        cu_n2_ip_address = inputs.cu_n2_ip_address,
        cu_n3_interface_name = inputs.cu_n3_interface_name,
        cu_n3_ip_address = inputs.cu_n3_ip_address,
    )
}
