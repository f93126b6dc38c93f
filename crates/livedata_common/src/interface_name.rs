//! Interface name helpers: split a name into type and number, and map
//! long type names to their conventional CLI abbreviation.

/// (canonical type name, abbreviation, accepted aliases in lowercase)
const INTERFACE_TYPES: &[(&str, &str, &[&str])] = &[
    ("HundredGigabitEthernet", "Hu", &["hundredgige", "hu"]),
    ("FortyGigabitEthernet", "Fo", &["fortygige", "fo"]),
    ("TwentyFiveGigE", "Twe", &["twentyfivegigabitethernet", "twe"]),
    ("TenGigabitEthernet", "Te", &["tengige", "te"]),
    ("TwoGigabitEthernet", "Tw", &["twogige", "tw"]),
    ("FiveGigabitEthernet", "Fi", &["fivegige", "fi"]),
    ("GigabitEthernet", "Gi", &["gige", "gi", "ge"]),
    ("FastEthernet", "Fa", &["fa", "fe"]),
    ("Ethernet", "Eth", &["eth", "et"]),
    ("Port-channel", "Po", &["port-channel", "portchannel", "po"]),
    ("Bundle-Ether", "BE", &["bundle-ether", "be"]),
    ("Loopback", "Lo", &["lo", "loop"]),
    ("Vlan", "Vl", &["vl", "vlan"]),
    ("Tunnel", "Tu", &["tu", "tun"]),
    ("Serial", "Se", &["se", "ser"]),
    ("Management", "Mgmt", &["mgmt", "ma"]),
    ("AppGigabitEthernet", "Ap", &["ap"]),
];

/// Split an interface name into its type prefix and its number.
///
/// `GigabitEthernet1/0/10` -> (`GigabitEthernet`, `1/0/10`),
/// `Port-channel 5` -> (`Port-channel`, `5`).
pub fn split_interface(name: &str) -> (String, String) {
    let head = name.trim_end_matches(|c: char| c.is_ascii_digit() || "/\\.: ".contains(c));
    let tail = name[head.len()..].trim_start();
    (head.to_string(), tail.to_string())
}

fn lookup_type(prefix: &str) -> Option<(&'static str, &'static str)> {
    let lowered = prefix.to_lowercase();
    INTERFACE_TYPES
        .iter()
        .find(|(canonical, _, aliases)| {
            canonical.to_lowercase() == lowered || aliases.contains(&lowered.as_str())
        })
        .map(|(canonical, abbrev, _)| (*canonical, *abbrev))
}

/// Canonical long form (`Gi1/0/1` -> `GigabitEthernet1/0/1`); unknown types unchanged
pub fn canonical_interface_name(name: &str) -> String {
    let (prefix, number) = split_interface(name);
    match lookup_type(&prefix) {
        Some((canonical, _)) => format!("{}{}", canonical, number),
        None => name.to_string(),
    }
}

/// Abbreviated form (`GigabitEthernet1/0/1` -> `Gi1/0/1`); unknown types unchanged
pub fn abbreviated_interface_name(name: &str) -> String {
    let (prefix, number) = split_interface(name);
    match lookup_type(&prefix) {
        Some((_, abbrev)) => format!("{}{}", abbrev, number),
        None => name.to_string(),
    }
}
