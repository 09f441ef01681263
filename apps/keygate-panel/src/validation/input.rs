use keygate_shared::ValidationRequest;
use std::net::IpAddr;
use thiserror::Error;

const MAX_TEXT_LEN: usize = 255;
const MAX_HASH_LEN: usize = 256;
const MAX_SESSION_LEN: usize = 64;
const MAX_MACS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Invalid license key format")]
    LicenseKey,
    #[error("Invalid hardware fingerprint format")]
    Fingerprint,
    #[error("Invalid hardware hash")]
    HardwareHash,
    #[error("Invalid MAC address: {0}")]
    MacAddress(String),
    #[error("Too many MAC addresses")]
    TooManyMacs,
    #[error("Field too long: {0}")]
    FieldTooLong(&'static str),
    #[error("Invalid session id")]
    SessionId,
}

/// A request that passed syntactic validation. Text fields are trimmed,
/// the fingerprint is lowercased and MACs are in `AA:BB:CC:DD:EE:FF` form.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationInput {
    pub license_key: String,
    pub hardware_fingerprint: String,
    pub hardware_hash: String,
    pub mac_addresses: Vec<String>,
    pub computer_name: String,
    pub os_version: String,
    pub processor: Option<String>,
    pub product_version: Option<String>,
    pub session_id: Option<String>,
    pub caller_ip: IpAddr,
    pub reported_ip: Option<String>,
}

/// `XXXX-XXXX-XXXX-XXXX`, uppercase letters and digits only.
pub fn is_valid_license_key(key: &str) -> bool {
    let groups: Vec<&str> = key.split('-').collect();
    groups.len() == 4
        && groups.iter().all(|g| {
            g.len() == 4
                && g.bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        })
}

pub fn is_valid_fingerprint(fingerprint: &str) -> bool {
    (32..=128).contains(&fingerprint.len()) && fingerprint.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Accepts `:` or `-` separated MACs in any case.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let sep = if raw.contains(':') { ':' } else { '-' };
    let octets: Vec<&str> = raw.split(sep).collect();
    if octets.len() != 6
        || !octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return None;
    }
    Some(octets.join(":").to_uppercase())
}

fn optional_text(value: Option<String>, field: &'static str) -> Result<Option<String>, InputError> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) if v.len() > MAX_TEXT_LEN => Err(InputError::FieldTooLong(field)),
        other => Ok(other),
    }
}

impl ValidationInput {
    pub fn parse(req: ValidationRequest, caller_ip: IpAddr) -> Result<Self, InputError> {
        let license_key = req.license_key.trim().to_string();
        if !is_valid_license_key(&license_key) {
            return Err(InputError::LicenseKey);
        }

        let hardware_fingerprint = req.hardware_fingerprint.trim().to_ascii_lowercase();
        if !is_valid_fingerprint(&hardware_fingerprint) {
            return Err(InputError::Fingerprint);
        }

        let hardware_hash = req.hardware_hash.trim().to_string();
        if hardware_hash.is_empty() || hardware_hash.len() > MAX_HASH_LEN {
            return Err(InputError::HardwareHash);
        }

        if req.mac_addresses.len() > MAX_MACS {
            return Err(InputError::TooManyMacs);
        }
        let mut mac_addresses = Vec::with_capacity(req.mac_addresses.len());
        for raw in &req.mac_addresses {
            let mac = normalize_mac(raw).ok_or_else(|| InputError::MacAddress(raw.clone()))?;
            if !mac_addresses.contains(&mac) {
                mac_addresses.push(mac);
            }
        }

        let computer_name = req.computer_name.trim().to_string();
        if computer_name.len() > MAX_TEXT_LEN {
            return Err(InputError::FieldTooLong("computer_name"));
        }
        let os_version = req.os_version.trim().to_string();
        if os_version.len() > MAX_TEXT_LEN {
            return Err(InputError::FieldTooLong("os_version"));
        }

        let session_id = req
            .session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(session) = &session_id {
            if session.len() > MAX_SESSION_LEN
                || !session.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
            {
                return Err(InputError::SessionId);
            }
        }

        Ok(Self {
            license_key,
            hardware_fingerprint,
            hardware_hash,
            mac_addresses,
            computer_name,
            os_version,
            processor: optional_text(req.processor, "processor")?,
            product_version: optional_text(req.product_version, "product_version")?,
            session_id,
            caller_ip,
            reported_ip: optional_text(req.ip_address, "ip_address")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ValidationRequest {
        ValidationRequest {
            license_key: "AB12-CD34-EF56-GH78".into(),
            hardware_fingerprint: "A".repeat(64),
            hardware_hash: "hw-hash".into(),
            mac_addresses: vec!["aa-bb-cc-dd-ee-ff".into(), "AA:BB:CC:DD:EE:FF".into()],
            computer_name: " WORKSTATION-1 ".into(),
            os_version: "Windows 11".into(),
            ..Default::default()
        }
    }

    fn ip() -> IpAddr {
        "203.0.113.7".parse().unwrap()
    }

    #[test]
    fn license_key_format() {
        assert!(is_valid_license_key("ABCD-1234-EFGH-5678"));
        assert!(!is_valid_license_key("abcd-1234-efgh-5678"));
        assert!(!is_valid_license_key("ABCD-1234-EFGH"));
        assert!(!is_valid_license_key("ABCD-1234-EFGH-56789"));
        assert!(!is_valid_license_key("ABCD_1234-EFGH-5678"));
        assert!(!is_valid_license_key(""));
    }

    #[test]
    fn mac_normalization() {
        assert_eq!(normalize_mac("00-0c-29-ab-cd-ef").as_deref(), Some("00:0C:29:AB:CD:EF"));
        assert_eq!(normalize_mac("00:0C:29:AB:CD"), None);
        assert_eq!(normalize_mac("00:0C:29:AB:CD:GG"), None);
    }

    #[test]
    fn parse_normalizes_fields() {
        let input = ValidationInput::parse(request(), ip()).unwrap();
        assert_eq!(input.hardware_fingerprint, "a".repeat(64));
        assert_eq!(input.mac_addresses, vec!["AA:BB:CC:DD:EE:FF".to_string()]);
        assert_eq!(input.computer_name, "WORKSTATION-1");
        assert_eq!(input.session_id, None);
    }

    #[test]
    fn parse_rejects_malformed_fields() {
        let mut req = request();
        req.license_key = "AB12-CD34-EF56-gh78".into();
        assert_eq!(ValidationInput::parse(req, ip()), Err(InputError::LicenseKey));

        let mut req = request();
        req.hardware_fingerprint = "not-hex".into();
        assert_eq!(ValidationInput::parse(req, ip()), Err(InputError::Fingerprint));

        let mut req = request();
        req.mac_addresses = vec!["zz:zz".into()];
        assert!(matches!(
            ValidationInput::parse(req, ip()),
            Err(InputError::MacAddress(_))
        ));

        let mut req = request();
        req.session_id = Some("bad session".into());
        assert_eq!(ValidationInput::parse(req, ip()), Err(InputError::SessionId));
    }
}
