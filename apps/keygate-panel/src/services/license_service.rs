use chrono::{DateTime, Duration, Utc};
use keygate_db::models::license::{License, LicenseFilter, NewLicense};
use keygate_db::repositories::customer_repo::CustomerRepository;
use keygate_db::repositories::license_repo::LicenseRepository;
use keygate_db::repositories::product_repo::ProductRepository;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;

use crate::validation::input::{is_valid_fingerprint, normalize_mac};

const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const KEY_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("License not found")]
    NotFound,
    #[error("Customer {0} not found")]
    CustomerNotFound(i64),
    #[error("Product {0} not found")]
    ProductNotFound(i64),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Cannot {action} a {from} license")]
    InvalidTransition { action: &'static str, from: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// `XXXX-XXXX-XXXX-XXXX` from an alphabet without `0`, `O`, `1` and `I`.
pub fn generate_license_key() -> String {
    let mut rng = rand::rng();
    (0..4)
        .map(|_| {
            (0..4)
                .map(|_| KEY_ALPHABET[rng.random_range(0..KEY_ALPHABET.len())] as char)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Stable device fingerprint: SHA-256 over the hardware hash, the sorted MAC
/// list and the lowercased machine name.
pub fn compute_fingerprint(hardware_hash: &str, mac_addresses: &[String], computer_name: &str) -> String {
    let mut macs: Vec<String> = mac_addresses
        .iter()
        .map(|m| normalize_mac(m).unwrap_or_else(|| m.trim().to_uppercase()))
        .collect();
    macs.sort();
    macs.dedup();

    let mut hasher = Sha256::new();
    hasher.update(hardware_hash.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(macs.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(computer_name.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_macs(raw: &[String]) -> Result<Vec<String>, LicenseError> {
    let mut macs = Vec::with_capacity(raw.len());
    for mac in raw {
        let normalized = normalize_mac(mac)
            .ok_or_else(|| LicenseError::InvalidInput(format!("Invalid MAC address: {}", mac)))?;
        if !macs.contains(&normalized) {
            macs.push(normalized);
        }
    }
    Ok(macs)
}

/// Device details an admin can attach when issuing or rebinding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceBinding {
    #[serde(default)]
    pub hardware_fingerprint: Option<String>,
    #[serde(default)]
    pub hardware_hash: Option<String>,
    #[serde(default)]
    pub mac_addresses: Vec<String>,
    #[serde(default)]
    pub computer_name: Option<String>,
}

struct ResolvedBinding {
    fingerprint: Option<String>,
    hardware_hash: Option<String>,
    mac_addresses: Vec<String>,
}

impl DeviceBinding {
    /// An explicit fingerprint wins; otherwise one is derived when a hardware
    /// hash is present. No fingerprint means a floating license.
    fn resolve(&self) -> Result<ResolvedBinding, LicenseError> {
        let mac_addresses = normalize_macs(&self.mac_addresses)?;
        let hardware_hash = self
            .hardware_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        let fingerprint = match self.hardware_fingerprint.as_deref().map(str::trim) {
            Some(fp) if !fp.is_empty() => {
                let fp = fp.to_ascii_lowercase();
                if !is_valid_fingerprint(&fp) {
                    return Err(LicenseError::InvalidInput(
                        "hardware_fingerprint must be 32-128 hex characters".into(),
                    ));
                }
                Some(fp)
            }
            _ => hardware_hash.as_deref().map(|hash| {
                compute_fingerprint(
                    hash,
                    &mac_addresses,
                    self.computer_name.as_deref().unwrap_or_default(),
                )
            }),
        };

        Ok(ResolvedBinding {
            fingerprint,
            hardware_hash,
            mac_addresses,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueLicense {
    pub customer_id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Alternative to `expires_at`, counted from now.
    #[serde(default)]
    pub valid_days: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub device: DeviceBinding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    Suspend,
    Revoke,
    Reactivate,
}

impl StatusAction {
    fn verb(&self) -> &'static str {
        match self {
            Self::Suspend => "suspend",
            Self::Revoke => "revoke",
            Self::Reactivate => "reactivate",
        }
    }
}

/// Target status for an admin action. Revocation is terminal.
pub fn next_status(current: &str, action: StatusAction) -> Result<&'static str, LicenseError> {
    let invalid = || LicenseError::InvalidTransition {
        action: action.verb(),
        from: current.to_string(),
    };
    match (current, action) {
        ("revoked", _) => Err(invalid()),
        ("active" | "suspended" | "expired", StatusAction::Revoke) => Ok("revoked"),
        ("active" | "suspended", StatusAction::Suspend) => Ok("suspended"),
        ("suspended" | "expired", StatusAction::Reactivate) => Ok("active"),
        _ => Err(invalid()),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendLicense {
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Removes the expiry entirely.
    #[serde(default)]
    pub perpetual: bool,
}

/// New expiry for an extension. Days are added to the current expiry, or to
/// `now` when the license has already lapsed.
pub fn extended_expiry(
    current: Option<DateTime<Utc>>,
    req: &ExtendLicense,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, LicenseError> {
    if req.perpetual {
        return Ok(None);
    }
    if let Some(at) = req.expires_at {
        if at <= now {
            return Err(LicenseError::InvalidInput("expires_at must be in the future".into()));
        }
        return Ok(Some(at));
    }
    match req.days {
        Some(days) if days > 0 => {
            let base = current.filter(|c| *c > now).unwrap_or(now);
            Ok(Some(base + Duration::days(days)))
        }
        Some(_) => Err(LicenseError::InvalidInput("days must be positive".into())),
        None => Err(LicenseError::InvalidInput(
            "one of days, expires_at or perpetual is required".into(),
        )),
    }
}

#[derive(Clone)]
pub struct LicenseService {
    licenses: LicenseRepository,
    customers: CustomerRepository,
    products: ProductRepository,
}

impl LicenseService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            licenses: LicenseRepository::new(pool.clone()),
            customers: CustomerRepository::new(pool.clone()),
            products: ProductRepository::new(pool),
        }
    }

    pub async fn list(&self, filter: &LicenseFilter) -> Result<Vec<License>, LicenseError> {
        Ok(self.licenses.list(filter).await?)
    }

    pub async fn get(&self, key: &str) -> Result<License, LicenseError> {
        self.licenses
            .get_by_key(key)
            .await?
            .ok_or(LicenseError::NotFound)
    }

    pub async fn issue(&self, req: &IssueLicense) -> Result<License, LicenseError> {
        if self.customers.get_by_id(req.customer_id).await?.is_none() {
            return Err(LicenseError::CustomerNotFound(req.customer_id));
        }
        if self.products.get_by_id(req.product_id).await?.is_none() {
            return Err(LicenseError::ProductNotFound(req.product_id));
        }

        let now = Utc::now();
        let expires_at = match (req.expires_at, req.valid_days) {
            (Some(at), _) if at <= now => {
                return Err(LicenseError::InvalidInput("expires_at must be in the future".into()));
            }
            (Some(at), _) => Some(at),
            (None, Some(days)) if days > 0 => Some(now + Duration::days(days)),
            (None, Some(_)) => {
                return Err(LicenseError::InvalidInput("valid_days must be positive".into()));
            }
            (None, None) => None,
        };

        let binding = req.device.resolve()?;
        let license_key = self.unused_key().await?;

        let license = self
            .licenses
            .create(&NewLicense {
                license_key,
                customer_id: req.customer_id,
                product_id: req.product_id,
                device_fingerprint: binding.fingerprint,
                hardware_hash: binding.hardware_hash,
                mac_addresses: binding.mac_addresses,
                expires_at,
                notes: req.notes.clone(),
            })
            .await?;

        tracing::info!(
            license = %license.license_key,
            customer_id = license.customer_id,
            product_id = license.product_id,
            floating = license.device_fingerprint.is_none(),
            "License issued"
        );
        Ok(license)
    }

    async fn unused_key(&self) -> Result<String, LicenseError> {
        for _ in 0..KEY_ATTEMPTS {
            let key = generate_license_key();
            if !self.licenses.key_exists(&key).await? {
                return Ok(key);
            }
            tracing::warn!("Generated license key collided, retrying");
        }
        Err(anyhow::anyhow!("Failed to generate a unique license key").into())
    }

    pub async fn change_status(&self, key: &str, action: StatusAction) -> Result<License, LicenseError> {
        let current = self.get(key).await?;
        let target = next_status(&current.status, action)?;

        let updated = self
            .licenses
            .set_status(key, target)
            .await?
            .ok_or(LicenseError::NotFound)?;
        tracing::info!(license = %key, from = %current.status, to = target, "License status changed");
        Ok(updated)
    }

    pub async fn extend(&self, key: &str, req: &ExtendLicense) -> Result<License, LicenseError> {
        let current = self.get(key).await?;
        if current.status == "revoked" {
            return Err(LicenseError::InvalidTransition {
                action: "extend",
                from: current.status,
            });
        }

        let expires_at = extended_expiry(current.expires_at, req, Utc::now())?;
        let updated = self
            .licenses
            .set_expiry(key, expires_at)
            .await?
            .ok_or(LicenseError::NotFound)?;
        tracing::info!(license = %key, expires_at = ?updated.expires_at, "License extended");
        Ok(updated)
    }

    /// Replaces the bound device. An empty binding turns the license into a
    /// floating one.
    pub async fn rebind(&self, key: &str, device: &DeviceBinding) -> Result<License, LicenseError> {
        let current = self.get(key).await?;
        if current.status == "revoked" {
            return Err(LicenseError::InvalidTransition {
                action: "rebind",
                from: current.status,
            });
        }

        let binding = device.resolve()?;
        let updated = self
            .licenses
            .rebind(
                key,
                binding.fingerprint.as_deref(),
                binding.hardware_hash.as_deref(),
                &binding.mac_addresses,
            )
            .await?
            .ok_or(LicenseError::NotFound)?;
        tracing::warn!(
            license = %key,
            previous = ?current.device_fingerprint,
            current = ?updated.device_fingerprint,
            "License rebound to a new device"
        );
        Ok(updated)
    }
}
