use async_trait::async_trait;
use maxminddb::{Reader, geoip2};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const CACHE_TTL: Duration = Duration::from_secs(86400);
const API_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// ISO-3166 alpha-2 code, `None` when the address cannot be resolved.
    async fn country_code(&self, ip: IpAddr) -> Option<String>;
}

/// Loopback, private and link-local addresses never reach a geo database.
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_local_ip(IpAddr::V4(v4)))
        }
    }
}

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(rename = "countryCode", default)]
    country_code: Option<String>,
}

/// MaxMind database first, ip-api.com as fallback, results cached for a day.
pub struct GeoService {
    reader: Option<Arc<Reader<Vec<u8>>>>,
    http: reqwest::Client,
    cache: Arc<Mutex<HashMap<IpAddr, (String, Instant)>>>,
}

impl GeoService {
    pub fn new(db_path: Option<&str>) -> Self {
        let reader = if let Some(path) = db_path {
            match Reader::open_readfile(path) {
                Ok(r) => Some(Arc::new(r)),
                Err(e) => {
                    tracing::warn!("Failed to open GeoIP DB at {}: {}", path, e);
                    None
                }
            }
        } else {
            None
        };

        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            reader,
            http,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lookup_database(&self, ip: IpAddr) -> Option<String> {
        let reader = self.reader.as_ref()?;
        match reader.lookup::<geoip2::Country>(ip) {
            Ok(record) => record
                .country
                .and_then(|c| c.iso_code)
                .map(|code| code.to_uppercase()),
            Err(e) => {
                tracing::debug!("GeoIP DB has no entry for {}: {}", ip, e);
                None
            }
        }
    }

    async fn lookup_api(&self, ip: IpAddr) -> Option<String> {
        let url = format!("http://ip-api.com/json/{}?fields=status,countryCode", ip);
        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("GeoIP API failed for {}: {}", ip, e);
                return None;
            }
        };

        match resp.json::<IpApiResponse>().await {
            Ok(body) if body.status == "success" => body.country_code.map(|c| c.to_uppercase()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("GeoIP API returned an unreadable body for {}: {}", ip, e);
                None
            }
        }
    }
}

#[async_trait]
impl GeoLookup for GeoService {
    async fn country_code(&self, ip: IpAddr) -> Option<String> {
        {
            let mut cache = self.cache.lock().await;
            if let Some((code, ts)) = cache.get(&ip) {
                if ts.elapsed() < CACHE_TTL {
                    return Some(code.clone());
                }
                cache.remove(&ip);
            }
        }

        let code = match self.lookup_database(ip) {
            Some(code) => Some(code),
            None => self.lookup_api(ip).await,
        }?;

        self.cache
            .lock()
            .await
            .insert(ip, (code.clone(), Instant::now()));
        Some(code)
    }
}
