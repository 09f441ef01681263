use anyhow::Result;
use chrono::Duration;

use crate::auth::TokenSigner;
use crate::services::license_service::{compute_fingerprint, generate_license_key};
use crate::settings::Settings;

pub fn issue_admin_token(settings: &Settings, subject: &str, hours: i64) -> Result<()> {
    if hours <= 0 {
        return Err(anyhow::anyhow!("--hours must be positive"));
    }
    let token = TokenSigner::new(&settings.admin_jwt_secret).issue(subject, Duration::hours(hours))?;
    println!("{}", token);
    Ok(())
}

pub fn print_info(settings: &Settings) {
    println!("\n=== KEYGATE INFO ===");
    println!("Version:       {}", env!("CARGO_PKG_VERSION"));
    println!("Listen port:   {}", settings.listen_port);
    println!("Validate URL:  <YOUR_DOMAIN>/api/v1/licenses/validate");
    println!("Admin API:     <YOUR_DOMAIN>/api/admin (Bearer token)");
    println!("Redis URL:     {}", settings.redis_url);
    println!(
        "GeoIP DB:      {}",
        settings.geoip_db_path.as_deref().unwrap_or("(none, ip-api.com fallback)")
    );
    println!(
        "Rate limit:    {} req / {}s, block after {} failures for {}s",
        settings.rate_limit.requests_per_window,
        settings.rate_limit.window_secs,
        settings.rate_limit.failure_threshold,
        settings.rate_limit.block_ttl_secs
    );
    println!(
        "Proxies:       {}",
        if settings.trusted_proxies.is_empty() {
            "(none, forwarding headers ignored)".to_string()
        } else {
            settings
                .trusted_proxies
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!("====================\n");
}

pub fn generate_keys(count: usize) {
    for _ in 0..count.max(1) {
        println!("{}", generate_license_key());
    }
}

pub fn print_fingerprint(hardware_hash: &str, mac_addresses: &[String], computer_name: &str) {
    println!("{}", compute_fingerprint(hardware_hash, mac_addresses, computer_name));
}
