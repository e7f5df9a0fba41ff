//! Server configuration, read from `MPG_*` environment variables with sensible defaults.

use std::{env, net::IpAddr, str::FromStr};

use chrono::Duration;
use log::*;
use mpg_common::{crypto, crypto::EncryptionKey, helpers::parse_boolean_flag, Money, Secret};
use rust_decimal::Decimal;
use settlement_engine::fees::FeeDefaults;

const DEFAULT_MPG_HOST: &str = "127.0.0.1";
const DEFAULT_MPG_PORT: u16 = 8360;
const DEFAULT_RETRY_COOLDOWN: Duration = Duration::seconds(300);
const DEFAULT_NOTIFIER_TIMEOUT: Duration = Duration::seconds(10);
const DEFAULT_AUTH_MAX_SKEW: Duration = Duration::seconds(300);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// The key under which merchant webhook secrets are encrypted at rest.
    pub encryption_key: EncryptionKey,
    /// How long a merchant must wait before retrying a failed withdrawal with the same order id.
    pub retry_cooldown: Duration,
    /// Per-request timeout for outbound merchant notifications.
    pub notifier_timeout: Duration,
    /// Maximum allowed clock skew on the merchant API's signed `x-timestamp` header.
    pub auth_max_skew: Duration,
    pub provider: ProviderConfig,
    pub fees: FeeConfig,
}

/// Inbound-provider settings: the RSA public key used to verify webhook signatures and an
/// optional IP allow-list for the webhook routes.
#[derive(Clone, Debug, Default)]
pub struct ProviderConfig {
    /// Base64-encoded DER (PKCS#8/SPKI) public key.
    pub public_key: Secret<String>,
    /// If supplied, webhook requests are checked against this list. To explicitly disable the
    /// allow-list, set MPG_PROVIDER_IP_ALLOWLIST to "false", "none", or "0".
    pub allowlist: Option<Vec<IpAddr>>,
}

#[derive(Clone, Debug)]
pub struct FeeConfig {
    pub percentage: Decimal,
    pub cap: Money,
}

impl Default for FeeConfig {
    fn default() -> Self {
        let d = FeeDefaults::default();
        Self { percentage: d.percentage, cap: d.cap }
    }
}

impl FeeConfig {
    pub fn fee_defaults(&self) -> FeeDefaults {
        FeeDefaults { percentage: self.percentage, cap: self.cap, ..Default::default() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPG_HOST.to_string(),
            port: DEFAULT_MPG_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            encryption_key: [0u8; 32],
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            notifier_timeout: DEFAULT_NOTIFIER_TIMEOUT,
            auth_max_skew: DEFAULT_AUTH_MAX_SKEW,
            provider: ProviderConfig::default(),
            fees: FeeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPG_HOST").ok().unwrap_or_else(|| DEFAULT_MPG_HOST.into());
        let port = env::var("MPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPG_PORT. {e} Using the default, {DEFAULT_MPG_PORT}, instead."
                    );
                    DEFAULT_MPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPG_PORT);
        let database_url = env::var("MPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("MPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("MPG_USE_FORWARDED").ok(), false);
        let encryption_key = configure_encryption_key();
        let retry_cooldown = duration_from_env("MPG_RETRY_COOLDOWN", DEFAULT_RETRY_COOLDOWN);
        let notifier_timeout = duration_from_env("MPG_NOTIFIER_TIMEOUT", DEFAULT_NOTIFIER_TIMEOUT);
        let auth_max_skew = duration_from_env("MPG_AUTH_MAX_SKEW", DEFAULT_AUTH_MAX_SKEW);
        let provider = ProviderConfig::from_env_or_default();
        let fees = FeeConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            encryption_key,
            retry_cooldown,
            notifier_timeout,
            auth_max_skew,
            provider,
            fees,
        }
    }
}

impl ProviderConfig {
    pub fn from_env_or_default() -> Self {
        let public_key = env::var("MPG_PROVIDER_PUBLIC_KEY").ok().unwrap_or_else(|| {
            error!(
                "🪛️ MPG_PROVIDER_PUBLIC_KEY is not set. Inbound webhook signatures cannot be verified and every \
                 provider event will be rejected."
            );
            String::default()
        });
        let allowlist = env::var("MPG_PROVIDER_IP_ALLOWLIST").ok().and_then(|s| {
            if ["none", "false", "0"].contains(&s.to_lowercase().as_str()) {
                info!(
                    "🪛️ The provider IP allow-list is disabled. If this is not what you want, set \
                     MPG_PROVIDER_IP_ALLOWLIST to a comma-separated list of IP addresses to enable it."
                );
                return None;
            }
            let ip_addrs = s
                .split(',')
                .filter_map(|s| {
                    IpAddr::from_str(s.trim())
                        .map_err(|e| {
                            warn!("🪛️ Ignoring invalid IP address ({s}) in MPG_PROVIDER_IP_ALLOWLIST: {e}");
                        })
                        .ok()
                })
                .collect::<Vec<IpAddr>>();
            Some(ip_addrs)
        });
        match &allowlist {
            Some(list) if list.is_empty() => {
                warn!(
                    "🚨️ The provider IP allow-list was configured, but is empty. The server will run, but won't \
                     accept any inbound webhooks."
                );
            },
            None => {
                info!("🪛️ No provider IP allow-list is set. Only signature validation will be used.");
            },
            Some(list) => {
                let addrs = list.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Provider IP allow-list: {addrs}");
            },
        }
        Self { public_key: Secret::new(public_key), allowlist }
    }

    pub fn ip_is_allowed(&self, ip: Option<IpAddr>) -> bool {
        match (&self.allowlist, ip) {
            (None, _) => true,
            (Some(list), Some(ip)) => list.contains(&ip),
            (Some(_), None) => false,
        }
    }
}

impl FeeConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let percentage = env::var("MPG_FEE_PERCENTAGE")
            .ok()
            .and_then(|s| {
                Decimal::from_str(&s)
                    .map_err(|e| warn!("🪛️ Invalid value for MPG_FEE_PERCENTAGE ({s}): {e}"))
                    .ok()
            })
            .unwrap_or(defaults.percentage);
        let cap = env::var("MPG_FEE_CAP")
            .ok()
            .and_then(|s| s.parse::<Money>().map_err(|e| warn!("🪛️ Invalid value for MPG_FEE_CAP ({s}): {e}")).ok())
            .unwrap_or(defaults.cap);
        Self { percentage, cap }
    }
}

fn duration_from_env(var: &str, default: Duration) -> Duration {
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default value of {} s.", default.num_seconds()))
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::seconds)
                .map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}"))
        })
        .ok()
        .unwrap_or(default)
}

/// Loads the at-rest encryption key from MPG_ENCRYPTION_KEY (64 hex characters). If it is
/// missing or malformed an ephemeral key is generated so the server can still start, with a
/// loud warning that stored merchant secrets will be unreadable.
fn configure_encryption_key() -> EncryptionKey {
    match env::var("MPG_ENCRYPTION_KEY").ok().and_then(|s| {
        let bytes = hex::decode(s.trim()).ok()?;
        EncryptionKey::try_from(bytes.as_slice()).ok()
    }) {
        Some(key) => key,
        None => {
            warn!(
                "🚨️ MPG_ENCRYPTION_KEY is not set or is not 64 hex characters. A random ephemeral key has been \
                 generated; merchant secrets encrypted under previous keys CANNOT be decrypted, and this key will \
                 not survive a restart."
            );
            crypto::generate_key()
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fee_config_defaults_match_the_platform_defaults() {
        let fees = FeeConfig::default();
        assert_eq!(fees.percentage, Decimal::new(15, 1));
        assert_eq!(fees.cap, Money::from_major(500));
        let d = fees.fee_defaults();
        assert_eq!(d.withdrawal_tiers.len(), 3);
    }

    #[test]
    fn allowlist_checks() {
        let open = ProviderConfig { public_key: Secret::default(), allowlist: None };
        assert!(open.ip_is_allowed(None));
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        let restricted = ProviderConfig { public_key: Secret::default(), allowlist: Some(vec![ip]) };
        assert!(restricted.ip_is_allowed(Some(ip)));
        assert!(!restricted.ip_is_allowed(Some("10.9.9.9".parse().unwrap())));
        assert!(!restricted.ip_is_allowed(None));
    }
}
