use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_hold_duration")]
    pub hold_duration_seconds: u64,
    #[serde(default = "default_payment_expiry")]
    pub payment_expiry_seconds: u64,
    #[serde(default = "default_idempotency_ttl")]
    pub idempotency_ttl_seconds: i64,
    #[serde(default = "default_seat_table_ttl")]
    pub seat_table_ttl_seconds: u64,
    #[serde(default = "default_reaper_period")]
    pub reaper_period_seconds: u64,
    #[serde(default = "default_max_seats")]
    pub max_seats_per_booking: usize,
    #[serde(default = "default_reaper_batch")]
    pub reaper_batch_size: i64,
}

fn default_hold_duration() -> u64 {
    600
}
fn default_payment_expiry() -> u64 {
    900
}
fn default_idempotency_ttl() -> i64 {
    86_400
}
fn default_seat_table_ttl() -> u64 {
    604_800
}
fn default_reaper_period() -> u64 {
    60
}
fn default_max_seats() -> usize {
    10
}
fn default_reaper_batch() -> i64 {
    100
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            hold_duration_seconds: default_hold_duration(),
            payment_expiry_seconds: default_payment_expiry(),
            idempotency_ttl_seconds: default_idempotency_ttl(),
            seat_table_ttl_seconds: default_seat_table_ttl(),
            reaper_period_seconds: default_reaper_period(),
            max_seats_per_booking: default_max_seats(),
            reaper_batch_size: default_reaper_batch(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_defaults_match_the_operational_envelope() {
        let rules = BusinessRules::default();
        assert_eq!(rules.hold_duration_seconds, 600);
        assert_eq!(rules.payment_expiry_seconds, 900);
        assert_eq!(rules.idempotency_ttl_seconds, 86_400);
        assert_eq!(rules.seat_table_ttl_seconds, 604_800);
        assert_eq!(rules.reaper_period_seconds, 60);
        assert_eq!(rules.max_seats_per_booking, 10);
    }
}
