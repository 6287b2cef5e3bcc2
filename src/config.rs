use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub intake: IntakeConfig,
    pub discovery: DiscoveryConfig,
    pub points: PointsConfig,
    pub reaper: ReaperConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    /// Upper bound on how long a storage operation may wait on a locked
    /// database before failing with Timeout.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntakeConfig {
    /// Fallback shelf life when neither the donor nor the AI suggestion
    /// provides an expiry.
    pub default_expiry_hours: i64,
    /// AI suggestions below this confidence are ignored during merge.
    pub min_confidence: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    pub default_radius_m: f64,
    pub max_results: usize,
    /// Grid cell edge in degrees for the in-memory spatial index.
    pub cell_size_deg: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PointsConfig {
    pub donation_award: i64,
    pub pickup_award: i64,
    pub feedback_bonus: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaperConfig {
    pub interval_secs: u64,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MEALBRIDGE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: ":memory:".to_string(),
                busy_timeout_ms: 2_000,
            },
            intake: IntakeConfig {
                default_expiry_hours: 12,
                min_confidence: 0.6,
            },
            discovery: DiscoveryConfig {
                default_radius_m: 5_000.0,
                max_results: 50,
                cell_size_deg: 0.05,
            },
            points: PointsConfig {
                donation_award: 50,
                pickup_award: 20,
                feedback_bonus: 10,
            },
            reaper: ReaperConfig { interval_secs: 60 },
        }
    }
}
