use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use health::{HealthHandle, HealthRegistry};

use crate::config::Config;

pub struct AppContext {
    pub pool: PgPool,
    pub liveness: HealthRegistry,
    pub similarity_liveness: HealthHandle,
    pub weights_liveness: HealthHandle,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, sqlx::Error> {
        let options = PgPoolOptions::new().max_connections(config.max_pg_connections);
        let pool = options.connect(&config.database_url).await?;

        let liveness = HealthRegistry::new("liveness");
        let similarity_liveness =
            liveness.register("similarity-consumer", Duration::from_secs(60));
        let weights_liveness = liveness.register("weights-consumer", Duration::from_secs(60));

        Ok(Self {
            pool,
            liveness,
            similarity_liveness,
            weights_liveness,
        })
    }
}
