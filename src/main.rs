use std::env;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use despacho::engine::Engine;
use despacho::error::Error;
use despacho::fraud::{FraudSink, HttpFraudSink, NullFraudSink};
use despacho::gateway::BroadcastGateway;
use despacho::server::{self, DynAPI};
use despacho::sweeps;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = env::var("DATABASE_URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let gateway = Arc::new(BroadcastGateway::new(1024));

    let fraud: Arc<dyn FraudSink> = match env::var("FRAUD_SERVICE_URL") {
        Ok(url) => Arc::new(HttpFraudSink::new(url)),
        Err(_) => Arc::new(NullFraudSink),
    };

    let engine = Engine::new(pool, gateway, fraud).await?;
    let api: DynAPI = Arc::new(engine);

    sweeps::spawn(api.clone());
    server::serve(api).await;

    Ok(())
}
