use cinder_net::{SearchServer, ServerConfig};
use cinder_search::{SaConfig, SaController, Unconstrained};
use cinder_types::{ratios_to_tokens, Bound, RangeTable, DEFAULT_STEP};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let dims: usize = env_or("CINDER_DIMS", 1);
    let min_ratio: f64 = env_or("CINDER_MIN_RATIO", 0.0);
    let max_ratio: f64 = env_or("CINDER_MAX_RATIO", 0.9);
    let init_ratio: f64 = env_or("CINDER_INIT_RATIO", min_ratio);

    let config = ServerConfig {
        host: std::env::var("CINDER_HOST").unwrap_or_default(),
        port: env_or("CINDER_PORT", 8180),
        max_client_num: env_or("CINDER_MAX_CLIENTS", 10),
        search_steps: env_or("CINDER_SEARCH_STEPS", 300),
        key: std::env::var("CINDER_KEY").unwrap_or_else(|_| "cinder".to_string()),
    };
    let sa = SaConfig::default()
        .with_temperature(
            env_or("CINDER_INIT_TEMPERATURE", 100.0),
            env_or("CINDER_REDUCE_RATE", 0.85),
        )
        .with_max_try_number(env_or("CINDER_MAX_TRY_NUMBER", 300));

    let table = RangeTable::new(
        Bound::Scalar(min_ratio),
        Bound::Scalar(max_ratio),
        dims,
        DEFAULT_STEP,
    )?;
    let init_tokens = ratios_to_tokens(&vec![init_ratio; dims], DEFAULT_STEP);
    let controller = SaController::new(table, init_tokens, sa, Box::new(Unconstrained))?;

    let server = SearchServer::start(config, controller).await?;
    println!("cinder search service listening on {}", server.addr());

    tokio::signal::ctrl_c().await?;
    Ok(())
}
