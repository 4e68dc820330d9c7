use std::path::Path;
use std::sync::Arc;

use gmindd::{
    config::GminddConfig,
    feed::UpdateFeed,
    GminddResult,
};
use gmind_registry::GreenhouseSessions;
use gmind_sched::{
    CommandDispatcher, CommandStore, DeviceClient, GreenhouseCatalog, MqttDeviceClient,
    ScheduleService, SqliteCommandStore,
};
use tracing_appender::rolling;
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

#[actix::main]
async fn main() -> GminddResult<()> {
    LogTracer::init().expect("Unable to set up log tracer");

    let log = rolling::daily("./logs", "gmindd");
    let (nb, _guard) = tracing_appender::non_blocking(log);

    let sub = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(nb)
        .finish();

    tracing::subscriber::set_global_default(sub).expect("Unable to set up tracing subscriber");

    let config_path =
        std::env::var("GMINDD_CONFIG").unwrap_or_else(|_| "./gmindd.toml".to_string());
    let config = GminddConfig::load(Path::new(&config_path))?;

    let store: Arc<dyn CommandStore> =
        Arc::new(SqliteCommandStore::new(&config.database.path)?);
    let catalog: Arc<dyn GreenhouseCatalog> = Arc::new(config.catalog());
    let device: Arc<dyn DeviceClient> = Arc::new(MqttDeviceClient::new(
        &config.mqtt.control_client_id,
        &config.mqtt.host,
        config.mqtt.port,
    ));

    // Scheduling surface for the (out of scope) REST layer to call
    let _schedule = ScheduleService::new(catalog, store.clone());

    let _dispatcher = CommandDispatcher::start(store, device, config.dispatcher_config());

    // Session surface for the (out of scope) socket gateway; the
    // update feed drives its fan-out from the data service's MQTT
    // state stream
    let sessions = GreenhouseSessions::start(config.delivery_timeout());
    let _feed = UpdateFeed::start(&config.mqtt, sessions.publisher());

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");

    Ok(())
}
