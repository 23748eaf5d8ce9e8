//! Check Service Demo
//!
//! Runs a check service with stub logic over an in-memory partition of
//! generated check orders, until every order is acknowledged or Ctrl-C.
//!
//! Usage: `check_service_demo [config.json]`. Without a configuration file a
//! built-in one is used. `DEMO_ORDER_COUNT` sets the number of orders.

use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use reactive_tools::config::loader::DEFAULT_CONFIG_FILE;
use reactive_tools::config::{
    ConfigLoader, FeedConfig, LogConfig, PipelineConfig, ServiceConfig, StatisticsConfig,
};
use reactive_tools::logging;
use reactive_tools::service::CheckService;
use reactive_tools::sinks::{LoggingResultPublisher, StubCheckLogic};
use reactive_tools::source::{CheckOrderData, InMemoryPartition, MessageFeed};
use reactive_tools::statistics::{ProviderSet, StatisticProvider, StatisticsSender};

const DEFAULT_ORDER_COUNT: usize = 25;

fn demo_config() -> ServiceConfig {
    ServiceConfig {
        pipeline: PipelineConfig {
            service_id: "check-service-demo".to_string(),
            parallelism: 4,
            ..PipelineConfig::default()
        },
        feed: FeedConfig::new("sku", "has_price"),
        statistics: Some(StatisticsConfig {
            cache_timeout_in_secs: 120,
            send_interval_in_secs: 5,
        }),
        log: LogConfig::default(),
        sql_sink: None,
        kv_sink: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = if Path::new(&config_path).is_file() {
        ConfigLoader::new(&config_path).load()?
    } else {
        demo_config()
    };

    logging::init_with_config(&config.log);

    let order_count = std::env::var("DEMO_ORDER_COUNT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_ORDER_COUNT);

    let orders = InMemoryPartition::with_lag_labels(
        "check_orders",
        &config.feed.operation_name,
        &config.feed.object_type,
    );
    for i in 0..order_count {
        // Every fifth order asks for another check and is filtered out by the feed
        let check_name = if i % 5 == 4 {
            "other_check"
        } else {
            config.feed.operation_name.as_str()
        };
        orders.produce_json(&CheckOrderData::new(
            config.feed.object_type.as_str(),
            check_name,
            i.to_string(),
        ))?;
    }
    orders.close();

    info!(orders = order_count, "Check orders generated");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                cancel.cancel();
            }
        });
    }

    let feed = MessageFeed::<CheckOrderData>::spawn(
        &config.feed,
        orders.subscribe(config.feed.channel_buffer),
        cancel.clone(),
    )?;
    let publisher = Arc::new(LoggingResultPublisher::new());
    let mut service = CheckService::new(
        config.pipeline.clone(),
        feed,
        StubCheckLogic,
        publisher.clone(),
    )?;

    let providers = ProviderSet::new()
        .with(Arc::new(orders.clone()))
        .with(Arc::new(service.statistics_provider()));

    if let Some(statistics) = &config.statistics {
        let topic = InMemoryPartition::new("statistics");
        let sender =
            StatisticsSender::from_config(statistics, Arc::new(providers.clone()), Arc::new(topic))?;
        service = service.with_statistics_sender(sender);
    }

    service.run(cancel).await?;

    for statistic in providers.statistics().await? {
        info!(name = %statistic.name(), value = %statistic.value(), "Final statistic");
    }
    info!(
        published = publisher.published(),
        committed = orders.committed_offset(),
        lag = orders.consumer_lag(),
        "Check service demo finished"
    );

    Ok(())
}
