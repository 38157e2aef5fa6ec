use std::path::PathBuf;
use std::sync::Arc;

use ferrotrade_broker::Broker;
use ferrotrade_bus::EventBus;
use ferrotrade_execution::{LiveBroker, LiveBrokerConfig};
use ferrotrade_strategy::StrategyRegistry;
use uuid::Uuid;

use crate::commands::{instantiate, register_dsl_strategy};
use crate::config::StoreHandles;
use crate::CliError;

/// Credentials for the deployment's broker connection. Resolving these from
/// a `broker_connections` row (OAuth negotiation, secret storage) is out of
/// scope (`spec.md` §1); the CLI takes them directly so `deployment run` is
/// runnable standalone.
#[derive(Debug, Clone)]
pub struct BrokerCredentials {
    pub base_url: url::Url,
    pub api_key: String,
    pub api_secret: String,
    pub source: String,
    pub rate_limit_per_minute: u32,
}

/// `deployment run --deployment-id UUID` (`spec.md` §6, §4.K): runs one
/// deployment's strategy/control race to a terminal status.
///
/// Returns the process exit code the spec calls for: 0 on a clean `stopped`
/// transition, 1 on `error`.
pub async fn run(
    handles: StoreHandles,
    bus: Arc<dyn EventBus>,
    deployment_id: Uuid,
    strategy_dsl_path: Option<PathBuf>,
    credentials: BrokerCredentials,
) -> Result<i32, CliError> {
    let record = handles
        .stores
        .deployments()
        .get(deployment_id)
        .await?
        .ok_or(CliError::DeploymentNotFound(deployment_id))?;

    let mut registry = StrategyRegistry::new();
    if let Some(path) = &strategy_dsl_path {
        register_dsl_strategy(&mut registry, record.strategy_id, path)?;
    }
    let strategy = instantiate(&registry, record.strategy_id, deployment_id)?;

    let broker_config = LiveBrokerConfig {
        base_url: credentials.base_url,
        api_key: credentials.api_key,
        api_secret: credentials.api_secret,
        account_id: record.broker_connection_id.to_string().into(),
        source: credentials.source.into(),
        rate_limit_per_minute: credentials.rate_limit_per_minute,
    }
    .default_rate_limit();

    let broker: Arc<dyn Broker> = Arc::new(LiveBroker::new(broker_config, bus.clone()));

    let runtime = ferrotrade_deployment::DeploymentRuntime::new(handles.stores.clone(), bus);
    let status = runtime.run(deployment_id, strategy, broker).await?;

    tracing::info!(%deployment_id, ?status, "deployment run finished");
    Ok(if status.is_terminal() && status == ferrotrade_types::DeploymentStatus::Stopped {
        0
    } else {
        1
    })
}
