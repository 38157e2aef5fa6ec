use ferrotrade_bus::SnapshotEvent;
use ferrotrade_store::{DeploymentStore, SnapshotStore, StorageError};
use ferrotrade_types::{AccountSnapshot, SnapshotType};
use uuid::Uuid;

/// Applies one `snapshots.events` message (`spec.md` §4.L mapping table):
/// insert the row, and if it's the first `balance` snapshot for a deployment
/// that doesn't have one yet, set `starting_balance` from it.
pub async fn apply(
    snapshots: &dyn SnapshotStore,
    deployments: &dyn DeploymentStore,
    event: SnapshotEvent,
) -> Result<(), StorageError> {
    let snapshot_id = Uuid::new_v4();
    let row = AccountSnapshot {
        snapshot_id,
        deployment_id: event.deployment_id,
        timestamp: event.timestamp,
        snapshot_type: event.snapshot_type,
        value: event.value,
    };
    snapshots.insert(&row).await?;

    if event.snapshot_type != SnapshotType::Balance {
        return Ok(());
    }

    let Some(deployment) = deployments.get(event.deployment_id).await? else {
        tracing::info!(
            deployment_id = %event.deployment_id,
            "balance snapshot for unknown deployment, row inserted but starting_balance not set"
        );
        return Ok(());
    };
    if deployment.starting_balance.is_none() {
        deployments
            .set_starting_balance(event.deployment_id, event.value)
            .await?;
    }
    Ok(())
}
