//! Periodic reconciliation: reproject every project from the database
//! into the cluster, then collect namespaces nothing backs anymore.

use std::collections::HashSet;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::Core;

const SYNC_PERIOD: Duration = Duration::from_secs(60);
const PAGE_SIZE: i64 = 1000;

/// Fixed-delay scheduling: the next tick starts only after the previous
/// one finished, so ticks never overlap.
pub fn spawn_sync(core: Core, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("kubernetes sync loop stopped");
                    return;
                }
                _ = run_sync_tick(&core) => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("kubernetes sync loop stopped");
                    return;
                }
                _ = tokio::time::sleep(SYNC_PERIOD) => {}
            }
        }
    })
}

pub async fn run_sync_tick(core: &Core) {
    info!("kubernetes sync started");

    let mut checked: HashSet<String> = HashSet::new();
    let mut offset = 0;
    loop {
        let projects = match core.projects.find_all(PAGE_SIZE, offset).await {
            Ok(projects) => projects,
            Err(err) => {
                error!(error = %err, "failed to retrieve projects");
                return;
            }
        };
        let page_len = projects.len() as i64;

        for project in projects {
            checked.insert(project.id.clone());
            sync_project(core, &project.id).await;
        }

        if page_len < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }

    core.projects.remove_orphan_namespaces(&checked).await;

    info!("kubernetes sync finished");
}

/// The namespace step gates the rest: without a namespace nothing else
/// for the project can be applied. Later steps fail independently.
async fn sync_project(core: &Core, project_id: &str) {
    if let Err(err) = core.projects.sync_kubernetes(project_id).await {
        error!(error = %err, project = %project_id, "project sync failed, skipping");
        return;
    }
    if let Err(err) = core.registries.sync_kubernetes(project_id).await {
        error!(error = %err, project = %project_id, "registries sync failed");
    }
    if let Err(err) = core.services.sync_kubernetes(project_id).await {
        error!(error = %err, project = %project_id, "services sync failed");
    }
    if let Err(err) = core.managed_services.sync_kubernetes(project_id).await
    {
        error!(error = %err, project = %project_id, "managed services sync failed");
    }
}
