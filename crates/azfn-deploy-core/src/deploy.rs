//! Artifact upload stage

use std::time::Duration;
use tracing::{info, warn};

use crate::cloud::{CloudAdapter, DeployAuth};
use crate::error::{DeployError, Result};
use crate::package::DeploymentArtifact;

/// Upload the archive as the function app's new deployment, then wait `settle`
/// for the platform to activate it.
///
/// One attempt only. The artifact is consumed and deleted whether or not the
/// upload succeeds.
pub async fn deploy(
    cloud: &dyn CloudAdapter,
    resource_group: &str,
    function_app: &str,
    artifact: DeploymentArtifact,
    auth: &DeployAuth,
    settle: Duration,
) -> Result<()> {
    info!(
        "Uploading {} ({} bytes) to {} using {}",
        artifact.path().display(),
        artifact.stats().bytes,
        function_app,
        auth.describe()
    );

    let upload = cloud
        .deploy_package(resource_group, function_app, artifact.path(), auth)
        .await;

    if let Err(e) = artifact.discard() {
        warn!("Failed to delete deployment archive: {}", e);
    }

    upload.map_err(|e| DeployError::Deployment(e.to_string()))?;

    if !settle.is_zero() {
        info!("Waiting {}s for {} to settle", settle.as_secs(), function_app);
        tokio::time::sleep(settle).await;
    }
    Ok(())
}
