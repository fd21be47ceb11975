//! Infrastructure provisioning stage

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::cloud::{CloudAdapter, GroupStatus, TemplateOutputs, TemplateParameters};
use crate::error::{DeployError, Result};
use crate::params::DeploymentConfig;

/// Template outputs every deployment must return
pub const REQUIRED_OUTPUTS: [&str; 4] = [
    "functionAppName",
    "functionUrl",
    "storageAccountName",
    "fileShareName",
];

/// Everything later stages need to know about the provisioned resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningResult {
    pub function_app_name: String,
    pub function_url: String,
    pub storage_account_name: String,
    pub file_share_name: String,
    #[serde(skip_serializing)]
    pub function_app_key: String,
}

fn required_output(outputs: &TemplateOutputs, name: &str) -> Result<String> {
    outputs
        .get_string(name)
        .ok_or_else(|| DeployError::MissingOutput(name.to_string()))
}

/// Prefer the `default` function key, else the first one listed
fn pick_function_key(mut keys: std::collections::BTreeMap<String, String>) -> Option<String> {
    keys.remove("default")
        .or_else(|| keys.into_values().next())
        .filter(|k| !k.is_empty())
}

/// Ensure the resource group, apply the template and collect its outputs.
///
/// Safe to run repeatedly with the same config: an existing group is reused and
/// the template apply itself is idempotent on the Azure side.
pub async fn provision(
    cloud: &dyn CloudAdapter,
    config: &DeploymentConfig,
    template: &Path,
) -> Result<ProvisioningResult> {
    if !template.is_file() {
        return Err(DeployError::Provisioning(format!(
            "template file {} not found (pass --template or set templateFile in the config)",
            template.display()
        )));
    }

    if let Some(subscription) = &config.subscription_id {
        info!("Selecting subscription {}", subscription);
        cloud
            .select_subscription(subscription)
            .await
            .map_err(|e| DeployError::Provisioning(e.to_string()))?;
    }

    match cloud
        .create_resource_group_if_absent(&config.resource_group, &config.location)
        .await
        .map_err(|e| DeployError::Provisioning(e.to_string()))?
    {
        GroupStatus::Created => info!("Created resource group {}", config.resource_group),
        GroupStatus::AlreadyExists => info!("Using existing resource group {}", config.resource_group),
    }

    let parameters = TemplateParameters {
        project_name: config.project_name.clone(),
        location: config.location.clone(),
        openai_location: config.secondary_location.clone(),
    };
    info!("Applying template {} to {}", template.display(), config.resource_group);
    let outputs = cloud
        .apply_template(&config.resource_group, template, &parameters)
        .await
        .map_err(|e| DeployError::Provisioning(e.to_string()))?;

    let function_app_name = required_output(&outputs, REQUIRED_OUTPUTS[0])?;
    let function_url = required_output(&outputs, REQUIRED_OUTPUTS[1])?;
    let storage_account_name = required_output(&outputs, REQUIRED_OUTPUTS[2])?;
    let file_share_name = required_output(&outputs, REQUIRED_OUTPUTS[3])?;

    let keys = cloud
        .list_function_keys(&config.resource_group, &function_app_name)
        .await
        .map_err(|e| DeployError::Provisioning(e.to_string()))?;
    let function_app_key = pick_function_key(keys).ok_or_else(|| {
        DeployError::Provisioning(format!(
            "function app {} returned no function keys",
            function_app_name
        ))
    })?;

    Ok(ProvisioningResult {
        function_app_name,
        function_url,
        storage_account_name,
        file_share_name,
        function_app_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn keys(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_pick_function_key() {
        assert_eq!(
            pick_function_key(keys(&[("alpha", "a"), ("default", "d")])).as_deref(),
            Some("d")
        );
        assert_eq!(pick_function_key(keys(&[("alpha", "a")])).as_deref(), Some("a"));
        assert_eq!(pick_function_key(keys(&[])), None);
        assert_eq!(pick_function_key(keys(&[("default", "")])), None);
    }

    #[test]
    fn test_required_output_missing() {
        let outputs: TemplateOutputs = [("functionUrl".to_string(), "https://x".to_string())]
            .into_iter()
            .collect();
        assert_eq!(required_output(&outputs, "functionUrl").unwrap(), "https://x");
        assert!(matches!(
            required_output(&outputs, "functionAppName"),
            Err(DeployError::MissingOutput(ref n)) if n == "functionAppName"
        ));
    }

    #[test]
    fn test_key_is_not_serialized() {
        let result = ProvisioningResult {
            function_app_name: "app".into(),
            function_url: "https://app/api/chat".into(),
            storage_account_name: "st".into(),
            file_share_name: "share".into(),
            function_app_key: "secret".into(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("functionAppName"));
        assert!(!json.contains("secret"));
    }
}
