//! Azure CLI backed implementation of [`CloudAdapter`]
//!
//! Covers:
//! - resource group existence check / creation
//! - ARM template deployment and output extraction
//! - function key listing
//! - zip deployment (az identity or Kudu publish credential)
//! - log streaming

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::cloud::{CloudAdapter, DeployAuth, TemplateOutputs, TemplateParameters};
use crate::command::{self, CommandError};

const AZ: &str = "az";

/// Upload can include a remote build, which is slow
const UPLOAD_TIMEOUT_SECS: u64 = 600;

/// Response of `az functionapp keys list`
#[derive(Debug, Deserialize)]
struct FunctionAppKeys {
    #[serde(rename = "functionKeys", default)]
    function_keys: BTreeMap<String, String>,
}

/// Azure CLI adapter
pub struct AzCli {
    client: reqwest::Client,
}

impl AzCli {
    pub fn new() -> Result<Self, CommandError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    fn deployment_name() -> String {
        format!("azfn-deploy-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"))
    }

    /// Kudu zipdeploy endpoint of a function app
    pub fn zipdeploy_url(function_app: &str) -> String {
        format!(
            "https://{}.scm.azurewebsites.net/api/zipdeploy?isAsync=false",
            function_app
        )
    }

    async fn upload_with_credential(
        &self,
        function_app: &str,
        archive: &Path,
        username: &str,
        password: &str,
    ) -> Result<(), CommandError> {
        let url = Self::zipdeploy_url(function_app);
        let body = tokio::fs::read(archive).await?;
        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .header(CONTENT_TYPE, "application/zip")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(CommandError::Failed {
            command: format!("POST {}", url),
            exit_code: i32::from(status.as_u16()),
            stderr: format!("zipdeploy returned {}: {}", status, text.trim()),
        })
    }
}

#[async_trait]
impl CloudAdapter for AzCli {
    async fn select_subscription(&self, subscription: &str) -> Result<(), CommandError> {
        command::run(AZ, &["account", "set", "--subscription", subscription]).await?;
        Ok(())
    }

    async fn resource_group_exists(&self, name: &str) -> Result<bool, CommandError> {
        let output = command::run(AZ, &["group", "exists", "--name", name]).await?;
        match output.stdout.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(CommandError::Parse {
                command: output.command.clone(),
                reason: format!("expected true/false, got `{}`", other),
            }),
        }
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<(), CommandError> {
        info!("Creating resource group {} in {}", name, location);
        command::run(
            AZ,
            &["group", "create", "--name", name, "--location", location, "--output", "none"],
        )
        .await?;
        Ok(())
    }

    async fn apply_template(
        &self,
        resource_group: &str,
        template: &Path,
        parameters: &TemplateParameters,
    ) -> Result<TemplateOutputs, CommandError> {
        let deployment_name = Self::deployment_name();
        let template = template.to_string_lossy();
        let pairs = parameters.as_cli_pairs();

        let mut args = vec![
            "deployment",
            "group",
            "create",
            "--resource-group",
            resource_group,
            "--name",
            deployment_name.as_str(),
            "--template-file",
            &*template,
            "--parameters",
        ];
        args.extend(pairs.iter().map(String::as_str));
        args.extend(["--query", "properties.outputs", "--output", "json"]);

        let output = command::run(AZ, &args).await?;
        if output.stdout.trim().is_empty() || output.stdout.trim() == "null" {
            return Ok(TemplateOutputs::default());
        }
        let outputs: Map<String, Value> = output.json()?;
        Ok(TemplateOutputs::new(outputs))
    }

    async fn list_function_keys(
        &self,
        resource_group: &str,
        function_app: &str,
    ) -> Result<BTreeMap<String, String>, CommandError> {
        let output = command::run(
            AZ,
            &[
                "functionapp",
                "keys",
                "list",
                "--name",
                function_app,
                "--resource-group",
                resource_group,
                "--output",
                "json",
            ],
        )
        .await?;
        let keys: FunctionAppKeys = output.json()?;
        Ok(keys.function_keys)
    }

    async fn deploy_package(
        &self,
        resource_group: &str,
        function_app: &str,
        archive: &Path,
        auth: &DeployAuth,
    ) -> Result<(), CommandError> {
        match auth {
            DeployAuth::Identity => {
                let src = archive.to_string_lossy();
                let timeout = UPLOAD_TIMEOUT_SECS.to_string();
                command::run(
                    AZ,
                    &[
                        "functionapp",
                        "deployment",
                        "source",
                        "config-zip",
                        "--resource-group",
                        resource_group,
                        "--name",
                        function_app,
                        "--src",
                        &*src,
                        "--build-remote",
                        "true",
                        "--timeout",
                        timeout.as_str(),
                    ],
                )
                .await?;
                Ok(())
            }
            DeployAuth::PublishCredential { username, password } => {
                self.upload_with_credential(function_app, archive, username, password)
                    .await
            }
        }
    }

    async fn tail_logs(&self, resource_group: &str, function_app: &str) -> Result<(), CommandError> {
        command::run_attached(
            AZ,
            &["webapp", "log", "tail", "--name", function_app, "--resource-group", resource_group],
        )
        .await
    }
}
