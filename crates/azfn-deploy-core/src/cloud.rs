//! Cloud adapter seam
//!
//! The pipeline only talks to Azure through [`CloudAdapter`], so the
//! orchestration can run against an in-memory fake.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::command::CommandError;

/// Parameters handed to the infrastructure template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateParameters {
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub location: String,
    #[serde(rename = "openAILocation")]
    pub openai_location: String,
}

impl TemplateParameters {
    /// `name=value` pairs in the form `az deployment group create --parameters` takes
    pub fn as_cli_pairs(&self) -> Vec<String> {
        vec![
            format!("projectName={}", self.project_name),
            format!("location={}", self.location),
            format!("openAILocation={}", self.openai_location),
        ]
    }
}

/// Named outputs of a template deployment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateOutputs(Map<String, Value>);

impl TemplateOutputs {
    pub fn new(outputs: Map<String, Value>) -> Self {
        Self(outputs)
    }

    /// String value of an output. Accepts both the ARM shape
    /// `{"type": "String", "value": "..."}` and a bare string.
    pub fn get_string(&self, name: &str) -> Option<String> {
        let value = self.0.get(name)?;
        let inner = match value {
            Value::Object(obj) => obj.get("value")?,
            other => other,
        };
        inner
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl FromIterator<(String, String)> for TemplateOutputs {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let map = iter
            .into_iter()
            .map(|(k, v)| (k, serde_json::json!({ "type": "String", "value": v })))
            .collect();
        Self(map)
    }
}

/// How the archive upload authenticates
#[derive(Clone, PartialEq, Eq)]
pub enum DeployAuth {
    /// The signed-in `az` session
    Identity,
    /// Publish credential from the function app's publish profile
    PublishCredential { username: String, password: String },
}

impl DeployAuth {
    pub fn describe(&self) -> &'static str {
        match self {
            DeployAuth::Identity => "azure identity",
            DeployAuth::PublishCredential { .. } => "publish credential",
        }
    }
}

impl std::fmt::Debug for DeployAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployAuth::Identity => write!(f, "Identity"),
            DeployAuth::PublishCredential { username, .. } => f
                .debug_struct("PublishCredential")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Whether `create_resource_group_if_absent` had to create the group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Created,
    AlreadyExists,
}

/// Operations the pipeline needs from the cloud
#[async_trait]
pub trait CloudAdapter: Send + Sync {
    async fn select_subscription(&self, subscription: &str) -> Result<(), CommandError>;

    async fn resource_group_exists(&self, name: &str) -> Result<bool, CommandError>;

    async fn create_resource_group(&self, name: &str, location: &str) -> Result<(), CommandError>;

    /// Existence check first; creation only when the group is missing
    async fn create_resource_group_if_absent(
        &self,
        name: &str,
        location: &str,
    ) -> Result<GroupStatus, CommandError> {
        if self.resource_group_exists(name).await? {
            Ok(GroupStatus::AlreadyExists)
        } else {
            self.create_resource_group(name, location).await?;
            Ok(GroupStatus::Created)
        }
    }

    async fn apply_template(
        &self,
        resource_group: &str,
        template: &Path,
        parameters: &TemplateParameters,
    ) -> Result<TemplateOutputs, CommandError>;

    /// Function keys of the app, by key name
    async fn list_function_keys(
        &self,
        resource_group: &str,
        function_app: &str,
    ) -> Result<BTreeMap<String, String>, CommandError>;

    async fn deploy_package(
        &self,
        resource_group: &str,
        function_app: &str,
        archive: &Path,
        auth: &DeployAuth,
    ) -> Result<(), CommandError>;

    /// Stream the app's log output until interrupted
    async fn tail_logs(&self, resource_group: &str, function_app: &str) -> Result<(), CommandError>;
}
