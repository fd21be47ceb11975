//! In-memory fakes for the pipeline's collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use azfn_deploy_core::ci::TriggerEvent;
use azfn_deploy_core::smoke::ProbeError;
use azfn_deploy_core::{
    CiContext, CloudAdapter, CommandError, DeployAuth, DeployFlags, Defaults, Environment,
    PipelineSettings, Provider, ReleaseRecord, ReleaseRecorder, SmokeProbe, TemplateOutputs,
    TemplateParameters, Toolchain,
};

pub const FUNCTION_URL: &str = "https://copilot01-func.azurewebsites.net/api/businessinsightbot_function";
pub const FUNCTION_KEY: &str = "s3cr3t-key==";

pub struct FakeToolchain {
    pub tools: HashSet<String>,
    pub signed_in: HashSet<Provider>,
}

impl FakeToolchain {
    pub fn ready() -> Self {
        Self {
            tools: ["az", "gh"].iter().map(|s| s.to_string()).collect(),
            signed_in: [Provider::Azure, Provider::GitHub].into_iter().collect(),
        }
    }

    pub fn without_tool(tool: &str) -> Self {
        let mut toolchain = Self::ready();
        toolchain.tools.remove(tool);
        toolchain
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    fn find_tool(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    async fn is_authenticated(&self, provider: Provider) -> Result<bool, CommandError> {
        Ok(self.signed_in.contains(&provider))
    }

    async fn login(&self, _provider: Provider) -> Result<(), CommandError> {
        Ok(())
    }
}

/// Cloud fake that remembers every call and mimics Azure's "group already
/// exists" failure if creation is attempted twice
pub struct FakeCloud {
    pub calls: Mutex<Vec<String>>,
    pub groups: Mutex<HashSet<String>>,
    pub outputs: TemplateOutputs,
    pub template_error: Option<String>,
    pub keys: BTreeMap<String, String>,
    pub upload_error: Option<String>,
    /// Entries of the archive seen by `deploy_package`
    pub uploaded: Mutex<Option<BTreeMap<String, Vec<u8>>>>,
    pub uploaded_path: Mutex<Option<PathBuf>>,
}

pub fn full_outputs() -> TemplateOutputs {
    [
        ("functionAppName", "copilot01-func"),
        ("functionUrl", FUNCTION_URL),
        ("storageAccountName", "copilot01st"),
        ("fileShareName", "azfbusinessbot3c92ab"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            groups: Mutex::new(HashSet::new()),
            outputs: full_outputs(),
            template_error: None,
            keys: [("default".to_string(), FUNCTION_KEY.to_string())]
                .into_iter()
                .collect(),
            upload_error: None,
            uploaded: Mutex::new(None),
            uploaded_path: Mutex::new(None),
        }
    }

    pub fn without_output(name: &str) -> Self {
        let outputs: TemplateOutputs = full_outputs()
            .names()
            .filter(|n| n.as_str() != name)
            .map(|n| (n.clone(), full_outputs().get_string(n).unwrap()))
            .collect();
        Self {
            outputs,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == op).count()
    }

    fn log(&self, op: &str) {
        self.calls.lock().unwrap().push(op.to_string());
    }
}

fn failed(message: &str) -> CommandError {
    CommandError::Failed {
        command: "az".to_string(),
        exit_code: 1,
        stderr: message.to_string(),
    }
}

pub fn read_zip(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut files = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        files.insert(entry.name().to_string(), content);
    }
    files
}

#[async_trait]
impl CloudAdapter for FakeCloud {
    async fn select_subscription(&self, _subscription: &str) -> Result<(), CommandError> {
        self.log("select_subscription");
        Ok(())
    }

    async fn resource_group_exists(&self, name: &str) -> Result<bool, CommandError> {
        self.log("resource_group_exists");
        Ok(self.groups.lock().unwrap().contains(name))
    }

    async fn create_resource_group(&self, name: &str, _location: &str) -> Result<(), CommandError> {
        self.log("create_resource_group");
        if !self.groups.lock().unwrap().insert(name.to_string()) {
            return Err(failed("ResourceGroupAlreadyExists"));
        }
        Ok(())
    }

    async fn apply_template(
        &self,
        _resource_group: &str,
        _template: &Path,
        _parameters: &TemplateParameters,
    ) -> Result<TemplateOutputs, CommandError> {
        self.log("apply_template");
        match &self.template_error {
            Some(message) => Err(failed(message)),
            None => Ok(self.outputs.clone()),
        }
    }

    async fn list_function_keys(
        &self,
        _resource_group: &str,
        _function_app: &str,
    ) -> Result<BTreeMap<String, String>, CommandError> {
        self.log("list_function_keys");
        Ok(self.keys.clone())
    }

    async fn deploy_package(
        &self,
        _resource_group: &str,
        _function_app: &str,
        archive: &Path,
        _auth: &DeployAuth,
    ) -> Result<(), CommandError> {
        self.log("deploy_package");
        *self.uploaded.lock().unwrap() = Some(read_zip(archive));
        *self.uploaded_path.lock().unwrap() = Some(archive.to_path_buf());
        match &self.upload_error {
            Some(message) => Err(failed(message)),
            None => Ok(()),
        }
    }

    async fn tail_logs(&self, _resource_group: &str, _function_app: &str) -> Result<(), CommandError> {
        self.log("tail_logs");
        Ok(())
    }
}

/// Probe answering with a fixed status, or failing to connect
pub struct FakeProbe {
    pub response: Result<u16, String>,
    pub requests: Mutex<Vec<(String, Value)>>,
}

impl FakeProbe {
    pub fn status(status: u16) -> Self {
        Self {
            response: Ok(status),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            response: Err("connection refused".to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmokeProbe for FakeProbe {
    async fn post_json(&self, url: &str, body: &Value) -> Result<u16, ProbeError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        self.response.clone().map_err(ProbeError)
    }
}

#[derive(Default)]
pub struct FakeRecorder {
    pub records: Mutex<Vec<ReleaseRecord>>,
}

impl FakeRecorder {
    pub fn records(&self) -> Vec<ReleaseRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReleaseRecorder for FakeRecorder {
    async fn record(&self, release: &ReleaseRecord) -> Result<(), CommandError> {
        self.records.lock().unwrap().push(release.clone());
        Ok(())
    }
}

/// Function app source tree with files the packager must leave out
pub fn source_tree(root: &Path) -> PathBuf {
    let src = root.join("app");
    let files: [(&str, &[u8]); 6] = [
        ("function_app.py", b"import azure.functions as func\n"),
        ("host.json", b"{\"version\": \"2.0\"}"),
        ("agents/basic_agent.py", b"class BasicAgent:\n    pass\n"),
        ("__pycache__/x.pyc", &[0x55, 0x0d, 0x0d, 0x0a]),
        ("local.settings.json", b"{\"Values\": {\"AzureWebJobsStorage\": \"secret\"}}"),
        ("utils/azure_file_storage.py", b"class AzureFileStorageManager: pass\n"),
    ];
    for (relative, content) in files {
        let path = src.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    src
}

pub fn template(root: &Path) -> PathBuf {
    let path = root.join("azuredeploy.json");
    fs::write(&path, r#"{"$schema": "deploymentTemplate.json#", "resources": []}"#).unwrap();
    path
}

pub fn ci_run(run_number: Option<u64>) -> CiContext {
    CiContext {
        event: TriggerEvent::WorkflowDispatch,
        environment: Environment::Production,
        run_number,
        commit: Some("c0ffee1".to_string()),
        repository: Some("example/copilot-agent".to_string()),
    }
}

pub fn settings(root: &Path, project_name: &str) -> PipelineSettings {
    PipelineSettings {
        flags: DeployFlags {
            project_name: Some(project_name.to_string()),
            resource_group: Some("rg-copilot".to_string()),
            location: None,
            openai_location: None,
            subscription: None,
            yes: true,
        },
        defaults: Defaults {
            location: "eastus".to_string(),
            openai_location: "eastus".to_string(),
        },
        source_dir: source_tree(root),
        template: template(root),
        settle_delay: Duration::ZERO,
        auth: DeployAuth::Identity,
        environment: Environment::Production,
        ci: ci_run(Some(42)),
        record_release: true,
        lock_path: Some(root.join(".azfn-deploy.lock")),
    }
}
