use std::collections::BTreeMap;
use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio::io::AsyncReadExt;
use tokio::time::Duration;
use tracing::{debug, info};

use super::{Layer, Plan, Workload};
use crate::util::errors::{Error, Result, StdError};

pub const PEBBLE_BIN: &str = "/charm/bin/pebble";
const LAYER_FILE_PATH: &str = "/tmp/cu-layer.yaml";
const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Workload reached through `pods/exec` on the first pod of the StatefulSet
pub struct PebbleWorkload {
    pods: Api<Pod>,
    pod_name: String,
    container: String,
}

impl PebbleWorkload {
    pub fn new(client: Client, namespace: &str, pod_name: &str, container: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            pod_name: pod_name.to_string(),
            container: container.to_string(),
        }
    }

    async fn get_pod(&self) -> Result<Option<Pod>> {
        match self.pods.get(&self.pod_name).await {
            Ok(pod) => Ok(Some(pod)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }

    async fn run(&self, command: Vec<String>) -> Result<(String, String)> {
        self.exec(command, DEFAULT_EXEC_TIMEOUT, BTreeMap::new()).await
    }

    async fn pebble(&self, args: &[&str]) -> Result<String> {
        let mut command = vec![PEBBLE_BIN.to_string()];
        command.extend(args.iter().map(|arg| arg.to_string()));
        let (stdout, _) = self.run(command).await?;
        Ok(stdout)
    }

    async fn exec_attached(&self, command: Vec<String>) -> Result<(String, String)> {
        let params = AttachParams::default()
            .container(self.container.clone())
            .stdout(true)
            .stderr(true);
        let mut attached = self
            .pods
            .exec(&self.pod_name, command.clone(), &params)
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;

        let stdout_reader = attached.stdout();
        let stderr_reader = attached.stderr();
        let read_stdout = async move {
            let mut out = String::new();
            if let Some(mut reader) = stdout_reader {
                reader.read_to_string(&mut out).await?;
            }
            Ok::<_, io::Error>(out)
        };
        let read_stderr = async move {
            let mut out = String::new();
            if let Some(mut reader) = stderr_reader {
                reader.read_to_string(&mut out).await?;
            }
            Ok::<_, io::Error>(out)
        };
        let (stdout, stderr) = tokio::join!(read_stdout, read_stderr);

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        if let Err(e) = attached.join().await {
            debug!("exec session did not close cleanly: {}", e);
        }

        exec_output(&command, status, stdout, stderr)
    }
}

/// Output of a finished exec session; a stream that could not be read fails the command.
pub fn exec_output(
    command: &[String],
    status: Option<Status>,
    stdout: io::Result<String>,
    stderr: io::Result<String>,
) -> Result<(String, String)> {
    let failed = |message: String| {
        Err(Error::StdError(StdError::ExecError {
            command: command.join(" "),
            message,
        }))
    };
    let stdout = match stdout {
        Ok(stdout) => stdout,
        Err(e) => return failed(format!("reading stdout: {e}")),
    };
    let stderr = match stderr {
        Ok(stderr) => stderr,
        Err(e) => return failed(format!("reading stderr: {e}")),
    };

    match status {
        Some(status) if status.status.as_deref() == Some("Success") => Ok((stdout, stderr)),
        Some(status) => failed(status.message.unwrap_or_else(|| stderr.trim().to_string())),
        None => failed("no exit status reported".to_string()),
    }
}

/// Prefixes `command` with `env` assignments.
pub fn with_env(command: Vec<String>, env: &BTreeMap<String, String>) -> Vec<String> {
    if env.is_empty() {
        return command;
    }
    let mut wrapped = vec!["env".to_string()];
    wrapped.extend(env.iter().map(|(key, value)| format!("{key}={value}")));
    wrapped.extend(command);
    wrapped
}

/// Writes the file content as a positional argument, creating parent directories.
pub fn push_command(path: &str, content: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        r#"mkdir -p "$(dirname "$0")" && printf '%s' "$1" > "$0""#.to_string(),
        path.to_string(),
        content.to_string(),
    ]
}

#[async_trait]
impl Workload for PebbleWorkload {
    async fn can_connect(&self) -> Result<bool> {
        let Some(pod) = self.get_pod().await? else {
            return Ok(false);
        };
        let running = pod
            .status
            .and_then(|status| status.container_statuses)
            .unwrap_or_default()
            .into_iter()
            .find(|cs| cs.name == self.container)
            .and_then(|cs| cs.state)
            .is_some_and(|state| state.running.is_some());
        Ok(running)
    }

    async fn pod_ip(&self) -> Result<Option<IpAddr>> {
        let Some(pod) = self.get_pod().await? else {
            return Ok(None);
        };
        Ok(pod
            .status
            .and_then(|status| status.pod_ip)
            .and_then(|ip| ip.parse::<IpAddr>().ok()))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.run(vec!["test".to_string(), "-e".to_string(), path.to_string()]).await {
            Ok(_) => Ok(true),
            Err(Error::StdError(StdError::ExecError { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull(&self, path: &str) -> Result<String> {
        let (content, _) = self.run(vec!["cat".to_string(), path.to_string()]).await?;
        Ok(content)
    }

    async fn push(&self, path: &str, content: &str) -> Result<()> {
        self.run(push_command(path, content)).await?;
        debug!("Pushed {} bytes to {}", content.len(), path);
        Ok(())
    }

    async fn plan(&self) -> Result<Plan> {
        let output = self.pebble(&["plan"]).await?;
        serde_yaml::from_str(&output).map_err(|e| Error::StdError(StdError::YamlSerializationError(e)))
    }

    async fn add_layer(&self, label: &str, layer: &Layer) -> Result<()> {
        let yaml = serde_yaml::to_string(layer)
            .map_err(|e| Error::StdError(StdError::YamlSerializationError(e)))?;
        self.push(LAYER_FILE_PATH, &yaml).await?;
        self.pebble(&["add", label, LAYER_FILE_PATH, "--combine"]).await?;
        info!("Layer '{}' added", label);
        Ok(())
    }

    async fn replan(&self) -> Result<()> {
        self.pebble(&["replan"]).await?;
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<()> {
        self.pebble(&["restart", service]).await?;
        Ok(())
    }

    async fn exec(
        &self,
        command: Vec<String>,
        timeout: Duration,
        env: BTreeMap<String, String>,
    ) -> Result<(String, String)> {
        let command = with_env(command, &env);
        match tokio::time::timeout(timeout, self.exec_attached(command.clone())).await {
            Ok(result) => result,
            Err(_) => Err(Error::StdError(StdError::ExecTimeout {
                command: command.join(" "),
                timeout,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_is_prepended() {
        let command = vec!["ip".to_string(), "route".to_string()];
        assert_eq!(with_env(command.clone(), &BTreeMap::new()), command);

        let env = BTreeMap::from([("LANG".to_string(), "C".to_string())]);
        assert_eq!(with_env(command, &env), vec!["env", "LANG=C", "ip", "route"]);
    }

    #[test]
    fn push_passes_content_as_argument() {
        let command = push_command("/tmp/conf/cu.conf", "Active_gNBs = ( \"cu\");\n");
        assert_eq!(command[0], "sh");
        assert_eq!(command[3], "/tmp/conf/cu.conf");
        assert_eq!(command[4], "Active_gNBs = ( \"cu\");\n");
    }

    fn status(outcome: &str) -> Option<Status> {
        Some(Status {
            status: Some(outcome.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn successful_exec_returns_both_streams() {
        let command = vec!["cat".to_string(), "/etc/workload-version".to_string()];
        let output = exec_output(&command, status("Success"), Ok("2.1.0\n".to_string()), Ok(String::new())).unwrap();
        assert_eq!(output, ("2.1.0\n".to_string(), String::new()));
    }

    #[test]
    fn unreadable_stdout_fails_even_on_success() {
        let command = vec!["cat".to_string(), "/tmp/conf/cu.conf".to_string()];
        let broken = Err(io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8"));

        let err = exec_output(&command, status("Success"), broken, Ok(String::new())).unwrap_err();

        match err {
            Error::StdError(StdError::ExecError { command, message }) => {
                assert_eq!(command, "cat /tmp/conf/cu.conf");
                assert!(message.contains("valid UTF-8"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failed_status_falls_back_to_stderr() {
        let command = vec!["test".to_string(), "-e".to_string(), "/tmp/conf/cu.conf".to_string()];
        let err = exec_output(&command, status("Failure"), Ok(String::new()), Ok("no such file\n".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("no such file"));
        assert!(exec_output(&command, None, Ok(String::new()), Ok(String::new())).is_err());
    }
}
