//! Docker engine runtime driven through the `docker` CLI.
//!
//! A container is created with `docker create` (never pulling), then started
//! with `docker start --attach` as a child process whose stdout/stderr are
//! inherited, so kernel output streams to the front-end for the lifetime of
//! the container. The attached child's exit status is the container's.

use super::{ContainerHandle, ContainerRuntime, ImageInfo, WaitStatus};
use crate::error::{Error, Result};
use crate::launch::{ContainerLaunchSpec, DeviceSelection, MountKind};
use crate::options::BIND_NETWORK;
use crate::shutdown::{Shutdown, POLL_INTERVAL};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

/// Default docker CLI binary.
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Docker network that `bind` mode runs on.
pub const BRIDGE_NETWORK: &str = "bridge";

/// Extra time allowed for `docker stop` to confirm beyond the grace period.
const STOP_CONFIRM_MARGIN: Duration = Duration::from_secs(5);

/// Time allowed for the attached client to exit once its container is gone.
const ATTACH_EXIT_WAIT: Duration = Duration::from_secs(2);

/// [`ContainerRuntime`] backed by the docker CLI.
#[derive(Debug)]
pub struct DockerCli {
    binary: String,
    /// `docker start --attach` clients, keyed by container id.
    attached: Mutex<HashMap<String, Child>>,
}

impl DockerCli {
    /// Use the docker CLI at `binary` (a name on PATH or an absolute path).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            attached: Mutex::new(HashMap::new()),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    fn output(&self, args: &[String]) -> Result<Output> {
        tracing::debug!(binary = %self.binary, args = ?args, "running docker");
        self.command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::runtime_unavailable(format!("'{}' not found on PATH", self.binary))
        } else {
            Error::runtime_unavailable(format!("failed to run '{}': {}", self.binary, e))
        }
    }

    /// Arguments for `docker create` reproducing `spec`.
    pub fn create_args(spec: &ContainerLaunchSpec) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--pull".to_string(),
            "never".to_string(),
        ];

        if spec.auto_remove {
            args.push("--rm".to_string());
        }

        for (name, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", name, value));
        }

        if let Some(mounts) = &spec.mounts {
            for mount in mounts {
                let kind = match mount.kind {
                    MountKind::Volume => "volume",
                    MountKind::Bind => "bind",
                };
                let mut fields = vec![
                    format!("type={}", kind),
                    csv_field("source", &mount.source),
                    csv_field("target", &mount.target),
                ];
                if mount.read_only {
                    fields.push("readonly".to_string());
                }
                args.push("--mount".to_string());
                args.push(fields.join(","));
            }
        }

        if spec.network_mode == BIND_NETWORK {
            args.push("--network".to_string());
            args.push(BRIDGE_NETWORK.to_string());
        } else {
            args.push("--network".to_string());
            args.push(spec.network_mode.clone());
        }

        if let Some(ports) = &spec.ports {
            for (container, host) in ports {
                args.push("--publish".to_string());
                args.push(format!("{}:{}", host, container));
            }
        }

        if let Some(user) = &spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }

        if let Some(groups) = &spec.group_add {
            for group in groups {
                args.push("--group-add".to_string());
                args.push(group.clone());
            }
        }

        if let Some(requests) = &spec.device_requests {
            for request in requests {
                let mut value = match &request.selection {
                    DeviceSelection::All => "count=all".to_string(),
                    DeviceSelection::Ids(ids) => format!("\"device={}\"", ids.join(",")),
                };
                value.push_str(&format!(",capabilities={}", request.capabilities.join(",")));
                args.push("--gpus".to_string());
                args.push(value);
            }
        }

        args.push(spec.image.clone());
        args
    }

    /// Drop the attached client for `handle`, waiting briefly for it to exit.
    fn detach(&self, handle: &ContainerHandle) {
        let Some(mut child) = self.attached.lock().remove(&handle.id) else {
            return;
        };

        let deadline = Instant::now() + ATTACH_EXIT_WAIT;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => std::thread::sleep(POLL_INTERVAL),
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
            }
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_BINARY)
    }
}

impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    fn image(&self, name: &str) -> Result<ImageInfo> {
        let output = self.output(&[
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            name.to_string(),
        ])?;

        if output.status.success() {
            let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Ok(ImageInfo { id });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        match classify_failure(&stderr, name) {
            Error::LaunchFailed(reason) => Err(Error::command_failed("docker image inspect", reason)),
            other => Err(other),
        }
    }

    fn create_and_run(&self, spec: &ContainerLaunchSpec) -> Result<ContainerHandle> {
        let output = self.output(&Self::create_args(spec))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, &spec.image));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(Error::launch_failed("docker create returned no container id"));
        }
        let handle = ContainerHandle::new(id);
        tracing::debug!(container = %handle.id, image = %spec.image, "created container");

        let mut start = self.command();
        start
            .args(["start", "--attach", handle.id.as_str()])
            .stdin(Stdio::null())
            .stdout(capture(spec.capture_stdout))
            .stderr(capture(spec.capture_stderr));

        // Keep terminal signals away from the client; shutdown goes through stop().
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            start.process_group(0);
        }

        let child = match start.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = self.remove(&handle);
                return Err(self.spawn_error(e));
            }
        };

        self.attached.lock().insert(handle.id.clone(), child);
        Ok(handle)
    }

    fn wait(&self, handle: &ContainerHandle, shutdown: &Shutdown) -> Result<WaitStatus> {
        loop {
            if let Some(signal) = shutdown.received() {
                return Ok(WaitStatus::Interrupted(signal));
            }

            {
                let mut attached = self.attached.lock();
                let child = attached.get_mut(&handle.id).ok_or_else(|| {
                    Error::command_failed(
                        "docker start --attach",
                        format!("no attached client for container {}", handle.id),
                    )
                })?;

                if let Some(status) = child.try_wait()? {
                    attached.remove(&handle.id);
                    return Ok(WaitStatus::Exited(exit_code(status)));
                }
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn stop(&self, handle: &ContainerHandle, grace: Duration) -> Result<bool> {
        let grace_secs = stop_seconds(grace).to_string();
        let mut child = self
            .command()
            .args(["stop", "--time", grace_secs.as_str(), handle.id.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let deadline = Instant::now() + grace + STOP_CONFIRM_MARGIN;
        loop {
            if let Some(status) = child.try_wait()? {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }

                if status.success() || is_missing_container(&stderr) {
                    self.detach(handle);
                    return Ok(true);
                }
                return Err(Error::command_failed("docker stop", stderr.trim()));
            }

            if Instant::now() >= deadline {
                tracing::debug!(container = %handle.id, "docker stop unconfirmed within grace period");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(false);
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill(&self, handle: &ContainerHandle) -> Result<()> {
        let output = self.output(&["kill".to_string(), handle.id.clone()])?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        // "is not running" means it already stopped on its own
        if !output.status.success()
            && !is_missing_container(&stderr)
            && !stderr.to_lowercase().contains("is not running")
        {
            return Err(Error::command_failed("docker kill", stderr.trim()));
        }
        self.detach(handle);
        Ok(())
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<()> {
        let output = self.output(&["rm".to_string(), "--force".to_string(), handle.id.clone()])?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !is_missing_container(&stderr) {
            return Err(Error::command_failed("docker rm", stderr.trim()));
        }
        self.detach(handle);
        Ok(())
    }
}

/// Whole seconds for `docker stop --time`, rounded up so a grace period is never cut short.
fn stop_seconds(grace: Duration) -> u64 {
    grace.as_secs() + u64::from(grace.subsec_nanos() > 0)
}

fn capture(enabled: bool) -> Stdio {
    if enabled {
        Stdio::inherit()
    } else {
        Stdio::null()
    }
}

/// Quote a `--mount` field when its value would break the CSV syntax.
fn csv_field(key: &str, value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}={}\"", key, value.replace('"', "\"\""))
    } else {
        format!("{}={}", key, value)
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i64 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => i64::from(code),
        (None, Some(signal)) => 128 + i64::from(signal),
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i64 {
    status.code().map(i64::from).unwrap_or(-1)
}

fn is_missing_container(stderr: &str) -> bool {
    stderr.to_lowercase().contains("no such container")
}

/// Map docker CLI stderr to an error.
///
/// Engine connection failures become [`Error::RuntimeUnavailable`], missing
/// images [`Error::ImageNotFound`]; anything else is [`Error::LaunchFailed`]
/// carrying the message verbatim.
pub fn classify_failure(stderr: &str, image: &str) -> Error {
    let message = stderr.trim();
    let lower = message.to_lowercase();

    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("permission denied while trying to connect")
        || lower.contains("error during connect")
    {
        return Error::runtime_unavailable(message);
    }

    if lower.contains("no such image")
        || lower.contains("unable to find image")
        || lower.contains("pull access denied")
    {
        return Error::image_not_found(image);
    }

    Error::launch_failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::{DeviceRequest, Mount, GPU_CAPABILITY};
    use std::collections::BTreeMap;

    fn base_spec() -> ContainerLaunchSpec {
        ContainerLaunchSpec {
            image: "k".to_string(),
            env: vec![("DOCKERNEL_CONNECTION_FILE".to_string(), "/c.json".to_string())],
            mounts: None,
            ports: None,
            network_mode: BIND_NETWORK.to_string(),
            user: None,
            group_add: None,
            device_requests: None,
            auto_remove: true,
            capture_stdout: true,
            capture_stderr: true,
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_create_args_minimal() {
        let args = DockerCli::create_args(&base_spec());
        assert_eq!(args[0], "create");
        assert!(has_pair(&args, "--pull", "never"), "must never pull implicitly");
        assert!(args.contains(&"--rm".to_string()));
        assert!(has_pair(&args, "--env", "DOCKERNEL_CONNECTION_FILE=/c.json"));
        assert!(has_pair(&args, "--network", BRIDGE_NETWORK));
        assert!(!args.contains(&"--mount".to_string()));
        assert!(!args.contains(&"--publish".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("k"));
    }

    #[test]
    fn test_create_args_mounts_and_ports() {
        let mut spec = base_spec();
        spec.mounts = Some(vec![
            Mount {
                source: "data".to_string(),
                target: "/data".to_string(),
                kind: MountKind::Volume,
                read_only: true,
            },
            Mount {
                source: "/srv/a,b".to_string(),
                target: "/srv".to_string(),
                kind: MountKind::Bind,
                read_only: false,
            },
        ]);
        spec.ports = Some(BTreeMap::from([(5555, 5555), (5556, 5556)]));

        let args = DockerCli::create_args(&spec);

        assert!(has_pair(&args, "--mount", "type=volume,source=data,target=/data,readonly"));
        assert!(has_pair(
            &args,
            "--mount",
            "type=bind,\"source=/srv/a,b\",target=/srv"
        ));
        assert!(has_pair(&args, "--publish", "5555:5555"));
        assert!(has_pair(&args, "--publish", "5556:5556"));
    }

    #[test]
    fn test_create_args_identity_and_network() {
        let mut spec = base_spec();
        spec.network_mode = "host".to_string();
        spec.user = Some("1000".to_string());
        spec.group_add = Some(vec!["100".to_string(), "998".to_string()]);

        let args = DockerCli::create_args(&spec);

        assert!(has_pair(&args, "--network", "host"));
        assert!(has_pair(&args, "--user", "1000"));
        assert!(has_pair(&args, "--group-add", "100"));
        assert!(has_pair(&args, "--group-add", "998"));
    }

    #[test]
    fn test_create_args_gpus() {
        let mut spec = base_spec();
        spec.device_requests = Some(vec![DeviceRequest {
            selection: DeviceSelection::All,
            capabilities: vec![GPU_CAPABILITY.to_string()],
        }]);
        let args = DockerCli::create_args(&spec);
        assert!(has_pair(&args, "--gpus", "count=all,capabilities=gpu"));

        spec.device_requests = Some(vec![DeviceRequest {
            selection: DeviceSelection::Ids(vec!["1".to_string()]),
            capabilities: vec![GPU_CAPABILITY.to_string()],
        }]);
        let args = DockerCli::create_args(&spec);
        assert!(has_pair(&args, "--gpus", "\"device=1\",capabilities=gpu"));
    }

    #[test]
    fn test_create_args_keep_auto_remove_off_when_disabled() {
        let mut spec = base_spec();
        spec.auto_remove = false;
        assert!(!DockerCli::create_args(&spec).contains(&"--rm".to_string()));
    }

    #[test]
    fn test_classify_daemon_unreachable() {
        let err = classify_failure(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?\n",
            "k",
        );
        assert!(matches!(err, Error::RuntimeUnavailable(_)));
    }

    #[test]
    fn test_classify_missing_image() {
        let err = classify_failure("Error response from daemon: No such image: k:latest", "k");
        assert!(matches!(err, Error::ImageNotFound { ref image } if image == "k"));
    }

    #[test]
    fn test_classify_other_is_verbatim_launch_failure() {
        let msg = "Error response from daemon: invalid mount config for type \"bind\": bind source path does not exist: /nope";
        let err = classify_failure(&format!("{}\n", msg), "k");
        assert!(matches!(err, Error::LaunchFailed(ref m) if m == msg));
    }

    #[test]
    fn test_missing_binary_is_runtime_unavailable() {
        let docker = DockerCli::new("/nonexistent/dockernel-test-docker");
        let err = docker.image("k").unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable(_)));
    }

    #[test]
    fn test_stop_seconds_round_up() {
        assert_eq!(stop_seconds(Duration::ZERO), 0);
        assert_eq!(stop_seconds(Duration::from_millis(500)), 1);
        assert_eq!(stop_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(stop_seconds(Duration::from_secs(10)), 10);
    }

    /// Tests that run a shell script in place of the docker CLI.
    #[cfg(unix)]
    mod scripted {
        use super::*;
        use crate::shutdown::Shutdown;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn fake_docker(dir: &TempDir, body: &str) -> DockerCli {
            let path = dir.path().join("docker");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            DockerCli::new(path.to_string_lossy().into_owned())
        }

        fn quiet_spec() -> ContainerLaunchSpec {
            ContainerLaunchSpec {
                capture_stdout: false,
                capture_stderr: false,
                ..base_spec()
            }
        }

        #[test]
        fn test_image_lookup_returns_id() {
            let dir = TempDir::new().unwrap();
            let docker = fake_docker(&dir, "echo sha256:4f0c6a3b2d1e9f8a7b6c");
            let info = docker.image("k").unwrap();
            assert_eq!(info.id, "sha256:4f0c6a3b2d1e9f8a7b6c");
        }

        #[test]
        fn test_image_lookup_missing_image() {
            let dir = TempDir::new().unwrap();
            let docker = fake_docker(
                &dir,
                "echo 'Error response from daemon: No such image: k:latest' >&2; exit 1",
            );
            let err = docker.image("k").unwrap_err();
            assert!(matches!(err, Error::ImageNotFound { ref image } if image == "k"));
        }

        #[test]
        fn test_stop_passes_rounded_grace() {
            let dir = TempDir::new().unwrap();
            let log = dir.path().join("argv.log");
            let docker = fake_docker(&dir, &format!("echo \"$@\" >> '{}'", log.display()));
            let handle = ContainerHandle::new("c1");

            assert!(docker.stop(&handle, Duration::from_millis(1500)).unwrap());
            assert!(docker.stop(&handle, Duration::from_millis(500)).unwrap());

            let logged = std::fs::read_to_string(&log).unwrap();
            assert_eq!(logged, "stop --time 2 c1\nstop --time 1 c1\n");
        }

        #[test]
        fn test_stop_unconfirmed_returns_false() {
            let dir = TempDir::new().unwrap();
            let docker = fake_docker(&dir, "exec sleep 30");
            let handle = ContainerHandle::new("c1");

            let started = Instant::now();
            let stopped = docker.stop(&handle, Duration::ZERO).unwrap();
            let elapsed = started.elapsed();

            assert!(!stopped, "a stop that never returns must not count as confirmed");
            assert!(elapsed >= STOP_CONFIRM_MARGIN, "gave up early: {:?}", elapsed);
            assert!(elapsed < Duration::from_secs(20), "stop was not bounded: {:?}", elapsed);
        }

        #[test]
        fn test_stop_missing_container_counts_as_stopped() {
            let dir = TempDir::new().unwrap();
            let docker = fake_docker(
                &dir,
                "echo 'Error response from daemon: No such container: c1' >&2; exit 1",
            );
            assert!(docker.stop(&ContainerHandle::new("c1"), Duration::from_secs(1)).unwrap());
        }

        #[test]
        fn test_stop_failure_is_command_failed() {
            let dir = TempDir::new().unwrap();
            let docker = fake_docker(&dir, "echo 'permission denied' >&2; exit 1");
            let err = docker
                .stop(&ContainerHandle::new("c1"), Duration::from_secs(1))
                .unwrap_err();
            assert!(matches!(err, Error::CommandFailed { .. }), "got {err}");
        }

        #[test]
        fn test_kill_tolerates_stopped_or_missing_container() {
            let dir = TempDir::new().unwrap();
            let handle = ContainerHandle::new("c1");

            let docker = fake_docker(
                &dir,
                "echo 'Error response from daemon: cannot kill container: c1: container c1 is not running' >&2; exit 1",
            );
            docker.kill(&handle).unwrap();

            let docker = fake_docker(
                &dir,
                "echo 'Error response from daemon: No such container: c1' >&2; exit 1",
            );
            docker.kill(&handle).unwrap();
        }

        #[test]
        fn test_remove_tolerates_missing_container() {
            let dir = TempDir::new().unwrap();
            let handle = ContainerHandle::new("c1");

            let docker = fake_docker(
                &dir,
                "echo 'Error response from daemon: No such container: c1' >&2; exit 1",
            );
            docker.remove(&handle).unwrap();

            let docker = fake_docker(&dir, "echo 'device or resource busy' >&2; exit 1");
            let err = docker.remove(&handle).unwrap_err();
            assert!(matches!(err, Error::CommandFailed { .. }), "got {err}");
        }

        #[test]
        fn test_wait_reports_container_exit_code() {
            let dir = TempDir::new().unwrap();
            let docker = fake_docker(
                &dir,
                r#"case "$1" in
  create) echo c0ffee ;;
  start) exit 3 ;;
  *) exit 0 ;;
esac"#,
            );

            let handle = docker.create_and_run(&quiet_spec()).unwrap();
            assert_eq!(handle.id, "c0ffee");

            let status = docker.wait(&handle, &Shutdown::new()).unwrap();
            assert_eq!(status, WaitStatus::Exited(3));
            assert!(docker.attached.lock().is_empty());
        }

        #[test]
        fn test_wait_is_interrupted_by_shutdown() {
            let dir = TempDir::new().unwrap();
            let docker = fake_docker(
                &dir,
                r#"case "$1" in
  create) echo c0ffee ;;
  start) exec sleep 30 ;;
  *) exit 0 ;;
esac"#,
            );

            let handle = docker.create_and_run(&quiet_spec()).unwrap();

            let shutdown = Shutdown::new();
            let trigger = shutdown.clone();
            let signaller = std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(300));
                trigger.trigger(libc::SIGTERM);
            });

            let status = docker.wait(&handle, &shutdown).unwrap();
            signaller.join().unwrap();
            assert_eq!(status, WaitStatus::Interrupted(libc::SIGTERM));

            // Removal reaps the attached client even though it is still running
            docker.remove(&handle).unwrap();
            assert!(docker.attached.lock().is_empty());
        }
    }
}
