//! Lifecycle tests against a scripted container runtime.
//!
//! These drive the full start path (descriptor patch, port extraction,
//! launch spec, orchestration) without a container engine.

use dockernel::connection;
use dockernel::launch;
use dockernel::orchestrator;
use dockernel::{
    ContainerHandle, ContainerLaunchSpec, ContainerRuntime, Error, ExitOutcome, ImageInfo,
    Result, RuntimeOptions, Shutdown, StaticIdentity, UserSpec, WaitStatus,
};
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Image(String),
    CreateAndRun(String),
    Wait,
    Stop(Duration),
    Kill,
    Remove,
}

/// How the fake wait ends.
#[derive(Clone, Copy)]
enum WaitScript {
    Exit(i64),
    /// Report the shutdown signal, like a real runtime polling the flag.
    FollowShutdown,
    Fail,
}

struct FakeRuntime {
    image_present: bool,
    wait: WaitScript,
    stop_confirms: bool,
    remove_fails: bool,
    calls: Mutex<Vec<Call>>,
    launched: Mutex<Option<ContainerLaunchSpec>>,
}

impl FakeRuntime {
    fn new(wait: WaitScript) -> Self {
        Self {
            image_present: true,
            wait,
            stop_confirms: true,
            remove_fails: false,
            calls: Mutex::new(Vec::new()),
            launched: Mutex::new(None),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    fn image(&self, name: &str) -> Result<ImageInfo> {
        self.record(Call::Image(name.to_string()));
        if self.image_present {
            Ok(ImageInfo {
                id: "sha256:0123456789abcdef0123".to_string(),
            })
        } else {
            Err(Error::image_not_found(name))
        }
    }

    fn create_and_run(&self, spec: &ContainerLaunchSpec) -> Result<ContainerHandle> {
        self.record(Call::CreateAndRun(spec.image.clone()));
        *self.launched.lock() = Some(spec.clone());
        Ok(ContainerHandle::new("c0ffee"))
    }

    fn wait(&self, _handle: &ContainerHandle, shutdown: &Shutdown) -> Result<WaitStatus> {
        self.record(Call::Wait);
        match self.wait {
            WaitScript::Exit(code) => Ok(WaitStatus::Exited(code)),
            WaitScript::FollowShutdown => match shutdown.received() {
                Some(signal) => Ok(WaitStatus::Interrupted(signal)),
                None => Ok(WaitStatus::Exited(0)),
            },
            WaitScript::Fail => Err(Error::launch_failed("lost connection to engine")),
        }
    }

    fn stop(&self, _handle: &ContainerHandle, grace: Duration) -> Result<bool> {
        self.record(Call::Stop(grace));
        Ok(self.stop_confirms)
    }

    fn kill(&self, _handle: &ContainerHandle) -> Result<()> {
        self.record(Call::Kill);
        Ok(())
    }

    fn remove(&self, _handle: &ContainerHandle) -> Result<()> {
        self.record(Call::Remove);
        if self.remove_fails {
            Err(Error::command_failed("remove", "engine went away"))
        } else {
            Ok(())
        }
    }
}

const DESCRIPTOR: &str = r#"{
  "shell_port": 53794,
  "iopub_port": 53795,
  "stdin_port": 53796,
  "control_port": 53797,
  "hb_port": 53798,
  "ip": "127.0.0.1",
  "key": "a0436f6c-1916-498b-8eb9-e81ab9368e84",
  "transport": "tcp",
  "signature_scheme": "hmac-sha256",
  "kernel_name": "dockernel-example"
}"#;

fn launch_spec(dir: &tempfile::TempDir, options: &RuntimeOptions) -> ContainerLaunchSpec {
    let path = dir.path().join("kernel-1.json");
    std::fs::write(&path, DESCRIPTOR).unwrap();

    let descriptor = connection::patch_bind_address(&path).unwrap();
    let ports = connection::extract_ports(&descriptor).unwrap();
    let host = StaticIdentity {
        uid: 1000,
        groups: vec![100, 27],
    };
    launch::build(options, &ports, &path, &host).unwrap()
}

#[test]
fn test_start_path_publishes_descriptor_ports() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = RuntimeOptions::new("example/kernel");
    options.user = Some(UserSpec::CurrentUser);
    let spec = launch_spec(&dir, &options);

    let runtime = FakeRuntime::new(WaitScript::Exit(0));
    let outcome =
        orchestrator::run(&runtime, &spec, &Shutdown::new(), Duration::from_secs(10)).unwrap();
    assert_eq!(outcome, ExitOutcome::Exited(0));

    let launched = runtime.launched.lock().clone().expect("container was created");
    let ports = launched.ports.expect("bind network publishes ports");
    assert_eq!(ports.len(), 5);
    assert_eq!(ports.get(&53794), Some(&53794));
    assert_eq!(ports.get(&53798), Some(&53798));
    assert_eq!(launched.user.as_deref(), Some("1000"));

    // The kernel inside the container must listen on every interface
    let patched = std::fs::read_to_string(dir.path().join("kernel-1.json")).unwrap();
    assert!(patched.contains("\"ip\": \"0.0.0.0\""));
    assert!(patched.contains("a0436f6c-1916-498b-8eb9-e81ab9368e84"));
}

#[test]
fn test_normal_exit_does_not_stop_or_remove() {
    let dir = tempfile::tempdir().unwrap();
    let spec = launch_spec(&dir, &RuntimeOptions::new("example/kernel"));

    let runtime = FakeRuntime::new(WaitScript::Exit(3));
    let outcome =
        orchestrator::run(&runtime, &spec, &Shutdown::new(), Duration::from_secs(10)).unwrap();

    assert_eq!(outcome, ExitOutcome::Exited(3));
    assert!(!outcome.is_success());
    assert_eq!(
        runtime.calls(),
        vec![
            Call::Image("example/kernel".to_string()),
            Call::CreateAndRun("example/kernel".to_string()),
            Call::Wait,
        ]
    );
}

#[test]
fn test_missing_image_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let spec = launch_spec(&dir, &RuntimeOptions::new("missing/kernel"));

    let mut runtime = FakeRuntime::new(WaitScript::Exit(0));
    runtime.image_present = false;

    let err = orchestrator::run(&runtime, &spec, &Shutdown::new(), Duration::from_secs(10))
        .unwrap_err();
    assert!(
        matches!(err, Error::ImageNotFound { ref image } if image == "missing/kernel"),
        "unexpected error: {err}"
    );
    assert_eq!(runtime.calls(), vec![Call::Image("missing/kernel".to_string())]);
}

#[test]
fn test_signal_stops_then_removes() {
    let dir = tempfile::tempdir().unwrap();
    let spec = launch_spec(&dir, &RuntimeOptions::new("example/kernel"));

    let runtime = FakeRuntime::new(WaitScript::FollowShutdown);
    let shutdown = Shutdown::new();
    shutdown.trigger(libc::SIGTERM);

    let grace = Duration::from_secs(4);
    let outcome = orchestrator::run(&runtime, &spec, &shutdown, grace).unwrap();

    assert_eq!(
        outcome,
        ExitOutcome::Cancelled {
            signal: libc::SIGTERM
        }
    );
    let calls = runtime.calls();
    assert_eq!(&calls[3..], &[Call::Stop(grace), Call::Remove]);
}

#[test]
fn test_unconfirmed_stop_is_followed_by_kill() {
    let dir = tempfile::tempdir().unwrap();
    let spec = launch_spec(&dir, &RuntimeOptions::new("example/kernel"));

    let mut runtime = FakeRuntime::new(WaitScript::FollowShutdown);
    runtime.stop_confirms = false;
    let shutdown = Shutdown::new();
    shutdown.trigger(libc::SIGINT);

    let outcome = orchestrator::run(&runtime, &spec, &shutdown, Duration::from_secs(1)).unwrap();

    assert_eq!(
        outcome,
        ExitOutcome::Cancelled {
            signal: libc::SIGINT
        }
    );
    let calls = runtime.calls();
    assert_eq!(
        &calls[3..],
        &[Call::Stop(Duration::from_secs(1)), Call::Kill, Call::Remove]
    );
}

#[test]
fn test_wait_failure_removes_and_returns_original_error() {
    let dir = tempfile::tempdir().unwrap();
    let spec = launch_spec(&dir, &RuntimeOptions::new("example/kernel"));

    let runtime = FakeRuntime::new(WaitScript::Fail);
    let err = orchestrator::run(&runtime, &spec, &Shutdown::new(), Duration::from_secs(10))
        .unwrap_err();

    assert!(matches!(err, Error::LaunchFailed(_)), "unexpected error: {err}");
    assert_eq!(runtime.calls().last(), Some(&Call::Remove));
}

#[test]
fn test_cleanup_failure_does_not_mask_wait_error() {
    let dir = tempfile::tempdir().unwrap();
    let spec = launch_spec(&dir, &RuntimeOptions::new("example/kernel"));

    let mut runtime = FakeRuntime::new(WaitScript::Fail);
    runtime.remove_fails = true;

    let err = orchestrator::run(&runtime, &spec, &Shutdown::new(), Duration::from_secs(10))
        .unwrap_err();
    assert!(
        err.to_string().contains("lost connection to engine"),
        "cleanup error replaced the original: {err}"
    );
}

#[test]
fn test_malformed_descriptor_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernel-2.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = connection::patch_bind_address(&path).unwrap_err();
    assert!(matches!(err, Error::MalformedDescriptor { .. }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}
