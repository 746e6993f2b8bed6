//! Workload backed by a local directory and child processes.
//!
//! Absolute workload paths are resolved under `root`, both for file transfer
//! and in service commands. Each started service records its pid in
//! `<root>/run/<service>.pid`, so a later invocation of the operator still
//! sees (and can restart) a service it did not spawn itself. Stopping sends
//! SIGTERM and waits up to the stop timeout before sending SIGKILL. The plan
//! is kept in `<root>/run/plan.yaml` for the same reason.
//!
//! A pid file also records the process start time from `/proc/<pid>/stat`.
//! A pid file is trusted only while a live process with that pid reports
//! the same start time. Anything else is stale and is never signalled.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::WorkloadConfig;
use crate::error::{Error, Result};
use crate::workload::{Layer, Service, Workload, WorkloadState};

const STOP_POLL: Duration = Duration::from_millis(50);
const PID_DIR: &str = "run";
const PLAN_FILE: &str = "plan.yaml";

/// Contents of a pid file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PidRecord {
    pid: u32,
    /// Start time in clock ticks since boot.
    started: u64,
}

pub struct ProcessWorkload {
    root: PathBuf,
    stop_timeout: Duration,
    plan: BTreeMap<String, Service>,
    /// Children spawned by this process, kept for reaping.
    children: Mutex<HashMap<String, Child>>,
}

impl ProcessWorkload {
    pub fn new(root: impl Into<PathBuf>, stop_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            stop_timeout,
            plan: BTreeMap::new(),
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &WorkloadConfig) -> Self {
        Self::new(&config.root, Duration::from_secs(config.stop_timeout_secs))
    }

    /// Host path for a workload path.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::validation(format!("invalid workload path {:?}", path)));
        }
        Ok(self.root.join(relative))
    }

    /// Stop `name` if it is running.
    pub fn stop_service(&mut self, name: &str) -> Result<()> {
        let child = self.children().remove(name);
        match (child, self.live_pid(name)) {
            (Some(mut child), _) => {
                tracing::debug!(service = %name, pid = child.id(), "Stopping service");
                self.stop_child(name, &mut child)?;
            }
            (None, Some(pid)) => {
                tracing::debug!(service = %name, pid, "Stopping service from pid file");
                self.stop_pid(name, pid)?;
            }
            (None, None) => {}
        }

        match fs::remove_file(self.pid_file(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn children(&self) -> std::sync::MutexGuard<'_, HashMap<String, Child>> {
        self.children.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn plan_file(&self) -> PathBuf {
        self.root.join(PID_DIR).join(PLAN_FILE)
    }

    /// Plan written by an earlier instance, empty when there is none.
    fn stored_plan(&self) -> Result<BTreeMap<String, Service>> {
        match fs::read_to_string(self.plan_file()) {
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn planned(&self, name: &str) -> Result<Option<Service>> {
        if let Some(service) = self.plan.get(name) {
            return Ok(Some(service.clone()));
        }
        Ok(self.stored_plan()?.remove(name))
    }

    fn pid_file(&self, name: &str) -> PathBuf {
        self.root.join(PID_DIR).join(format!("{}.pid", name))
    }

    /// Pid from the pid file, if it still names the process we started.
    fn live_pid(&self, name: &str) -> Option<u32> {
        let content = fs::read_to_string(self.pid_file(name)).ok()?;
        let Ok(record) = serde_json::from_str::<PidRecord>(&content) else {
            tracing::debug!(service = %name, "Ignoring unreadable pid file");
            return None;
        };
        if start_time(record.pid) == Some(record.started) {
            Some(record.pid)
        } else {
            tracing::debug!(service = %name, pid = record.pid, "Ignoring stale pid file");
            None
        }
    }

    fn write_pid(&self, name: &str, pid: u32) -> Result<()> {
        let started = start_time(pid)
            .ok_or_else(|| Error::upstream(format!("cannot read start time of {} (pid {})", name, pid)))?;
        let record = serde_json::to_string(&PidRecord { pid, started })?;
        write_atomic(&self.root, &self.pid_file(name), record.as_bytes())
    }

    fn spawn(&self, name: &str, service: &Service) -> Result<Child> {
        let argv = service.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::validation(format!("service {} has an empty command", name)));
        };

        let args = args
            .iter()
            .map(|arg| {
                if arg.starts_with('/') {
                    self.resolve(arg).map(|p| p.into_os_string())
                } else {
                    Ok((*arg).into())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut child = Command::new(program)
            .args(args)
            .envs(&service.environment)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| Error::upstream(format!("cannot start {}: {}", name, e)))?;

        if let Some(status) = child.try_wait()? {
            return Err(Error::upstream(format!("{} exited immediately: {}", name, status)));
        }
        Ok(child)
    }

    fn stop_child(&self, name: &str, child: &mut Child) -> Result<()> {
        if child.try_wait()?.is_some() {
            return Ok(());
        }

        signal(child.id(), "-TERM");
        let deadline = Instant::now() + self.stop_timeout;
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(STOP_POLL);
        }

        tracing::warn!(
            service = %name,
            timeout_secs = self.stop_timeout.as_secs(),
            "Service did not stop in time, killing"
        );
        child.kill()?;
        child.wait()?;
        Ok(())
    }

    fn stop_pid(&self, name: &str, pid: u32) -> Result<()> {
        let Some(started) = start_time(pid) else {
            return Ok(());
        };
        let same_process = || start_time(pid) == Some(started);

        signal(pid, "-TERM");
        let deadline = Instant::now() + self.stop_timeout;
        while Instant::now() < deadline {
            if !same_process() {
                return Ok(());
            }
            thread::sleep(STOP_POLL);
        }

        tracing::warn!(service = %name, pid, "Service did not stop in time, killing");
        if same_process() {
            signal(pid, "-KILL");
        }
        Ok(())
    }
}

/// Replace `target` through a temporary file in the same directory.
fn write_atomic(root: &Path, target: &Path, content: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or(root);
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Start time of a live process, in clock ticks since boot.
///
/// Field 22 of `/proc/<pid>/stat`. `None` when the process is gone or the
/// platform has no procfs.
fn start_time(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // `comm` is parenthesised and may itself contain spaces or parens.
    let (_, rest) = stat.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is the state (field 3); a zombie has already exited.
    if fields.first() == Some(&"Z") {
        return None;
    }
    fields.get(19)?.parse().ok()
}

/// Send `sig` to `pid` with kill(1). Returns whether the signal was delivered.
fn signal(pid: u32, sig: &str) -> bool {
    Command::new("kill")
        .arg(sig)
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

impl Workload for ProcessWorkload {
    fn can_connect(&self) -> bool {
        self.root.is_dir()
    }

    fn pull(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.resolve(path)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn push(&mut self, path: &str, content: &[u8]) -> Result<()> {
        write_atomic(&self.root, &self.resolve(path)?, content)
    }

    fn add_layer(&mut self, layer: &Layer) -> Result<()> {
        if self.plan.is_empty() {
            self.plan = self.stored_plan()?;
        }
        for (name, service) in &layer.services {
            self.plan.insert(name.clone(), service.clone());
        }
        let content = serde_yaml::to_string(&self.plan)?;
        write_atomic(&self.root, &self.plan_file(), content.as_bytes())
    }

    fn service(&self, name: &str) -> Result<Option<Service>> {
        self.planned(name)
    }

    fn restart(&mut self, name: &str) -> Result<()> {
        let service = self
            .planned(name)?
            .ok_or_else(|| Error::upstream(format!("service {} is not in the plan", name)))?;

        self.stop_service(name)?;

        let child = self.spawn(name, &service)?;
        let pid = child.id();
        self.children().insert(name.to_string(), child);
        self.write_pid(name, pid)?;
        tracing::debug!(service = %name, pid, "Service started");
        Ok(())
    }

    fn state(&self, name: &str) -> WorkloadState {
        if let Some(child) = self.children().get_mut(name) {
            return match child.try_wait() {
                Ok(None) => WorkloadState::Running,
                _ => WorkloadState::Stopped,
            };
        }
        match self.live_pid(name) {
            Some(_) => WorkloadState::Running,
            None => WorkloadState::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper(command: &str) -> Layer {
        let mut services = BTreeMap::new();
        services.insert(
            "dex".to_string(),
            Service {
                override_mode: "replace".to_string(),
                summary: "dex".to_string(),
                command: command.to_string(),
                startup: "enabled".to_string(),
                environment: BTreeMap::new(),
            },
        );
        Layer {
            summary: "test".to_string(),
            description: "test".to_string(),
            services,
        }
    }

    #[test]
    fn files_live_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut workload = ProcessWorkload::new(dir.path(), Duration::from_secs(1));

        assert_eq!(workload.pull("/etc/dex/config.docker.yaml").unwrap(), None);
        workload.push("/etc/dex/config.docker.yaml", b"issuer: x\n").unwrap();
        assert_eq!(
            fs::read(dir.path().join("etc/dex/config.docker.yaml")).unwrap(),
            b"issuer: x\n"
        );
        assert_eq!(
            workload.pull("/etc/dex/config.docker.yaml").unwrap().as_deref(),
            Some(&b"issuer: x\n"[..])
        );
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workload = ProcessWorkload::new(dir.path(), Duration::from_secs(1));
        assert!(workload.resolve("/etc/../../outside").is_err());
    }

    #[test]
    fn missing_root_cannot_connect() {
        let dir = tempfile::tempdir().unwrap();
        let workload = ProcessWorkload::new(dir.path().join("absent"), Duration::from_secs(1));
        assert!(!workload.can_connect());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn restart_replaces_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut workload = ProcessWorkload::new(dir.path(), Duration::from_secs(2));
        workload.add_layer(&sleeper("sleep 30")).unwrap();

        assert_eq!(workload.state("dex"), WorkloadState::Stopped);
        workload.restart("dex").unwrap();
        assert_eq!(workload.state("dex"), WorkloadState::Running);
        let first = workload.live_pid("dex").unwrap();

        workload.restart("dex").unwrap();
        assert_eq!(workload.state("dex"), WorkloadState::Running);
        let second = workload.live_pid("dex").unwrap();
        assert_ne!(second, first);

        workload.stop_service("dex").unwrap();
        assert_eq!(workload.state("dex"), WorkloadState::Stopped);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn service_is_visible_to_a_later_instance() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = ProcessWorkload::new(dir.path(), Duration::from_secs(1));
        first.add_layer(&sleeper("sleep 30")).unwrap();
        first.restart("dex").unwrap();

        let mut second = ProcessWorkload::new(dir.path(), Duration::from_secs(1));
        assert_eq!(second.state("dex"), WorkloadState::Running);
        assert_eq!(second.service("dex").unwrap(), first.service("dex").unwrap());
        assert_eq!(second.service("dex").unwrap().unwrap().command, "sleep 30");

        second.stop_service("dex").unwrap();
        assert!(!dir.path().join("run/dex.pid").exists());
        first.stop_service("dex").unwrap();
        assert_eq!(first.state("dex"), WorkloadState::Stopped);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pid_file_naming_another_process_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut bystander = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = bystander.id();
        let pid_file = dir.path().join("run/dex.pid");
        fs::create_dir_all(pid_file.parent().unwrap()).unwrap();

        let mut workload = ProcessWorkload::new(dir.path(), Duration::from_secs(1));
        workload.add_layer(&sleeper("sleep 30")).unwrap();

        // Bare pid, as left behind by some other tool.
        fs::write(&pid_file, pid.to_string()).unwrap();
        assert_eq!(workload.state("dex"), WorkloadState::Stopped);

        // Recycled pid: same number, different start time.
        let started = start_time(pid).unwrap();
        let record = PidRecord { pid, started: started + 1 };
        fs::write(&pid_file, serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(workload.state("dex"), WorkloadState::Stopped);

        workload.restart("dex").unwrap();
        assert_eq!(workload.state("dex"), WorkloadState::Running);
        assert!(bystander.try_wait().unwrap().is_none(), "bystander was signalled");
        assert_ne!(workload.live_pid("dex"), Some(pid));

        workload.stop_service("dex").unwrap();
        assert!(bystander.try_wait().unwrap().is_none(), "bystander was signalled");
        bystander.kill().unwrap();
        bystander.wait().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn exited_process_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut workload = ProcessWorkload::new(dir.path(), Duration::from_secs(1));
        workload.add_layer(&sleeper("sleep 30")).unwrap();
        workload.restart("dex").unwrap();
        let pid = workload.live_pid("dex").unwrap();

        signal(pid, "-KILL");
        let deadline = Instant::now() + Duration::from_secs(5);
        while workload.state("dex") == WorkloadState::Running && Instant::now() < deadline {
            thread::sleep(STOP_POLL);
        }
        assert_eq!(workload.state("dex"), WorkloadState::Stopped);
    }

    #[test]
    fn unknown_service_cannot_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut workload = ProcessWorkload::new(dir.path(), Duration::from_secs(1));
        assert!(matches!(workload.restart("dex"), Err(Error::Upstream(_))));
    }
}
