//! Launching a service and confirming it started.
//!
//! [`StartDetection`] runs the configured liveness detectors until all of them
//! passed; [`Launch`] wires the whole sequence: pre-launch checks, spawning the
//! command with redirected output, tailing its logs, start detection and
//! finally locating the service's processes.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{ConfigError, Error, Result};
use crate::latch::{PollLatch, Predicate};
use crate::liveness::LivenessDetector;
use crate::process::{
    service_process_ids, DelegatingProcessLocator, HeuristicProcessLocator, Pid,
    ProcessInfoProvider, ProcessLocator,
};
use crate::tail::{DirectoryTailer, LogLineHandler, TailerHandle};

/// Runs detectors in order until every one of them reported alive.
pub struct StartDetection {
    detectors: Vec<Box<dyn LivenessDetector>>,
    timeout: Duration,
    interval: Duration,
}

impl StartDetection {
    pub fn new(detectors: Vec<Box<dyn LivenessDetector>>, timeout: Duration, interval: Duration) -> Self {
        Self {
            detectors,
            timeout,
            interval,
        }
    }

    pub fn detectors(&self) -> &[Box<dyn LivenessDetector>] {
        &self.detectors
    }

    /// Pre-launch hooks of every detector, e.g. the port-in-use check.
    pub async fn before_launch(&self) -> Result<()> {
        for detector in &self.detectors {
            detector.before_launch().await?;
        }
        Ok(())
    }

    /// Wait until every detector passed once.
    ///
    /// A detector that passed is not run again. When `child` is given, each
    /// round first checks whether it exited: a non-zero exit fails the launch,
    /// a clean exit stops the check (the service may have daemonized).
    ///
    /// Returns `Ok(false)` when the timeout passes first.
    pub async fn wait(&self, child: Option<&mut Child>) -> Result<bool> {
        if self.detectors.is_empty() {
            warn!("No liveness detectors configured; assuming the service started");
            return Ok(true);
        }

        let mut round = DetectionRound {
            detectors: &self.detectors,
            passed: vec![false; self.detectors.len()],
            child,
        };
        let latch = PollLatch::new(self.timeout)
            .interval(self.interval)
            .timeout_message("Start detection timed out");

        match latch.wait_for(&mut round).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_timeout() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

struct DetectionRound<'a> {
    detectors: &'a [Box<dyn LivenessDetector>],
    passed: Vec<bool>,
    child: Option<&'a mut Child>,
}

#[async_trait]
impl<'a> Predicate for DetectionRound<'a> {
    async fn is_done(&mut self) -> Result<bool> {
        if let Some(child) = self.child.as_deref_mut() {
            if let Some(status) = child.try_wait()? {
                if !status.success() {
                    return Err(Error::LaunchFailed {
                        code: status.code().unwrap_or(-1),
                    });
                }
                info!("Launched process exited cleanly; continuing with liveness detection only");
                self.child = None;
            }
        }

        for (index, detector) in self.detectors.iter().enumerate() {
            if self.passed[index] {
                continue;
            }
            if !detector.is_alive().await? {
                debug!(detector = detector.name(), "Liveness detector not passed yet");
                return Ok(false);
            }
            info!(detector = detector.name(), "Liveness detector passed");
            self.passed[index] = true;
        }
        Ok(true)
    }
}

/// A launched service that passed start detection.
pub struct LaunchedService {
    pub child: Child,
    pub pids: Vec<Pid>,
    tailer: Arc<DirectoryTailer>,
    tailer_handle: TailerHandle,
}

impl LaunchedService {
    pub fn tailer(&self) -> &Arc<DirectoryTailer> {
        &self.tailer
    }

    /// Wait for the launched command to exit, then flush and stop the tailer.
    pub async fn wait(mut self) -> Result<std::process::ExitStatus> {
        let status = self.child.wait().await?;
        let tailer = Arc::clone(&self.tailer);
        tokio::task::spawn_blocking(move || tailer.dump()).await?;
        self.tailer_handle.stop().await?;
        Ok(status)
    }
}

/// The full launch sequence for one service.
pub struct Launch {
    name: String,
    working_dir: PathBuf,
    logs_dir: PathBuf,
    log_pattern: String,
    tailer_interval: Duration,
    post_launch_wait: Duration,
    pids_limit: usize,
    detection: StartDetection,
    locators: Vec<Box<dyn ProcessLocator>>,
}

impl Launch {
    /// Build from the `[service]` section. The heuristic locator is always
    /// used; a configured locator script is added after it.
    pub fn from_config(config: &ServiceConfig, provider: Arc<dyn ProcessInfoProvider>) -> Result<Self> {
        let detectors = config
            .detector_configs()?
            .iter()
            .map(|c| c.build())
            .collect::<Result<Vec<_>>>()?;

        let mut locators: Vec<Box<dyn ProcessLocator>> =
            vec![Box::new(HeuristicProcessLocator::new(provider))];
        if let Some(script) = config.locator_script()? {
            locators.push(Box::new(DelegatingProcessLocator::new(script)));
        }

        Ok(Self {
            name: config.name.clone(),
            working_dir: config.working_dir.clone(),
            logs_dir: config.logs_dir(),
            log_pattern: config.log_pattern(),
            tailer_interval: config.tailer_interval(),
            post_launch_wait: config.post_launch_wait(),
            pids_limit: config.pids_limit,
            detection: StartDetection::new(
                detectors,
                config.start_detection_timeout(),
                config.start_detection_interval(),
            ),
            locators,
        })
    }

    /// Launch `command` and supervise it until it is confirmed started.
    ///
    /// When the launch fails after the command was spawned, the command is
    /// killed and reaped before the error is returned.
    ///
    /// # Errors
    ///
    /// A pre-launch check failing (e.g. [`Error::PortInUse`]), the command
    /// exiting with a non-zero code ([`Error::LaunchFailed`]), start detection
    /// timing out ([`Error::Timeout`]), or locating more PIDs than allowed.
    pub async fn run(mut self, command: &[String]) -> Result<LaunchedService> {
        let Some((program, args)) = command.split_first() else {
            return Err(ConfigError::MissingField { field: "command" }.into());
        };

        self.detection.before_launch().await?;
        let (locators, ()) = on_blocking_pool(std::mem::take(&mut self.locators), |locators| {
            locators.iter_mut().try_for_each(|locator| locator.before_launch())
        })
        .await?;

        fs::create_dir_all(&self.logs_dir)?;
        let stdout = append(&self.logs_dir.join(format!("{}.out", self.name)))?;
        let stderr = append(&self.logs_dir.join(format!("{}.err", self.name)))?;

        info!(service = %self.name, command = ?command, "Launching service");
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?;

        let tailer = match DirectoryTailer::new(&self.logs_dir, &self.log_pattern, LogLineHandler) {
            Ok(tailer) => Arc::new(tailer),
            Err(e) => {
                stop(&self.name, &mut child).await;
                return Err(e.into());
            }
        };
        let tailer_handle = Arc::clone(&tailer).spawn(self.tailer_interval);

        let pids = match self.supervise(&mut child, &tailer, locators).await {
            Ok(pids) => pids,
            Err(e) => {
                stop(&self.name, &mut child).await;
                return Err(e);
            }
        };
        info!(service = %self.name, pids = ?pids, "Service started");

        Ok(LaunchedService {
            child,
            pids,
            tailer,
            tailer_handle,
        })
    }

    /// Everything between spawning the command and handing it to the caller.
    async fn supervise(
        &self,
        child: &mut Child,
        tailer: &Arc<DirectoryTailer>,
        locators: Vec<Box<dyn ProcessLocator>>,
    ) -> Result<Vec<Pid>> {
        tokio::time::sleep(self.post_launch_wait).await;

        if let Some(status) = child.try_wait()? {
            if !status.success() {
                dump(tailer).await;
                return Err(Error::LaunchFailed {
                    code: status.code().unwrap_or(-1),
                });
            }
        }

        match self.detection.wait(Some(child)).await {
            Ok(true) => {}
            Ok(false) => {
                dump(tailer).await;
                return Err(Error::Timeout {
                    message: format!(
                        "Service {} was not detected as started within {}s",
                        self.name,
                        self.detection.timeout.as_secs()
                    ),
                });
            }
            Err(e) => {
                dump(tailer).await;
                return Err(e);
            }
        }

        let limit = self.pids_limit;
        let (_, pids) =
            on_blocking_pool(locators, move |locators| service_process_ids(locators, limit)).await?;
        Ok(pids)
    }
}

/// Kill the launched command and reap it. An already exited command is only
/// reaped.
async fn stop(service: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(service, error = %e, "Launched command already exited");
    }
    match child.wait().await {
        Ok(status) => info!(service, status = %status, "Stopped launched command"),
        Err(e) => warn!(service, error = %e, "Failed to reap launched command"),
    }
}

/// Process table scans block, so locators run on the blocking pool.
async fn on_blocking_pool<T, F>(
    mut locators: Vec<Box<dyn ProcessLocator>>,
    f: F,
) -> Result<(Vec<Box<dyn ProcessLocator>>, T)>
where
    F: FnOnce(&mut [Box<dyn ProcessLocator>]) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (locators, result) = tokio::task::spawn_blocking(move || {
        let result = f(&mut locators);
        (locators, result)
    })
    .await?;
    Ok((locators, result?))
}

fn append(path: &Path) -> Result<fs::File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

async fn dump(tailer: &Arc<DirectoryTailer>) {
    let tailer = Arc::clone(tailer);
    if let Err(e) = tokio::task::spawn_blocking(move || tailer.dump()).await {
        warn!(error = %e, "Failed to dump service logs");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Alive from the `alive_from`-th call on; counts calls.
    struct Countdown {
        calls: Arc<AtomicU32>,
        alive_from: u32,
    }

    #[async_trait]
    impl LivenessDetector for Countdown {
        fn name(&self) -> &'static str {
            "countdown"
        }

        async fn is_alive(&self) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n >= self.alive_from)
        }
    }

    fn countdown(alive_from: u32) -> (Arc<AtomicU32>, Box<dyn LivenessDetector>) {
        let calls = Arc::new(AtomicU32::new(0));
        let detector = Countdown {
            calls: calls.clone(),
            alive_from,
        };
        (calls, Box::new(detector))
    }

    #[tokio::test]
    async fn no_detectors_means_started() {
        let detection = StartDetection::new(Vec::new(), Duration::ZERO, Duration::from_millis(1));
        assert!(detection.wait(None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn passed_detectors_are_not_rerun() {
        let (first_calls, first) = countdown(1);
        let (second_calls, second) = countdown(3);
        let detection = StartDetection::new(
            vec![first, second],
            Duration::from_secs(60),
            Duration::from_secs(1),
        );

        assert!(detection.wait(None).await.unwrap());

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_not_started() {
        let (_, never) = countdown(u32::MAX);
        let detection =
            StartDetection::new(vec![never], Duration::from_secs(3), Duration::from_secs(1));

        assert!(!detection.wait(None).await.unwrap());
    }

    #[tokio::test]
    async fn failing_child_aborts_detection() {
        let (_, never) = countdown(u32::MAX);
        let detection =
            StartDetection::new(vec![never], Duration::from_secs(10), Duration::from_millis(20));
        let mut child = Command::new("sh").arg("-c").arg("exit 3").spawn().unwrap();

        let err = detection.wait(Some(&mut child)).await.unwrap_err();

        assert!(matches!(err, Error::LaunchFailed { code: 3 }));
    }
}
