//! Background service registration.
//!
//! On Linux the agent is installed as a systemd unit; on Windows as a
//! scheduled task started at boot under the SYSTEM account. The command line
//! baked into the registration carries the install-time overrides.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

/// Registered service name.
pub const SERVICE_NAME: &str = "hostwatch";

/// Default systemd unit directory.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Errors raised by install and uninstall.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Writing or removing the registration failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A service-manager command exited unsuccessfully.
    #[error("`{program}` failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// No service backend exists for this platform.
    #[error("service installation is not supported on {0}")]
    Unsupported(&'static str),
}

/// Runs service-manager commands.
pub trait CommandRunner {
    /// Run `program` with `args`, failing on a non-zero exit.
    fn run(&self, program: &str, args: &[String]) -> Result<(), ServiceError>;
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<(), ServiceError> {
        tracing::debug!(program, ?args, "Running service command");
        let output = Command::new(program).args(args).output()?;
        if output.status.success() {
            return Ok(());
        }
        Err(ServiceError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// How the agent is registered with the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceBackend {
    /// A systemd unit written to `unit_dir`.
    Systemd { unit_dir: PathBuf },
    /// A Windows scheduled task triggered at startup.
    ScheduledTask,
}

impl ServiceBackend {
    /// Backend for the running platform.
    pub fn native() -> Result<Self, ServiceError> {
        if cfg!(windows) {
            Ok(Self::ScheduledTask)
        } else if cfg!(target_os = "linux") {
            Ok(Self::Systemd {
                unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            })
        } else {
            Err(ServiceError::Unsupported(std::env::consts::OS))
        }
    }
}

/// Command line the service runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallOptions {
    /// Agent executable.
    pub exe: PathBuf,
    /// Configuration file.
    pub config: PathBuf,
    /// Enabled collector set override.
    pub collectors: Option<Vec<String>>,
    /// Sampling interval override.
    pub interval: Option<Duration>,
    /// Aggregation count override.
    pub aggregation_count: Option<usize>,
}

impl InstallOptions {
    /// Arguments passed to the executable.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--config".to_string(),
            self.config.display().to_string(),
        ];
        if let Some(collectors) = &self.collectors {
            args.push("--collectors".to_string());
            args.push(collectors.join(","));
        }
        if let Some(interval) = self.interval {
            args.push("--interval".to_string());
            args.push(humantime::format_duration(interval).to_string());
        }
        if let Some(count) = self.aggregation_count {
            args.push("--aggregation-count".to_string());
            args.push(count.to_string());
        }
        args
    }

    /// Full command line with quoting for arguments containing spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.exe.display().to_string())
            .chain(self.run_args())
            .map(|arg| quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('"') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// systemd unit text for `options`.
pub fn render_unit(options: &InstallOptions) -> String {
    format!(
        "[Unit]\n\
         Description=hostwatch host telemetry agent\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={}\n\
         Restart=on-failure\n\
         RestartSec=5\n\
         TimeoutStopSec=15\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        options.command_line()
    )
}

/// Installs and removes the agent's registration.
#[derive(Debug)]
pub struct ServiceManager<R = SystemRunner> {
    backend: ServiceBackend,
    runner: R,
}

impl ServiceManager<SystemRunner> {
    /// Manager for the running platform.
    pub fn native() -> Result<Self, ServiceError> {
        Ok(Self::new(ServiceBackend::native()?, SystemRunner))
    }
}

impl<R: CommandRunner> ServiceManager<R> {
    /// Manager for an explicit backend and runner.
    pub fn new(backend: ServiceBackend, runner: R) -> Self {
        Self { backend, runner }
    }

    /// Register and start the agent.
    pub fn install(&self, options: &InstallOptions) -> Result<(), ServiceError> {
        match &self.backend {
            ServiceBackend::Systemd { unit_dir } => {
                let path = unit_path(unit_dir);
                std::fs::create_dir_all(unit_dir)?;
                std::fs::write(&path, render_unit(options))?;
                tracing::info!(unit = %path.display(), "systemd unit written");

                self.systemctl(&["daemon-reload"])?;
                self.systemctl(&["enable", "--now", SERVICE_NAME])?;
            }
            ServiceBackend::ScheduledTask => {
                self.schtasks(&[
                    "/Create",
                    "/TN",
                    SERVICE_NAME,
                    "/TR",
                    &options.command_line(),
                    "/SC",
                    "ONSTART",
                    "/RU",
                    "SYSTEM",
                    "/RL",
                    "HIGHEST",
                    "/F",
                ])?;
                self.schtasks(&["/Run", "/TN", SERVICE_NAME])?;
            }
        }
        tracing::info!(service = SERVICE_NAME, "Service installed");
        Ok(())
    }

    /// Stop and unregister the agent.
    ///
    /// Stopping an agent that is not running is not an error.
    pub fn uninstall(&self) -> Result<(), ServiceError> {
        match &self.backend {
            ServiceBackend::Systemd { unit_dir } => {
                if let Err(e) = self.systemctl(&["disable", "--now", SERVICE_NAME]) {
                    tracing::warn!(error = %e, "Failed to stop service, removing unit anyway");
                }
                let path = unit_path(unit_dir);
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::info!(unit = %path.display(), "systemd unit removed"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::warn!(unit = %path.display(), "systemd unit not found");
                    }
                    Err(e) => return Err(e.into()),
                }
                self.systemctl(&["daemon-reload"])?;
            }
            ServiceBackend::ScheduledTask => {
                if let Err(e) = self.schtasks(&["/End", "/TN", SERVICE_NAME]) {
                    tracing::warn!(error = %e, "Failed to stop task, deleting anyway");
                }
                self.schtasks(&["/Delete", "/TN", SERVICE_NAME, "/F"])?;
            }
        }
        tracing::info!(service = SERVICE_NAME, "Service uninstalled");
        Ok(())
    }

    fn systemctl(&self, args: &[&str]) -> Result<(), ServiceError> {
        self.runner.run("systemctl", &owned(args))
    }

    fn schtasks(&self, args: &[&str]) -> Result<(), ServiceError> {
        self.runner.run("schtasks", &owned(args))
    }
}

fn unit_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(format!("{SERVICE_NAME}.service"))
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl CommandRunner for &Recorder {
        fn run(&self, program: &str, args: &[String]) -> Result<(), ServiceError> {
            let line = format!("{program} {}", args.join(" "));
            self.calls.borrow_mut().push(line.clone());
            match self.fail_on {
                Some(needle) if line.contains(needle) => Err(ServiceError::CommandFailed {
                    program: program.to_string(),
                    status: "exit status: 5".into(),
                    stderr: "not loaded".into(),
                }),
                _ => Ok(()),
            }
        }
    }

    fn options() -> InstallOptions {
        InstallOptions {
            exe: PathBuf::from("/opt/hostwatch/bin/hostwatch"),
            config: PathBuf::from("/etc/hostwatch/my config.yaml"),
            collectors: Some(vec!["memory".into(), "processor".into()]),
            interval: Some(Duration::from_secs(5)),
            aggregation_count: Some(12),
        }
    }

    #[test]
    fn test_run_args() {
        assert_eq!(
            options().run_args(),
            vec![
                "run",
                "--config",
                "/etc/hostwatch/my config.yaml",
                "--collectors",
                "memory,processor",
                "--interval",
                "5s",
                "--aggregation-count",
                "12",
            ]
        );
    }

    #[test]
    fn test_run_args_without_overrides() {
        let opts = InstallOptions {
            collectors: None,
            interval: None,
            aggregation_count: None,
            ..options()
        };
        assert_eq!(opts.run_args().len(), 3);
    }

    #[test]
    fn test_unit_quotes_paths() {
        let unit = render_unit(&options());
        assert!(unit.contains(
            "ExecStart=/opt/hostwatch/bin/hostwatch run --config \"/etc/hostwatch/my config.yaml\""
        ));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn test_systemd_install_and_uninstall() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let manager = ServiceManager::new(
            ServiceBackend::Systemd {
                unit_dir: dir.path().to_path_buf(),
            },
            &recorder,
        );

        manager.install(&options()).unwrap();
        let unit = dir.path().join("hostwatch.service");
        assert!(unit.exists());
        assert_eq!(
            *recorder.calls.borrow(),
            vec!["systemctl daemon-reload", "systemctl enable --now hostwatch"]
        );

        manager.uninstall().unwrap();
        assert!(!unit.exists());
        assert_eq!(recorder.calls.borrow().len(), 4);
    }

    #[test]
    fn test_uninstall_tolerates_stopped_service() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder {
            fail_on: Some("disable"),
            ..Default::default()
        };
        let manager = ServiceManager::new(
            ServiceBackend::Systemd {
                unit_dir: dir.path().to_path_buf(),
            },
            &recorder,
        );
        assert!(manager.uninstall().is_ok());
    }

    #[test]
    fn test_install_propagates_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder {
            fail_on: Some("enable"),
            ..Default::default()
        };
        let manager = ServiceManager::new(
            ServiceBackend::Systemd {
                unit_dir: dir.path().to_path_buf(),
            },
            &recorder,
        );
        let err = manager.install(&options()).unwrap_err();
        assert!(matches!(err, ServiceError::CommandFailed { .. }));
    }

    #[test]
    fn test_scheduled_task_commands() {
        let recorder = Recorder::default();
        let manager = ServiceManager::new(ServiceBackend::ScheduledTask, &recorder);
        manager.install(&options()).unwrap();
        manager.uninstall().unwrap();

        let calls = recorder.calls.borrow();
        assert!(calls[0].starts_with("schtasks /Create /TN hostwatch /TR "));
        assert!(calls[0].ends_with("/SC ONSTART /RU SYSTEM /RL HIGHEST /F"));
        assert_eq!(calls[1], "schtasks /Run /TN hostwatch");
        assert_eq!(calls[2], "schtasks /End /TN hostwatch");
        assert_eq!(calls[3], "schtasks /Delete /TN hostwatch /F");
    }
}
