//! Measuring one execution of a command.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{BenchError, BenchResult};
use crate::preload::PreloadSpec;
use crate::record::Metrics;

pub const DEFAULT_PRELOAD_VAR: &str = "LD_PRELOAD";

/// GNU time format producing a JSON object with the [`Metrics`] fields.
pub const TIME_FORMAT: &str = r#"
{"real": %e, "user": %U, "sys": %S,
 "mem_total_avg": %K, "mem_max": %M,
 "exit": %x}
"#;

/// Runs a command once and reports what it cost.
///
/// `env` is applied on top of the ambient environment of the child only.
/// A non-zero exit of the measured command is part of the returned
/// [`Metrics`]; an `Err` means the measurement itself could not be taken.
pub trait MetricsCapturer {
    fn measure(&mut self, command: &[String], env: &BTreeMap<String, String>)
        -> BenchResult<Metrics>;

    /// Fail early when `command` cannot be launched at all, so that its exit
    /// status can later be treated purely as data.
    fn check_command(
        &self,
        _command: &[String],
        _env: &BTreeMap<String, String>,
    ) -> BenchResult<()> {
        Ok(())
    }
}

/// Locate `program` the way `execvp` would: paths containing `/` are taken
/// as is, bare names are searched in `path_var`.
pub fn resolve_executable(program: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        let candidate = PathBuf::from(program);
        return is_executable(&candidate).then_some(candidate);
    }
    std::env::split_paths(path_var?)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Environment for one scheduled item: `base`, then the item's own variables,
/// then `preload_var` set to the space-joined libraries (always present, even
/// when empty).
pub fn merge_environment(
    base: &BTreeMap<String, String>,
    spec: &PreloadSpec,
    preload_var: &str,
) -> BTreeMap<String, String> {
    let mut env = base.clone();
    env.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env.insert(preload_var.to_string(), spec.preload_value());
    env
}

/// Measures through the GNU `time` program.
///
/// The variables are handed to `env` inside the timed process tree, so a
/// preloaded library affects the measured command but never `time` itself.
#[derive(Debug, Clone)]
pub struct GnuTimeCapturer {
    program: String,
}

impl Default for GnuTimeCapturer {
    fn default() -> Self {
        Self::new("time")
    }
}

impl GnuTimeCapturer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_command(
        &self,
        report_path: &Path,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--format")
            .arg(TIME_FORMAT)
            .arg("--output")
            .arg(report_path)
            .arg("env")
            .args(env.iter().map(|(k, v)| format!("{}={}", k, v)))
            .args(command);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd
    }
}

impl MetricsCapturer for GnuTimeCapturer {
    fn measure(
        &mut self,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> BenchResult<Metrics> {
        if command.is_empty() {
            return Err(BenchError::MeasurementFacility(
                "no command to measure".to_string(),
            ));
        }
        let report = tempfile::NamedTempFile::new()?;
        let mut cmd = self.build_command(report.path(), command, env);
        debug!(program = %self.program, command = ?command, "starting measurement");

        let status = cmd.status().map_err(|e| {
            BenchError::MeasurementFacility(format!("could not start '{}': {}", self.program, e))
        })?;
        let text = fs::read_to_string(report.path())?;
        parse_time_report(&text).map_err(|reason| {
            BenchError::MeasurementFacility(format!(
                "'{}' exited with {} without a usable report: {}",
                self.program, status, reason
            ))
        })
    }

    fn check_command(
        &self,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> BenchResult<()> {
        let program = command.first().ok_or_else(|| {
            BenchError::MeasurementFacility("no command to measure".to_string())
        })?;
        let ambient = std::env::var_os("PATH");
        let path_var: Option<&OsStr> = match env.get("PATH") {
            Some(path) => Some(OsStr::new(path)),
            None => ambient.as_deref(),
        };
        match resolve_executable(program, path_var) {
            Some(resolved) => {
                debug!(command = %program, resolved = %resolved.display(), "resolved command");
                Ok(())
            }
            None => Err(BenchError::MeasurementFacility(format!(
                "cannot execute '{}': not found or not executable",
                program
            ))),
        }
    }
}

/// Parse the report written with [`TIME_FORMAT`]. GNU time may put notices
/// such as `Command exited with non-zero status 3` before the object.
pub fn parse_time_report(text: &str) -> Result<Metrics, String> {
    let start = text
        .find('{')
        .ok_or_else(|| "report contains no metrics object".to_string())?;
    serde_json::from_str(text[start..].trim_end()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn item_env_overrides_base_and_preload_var_is_always_set() {
        let base = env(&[("A", "base"), ("B", "base")]);
        let spec = PreloadSpec {
            libraries: vec!["x.so".to_string(), "y.so".to_string()],
            env: env(&[("B", "item"), ("C", "item")]),
        };
        let merged = merge_environment(&base, &spec, DEFAULT_PRELOAD_VAR);
        assert_eq!(
            merged,
            env(&[
                ("A", "base"),
                ("B", "item"),
                ("C", "item"),
                ("LD_PRELOAD", "x.so y.so")
            ])
        );
    }

    #[test]
    fn preload_var_wins_over_item_env_and_may_be_empty() {
        let spec = PreloadSpec {
            libraries: Vec::new(),
            env: env(&[("SHIM_PRELOAD", "from-item")]),
        };
        let merged = merge_environment(&BTreeMap::new(), &spec, "SHIM_PRELOAD");
        assert_eq!(merged.get("SHIM_PRELOAD").map(String::as_str), Some(""));
        assert!(!merged.contains_key(DEFAULT_PRELOAD_VAR));
    }

    #[test]
    fn parses_report_with_leading_notice() {
        let text = "Command exited with non-zero status 3\n\n{\"real\": 0.52, \"user\": 0.40, \"sys\": 0.01,\n \"mem_total_avg\": 0, \"mem_max\": 3456,\n \"exit\": 3}\n\n";
        let metrics = parse_time_report(text).expect("parse");
        assert_eq!(
            metrics,
            Metrics {
                real: 0.52,
                user: 0.40,
                sys: 0.01,
                mem_total_avg: 0,
                mem_max: 3456,
                exit: 3,
            }
        );
    }

    #[test]
    fn rejects_reports_without_metrics() {
        assert!(parse_time_report("").is_err());
        assert!(parse_time_report("time: cannot run foo").is_err());
        assert!(parse_time_report("{\"real\": 1.0}").is_err());
    }

    #[test]
    fn command_line_wraps_measured_command_in_env() {
        let capturer = GnuTimeCapturer::new("/usr/bin/time");
        let cmd = capturer.build_command(
            Path::new("/tmp/report"),
            &["prog".to_string(), "--flag".to_string()],
            &env(&[("LD_PRELOAD", "a.so"), ("X", "1")]),
        );
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(cmd.get_program(), "/usr/bin/time");
        assert_eq!(args[0], "--format");
        assert_eq!(args[1], TIME_FORMAT);
        assert_eq!(
            &args[2..],
            &["--output", "/tmp/report", "env", "LD_PRELOAD=a.so", "X=1", "prog", "--flag"]
        );
        assert_eq!(cmd.get_envs().count(), 0);
    }

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "ldbench_measure_{}_{}_{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&root).expect("temp dir");
        root
    }

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, body).expect("script");
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
    }

    #[cfg(unix)]
    #[test]
    fn resolves_commands_by_path_and_executable_bit() {
        let root = temp_root("resolve");
        write_script(&root.join("runnable"), "#!/bin/sh\nexit 0\n", 0o755);
        write_script(&root.join("plain"), "not a program\n", 0o644);
        let search = root.as_os_str();

        assert_eq!(
            resolve_executable("runnable", Some(search)),
            Some(root.join("runnable"))
        );
        assert_eq!(resolve_executable("plain", Some(search)), None);
        assert_eq!(resolve_executable("absent", Some(search)), None);
        assert_eq!(resolve_executable("runnable", None), None);
        let direct = root.join("runnable").display().to_string();
        assert!(resolve_executable(&direct, None).is_some());
        assert_eq!(resolve_executable("", Some(search)), None);
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn check_command_uses_path_from_run_env() {
        let root = temp_root("check");
        write_script(&root.join("workload"), "#!/bin/sh\nexit 0\n", 0o755);
        let capturer = GnuTimeCapturer::default();
        let dir = root.display().to_string();
        let with_path = env(&[("PATH", dir.as_str())]);

        capturer
            .check_command(&["workload".to_string()], &with_path)
            .expect("found on run PATH");
        let err = capturer
            .check_command(&["/nonexistent/ldbench-workload".to_string()], &with_path)
            .expect_err("missing command");
        assert!(matches!(err, BenchError::MeasurementFacility(_)), "{}", err);
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_127_of_measured_command_is_data() {
        let root = temp_root("exit127");
        let fake_time = root.join("fake-time");
        write_script(
            &fake_time,
            "#!/bin/sh\nprintf '{\"real\": 0.5, \"user\": 0.1, \"sys\": 0.0, \"mem_total_avg\": 0, \"mem_max\": 10, \"exit\": 127}' > \"$4\"\nexit 127\n",
            0o755,
        );
        let mut capturer = GnuTimeCapturer::new(fake_time.display().to_string());
        let metrics = capturer
            .measure(&["true".to_string()], &BTreeMap::new())
            .expect("exit status is recorded");
        assert_eq!(metrics.exit, 127);
        assert_eq!(metrics.mem_max, 10);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_time_program_is_a_facility_error() {
        let mut capturer = GnuTimeCapturer::new("/nonexistent/ldbench-time");
        let err = capturer
            .measure(&["true".to_string()], &BTreeMap::new())
            .expect_err("must fail");
        assert!(matches!(err, BenchError::MeasurementFacility(_)), "{}", err);
    }
}
