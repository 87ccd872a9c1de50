//! Port to the external tree-growth tool and its subprocess adapter.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::params::TreeParameters;
use crate::graph::VesselGraph;
use crate::parse::ParseError;
use crate::perfusion::DemandMaps;

pub const DEMAND_MAP_FILE: &str = "demand_map.txt";
pub const SUPPLY_MAP_FILE: &str = "supply_map.txt";

#[derive(Debug, Error)]
pub enum GrowthError {
    #[error("cannot prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("growth tool exited with {status:?}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Failed {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("growth tool killed after {seconds}s\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Timeout {
        seconds: u64,
        stdout: String,
        stderr: String,
    },
    #[error("growth tool did not write {0}")]
    MissingOutput(PathBuf),
    #[error("cannot read grown tree {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

/// One parameter file together with the name it is written under.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterFile {
    pub file_name: String,
    pub parameters: TreeParameters,
}

/// Everything the growth tool needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthRequest {
    pub maps: DemandMaps,
    pub parameter_files: Vec<ParameterFile>,
    pub working_dir: PathBuf,
    /// Run seed; the per-tree `RANDOM_SEED` values are already in the files.
    pub seed: u64,
}

/// A grown tree, keyed by the `OUTPUT_FILENAME` of its parameter file.
#[derive(Debug, Clone, PartialEq)]
pub struct GrownTree {
    pub output_filename: String,
    pub graph: VesselGraph,
}

/// Grows one tree per parameter file of a request.
pub trait TreeGrowthEngine {
    fn grow(&self, request: &GrowthRequest) -> Result<Vec<GrownTree>, GrowthError>;
}

/// Runs the growth executable as
/// `<exe> demand_map.txt supply_map.txt <param_1> [<param_2> ...]` inside
/// the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEngine {
    pub executable: PathBuf,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ProcessEngine {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            poll_interval: Duration::from_millis(50),
        }
    }

    fn write_inputs(request: &GrowthRequest) -> Result<(), GrowthError> {
        let dir = &request.working_dir;
        fs::create_dir_all(dir).map_err(|source| GrowthError::Io {
            path: dir.clone(),
            source,
        })?;
        let files = [
            (DEMAND_MAP_FILE, request.maps.demand_map.as_str()),
            (SUPPLY_MAP_FILE, request.maps.supply_map.as_str()),
        ];
        for (name, text) in files {
            write_file(&dir.join(name), text)?;
        }
        for file in &request.parameter_files {
            write_file(&dir.join(&file.file_name), &file.parameters.to_text())?;
            remove_stale(&dir.join(&file.parameters.output_filename))?;
        }
        Ok(())
    }

    fn wait(&self, child: &mut Child) -> Result<Option<ExitStatus>, std::io::Error> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                child.kill()?;
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl TreeGrowthEngine for ProcessEngine {
    fn grow(&self, request: &GrowthRequest) -> Result<Vec<GrownTree>, GrowthError> {
        Self::write_inputs(request)?;
        let program = self.executable.display().to_string();
        let mut child = Command::new(&self.executable)
            .arg(DEMAND_MAP_FILE)
            .arg(SUPPLY_MAP_FILE)
            .args(request.parameter_files.iter().map(|f| f.file_name.as_str()))
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GrowthError::Spawn {
                program: program.clone(),
                source,
            })?;
        log::debug!(
            "started `{program}` with {} parameter files in {}",
            request.parameter_files.len(),
            request.working_dir.display()
        );

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        let waited = self.wait(&mut child);
        let (stdout, stderr) = (collect(stdout), collect(stderr));

        match waited {
            Ok(Some(status)) if status.success() => {}
            Ok(Some(status)) => {
                return Err(GrowthError::Failed {
                    status: status.code(),
                    stdout,
                    stderr,
                });
            }
            Ok(None) => {
                return Err(GrowthError::Timeout {
                    seconds: self.timeout.as_secs(),
                    stdout,
                    stderr,
                });
            }
            Err(source) => return Err(GrowthError::Spawn { program, source }),
        }

        request
            .parameter_files
            .iter()
            .map(|file| {
                let name = &file.parameters.output_filename;
                let path = request.working_dir.join(name);
                if !path.is_file() {
                    return Err(GrowthError::MissingOutput(path));
                }
                let graph = VesselGraph::load(&path).map_err(|source| GrowthError::Parse { path, source })?;
                Ok(GrownTree {
                    output_filename: name.clone(),
                    graph,
                })
            })
            .collect()
    }
}

fn write_file(path: &Path, text: &str) -> Result<(), GrowthError> {
    fs::write(path, text).map_err(|source| GrowthError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Outputs of an earlier run must not pass for this run's trees.
fn remove_stale(path: &Path) -> Result<(), GrowthError> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed stale output {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GrowthError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Err(err) = pipe.read_to_end(&mut bytes) {
            log::warn!("reading growth tool output failed: {err}");
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROWN_GXL: &str = r#"<gxl><graph id="t">
<node id="n0"><attr name=" position"><tup><float>1</float><float>1</float><float>0</float></tup></attr></node>
<node id="n1"><attr name=" position"><tup><float>1</float><float>1</float><float>2</float></tup></attr></node>
<edge id="e0" to="n1" from="n0"><attr name=" radius"><float>0.1</float></attr></edge>
</graph></gxl>"#;

    fn request(dir: &Path) -> GrowthRequest {
        GrowthRequest {
            maps: DemandMaps {
                demand_map: "1 1 1\n".to_owned(),
                supply_map: "1 1 1 1\n".to_owned(),
            },
            parameter_files: Vec::new(),
            working_dir: dir.to_path_buf(),
            seed: 0,
        }
    }

    /// A request whose demand map doubles as the script run by `sh`.
    fn scripted(dir: &Path, script: &str) -> GrowthRequest {
        let mut request = request(dir);
        request.maps.demand_map = script.to_owned();
        request.parameter_files.push(ParameterFile {
            file_name: "tree_params.txt".to_owned(),
            parameters: TreeParameters {
                perf_point: [1, 1, 0],
                perf_pressure: 133_000.0,
                term_pressure: 63_000.0,
                perf_flow: 1e-5,
                rho: 0.0036,
                gamma: 3.0,
                lambda: 2.0,
                mu: 1.0,
                min_distance: 1.0,
                num_nodes: 2,
                voxel_width: 0.1,
                closest_neighbours: 5,
                output_filename: "tree.gxl".to_owned(),
                random_seed: 7,
            },
        });
        request
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vascu_engine_{name}_{}", std::process::id()))
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let dir = scratch("spawn");
        let engine = ProcessEngine::new(dir.join("no_such_tool"), Duration::from_secs(1));
        let err = engine.grow(&request(&dir)).unwrap_err();
        assert!(matches!(err, GrowthError::Spawn { .. }));
        assert!(dir.join(DEMAND_MAP_FILE).is_file());
        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_output() {
        let dir = scratch("fail");
        let engine = ProcessEngine::new("sh", Duration::from_secs(5));
        let script = "echo grown\necho broken >&2\nexit 3\n";
        match engine.grow(&scripted(&dir, script)).unwrap_err() {
            GrowthError::Failed {
                status,
                stdout,
                stderr,
            } => {
                assert_eq!(status, Some(3));
                assert_eq!(stdout, "grown\n");
                assert_eq!(stderr, "broken\n");
            }
            other => panic!("unexpected {other:?}"),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn slow_tool_is_killed_at_the_timeout() {
        let dir = scratch("timeout");
        let engine = ProcessEngine::new("sh", Duration::from_millis(300));
        let started = Instant::now();
        let err = engine
            .grow(&scripted(&dir, "echo started\nexec sleep 30\n"))
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            GrowthError::Timeout { stdout, .. } => assert_eq!(stdout, "started\n"),
            other => panic!("unexpected {other:?}"),
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn outputs_of_an_earlier_run_are_not_reused() {
        let dir = scratch("stale");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tree.gxl"), GROWN_GXL).unwrap();
        let engine = ProcessEngine::new("sh", Duration::from_secs(5));

        let err = engine.grow(&scripted(&dir, "exit 0\n")).unwrap_err();
        assert!(matches!(err, GrowthError::MissingOutput(path) if path.ends_with("tree.gxl")));
        assert!(!dir.join("tree.gxl").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn written_trees_are_loaded_by_output_name() {
        let dir = scratch("grow");
        let engine = ProcessEngine::new("sh", Duration::from_secs(5));
        let script = format!("test -f tree_params.txt || exit 9\ncat > tree.gxl <<'END'\n{GROWN_GXL}\nEND\n");

        let trees = engine.grow(&scripted(&dir, &script)).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].output_filename, "tree.gxl");
        assert_eq!(trees[0].graph.node_count(), 2);
        assert_eq!(trees[0].graph.edges()[0].radius, 0.1);
        let _ = fs::remove_dir_all(&dir);
    }
}
