//! Scripted in-memory sandbox engine shared by the integration tests.
//!
//! Each image maps to a [`Script`] describing how the "program" in that
//! sandbox behaves. Output is encoded in the multiplexed wire format and
//! decoded back through `demux::frames`, so the tests exercise the real
//! frame decoder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use code_runner::error::EngineError;
use code_runner::execution::demux::{self, Frame};
use code_runner::execution::workspace::INPUT_FILE_NAME;
use code_runner::execution::{
    AttachedChannel, EngineContext, Executor, ExecutorSettings, SandboxEngine, SandboxSpec,
    SandboxStatus, WorkspaceManager,
};
use code_runner::languages::LanguageRegistry;

/// Engine call that a script can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Create,
    Start,
    Attach,
    /// Attach succeeds but writing to stdin fails.
    Input,
}

/// Behavior of the program inside a fake sandbox.
#[derive(Debug, Clone)]
pub enum Script {
    /// Writes the given frames, then exits with `code`.
    Exit { code: i64, frames: Vec<Frame> },
    /// Writes the workspace's source file to stdout and whatever arrives on
    /// stdin to stderr, then exits with `code` once stdin is closed.
    Echo { code: i64 },
    /// Copies stdin to stdout as it arrives, then exits with `code` once
    /// stdin is closed.
    Cat { code: i64 },
    /// Writes the given frames and exits with `code`, but the output
    /// channel never closes.
    Linger { code: i64, frames: Vec<Frame> },
    /// Never writes, never reads stdin and never exits.
    Hang,
    /// Panics while the sandbox is being waited on.
    Panic,
    /// The given engine call fails.
    Fail(FailPoint),
}

impl Script {
    pub fn stdout(text: &str) -> Self {
        Script::Exit {
            code: 0,
            frames: vec![Frame::stdout(text.as_bytes())],
        }
    }

    pub fn stderr_exit(code: i64, text: &str) -> Self {
        Script::Exit {
            code,
            frames: vec![Frame::stderr(text.as_bytes())],
        }
    }
}

struct Instance {
    spec: SandboxSpec,
    script: Script,
    exit_tx: Arc<watch::Sender<Option<i64>>>,
}

#[derive(Default)]
struct Calls {
    created: Vec<SandboxSpec>,
    workspace_files: Vec<Vec<String>>,
    started: Vec<String>,
    removed: Vec<String>,
}

/// In-memory [`SandboxEngine`].
pub struct FakeEngine {
    default_script: Script,
    scripts: HashMap<String, Script>,
    instances: Mutex<HashMap<String, Instance>>,
    calls: Mutex<Calls>,
    next_id: Mutex<u64>,
}

impl FakeEngine {
    pub fn new(default_script: Script) -> Self {
        Self {
            default_script,
            scripts: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
            calls: Mutex::new(Calls::default()),
            next_id: Mutex::new(0),
        }
    }

    /// Uses `script` for sandboxes created from `image`.
    pub fn with_image_script(mut self, image: &str, script: Script) -> Self {
        self.scripts.insert(image.to_string(), script);
        self
    }

    pub fn created(&self) -> Vec<SandboxSpec> {
        self.calls.lock().unwrap().created.clone()
    }

    /// File names present in each workspace when its sandbox was created.
    pub fn workspace_files(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().workspace_files.clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.calls.lock().unwrap().started.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.calls.lock().unwrap().removed.clone()
    }

    /// Sandboxes created and not yet removed.
    pub fn live(&self) -> usize {
        self.instances.lock().unwrap().len()
    }

    fn script_for(&self, image: &str) -> Script {
        self.scripts
            .get(image)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone())
    }

    fn instance<T>(&self, id: &str, f: impl FnOnce(&Instance) -> T) -> Result<T, EngineError> {
        let instances = self.instances.lock().unwrap();
        instances
            .get(id)
            .map(f)
            .ok_or_else(|| EngineError::SandboxNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl SandboxEngine for FakeEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn create_sandbox(&self, spec: &SandboxSpec) -> Result<String, EngineError> {
        let script = self.script_for(&spec.image);
        if matches!(script, Script::Fail(FailPoint::Create)) {
            return Err(EngineError::Request("no such image".to_string()));
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("fake-{}", *next)
        };
        let (exit_tx, _) = watch::channel(None);
        let exit_tx = Arc::new(exit_tx);
        let files = file_names(&workspace_of(spec));
        {
            let mut calls = self.calls.lock().unwrap();
            calls.created.push(spec.clone());
            calls.workspace_files.push(files);
        }
        self.instances.lock().unwrap().insert(
            id.clone(),
            Instance {
                spec: spec.clone(),
                script,
                exit_tx,
            },
        );
        Ok(id)
    }

    async fn start_sandbox(&self, id: &str) -> Result<(), EngineError> {
        let script = self.instance(id, |i| i.script.clone())?;
        if matches!(script, Script::Fail(FailPoint::Start)) {
            return Err(EngineError::Request("start refused".to_string()));
        }
        self.calls.lock().unwrap().started.push(id.to_string());
        Ok(())
    }

    async fn attach_sandbox(&self, id: &str) -> Result<AttachedChannel, EngineError> {
        let (script, spec, exit_tx) =
            self.instance(id, |i| (i.script.clone(), i.spec.clone(), Arc::clone(&i.exit_tx)))?;

        match script {
            Script::Fail(FailPoint::Attach) => {
                Err(EngineError::Stream("attach refused".to_string()))
            }
            Script::Fail(FailPoint::Input) => Ok(AttachedChannel {
                output: futures::stream::pending().boxed(),
                input: Box::pin(BrokenStdin),
            }),
            Script::Fail(_) => Err(EngineError::Request("unexpected attach".to_string())),
            Script::Exit { code, frames } => {
                let wire: Vec<u8> = frames.iter().flat_map(Frame::encode).collect();
                exit_tx.send_replace(Some(code));
                Ok(AttachedChannel {
                    output: demux::frames(std::io::Cursor::new(wire)),
                    input: Box::pin(tokio::io::sink()),
                })
            }
            Script::Linger { code, frames } => {
                let wire: Vec<u8> = frames.iter().flat_map(Frame::encode).collect();
                exit_tx.send_replace(Some(code));
                Ok(AttachedChannel {
                    output: demux::frames(std::io::Cursor::new(wire))
                        .chain(futures::stream::pending())
                        .boxed(),
                    input: Box::pin(tokio::io::sink()),
                })
            }
            Script::Hang => Ok(AttachedChannel {
                output: futures::stream::pending().boxed(),
                input: Box::pin(StuckStdin),
            }),
            Script::Panic => Ok(AttachedChannel {
                output: futures::stream::pending().boxed(),
                input: Box::pin(tokio::io::sink()),
            }),
            Script::Echo { code } => {
                let source = read_source(&workspace_of(&spec));
                let (stdin, mut program_stdin) = tokio::io::duplex(64 * 1024);
                let (mut program_out, output) = tokio::io::duplex(64 * 1024);

                tokio::spawn(async move {
                    let mut received = Vec::new();
                    let _ = program_stdin.read_to_end(&mut received).await;
                    let _ = program_out.write_all(&Frame::stdout(source).encode()).await;
                    if !received.is_empty() {
                        let _ = program_out.write_all(&Frame::stderr(received).encode()).await;
                    }
                    drop(program_out);
                    exit_tx.send_replace(Some(code));
                });

                Ok(AttachedChannel {
                    output: demux::frames(output),
                    input: Box::pin(stdin),
                })
            }
            Script::Cat { code } => {
                let (stdin, mut program_stdin) = tokio::io::duplex(64 * 1024);
                let (mut program_out, output) = tokio::io::duplex(64 * 1024);

                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8 * 1024];
                    loop {
                        let n = match program_stdin.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        let frame = Frame::stdout(buf[..n].to_vec()).encode();
                        if program_out.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                    drop(program_out);
                    exit_tx.send_replace(Some(code));
                });

                Ok(AttachedChannel {
                    output: demux::frames(output),
                    input: Box::pin(stdin),
                })
            }
        }
    }

    async fn wait_sandbox(&self, id: &str) -> Result<i64, EngineError> {
        let (mut rx, panics) =
            self.instance(id, |i| (i.exit_tx.subscribe(), matches!(i.script, Script::Panic)))?;
        if panics {
            panic!("sandbox {id} blew up while waiting");
        }
        let code = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| EngineError::SandboxNotFound { id: id.to_string() })?;
        Ok((*code).unwrap_or(-1))
    }

    async fn inspect_sandbox(&self, id: &str) -> Result<SandboxStatus, EngineError> {
        self.instance(id, |i| match *i.exit_tx.borrow() {
            Some(exit_code) => SandboxStatus::Exited {
                exit_code,
                oom_killed: false,
            },
            None => SandboxStatus::Running,
        })
    }

    async fn sandbox_logs(&self, id: &str) -> Result<String, EngineError> {
        self.instance(id, |_| String::new())
    }

    async fn remove_sandbox(&self, id: &str) -> Result<(), EngineError> {
        self.instances.lock().unwrap().remove(id);
        self.calls.lock().unwrap().removed.push(id.to_string());
        Ok(())
    }
}

/// Host-side workspace path from the sandbox's bind mount.
pub fn workspace_of(spec: &SandboxSpec) -> PathBuf {
    let bind = spec.binds.first().map(String::as_str).unwrap_or_default();
    PathBuf::from(bind.split(':').next().unwrap_or_default())
}

fn file_names(workspace: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(workspace)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Stdin whose every write fails.
struct BrokenStdin;

impl AsyncWrite for BrokenStdin {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Stdin of a program that never reads it.
struct StuckStdin;

impl AsyncWrite for StuckStdin {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

fn read_source(workspace: &Path) -> Vec<u8> {
    let mut names: Vec<PathBuf> = std::fs::read_dir(workspace)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default();
    names.sort();
    names
        .into_iter()
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(INPUT_FILE_NAME))
        .flat_map(|p| std::fs::read(p).unwrap_or_default())
        .collect()
}

/// Executor over `engine` with workspaces under `root`.
pub fn executor(engine: Arc<FakeEngine>, root: &Path) -> Executor {
    executor_with(engine, root, LanguageRegistry::builtin(), ExecutorSettings::default())
}

pub fn executor_with(
    engine: Arc<FakeEngine>,
    root: &Path,
    registry: LanguageRegistry,
    settings: ExecutorSettings,
) -> Executor {
    Executor::new(
        Arc::new(EngineContext::connected(engine)),
        Arc::new(registry),
        WorkspaceManager::new(root),
        settings,
    )
}

/// Number of entries directly under `root`; zero when it does not exist.
pub fn entries(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}
