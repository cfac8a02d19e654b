//! Integration tests against a real Docker daemon.
//!
//! These tests pull images and start containers.
//! Run with: cargo test --test docker_integration -- --ignored

use std::sync::Arc;

use code_runner::error::ExecutionError;
use code_runner::execution::{
    DockerEngine, EngineContext, ExecutionRequest, Executor, ExecutorSettings, SandboxEngine,
    WorkspaceManager,
};
use code_runner::languages::{LanguageRegistry, LanguageSpec};

async fn create_executor(registry: LanguageRegistry, root: &std::path::Path) -> Executor {
    let engine = DockerEngine::connect(std::env::var("DOCKER_SOCKET").ok().as_deref())
        .expect("Docker client should build");
    engine.ping().await.expect("Docker daemon should answer ping");

    Executor::new(
        Arc::new(EngineContext::connected(Arc::new(engine))),
        Arc::new(registry),
        WorkspaceManager::new(root),
        ExecutorSettings::default(),
    )
}

#[tokio::test]
#[ignore] // Run with: cargo test --test docker_integration -- --ignored
async fn test_python_hello() {
    let root = tempfile::tempdir().expect("tempdir");
    let executor = create_executor(LanguageRegistry::builtin(), root.path()).await;

    let outcome = executor
        .execute(ExecutionRequest::new("python", "print('hello')"))
        .await
        .expect("execution should succeed");

    assert_eq!(outcome.stdout, "hello\n");
    assert_eq!(outcome.exit_code, 0);
}

#[tokio::test]
#[ignore]
async fn test_python_reads_stdin() {
    let root = tempfile::tempdir().expect("tempdir");
    let executor = create_executor(LanguageRegistry::builtin(), root.path()).await;

    let outcome = executor
        .execute(
            ExecutionRequest::new("python", "import sys\nprint(sum(int(x) for x in sys.stdin.read().split()))")
                .with_input("1 2 3\n"),
        )
        .await
        .expect("execution should succeed");

    assert_eq!(outcome.stdout.trim(), "6");
}

#[tokio::test]
#[ignore]
async fn test_c_compile_error_goes_to_stderr() {
    let root = tempfile::tempdir().expect("tempdir");
    let executor = create_executor(LanguageRegistry::builtin(), root.path()).await;

    let outcome = executor
        .execute(ExecutionRequest::new("c", "int main( { return 0; }"))
        .await
        .expect("a failed compile is still an outcome");

    assert_ne!(outcome.exit_code, 0);
    assert!(
        outcome.stderr.contains("error"),
        "stderr should carry the compiler diagnostics, got: {}",
        outcome.stderr
    );
}

#[tokio::test]
#[ignore]
async fn test_infinite_loop_times_out() {
    let root = tempfile::tempdir().expect("tempdir");
    let registry = LanguageRegistry::from_specs([LanguageSpec::new(
        "python",
        "python:3.12-slim",
        "py",
        "python3 program.py",
    )
    .with_timeout_seconds(3)]);
    let executor = create_executor(registry, root.path()).await;

    let err = executor
        .execute(ExecutionRequest::new("python", "while True:\n    pass\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Timeout { seconds: 3 }));
    assert_eq!(std::fs::read_dir(root.path()).expect("root").count(), 0);
}
