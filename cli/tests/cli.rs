//! Integration tests driving the real `conduit` binary.
//!
//! Helper-process subcommands are exercised exactly the way the lifecycle
//! manager uses them: spawned with piped stdio, spoken to in line-delimited
//! JSON-RPC.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

const BIN: &str = env!("CARGO_BIN_EXE_conduit");

struct Helper {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Helper {
    fn spawn(args: &[&str], envs: &[(&str, &str)]) -> Self {
        let mut command = Command::new(BIN);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in envs {
            command.env(key, value);
        }

        let mut child = command.spawn().expect("spawn conduit helper");
        let stdin = child.stdin.take().unwrap();
        let stdout = BufReader::new(child.stdout.take().unwrap()).lines();
        Self {
            child,
            stdin,
            stdout,
        }
    }

    /// Send one request line and read one response line.
    async fn request(&mut self, request: serde_json::Value) -> serde_json::Value {
        let mut line = request.to_string();
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await.unwrap();

        let response = tokio::time::timeout(Duration::from_secs(10), self.stdout.next_line())
            .await
            .expect("helper response timed out")
            .unwrap()
            .expect("helper closed stdout");
        serde_json::from_str(&response).unwrap()
    }

    async fn shutdown(mut self) {
        drop(self.stdin);
        let _ = tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await;
    }
}

#[tokio::test]
async fn workspace_server_speaks_the_pipe_protocol() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.txt");
    std::fs::write(&path, "hello from the helper").unwrap();

    let mut helper = Helper::spawn(&["serve", "workspace"], &[]);

    let init = helper
        .request(serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {},
        }))
        .await;
    assert_eq!(init["result"]["serverInfo"]["name"], "workspace");

    let list = helper
        .request(serde_json::json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/list",
        }))
        .await;
    let tools = list["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "read_file"));

    let call = helper
        .request(serde_json::json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": { "name": "read_file", "arguments": { "path": path.to_str().unwrap() } },
        }))
        .await;
    assert_eq!(call["result"]["success"], true);
    assert!(
        call["result"]["output"]
            .as_str()
            .unwrap()
            .contains("hello from the helper")
    );

    helper.shutdown().await;
}

#[tokio::test]
async fn gateway_degrades_gracefully_when_disconnected() {
    // Port 1 refuses connections immediately; one quick attempt per burst.
    let mut helper = Helper::spawn(
        &["gateway"],
        &[
            ("CONDUIT_BROWSER_ADDR", "127.0.0.1:1"),
            ("CONDUIT_BROWSER_MAX_ATTEMPTS", "1"),
            ("CONDUIT_BROWSER_RETRY_MS", "10"),
        ],
    );

    let init = helper
        .request(serde_json::json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {},
        }))
        .await;
    assert_eq!(init["result"]["serverInfo"]["name"], "browser");

    // The status tool answers even though the link never connected.
    let status = helper
        .request(serde_json::json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": { "name": "browser_status", "arguments": {} },
        }))
        .await;
    assert_eq!(status["result"]["success"], true);
    let link: serde_json::Value =
        serde_json::from_str(status["result"]["output"].as_str().unwrap()).unwrap();
    assert_eq!(link["connected"], false);

    // Remote tools answer with a structured unavailability result, not a
    // protocol error.
    let navigate = helper
        .request(serde_json::json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": { "name": "browser_navigate", "arguments": { "url": "https://example.com" } },
        }))
        .await;
    assert_eq!(navigate["result"]["success"], false);
    assert_eq!(navigate["result"]["error"]["code"], "SERVICE_UNAVAILABLE");

    helper.shutdown().await;
}

#[tokio::test]
async fn registry_routes_calls_into_a_spawned_helper() {
    use conduit_domain::tool::entities::ToolCall;
    use conduit_infrastructure::registry::ConnectionRegistry;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routed.txt");
    std::fs::write(&path, "routed through the registry").unwrap();

    let registry = ConnectionRegistry::new();
    let merged = registry
        .connect_pipe(
            "workspace",
            BIN,
            &["serve".to_string(), "workspace".to_string()],
            &Default::default(),
            None,
        )
        .await
        .unwrap();
    assert!(merged >= 3);
    assert!(registry.has_tool("read_file"));

    let call = ToolCall::new("read_file").with_arg("path", path.to_str().unwrap());
    let result = registry.call_tool(&call).await.unwrap();
    assert!(result.is_success());
    assert!(
        result
            .output()
            .unwrap()
            .contains("routed through the registry")
    );

    registry.shutdown().await;
}

#[tokio::test]
async fn call_subcommand_runs_a_tool_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("e2e.txt");
    std::fs::write(&path, "end to end").unwrap();

    let args = serde_json::json!({ "path": path.to_str().unwrap() }).to_string();
    let output = tokio::time::timeout(
        Duration::from_secs(30),
        Command::new(BIN)
            .args([
                "call",
                "read_file",
                "--args",
                &args,
                "--root",
                dir.path().to_str().unwrap(),
            ])
            // Keep the browser gateway from waiting on a real extension.
            .env("CONDUIT_BROWSER_ADDR", "127.0.0.1:1")
            .env("CONDUIT_BROWSER_MAX_ATTEMPTS", "1")
            .output(),
    )
    .await
    .expect("call subcommand timed out")
    .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("end to end"));
}

#[tokio::test]
async fn tools_subcommand_lists_every_server() {
    let dir = tempfile::tempdir().unwrap();

    let output = tokio::time::timeout(
        Duration::from_secs(30),
        Command::new(BIN)
            .args(["tools", "--root", dir.path().to_str().unwrap()])
            .env("CONDUIT_BROWSER_ADDR", "127.0.0.1:1")
            .env("CONDUIT_BROWSER_MAX_ATTEMPTS", "1")
            .output(),
    )
    .await
    .expect("tools subcommand timed out")
    .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("read_file"));
    assert!(stdout.contains("run_command"));
    assert!(stdout.contains("browser_status"));
}
