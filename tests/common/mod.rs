use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

static SERVER: OnceLock<TestServer> = OnceLock::new();
static COUNTER: AtomicU32 = AtomicU32::new(0);

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Spawn the already-built binary to keep start fast during tests.
        // DATABASE_URL is removed so the server runs on the in-memory store.
        let mut cmd = Command::new("target/debug/freightgate");
        cmd.env("FREIGHTGATE_PORT", port.to_string())
            .env_remove("DATABASE_URL")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Unique username for a test, so suites sharing the server never collide
pub fn unique_username(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", prefix, std::process::id(), n)
}

/// Register a user and log in; returns the login response body
/// (access_token, refresh_token, user, ...)
pub async fn register_and_login(
    client: &reqwest::Client,
    base_url: &str,
    username: &str,
) -> Result<Value> {
    let register = client
        .post(format!("{}/auth/register", base_url))
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "correct-horse-battery",
        }))
        .send()
        .await?;
    anyhow::ensure!(
        register.status() == StatusCode::CREATED,
        "register failed: {}",
        register.text().await?
    );

    let login = client
        .post(format!("{}/auth/login", base_url))
        .json(&json!({
            "username": username,
            "password": "correct-horse-battery",
        }))
        .send()
        .await?;
    anyhow::ensure!(login.status() == StatusCode::OK, "login failed: {}", login.text().await?);

    Ok(login.json::<Value>().await?)
}
