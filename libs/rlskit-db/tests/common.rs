#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]
use anyhow::Result;
use std::time::Duration;

use testcontainers::{ImageExt, runners::AsyncRunner};

pub struct DbUnderTest {
    pub host: String,
    pub port: u16,
    _container: Box<dyn std::any::Any + Send>,
}

impl DbUnderTest {
    /// DSN of the container's superuser, which bypasses RLS.
    #[must_use]
    pub fn admin_url(&self) -> String {
        self.url_for("user", "pass")
    }

    #[must_use]
    pub fn url_for(&self, user: &str, password: &str) -> String {
        format!(
            "postgres://{user}:{password}@{}:{}/app",
            self.host, self.port
        )
    }
}

/// Bring up a `PostgreSQL` test container.
///
/// # Errors
/// Returns an error if the container fails to start or become ready.
pub async fn bring_up_postgres() -> Result<DbUnderTest> {
    use testcontainers::ContainerRequest;
    use testcontainers_modules::postgres::Postgres;

    let container = ContainerRequest::from(Postgres::default())
        .with_env_var("POSTGRES_PASSWORD", "pass")
        .with_env_var("POSTGRES_USER", "user")
        .with_env_var("POSTGRES_DB", "app")
        .start()
        .await?;
    let port = container.get_host_port_ipv4(5432).await?;
    wait_for_tcp("127.0.0.1", port, Duration::from_secs(20)).await?;

    Ok(DbUnderTest {
        host: "127.0.0.1".to_owned(),
        port,
        _container: Box::new(container),
    })
}

async fn wait_for_tcp(host: &str, port: u16, timeout: Duration) -> Result<()> {
    use tokio::{
        net::TcpStream,
        time::{Instant, sleep},
    };
    let deadline = Instant::now() + timeout;
    loop {
        if TcpStream::connect((host, port)).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("Timeout waiting for {host}:{port}");
        }
        sleep(Duration::from_millis(200)).await;
    }
}
