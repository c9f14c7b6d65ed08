//! Full application bootstrap against the in-process backends.

use conductor::prelude::*;
use conductor::queue::JobState;
use serde_json::{Value, json};
use std::result::Result;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

type Journal = Arc<Mutex<Vec<String>>>;

struct Recorded {
    name: &'static str,
    journal: Journal,
}

#[async_trait]
impl StartupModule for Recorded {
    fn name(&self) -> &str {
        self.name
    }

    async fn initialize(&mut self, _registry: &ResourceRegistry) -> Result<(), LifecycleError> {
        self.journal.lock().unwrap().push(format!("{}.initialize", self.name));
        Ok(())
    }

    async fn start(&mut self) -> Result<(), LifecycleError> {
        self.journal.lock().unwrap().push(format!("{}.start", self.name));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        self.journal.lock().unwrap().push(format!("{}.stop", self.name));
        Ok(())
    }
}

fn config() -> AppConfig {
    AppConfig::load(&ConfigService::from_pairs([
        ("APP_NAME", "bootstrap-test"),
        ("HOST", "127.0.0.1"),
        ("PORT", "0"),
        ("WORKER_CONCURRENCY", "2"),
    ]))
    .unwrap()
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    let status = raw[9..12].parse().unwrap();
    let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default();
    (status, serde_json::from_str(body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_modules_run_in_order_and_stop_in_reverse() {
    let journal = Journal::default();
    let app = Application::builder()
        .config(config())
        .startup_module(Recorded { name: "db", journal: journal.clone() })
        .startup_module(Recorded { name: "web", journal: journal.clone() })
        .build()
        .unwrap();

    app.run_until(async {}).await.unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "db.initialize",
            "web.initialize",
            "db.start",
            "web.start",
            "web.stop",
            "db.stop",
        ]
    );
}

#[tokio::test]
async fn test_full_stack_serves_health_and_processes_jobs() {
    let emails = Arc::new(QueueClient::new("emails"));
    let worker = Arc::new(WorkerDispatcher::new("emails"));
    worker.register_job_handler("welcome", |job: Job| async move {
        Ok::<_, BoxError>(json!({ "delivered": job.data["to"] }))
    });

    let web = WebServerModule::new(config().listen_addr());
    let mut address = web.local_addr();

    let app = Application::builder()
        .config(config())
        .startup_module(web)
        .startup_module(JobsModule::new().queue(emails.clone()).worker(worker.clone()))
        .build()
        .unwrap();

    let queue = emails.clone();
    app.run_until(async move {
        let addr = loop {
            if let Some(addr) = *address.borrow_and_update() {
                break addr;
            }
            address.changed().await.unwrap();
        };

        let (status, body) = http_get(addr, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["status"], "degraded");
        assert_eq!(body["data"]["components"]["cache"]["status"], "degraded");
        assert_eq!(body["data"]["components"]["hook:store"]["status"], "healthy");

        let job = queue
            .add_job("welcome", &json!({ "to": "ada@example.com" }), None)
            .await
            .unwrap();
        let mut finished = None;
        for _ in 0..200 {
            let current = queue.get_job(&job.id).await.unwrap().unwrap();
            if current.state == JobState::Completed {
                finished = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let finished = finished.expect("job was not processed");
        assert_eq!(finished.return_value, Some(json!({ "delivered": "ada@example.com" })));
    })
    .await
    .unwrap();

    assert!(!worker.is_running().await);
    assert!(!emails.is_initialized().await);
}

#[tokio::test]
async fn test_failed_init_hook_is_reported_without_aborting_startup() {
    let web = WebServerModule::new(config().listen_addr());
    let mut address = web.local_addr();

    let app = Application::builder()
        .config(config())
        .register(
            ResourceRegistration::value("search", "index".to_string()).on_ready(|_| async {
                Err::<(), _>(anyhow::anyhow!("search cluster rejected credentials"))
            }),
        )
        .startup_module(web)
        .build()
        .unwrap();

    app.run_until(async move {
        let addr = loop {
            if let Some(addr) = *address.borrow_and_update() {
                break addr;
            }
            address.changed().await.unwrap();
        };

        let (status, body) = http_get(addr, "/health").await;
        assert_eq!(status, 503);
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["components"]["hook:search"]["status"], "failed");
    })
    .await
    .unwrap();
}
