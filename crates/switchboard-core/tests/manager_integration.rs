//! End-to-end tests of the public connection manager API
//!
//! Backends are in-process fakes built on the public `Backend` and
//! `BackendFactory` traits, so nothing here spawns a process or opens a socket.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use switchboard_core::config::{ServiceConfig, ServiceSettings};
use switchboard_core::{
    Backend, BackendFactory, BackendInfo, BroadcastEventSink, ConfigLoader, ConnectionManager,
    ConnectionState, ConnectorError, ConnectorResult, ErrorKind, InvocationOutcome,
    ManagerConfig, OperationDescriptor, ParameterSpec, ParameterType, ReconnectPhase,
    ServiceStatus,
};

/// Behaviour and counters shared by every backend created for one service
#[derive(Default)]
struct FakeService {
    operations: Vec<OperationDescriptor>,
    open_failures: AtomicU32,
    opens: AtomicU32,
    calls: AtomicU32,
}

impl FakeService {
    fn with_operations(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            operations: names
                .iter()
                .map(|name| OperationDescriptor::new("", *name))
                .collect(),
            ..Default::default()
        })
    }

    fn failing_opens(self: Arc<Self>, count: u32) -> Arc<Self> {
        self.open_failures.store(count, Ordering::SeqCst);
        self
    }
}

struct FakeBackend {
    service: Arc<FakeService>,
}

#[async_trait]
impl Backend for FakeBackend {
    async fn open(&self, _timeout: Duration) -> ConnectorResult<BackendInfo> {
        self.service.opens.fetch_add(1, Ordering::SeqCst);
        let remaining = self.service.open_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.service
                .open_failures
                .store(remaining.saturating_sub(1), Ordering::SeqCst);
            return Err(ConnectorError::connection("connection refused"));
        }
        Ok(BackendInfo {
            name: "fake".to_string(),
            version: "1.0.0".to_string(),
            protocol_version: None,
        })
    }

    async fn discover(&self, _timeout: Duration) -> ConnectorResult<Vec<OperationDescriptor>> {
        Ok(self.service.operations.clone())
    }

    async fn invoke(
        &self,
        operation: &str,
        arguments: Value,
        _timeout: Duration,
    ) -> ConnectorResult<Value> {
        self.service.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "operation": operation, "echo": arguments }))
    }

    async fn ping(&self, _timeout: Duration) -> ConnectorResult<()> {
        Ok(())
    }

    async fn close(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeFactory {
    services: HashMap<String, Arc<FakeService>>,
}

impl FakeFactory {
    fn with(mut self, name: &str, service: Arc<FakeService>) -> Self {
        self.services.insert(name.to_string(), service);
        self
    }
}

#[async_trait]
impl BackendFactory for FakeFactory {
    async fn create(
        &self,
        service: &str,
        _config: &ServiceConfig,
        _settings: &ServiceSettings,
    ) -> ConnectorResult<Arc<dyn Backend>> {
        let fake = self
            .services
            .get(service)
            .cloned()
            .ok_or_else(|| ConnectorError::configuration(format!("no fake for {}", service)))?;
        Ok(Arc::new(FakeBackend { service: fake }))
    }
}

fn quick(command: &str) -> ServiceConfig {
    ServiceConfig::stdio(command, vec![])
        .with_timeout(Duration::from_secs(2))
        .with_backoff(Duration::from_secs(1), Duration::from_secs(60))
        .with_jitter(0.0)
}

#[tokio::test]
async fn test_invoke_across_services_with_events() {
    let zoho = FakeService::with_operations(&["get_invoices", "get_bills"]);
    let salesforce = FakeService::with_operations(&["get_accounts", "get_invoices"]);
    let factory = FakeFactory::default()
        .with("zoho", zoho.clone())
        .with("salesforce", salesforce.clone());

    let config = ManagerConfig::default()
        .with_service("zoho", quick("zoho-mcp").with_category("accounts_payable"))
        .with_service("salesforce", quick("sf-mcp").with_category("crm"));
    let sink = Arc::new(BroadcastEventSink::new(16));
    let mut events = sink.subscribe();
    let manager = ConnectionManager::builder(config)
        .with_factory(Arc::new(factory))
        .with_event_sink(sink)
        .with_health_probes(false)
        .build()
        .unwrap();

    let report = manager.connect_all().await;
    assert!(report.is_complete());
    assert_eq!(report.connected.len(), 2);

    let value = manager
        .invoke("zoho", "get_invoices", json!({"status": "open"}))
        .await
        .unwrap();
    assert_eq!(value["operation"], "get_invoices");
    assert_eq!(value["echo"]["status"], "open");

    let event = events.recv().await.unwrap();
    assert_eq!(event.service, "zoho");
    assert_eq!(event.outcome, InvocationOutcome::Success);

    assert_eq!(
        manager.services_for_category("accounts_payable"),
        vec!["zoho"]
    );
    let conflicts = manager.conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].operation, "get_invoices");
    assert_eq!(conflicts[0].services, vec!["salesforce", "zoho"]);

    assert_eq!(zoho.calls.load(Ordering::SeqCst), 1);
    assert_eq!(salesforce.calls.load(Ordering::SeqCst), 0);

    for health in manager.health_report() {
        assert_eq!(health.status, ServiceStatus::Healthy, "{}", health.service);
    }
    manager.shutdown().await;
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_the_backend() {
    let gmail = Arc::new(FakeService {
        operations: vec![
            OperationDescriptor::new("", "send_email")
                .with_parameter("to", ParameterSpec::required(ParameterType::String))
                .with_parameter("cc", ParameterSpec::optional(ParameterType::Array)),
        ],
        ..Default::default()
    });
    let config = ManagerConfig::default().with_service("gmail", quick("gmail-mcp"));
    let manager = ConnectionManager::builder(config)
        .with_factory(Arc::new(FakeFactory::default().with("gmail", gmail.clone())))
        .with_health_probes(false)
        .build()
        .unwrap();

    let err = manager
        .invoke("gmail", "send_email", json!({"to": 42}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert_eq!(gmail.calls.load(Ordering::SeqCst), 0);

    manager
        .invoke("gmail", "send_email", json!({"to": "ops@example.com"}))
        .await
        .unwrap();
    assert_eq!(gmail.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_exhausts_and_recovers_manually() {
    let zoho = FakeService::with_operations(&["get_invoices"]).failing_opens(u32::MAX);
    let config =
        ManagerConfig::default().with_service("zoho", quick("zoho-mcp").with_max_attempts(3));
    let manager = ConnectionManager::builder(config)
        .with_factory(Arc::new(FakeFactory::default().with("zoho", zoho.clone())))
        .with_health_probes(false)
        .build()
        .unwrap();

    let err = manager
        .invoke("zoho", "get_invoices", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_retryable());

    // 1s + 2s + 4s of backoff, then the policy gives up
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(zoho.opens.load(Ordering::SeqCst), 4);

    let health = manager.health_status("zoho").unwrap();
    assert_eq!(health.status, ServiceStatus::Unavailable);
    assert_eq!(health.reconnection.unwrap().phase, ReconnectPhase::Exhausted);

    let err = manager
        .invoke("zoho", "get_invoices", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(zoho.opens.load(Ordering::SeqCst), 4);

    let diagnosis = manager.diagnose("zoho").unwrap();
    assert!(!diagnosis.is_healthy());
    assert!(!diagnosis.suggestions.is_empty());

    zoho.open_failures.store(0, Ordering::SeqCst);
    let handle = manager.reconnect("zoho").await.unwrap();
    assert_eq!(handle.state(), ConnectionState::Ready);
    assert!(manager.invoke("zoho", "get_invoices", json!({})).await.is_ok());
    assert_eq!(
        manager.health_status("zoho").unwrap().status,
        ServiceStatus::Healthy
    );
}

#[tokio::test]
async fn test_manager_from_loaded_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.toml");
    std::fs::write(
        &path,
        r#"
[defaults]
timeout = "3s"
jitter = 0.0

[services.zoho]
command = "zoho-mcp"
category = "accounts_payable"

[services.archive]
command = "archive-mcp"
enabled = false
"#,
    )
    .unwrap();

    let config = ConfigLoader::new().with_file(&path).load().unwrap();
    let manager = ConnectionManager::builder(config)
        .with_factory(Arc::new(
            FakeFactory::default().with("zoho", FakeService::with_operations(&["get_bills"])),
        ))
        .with_health_probes(false)
        .build()
        .unwrap();

    assert_eq!(manager.services(), vec!["archive", "zoho"]);
    let report = manager.connect_all().await;
    assert_eq!(report.connected, vec!["zoho"]);
    assert!(report.failed.is_empty());

    let operations = manager.operations_for("zoho");
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].category.as_deref(), Some("accounts_payable"));

    let err = manager.invoke("archive", "anything", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    manager.close("zoho").await.unwrap();
    assert!(manager.discover().is_empty());
}
