//! Operation registry
//!
//! Holds one catalog per service plus a category → service → operations
//! index. A catalog is only ever replaced wholesale under the write lock, so
//! readers see either the old catalog or the new one, never a mix.

mod descriptor;

pub use descriptor::{OperationDescriptor, ParameterSpec, ParameterType, RateLimit};

use crate::error::{ConnectorError, ConnectorResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// The operations registered for one service
#[derive(Debug)]
struct ServiceCatalog {
    operations: Vec<OperationDescriptor>,
    by_name: HashMap<String, usize>,
    registered_at: DateTime<Utc>,
}

impl ServiceCatalog {
    fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.by_name.get(name).map(|&i| &self.operations[i])
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    catalogs: HashMap<String, Arc<ServiceCatalog>>,
    /// category → service → operation names
    categories: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl RegistryState {
    fn unindex(&mut self, service: &str) {
        self.categories.retain(|_, services| {
            services.remove(service);
            !services.is_empty()
        });
    }

    fn index(&mut self, service: &str, catalog: &ServiceCatalog) {
        for op in &catalog.operations {
            if let Some(category) = &op.category {
                self.categories
                    .entry(category.clone())
                    .or_default()
                    .entry(service.to_string())
                    .or_default()
                    .push(op.name.clone());
            }
        }
    }
}

/// Result of resolving a functional operation against a service catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOperation {
    pub service: String,
    /// Name the backend knows the operation by
    pub name: String,
    pub descriptor: OperationDescriptor,
}

impl ResolvedOperation {
    pub fn qualified_name(&self) -> String {
        self.descriptor.qualified_name()
    }
}

/// An operation name exposed by more than one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationConflict {
    pub operation: String,
    pub services: Vec<String>,
}

/// Catalog of callable operations across services
#[derive(Debug, Default)]
pub struct OperationRegistry {
    state: RwLock<RegistryState>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog of a service
    pub fn register(
        &self,
        service: &str,
        operations: Vec<OperationDescriptor>,
    ) -> ConnectorResult<()> {
        let mut by_name = HashMap::with_capacity(operations.len());
        let mut normalized = Vec::with_capacity(operations.len());

        for (i, mut op) in operations.into_iter().enumerate() {
            if op.name.is_empty() {
                return Err(ConnectorError::protocol("operation with empty name").with_service(service));
            }
            if by_name.insert(op.name.clone(), i).is_some() {
                return Err(ConnectorError::protocol(format!(
                    "duplicate operation '{}' in catalog",
                    op.name
                ))
                .with_service(service));
            }
            op.service = service.to_string();
            normalized.push(op);
        }

        let catalog = Arc::new(ServiceCatalog {
            operations: normalized,
            by_name,
            registered_at: Utc::now(),
        });

        let mut state = self.state.write();
        state.unindex(service);
        state.index(service, &catalog);
        state.catalogs.insert(service.to_string(), catalog);
        drop(state);

        debug!(service = %service, "registered operation catalog");
        Ok(())
    }

    /// Drop the catalog of a service; returns whether one existed
    pub fn remove(&self, service: &str) -> bool {
        let mut state = self.state.write();
        state.unindex(service);
        state.catalogs.remove(service).is_some()
    }

    /// Resolve a functional operation name to a concrete catalog entry.
    ///
    /// An exact match wins; otherwise `<service>_<operation>` is tried.
    pub fn resolve(&self, service: &str, operation: &str) -> ConnectorResult<ResolvedOperation> {
        let not_found = || ConnectorError::operation_not_found(operation).with_service(service);

        let catalog = self.catalog(service).ok_or_else(not_found)?;
        let prefixed = format!("{}_{}", service, operation);
        let descriptor = catalog
            .get(operation)
            .or_else(|| catalog.get(&prefixed))
            .ok_or_else(not_found)?;

        Ok(ResolvedOperation {
            service: service.to_string(),
            name: descriptor.name.clone(),
            descriptor: descriptor.clone(),
        })
    }

    /// Services exposing at least one operation in `category`
    pub fn services_for_category(&self, category: &str) -> Vec<String> {
        self.state
            .read()
            .categories
            .get(category)
            .map(|services| services.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Service → operation names for one category
    pub fn category_index(&self, category: &str) -> BTreeMap<String, Vec<String>> {
        self.state
            .read()
            .categories
            .get(category)
            .cloned()
            .unwrap_or_default()
    }

    /// All known categories
    pub fn categories(&self) -> Vec<String> {
        self.state.read().categories.keys().cloned().collect()
    }

    /// The catalog of one service, in registration order
    pub fn operations_for(&self, service: &str) -> Vec<OperationDescriptor> {
        self.catalog(service)
            .map(|c| c.operations.clone())
            .unwrap_or_default()
    }

    /// When the current catalog of a service was registered
    pub fn registered_at(&self, service: &str) -> Option<DateTime<Utc>> {
        self.catalog(service).map(|c| c.registered_at)
    }

    /// Whether a catalog is registered for `service`
    pub fn contains(&self, service: &str) -> bool {
        self.state.read().catalogs.contains_key(service)
    }

    /// Every catalog, taken under one read lock
    pub fn snapshot(&self) -> BTreeMap<String, Vec<OperationDescriptor>> {
        self.state
            .read()
            .catalogs
            .iter()
            .map(|(service, catalog)| (service.clone(), catalog.operations.clone()))
            .collect()
    }

    /// Operation names exposed by more than one service.
    ///
    /// Informational only; resolution is always service-scoped.
    pub fn conflicts(&self) -> Vec<OperationConflict> {
        let state = self.state.read();
        let mut owners: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (service, catalog) in &state.catalogs {
            for op in &catalog.operations {
                owners.entry(op.name.as_str()).or_default().insert(service.as_str());
            }
        }

        owners
            .into_iter()
            .filter(|(_, services)| services.len() > 1)
            .map(|(operation, services)| OperationConflict {
                operation: operation.to_string(),
                services: services.into_iter().map(str::to_string).collect(),
            })
            .collect()
    }

    fn catalog(&self, service: &str) -> Option<Arc<ServiceCatalog>> {
        self.state.read().catalogs.get(service).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::thread;

    fn op(service: &str, name: &str, category: &str) -> OperationDescriptor {
        OperationDescriptor::new(service, name).with_category(category)
    }

    #[test]
    fn test_register_then_operations_for_round_trip() {
        let registry = OperationRegistry::new();
        let catalog = vec![
            op("salesforce", "get_accounts", "crm"),
            op("salesforce", "create_lead", "crm"),
        ];
        registry.register("salesforce", catalog.clone()).unwrap();
        assert_eq!(registry.operations_for("salesforce"), catalog);
        assert!(registry.registered_at("salesforce").is_some());
    }

    #[test]
    fn test_round_trip_under_concurrent_registration() {
        let registry = Arc::new(OperationRegistry::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let service = format!("svc{}", i);
                for round in 0..50 {
                    let catalog: Vec<_> = (0..=round % 5)
                        .map(|n| op(&service, &format!("op{}", n), "shared"))
                        .collect();
                    registry.register(&service, catalog.clone()).unwrap();
                    assert_eq!(registry.operations_for(&service), catalog);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.services_for_category("shared").len(), 8);
    }

    #[test]
    fn test_register_replaces_catalog_and_index() {
        let registry = OperationRegistry::new();
        registry
            .register("gmail", vec![op("gmail", "send_email", "email")])
            .unwrap();
        registry
            .register("gmail", vec![op("gmail", "list_labels", "mail")])
            .unwrap();

        assert!(registry.services_for_category("email").is_empty());
        assert_eq!(registry.services_for_category("mail"), vec!["gmail"]);
        assert!(registry.resolve("gmail", "send_email").is_err());
        assert_eq!(registry.categories(), vec!["mail"]);
    }

    #[test]
    fn test_duplicate_names_rejected_and_previous_catalog_kept() {
        let registry = OperationRegistry::new();
        registry
            .register("zoho", vec![op("zoho", "get_invoices", "ap")])
            .unwrap();

        let err = registry
            .register(
                "zoho",
                vec![op("zoho", "pay", "ap"), op("zoho", "pay", "ap")],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(registry.operations_for("zoho")[0].name, "get_invoices");
    }

    #[test]
    fn test_resolve_exact_and_prefixed() {
        let registry = OperationRegistry::new();
        registry
            .register(
                "zoho",
                vec![op("zoho", "get_invoices", "ap"), op("zoho", "zoho_pay_bill", "ap")],
            )
            .unwrap();

        let exact = registry.resolve("zoho", "get_invoices").unwrap();
        assert_eq!(exact.name, "get_invoices");
        assert_eq!(exact.qualified_name(), "zoho.get_invoices");

        let prefixed = registry.resolve("zoho", "pay_bill").unwrap();
        assert_eq!(prefixed.name, "zoho_pay_bill");
    }

    #[test]
    fn test_resolve_missing_operation() {
        let registry = OperationRegistry::new();
        registry
            .register("crm", vec![op("crm", "create_lead", "crm")])
            .unwrap();

        let err = registry.resolve("crm", "get_accounts").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationNotFound);
        assert_eq!(err.context().label(), "crm/get_accounts");

        let unknown = registry.resolve("nope", "get_accounts").unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::OperationNotFound);
    }

    #[test]
    fn test_conflicts_listed_without_merging() {
        let registry = OperationRegistry::new();
        registry
            .register("zoho", vec![op("zoho", "get_invoices", "ap")])
            .unwrap();
        registry
            .register("quickbooks", vec![op("quickbooks", "get_invoices", "ap")])
            .unwrap();
        registry
            .register("gmail", vec![op("gmail", "send_email", "email")])
            .unwrap();

        let conflicts = registry.conflicts();
        assert_eq!(
            conflicts,
            vec![OperationConflict {
                operation: "get_invoices".to_string(),
                services: vec!["quickbooks".to_string(), "zoho".to_string()],
            }]
        );
        assert_eq!(registry.resolve("zoho", "get_invoices").unwrap().service, "zoho");
        assert_eq!(
            registry.category_index("ap").keys().cloned().collect::<Vec<_>>(),
            vec!["quickbooks", "zoho"]
        );
    }

    #[test]
    fn test_remove_and_snapshot() {
        let registry = OperationRegistry::new();
        registry
            .register("gmail", vec![op("gmail", "send_email", "email")])
            .unwrap();
        registry
            .register("salesforce", vec![op("salesforce", "get_accounts", "crm")])
            .unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.keys().cloned().collect::<Vec<_>>(), vec!["gmail", "salesforce"]);

        assert!(registry.remove("gmail"));
        assert!(!registry.remove("gmail"));
        assert!(!registry.contains("gmail"));
        assert!(registry.services_for_category("email").is_empty());
    }
}
