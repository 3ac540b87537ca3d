//! Tool registry: catalog, mode gating and dispatch
//!
//! The registry is the single source of truth for name -> descriptor. It
//! merges descriptors from every [`ToolProvider`] (static domain tools,
//! discovered parser tools, the built-in catalog search) and from runtime
//! registrations, then routes each call through the privacy filter and the
//! audit log:
//!
//! ```text
//! execute_tool -> log_invocation -> executor -> filter -> complete_invocation
//! ```
//!
//! The catalog sits behind an `RwLock`: registration, removal and refresh
//! take the write lock and swap in a fully built state, lookups and calls
//! take short read locks and work on `Arc` snapshots of descriptors.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, InvocationOutcome};
use crate::config::{Config, PrivacySettings, UnclassifiedPolicy};
use crate::error::{Error, Result, ToolError, ToolErrorCode};
use crate::models::{PrivacyMode, ToolKind, ToolSource};
use crate::parser_tools::ParserToolProvider;
use crate::privacy::{self, PrivacyFilter};
use crate::provider::{DomainActions, FinanceDataProvider};
use crate::search::{SearchToolProvider, ToolSearch};
use crate::tools::StaticToolProvider;

/// Valid tool names: lowercase snake_case, at most 64 characters
const TOOL_NAME_PATTERN: &str = r"^[a-z][a-z0-9_]{0,63}$";

/// Something that can run a tool call
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: &Value) -> std::result::Result<Value, ToolError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Value) -> std::result::Result<Value, ToolError> + Send + Sync,
{
    fn call(&self, args: &Value) -> std::result::Result<Value, ToolError> {
        self(args)
    }
}

/// How a descriptor is executed
#[derive(Clone, Default)]
pub enum ToolExecutor {
    /// The descriptor carries its own handler
    Handler(Arc<dyn ToolHandler>),
    /// The provider that listed the descriptor executes it by name
    #[default]
    Delegated,
    /// Built-in keyword search over this registry's catalog
    SearchCatalog,
    /// Registered without a handler; calls fail with `no_executor`
    Unbound,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Handler(_) => "Handler",
            Self::Delegated => "Delegated",
            Self::SearchCatalog => "SearchCatalog",
            Self::Unbound => "Unbound",
        };
        f.write_str(name)
    }
}

/// A tool's registered metadata plus its invocation strategy
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub source: ToolSource,
    pub minimum_mode: PrivacyMode,
    pub kind: ToolKind,
    pub input_schema: Value,
    #[serde(skip)]
    pub executor: ToolExecutor,
}

impl ToolDescriptor {
    /// New descriptor with the fail-safe defaults: minimum mode `anonymized`,
    /// kind `unclassified`, executed by its provider
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source: ToolSource,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source,
            minimum_mode: PrivacyMode::Anonymized,
            kind: ToolKind::Unclassified,
            input_schema,
            executor: ToolExecutor::Delegated,
        }
    }

    pub fn with_minimum_mode(mut self, mode: PrivacyMode) -> Self {
        self.minimum_mode = mode;
        self
    }

    pub fn with_kind(mut self, kind: ToolKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Whether this tool is listed and callable under `mode`
    pub fn visible_in(&self, mode: PrivacyMode) -> bool {
        mode.permits(self.minimum_mode) && privacy::mode_allows(&self.name, mode)
    }

    /// Modes under which this tool is visible
    pub fn allowed_modes(&self) -> Vec<PrivacyMode> {
        PrivacyMode::all()
            .iter()
            .copied()
            .filter(|m| self.visible_in(*m))
            .collect()
    }
}

/// A source of tool descriptors
pub trait ToolProvider: Send + Sync {
    fn source(&self) -> ToolSource;

    /// Current descriptors; called at startup and on every refresh
    fn list_tools(&self) -> Vec<ToolDescriptor>;

    /// Execute a descriptor this provider listed with [`ToolExecutor::Delegated`]
    fn execute(&self, name: &str, _args: &Value) -> std::result::Result<Value, ToolError> {
        Err(ToolError::new(
            ToolErrorCode::NoExecutor,
            format!("Tool '{}' has no executor", name),
        ))
    }
}

/// Attributes for a runtime registration
#[derive(Clone, Default)]
pub struct ToolAttributes {
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    /// Defaults to `anonymized`
    pub minimum_mode: Option<PrivacyMode>,
    pub kind: Option<ToolKind>,
    pub handler: Option<Arc<dyn ToolHandler>>,
}

impl ToolAttributes {
    pub fn new(description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            description: Some(description.into()),
            input_schema: Some(input_schema),
            ..Default::default()
        }
    }

    pub fn minimum_mode(mut self, mode: PrivacyMode) -> Self {
        self.minimum_mode = Some(mode);
        self
    }

    pub fn kind(mut self, kind: ToolKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }
}

struct CatalogEntry {
    descriptor: Arc<ToolDescriptor>,
    /// Owning provider, for delegated execution
    provider: Option<Arc<dyn ToolProvider>>,
}

#[derive(Default)]
struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

/// Registry of invocable tools
pub struct ToolRegistry {
    catalog: RwLock<Catalog>,
    providers: Vec<Arc<dyn ToolProvider>>,
    settings: PrivacySettings,
    filter: PrivacyFilter,
    audit: Option<AuditLog>,
}

impl ToolRegistry {
    pub fn builder(settings: PrivacySettings) -> ToolRegistryBuilder {
        ToolRegistryBuilder::new(settings)
    }

    /// Wire the full stack from configuration: static tools over `data`,
    /// parser tools over `actions`, catalog search, and the audit store
    pub fn from_config(
        config: &Config,
        data: Arc<dyn FinanceDataProvider>,
        actions: Arc<dyn DomainActions>,
    ) -> Result<Self> {
        let audit = AuditLog::open(&config.audit)?;
        Ok(Self::builder(config.privacy_settings())
            .unclassified_policy(config.privacy.unclassified_results)
            .provider(Arc::new(StaticToolProvider::new(data)))
            .provider(Arc::new(ParserToolProvider::new(actions)))
            .audit_log(audit)
            .build())
    }

    /// Handle to the process-wide privacy mode
    pub fn settings(&self) -> &PrivacySettings {
        &self.settings
    }

    pub fn audit_log(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Every tool in the catalog, ordered by name
    pub fn all_tools(&self) -> Vec<Arc<ToolDescriptor>> {
        self.read()
            .entries
            .values()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    pub fn find_tool(&self, name: &str) -> std::result::Result<Arc<ToolDescriptor>, ToolError> {
        self.read()
            .entries
            .get(name)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| ToolError::tool_not_found(name))
    }

    /// Tools visible under `mode`
    pub fn tools_for_mode(&self, mode: PrivacyMode) -> Vec<Arc<ToolDescriptor>> {
        self.read()
            .entries
            .values()
            .filter(|e| e.descriptor.visible_in(mode))
            .map(|e| e.descriptor.clone())
            .collect()
    }

    // =========================================================================
    // Runtime registration
    // =========================================================================

    /// Register a runtime tool
    ///
    /// Names must be unique across the whole catalog, whatever the source.
    pub fn register_tool(
        &self,
        name: &str,
        attrs: ToolAttributes,
    ) -> std::result::Result<Arc<ToolDescriptor>, ToolError> {
        let descriptor = Arc::new(validate_registration(name, attrs)?);

        let mut catalog = self.write();
        if let Some(existing) = catalog.entries.get(name) {
            return Err(ToolError::new(
                ToolErrorCode::NameConflict,
                format!(
                    "Tool '{}' is already registered ({} source)",
                    name, existing.descriptor.source
                ),
            ));
        }

        catalog.entries.insert(
            name.to_string(),
            CatalogEntry {
                descriptor: descriptor.clone(),
                provider: None,
            },
        );
        info!(
            "Registered runtime tool '{}' (minimum mode {})",
            name, descriptor.minimum_mode
        );
        Ok(descriptor)
    }

    /// Remove a runtime tool; static and discovered tools cannot be removed
    pub fn unregister_tool(
        &self,
        name: &str,
    ) -> std::result::Result<Arc<ToolDescriptor>, ToolError> {
        let mut catalog = self.write();
        let entry = catalog
            .entries
            .get(name)
            .ok_or_else(|| runtime_not_found(name))?;
        ensure_mutable(&entry.descriptor)?;

        let removed = catalog
            .entries
            .remove(name)
            .ok_or_else(|| runtime_not_found(name))?;
        info!("Unregistered runtime tool '{}'", name);
        Ok(removed.descriptor)
    }

    /// Re-run discovery on every provider
    ///
    /// Idempotent. Runtime registrations survive; a discovered tool whose
    /// name collides with an earlier source or a runtime entry is skipped.
    /// Returns the catalog size after the refresh.
    pub fn refresh(&self) -> usize {
        let mut ordered: Vec<&Arc<dyn ToolProvider>> = self.providers.iter().collect();
        ordered.sort_by_key(|p| source_priority(p.source()));

        let mut discovered: BTreeMap<String, CatalogEntry> = BTreeMap::new();
        for provider in ordered {
            let source = provider.source();
            for mut descriptor in provider.list_tools() {
                descriptor.source = source;
                if discovered.contains_key(&descriptor.name) {
                    warn!(
                        "Skipping duplicate {} tool '{}'",
                        source, descriptor.name
                    );
                    continue;
                }
                discovered.insert(
                    descriptor.name.clone(),
                    CatalogEntry {
                        descriptor: Arc::new(descriptor),
                        provider: Some(provider.clone()),
                    },
                );
            }
        }

        let mut catalog = self.write();
        let mut merged: BTreeMap<String, CatalogEntry> = BTreeMap::new();
        let previous = std::mem::take(&mut catalog.entries);
        for (name, entry) in previous {
            if entry.descriptor.source == ToolSource::Runtime {
                merged.insert(name, entry);
            }
        }
        for (name, entry) in discovered {
            if merged.contains_key(&name) {
                warn!(
                    "Discovered tool '{}' collides with a runtime tool; keeping the runtime tool",
                    name
                );
                continue;
            }
            merged.insert(name, entry);
        }
        catalog.entries = merged;

        let size = catalog.entries.len();
        info!("Tool catalog refreshed: {} tools", size);
        size
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute a tool under the current privacy mode
    pub fn execute_tool(&self, name: &str, args: &Value) -> std::result::Result<Value, ToolError> {
        self.execute_tool_for_session(name, args, None)
    }

    /// Execute a tool, attributing the audit record to a router session
    ///
    /// The privacy mode is read once here and used for gating, filtering and
    /// the audit record, so a concurrent mode change cannot alter this call.
    pub fn execute_tool_for_session(
        &self,
        name: &str,
        args: &Value,
        session_id: Option<&str>,
    ) -> std::result::Result<Value, ToolError> {
        let mode = self.settings.current();

        let pending = match &self.audit {
            Some(audit) => Some(audit.log_invocation(name, session_id, mode, args).map_err(
                |e| {
                    warn!("Audit log unavailable, refusing '{}': {}", name, e);
                    ToolError::new(
                        ToolErrorCode::AuditUnavailable,
                        "Tool call could not be recorded",
                    )
                },
            )?),
            None => None,
        };

        let outcome = self.dispatch(name, args, mode);

        if let (Some(audit), Some(pending)) = (&self.audit, pending) {
            let info = match &outcome {
                Ok((_, count)) => InvocationOutcome::Success {
                    result_count: *count,
                },
                Err(err) => InvocationOutcome::Failure {
                    code: err.code.as_str().to_string(),
                    message: err.message.clone(),
                },
            };
            if let Err(e) = audit.complete_invocation(pending, &info) {
                warn!("Failed to complete audit record for '{}': {}", name, e);
            }
        }

        outcome.map(|(filtered, _)| filtered)
    }

    fn dispatch(
        &self,
        name: &str,
        args: &Value,
        mode: PrivacyMode,
    ) -> std::result::Result<(Value, Option<i64>), ToolError> {
        let (descriptor, provider) = {
            let catalog = self.read();
            let entry = catalog
                .entries
                .get(name)
                .ok_or_else(|| ToolError::tool_not_found(name))?;
            (entry.descriptor.clone(), entry.provider.clone())
        };

        if !descriptor.visible_in(mode) {
            info!(
                "Rejected '{}': requires {} mode, current mode is {}",
                name, descriptor.minimum_mode, mode
            );
            return Err(ToolError::new(
                ToolErrorCode::PrivacyModeInsufficient,
                format!(
                    "Tool '{}' is not available in {} mode (requires {})",
                    name, mode, descriptor.minimum_mode
                ),
            ));
        }

        debug!("Executing '{}' in {} mode", name, mode);

        let raw = guard_panics(name, || match &descriptor.executor {
            ToolExecutor::Handler(handler) => handler.call(args),
            ToolExecutor::Delegated => match &provider {
                Some(provider) => provider.execute(name, args),
                None => Err(no_executor(name)),
            },
            ToolExecutor::SearchCatalog => ToolSearch::new(self).execute_for_mode(args, mode),
            ToolExecutor::Unbound => Err(no_executor(name)),
        })?;

        let count = result_count(&raw);
        let filtered = self.filter.filter_kind(&raw, name, descriptor.kind, mode)?;
        Ok((filtered, count))
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for [`ToolRegistry`]; `build` runs the initial discovery
pub struct ToolRegistryBuilder {
    settings: PrivacySettings,
    unclassified: UnclassifiedPolicy,
    providers: Vec<Arc<dyn ToolProvider>>,
    audit: Option<AuditLog>,
}

impl ToolRegistryBuilder {
    pub fn new(settings: PrivacySettings) -> Self {
        Self {
            settings,
            unclassified: UnclassifiedPolicy::default(),
            providers: vec![Arc::new(SearchToolProvider)],
            audit: None,
        }
    }

    pub fn unclassified_policy(mut self, policy: UnclassifiedPolicy) -> Self {
        self.unclassified = policy;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ToolProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> ToolRegistry {
        let registry = ToolRegistry {
            catalog: RwLock::new(Catalog::default()),
            filter: PrivacyFilter::new(self.settings.clone(), self.unclassified),
            providers: self.providers,
            settings: self.settings,
            audit: self.audit,
        };
        registry.refresh();
        registry
    }
}

/// Only runtime-sourced entries may be removed or replaced
fn ensure_mutable(descriptor: &ToolDescriptor) -> std::result::Result<(), ToolError> {
    if descriptor.source.is_mutable() {
        Ok(())
    } else {
        Err(ToolError::new(
            ToolErrorCode::NotFound,
            format!(
                "No runtime tool named '{}' ({} tools cannot be removed)",
                descriptor.name, descriptor.source
            ),
        ))
    }
}

fn validate_registration(
    name: &str,
    attrs: ToolAttributes,
) -> std::result::Result<ToolDescriptor, ToolError> {
    let pattern = Regex::new(TOOL_NAME_PATTERN).map_err(Error::from)?;
    let mut problems = Vec::new();

    if !pattern.is_match(name) {
        problems.push("name must be lowercase snake_case (max 64 characters)".to_string());
    }
    let description = attrs.description.unwrap_or_default();
    if description.trim().is_empty() {
        problems.push("description is required".to_string());
    }
    let input_schema = match attrs.input_schema {
        Some(schema @ Value::Object(_)) => schema,
        Some(_) => {
            problems.push("input schema must be a JSON object".to_string());
            Value::Null
        }
        None => {
            problems.push("input schema is required".to_string());
            Value::Null
        }
    };

    if !problems.is_empty() {
        return Err(ToolError {
            code: ToolErrorCode::InvalidTool,
            message: Some(problems.join("; ")),
            details: problems,
        });
    }

    let executor = match attrs.handler {
        Some(handler) => ToolExecutor::Handler(handler),
        None => ToolExecutor::Unbound,
    };

    Ok(
        ToolDescriptor::new(name, description, ToolSource::Runtime, input_schema)
            .with_minimum_mode(attrs.minimum_mode.unwrap_or(PrivacyMode::Anonymized))
            .with_kind(attrs.kind.unwrap_or(ToolKind::Unclassified))
            .with_executor(executor),
    )
}

fn source_priority(source: ToolSource) -> u8 {
    match source {
        ToolSource::Static => 0,
        ToolSource::Discovered => 1,
        ToolSource::Runtime => 2,
    }
}

fn runtime_not_found(name: &str) -> ToolError {
    ToolError::new(
        ToolErrorCode::NotFound,
        format!("No runtime tool named '{}'", name),
    )
}

fn no_executor(name: &str) -> ToolError {
    ToolError::new(
        ToolErrorCode::NoExecutor,
        format!("Tool '{}' has no executor", name),
    )
}

/// Turn a panicking executor into an `execution_failed` result
fn guard_panics<F>(name: &str, call: F) -> std::result::Result<Value, ToolError>
where
    F: FnOnce() -> std::result::Result<Value, ToolError>,
{
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|_| {
        warn!("Tool '{}' panicked", name);
        Err(ToolError::execution(format!("Tool '{}' failed", name)))
    })
}

/// Number of records in a raw result, when it has an obvious list
pub(crate) fn result_count(raw: &Value) -> Option<i64> {
    match raw {
        Value::Array(items) => Some(items.len() as i64),
        Value::Object(map) => ["accounts", "transactions", "holdings", "tools"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(|items| items.len() as i64)
            .or_else(|| map.get("count").and_then(Value::as_i64)),
        _ => None,
    }
}
