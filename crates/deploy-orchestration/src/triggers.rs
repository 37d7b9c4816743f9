//! Function trigger discovery and durable-task enrichment
//!
//! Per-function metadata files supply the trigger bindings; the host
//! configuration may supply a durable-task section that enriches
//! orchestration and activity triggers. All entries stay opaque key/value
//! maps end to end.

use std::path::Path;

use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::{Error, Result};

const HOST_CONFIG_FILE: &str = "host.json";
const FUNCTION_CONFIG_FILE: &str = "function.json";
const PROXY_CONFIG_FILE: &str = "proxies.json";

/// Durable-task hub settings read from the host configuration file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DurableTaskConfig {
    /// Task hub name applied to durable triggers
    pub hub_name: Option<String>,
    /// Storage connection name applied to durable triggers
    pub connection_name: Option<String>,
}

/// Collect the trigger payload for every function under `site_root`.
///
/// Each subdirectory holding a `function.json` contributes its trigger
/// bindings, tagged with the owning function's name. There is no ordering
/// guarantee across directories. Durable-task enrichment and the synthetic
/// routing trigger are applied before returning.
pub fn list_triggers(site_root: &Path) -> Result<Vec<Value>> {
    let mut triggers = Vec::new();
    for entry in std::fs::read_dir(site_root)? {
        let entry = entry?;
        let config_path = entry.path().join(FUNCTION_CONFIG_FILE);
        if !config_path.is_file() {
            continue;
        }
        let function_name = entry.file_name().to_string_lossy().into_owned();
        triggers.extend(function_triggers(&config_path, &function_name)?);
    }

    if let Some(durable) = durable_task_config(&site_root.join(HOST_CONFIG_FILE))? {
        enrich_durable_triggers(&mut triggers, &durable);
    }

    if site_root.join(PROXY_CONFIG_FILE).is_file() {
        triggers.push(json!({ "type": "routingTrigger" }));
    }

    Ok(triggers)
}

/// Parse one function's metadata and return its trigger bindings.
///
/// `disabled` and `excluded` are intentional skip conditions; a file that
/// fails to parse or lacks a bindings array fails the whole deployment.
fn function_triggers(path: &Path, function_name: &str) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    let doc: Value = serde_json::from_str(&text).map_err(|e| {
        warn!(path = %path.display(), error = %e, "failed to parse function metadata");
        Error::MalformedTrigger {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })?;

    if is_disabled(&doc) || is_excluded(&doc) {
        info!(function = %function_name, "skipping disabled or excluded function");
        return Ok(Vec::new());
    }

    let Some(bindings) = doc.get("bindings").and_then(Value::as_array) else {
        return Err(Error::MalformedTrigger {
            path: path.display().to_string(),
            reason: "missing bindings array".to_string(),
        });
    };

    let mut triggers = Vec::new();
    for binding in bindings {
        let Some(binding_type) = binding.get("type").and_then(Value::as_str) else {
            return Err(Error::MalformedTrigger {
                path: path.display().to_string(),
                reason: "binding without a type".to_string(),
            });
        };
        if !binding_type.to_ascii_lowercase().ends_with("trigger") {
            continue;
        }
        let mut map: Map<String, Value> = binding
            .as_object()
            .cloned()
            .unwrap_or_default();
        map.insert("functionName".to_string(), json!(function_name));
        triggers.push(Value::Object(map));
    }
    Ok(triggers)
}

/// `disabled` is either a boolean or the name of an environment value to
/// expand; a truthy expansion disables the function.
fn is_disabled(doc: &Value) -> bool {
    match doc.get("disabled") {
        Some(Value::Bool(disabled)) => *disabled,
        Some(Value::String(setting)) => std::env::var(setting)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
        _ => false,
    }
}

fn is_excluded(doc: &Value) -> bool {
    doc.get("excluded").and_then(Value::as_bool).unwrap_or(false)
}

/// Read the case-insensitive `durableTask` section of the host configuration
fn durable_task_config(path: &Path) -> Result<Option<DurableTaskConfig>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    let doc: Value = serde_json::from_str(&text).map_err(|e| Error::MalformedTrigger {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let Some(section) = get_ignore_case(&doc, "durableTask") else {
        return Ok(None);
    };
    Ok(Some(DurableTaskConfig {
        hub_name: get_ignore_case(section, "hubName")
            .and_then(Value::as_str)
            .map(str::to_owned),
        connection_name: get_ignore_case(section, "connectionName")
            .and_then(Value::as_str)
            .map(str::to_owned),
    }))
}

fn get_ignore_case<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    doc.as_object()?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

/// Attach hub and connection fields to orchestration and activity triggers.
///
/// Enrichment only touches entries whose declared type is an orchestration
/// or activity trigger; everything else is left untouched.
pub fn enrich_durable_triggers(triggers: &mut [Value], durable: &DurableTaskConfig) {
    for trigger in triggers.iter_mut() {
        let is_durable = trigger
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|ty| {
                ty.eq_ignore_ascii_case("orchestrationTrigger")
                    || ty.eq_ignore_ascii_case("activityTrigger")
            });
        if !is_durable {
            continue;
        }
        let Some(map) = trigger.as_object_mut() else {
            continue;
        };
        if let Some(hub) = &durable.hub_name {
            map.insert("taskHubName".to_string(), json!(hub));
        }
        if let Some(connection) = &durable.connection_name {
            map.insert("connection".to_string(), json!(connection));
        }
    }
}
