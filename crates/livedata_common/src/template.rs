//! Command template rendering.
//!
//! Templates use `{{ name }}` / `{{ name.field }}` placeholders. Rendering is
//! strict: a placeholder that does not resolve against the context is an
//! error, never an empty string, and one bad template fails the whole set.

use crate::error::{LivedataError, Result};
use crate::interface_name::{abbreviated_interface_name, split_interface};
use crate::types::{CommandSpec, ManagedDeviceContext, ObjectType, RenderedCommand};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Timestamp format exposed to templates as `timestamp`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern is valid"))
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").expect("path pattern is valid")
    })
}

/// Variables available to command templates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    vars: Map<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Build the standard context for a resolved live query
    pub fn for_query(context: &ManagedDeviceContext, now: DateTime<Utc>) -> Result<Self> {
        let mut ctx = Self::new()
            .with("device_name", context.source_device.name.clone())
            .with("managed_device", context.managed_device.name.clone())
            .with(
                "device_ip",
                context
                    .managed_device
                    .usable_address()
                    .unwrap_or_default()
                    .to_string(),
            )
            .with("timestamp", now.format(TIMESTAMP_FORMAT).to_string());

        if let Some(interface) = &context.source_interface {
            let (name_only, number) = split_interface(&interface.name);
            ctx.insert("intf_name", interface.name.clone());
            ctx.insert("intf_name_only", name_only);
            ctx.insert("intf_number", number);
            ctx.insert("intf_abbrev", abbreviated_interface_name(&interface.name));
        }

        let obj = match context.reference.object_type {
            ObjectType::Interface => context
                .source_interface
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
            ObjectType::Device => Some(serde_json::to_value(&context.source_device)?),
            ObjectType::DeviceCluster => context
                .source_cluster
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        };
        if let Some(obj) = obj {
            ctx.insert("obj", obj);
        }

        Ok(ctx)
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.vars.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a single template against the context
pub fn render_template(template: &str, context: &RenderContext) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_re().captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let literal = &template[last..whole.start()];
        check_literal(template, literal)?;
        rendered.push_str(literal);

        let path = inner.as_str().trim();
        if !path_re().is_match(path) {
            return Err(LivedataError::TemplateSyntax {
                template: template.to_string(),
                reason: format!("unsupported expression '{}'", path),
            });
        }
        let value = context
            .lookup(path)
            .ok_or_else(|| LivedataError::UndefinedVariable {
                variable: path.to_string(),
                template: template.to_string(),
            })?;
        rendered.push_str(&value_to_text(value));
        last = whole.end();
    }

    let tail = &template[last..];
    check_literal(template, tail)?;
    rendered.push_str(tail);
    Ok(rendered)
}

fn check_literal(template: &str, literal: &str) -> Result<()> {
    if literal.contains("{{") {
        return Err(LivedataError::TemplateSyntax {
            template: template.to_string(),
            reason: "unclosed '{{'".to_string(),
        });
    }
    Ok(())
}

/// Render a whole command set. Any failure fails the set.
pub fn render_commands(commands: &CommandSpec, context: &RenderContext) -> Result<Vec<RenderedCommand>> {
    commands
        .templates
        .iter()
        .map(|template| {
            Ok(RenderedCommand {
                template: template.clone(),
                rendered: render_template(template, context)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RenderContext {
        RenderContext::new()
            .with("intf_name", "GigabitEthernet1/0/2")
            .with("intf_abbrev", "Gi1/0/2")
            .with("obj", json!({"name": "GigabitEthernet1/0/2", "tags": ["uplink"], "description": null}))
    }

    #[test]
    fn test_render_simple() {
        let out = render_template("show interface {{ intf_name }} status", &ctx()).unwrap();
        assert_eq!(out, "show interface GigabitEthernet1/0/2 status");
        let out = render_template("show log | i {{intf_abbrev}}$", &ctx()).unwrap();
        assert_eq!(out, "show log | i Gi1/0/2$");
    }

    #[test]
    fn test_render_dotted_path() {
        assert_eq!(render_template("{{ obj.name }}", &ctx()).unwrap(), "GigabitEthernet1/0/2");
        assert_eq!(render_template("{{ obj.tags.0 }}", &ctx()).unwrap(), "uplink");
        assert_eq!(render_template("[{{ obj.description }}]", &ctx()).unwrap(), "[]");
    }

    #[test]
    fn test_render_without_placeholders() {
        assert_eq!(render_template("show version", &ctx()).unwrap(), "show version");
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let err = render_template("show mac address-table interface {{ intf_nmae }}", &ctx()).unwrap_err();
        match err {
            LivedataError::UndefinedVariable { variable, .. } => assert_eq!(variable, "intf_nmae"),
            other => panic!("unexpected error: {:?}", other),
        }
        let err = render_template("{{ obj.missing }}", &ctx()).unwrap_err();
        assert_eq!(err.kind(), "undefined_variable");
    }

    #[test]
    fn test_malformed_placeholders() {
        let err = render_template("show {{ intf_name", &ctx()).unwrap_err();
        assert_eq!(err.kind(), "template_syntax");
        let err = render_template("show {{ intf_name | upper }}", &ctx()).unwrap_err();
        assert_eq!(err.kind(), "template_syntax");
    }

    #[test]
    fn test_one_bad_template_fails_the_set() {
        let spec = CommandSpec {
            templates: vec![
                "show interface {{ intf_name }}".to_string(),
                "show run interface {{ nope }}".to_string(),
                "show version".to_string(),
            ],
        };
        assert!(render_commands(&spec, &ctx()).is_err());
    }

    #[test]
    fn test_render_commands_keeps_order() {
        let spec = CommandSpec {
            templates: vec![
                "show interface {{ intf_name }}".to_string(),
                "show version".to_string(),
            ],
        };
        let rendered = render_commands(&spec, &ctx()).unwrap();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].template, "show interface {{ intf_name }}");
        assert_eq!(rendered[0].rendered, "show interface GigabitEthernet1/0/2");
        assert_eq!(rendered[1].rendered, "show version");
    }
}
