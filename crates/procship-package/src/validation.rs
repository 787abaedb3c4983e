// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Package validation.
//!
//! Runs over the complete set of staged resources before the archive is written.
//! Error-level messages fail the build; warnings are logged and kept.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::descriptor::{DEPLOYMENT_DESCRIPTOR, KMODULE_XML};

const DROOLS_NS: &str = "http://www.jboss.org/drools";
const CLASS_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

/// Severity of a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warning,
    Error,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMessage {
    pub level: Level,
    pub path: String,
    pub text: String,
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        };
        write!(f, "[{}] {}: {}", level, self.path, self.text)
    }
}

/// Result of validating a staged package.
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    pub messages: Vec<ValidationMessage>,
}

impl ValidationReport {
    fn error(&mut self, path: &str, text: impl Into<String>) {
        self.messages.push(ValidationMessage {
            level: Level::Error,
            path: path.to_string(),
            text: text.into(),
        });
    }

    fn warning(&mut self, path: &str, text: impl Into<String>) {
        self.messages.push(ValidationMessage {
            level: Level::Warning,
            path: path.to_string(),
            text: text.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == Level::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationMessage> {
        self.messages.iter().filter(|m| m.level == Level::Warning)
    }

    /// Every message rendered as text.
    pub fn lines(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.to_string()).collect()
    }
}

/// Validate staged resources keyed by their package path.
pub fn validate(resources: &BTreeMap<String, Vec<u8>>) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !resources.contains_key(KMODULE_XML) {
        report.error(KMODULE_XML, "module marker is missing");
    }

    let registered = registered_handlers(resources, &mut report);
    let mut process_ids: HashMap<String, String> = HashMap::new();

    for (path, bytes) in resources {
        if path.ends_with(".xml") && path != DEPLOYMENT_DESCRIPTOR {
            check_xml(path, bytes, &mut report);
        } else if path.ends_with(".bpmn2") {
            check_process(path, bytes, &registered, &mut process_ids, &mut report);
        } else if path.ends_with(".class") && !bytes.starts_with(&CLASS_MAGIC) {
            report.error(path, "not a class file");
        }
    }

    report
}

fn check_xml(path: &str, bytes: &[u8], report: &mut ValidationReport) {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            if let Err(e) = roxmltree::Document::parse(text) {
                report.error(path, format!("malformed XML: {}", e));
            }
        }
        Err(_) => report.error(path, "not valid UTF-8"),
    }
}

/// Handler names registered in the deployment descriptor.
fn registered_handlers(
    resources: &BTreeMap<String, Vec<u8>>,
    report: &mut ValidationReport,
) -> HashSet<String> {
    let Some(bytes) = resources.get(DEPLOYMENT_DESCRIPTOR) else {
        report.warning(DEPLOYMENT_DESCRIPTOR, "deployment descriptor is missing");
        return HashSet::new();
    };
    let Ok(text) = std::str::from_utf8(bytes) else {
        report.error(DEPLOYMENT_DESCRIPTOR, "not valid UTF-8");
        return HashSet::new();
    };
    match roxmltree::Document::parse(text) {
        Ok(doc) => doc
            .descendants()
            .filter(|n| n.has_tag_name("work-item-handler"))
            .filter_map(|n| n.children().find(|c| c.has_tag_name("name")))
            .filter_map(|n| n.text())
            .map(|name| name.trim().to_string())
            .collect(),
        Err(e) => {
            report.error(DEPLOYMENT_DESCRIPTOR, format!("malformed XML: {}", e));
            HashSet::new()
        }
    }
}

fn check_process(
    path: &str,
    bytes: &[u8],
    registered: &HashSet<String>,
    process_ids: &mut HashMap<String, String>,
    report: &mut ValidationReport,
) {
    let Ok(text) = std::str::from_utf8(bytes) else {
        report.error(path, "not valid UTF-8");
        return;
    };
    let doc = match roxmltree::Document::parse(text) {
        Ok(doc) => doc,
        Err(e) => {
            report.error(path, format!("malformed process document: {}", e));
            return;
        }
    };
    let Some(process) = doc.descendants().find(|n| n.has_tag_name("process")) else {
        report.error(path, "no process element");
        return;
    };
    let Some(process_id) = process.attribute("id") else {
        report.error(path, "process has no id");
        return;
    };
    if let Some(other) = process_ids.insert(process_id.to_string(), path.to_string()) {
        report.error(
            path,
            format!("process id {} is already defined in {}", process_id, other),
        );
    }

    let mut node_ids = HashSet::new();
    let mut has_start = false;
    let mut has_end = false;
    for node in process.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "sequenceFlow" | "property" => continue,
            "startEvent" => has_start = true,
            "endEvent" => has_end = true,
            "task" => {
                if let Some(handler) = node.attribute((DROOLS_NS, "taskName"))
                    && !registered.contains(handler)
                {
                    report.warning(
                        path,
                        format!("no handler registered for work item {}", handler),
                    );
                }
            }
            _ => {}
        }
        if let Some(id) = node.attribute("id") {
            node_ids.insert(id);
        }
    }

    if !has_start {
        report.error(path, format!("process {} has no start event", process_id));
    }
    if !has_end {
        report.warning(path, format!("process {} has no end event", process_id));
    }

    let mut flow_ids = HashSet::new();
    for flow in process.children().filter(|n| n.has_tag_name("sequenceFlow")) {
        if let Some(id) = flow.attribute("id")
            && (node_ids.contains(id) || !flow_ids.insert(id))
        {
            report.error(path, format!("duplicate element id {} in process {}", id, process_id));
        }
        for attr in ["sourceRef", "targetRef"] {
            match flow.attribute(attr) {
                Some(node) if node_ids.contains(node) => {}
                Some(node) => report.error(
                    path,
                    format!(
                        "sequence flow {} references unknown node {}",
                        flow.attribute("id").unwrap_or("?"),
                        node
                    ),
                ),
                None => report.error(path, format!("sequence flow without {}", attr)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROCESS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn2:definitions xmlns:bpmn2="http://www.omg.org/spec/BPMN/20100524/MODEL" xmlns:drools="http://www.jboss.org/drools">
  <bpmn2:process id="demo.approval" name="Approval">
    <bpmn2:startEvent id="_1"/>
    <bpmn2:task id="_2" drools:taskName="Email"/>
    <bpmn2:endEvent id="_3"/>
    <bpmn2:sequenceFlow id="_1-_2" sourceRef="_1" targetRef="_2"/>
    <bpmn2:sequenceFlow id="_2-_3" sourceRef="_2" targetRef="_3"/>
  </bpmn2:process>
</bpmn2:definitions>"#;

    fn descriptor(handlers: &[&str]) -> Vec<u8> {
        let entries: String = handlers
            .iter()
            .map(|h| format!("<work-item-handler><name>{}</name></work-item-handler>", h))
            .collect();
        format!(
            "<deployment-descriptor><work-item-handlers>{}</work-item-handlers></deployment-descriptor>",
            entries
        )
        .into_bytes()
    }

    fn resources(handlers: &[&str]) -> BTreeMap<String, Vec<u8>> {
        let mut map = BTreeMap::new();
        map.insert(KMODULE_XML.to_string(), b"<kmodule/>".to_vec());
        map.insert(DEPLOYMENT_DESCRIPTOR.to_string(), descriptor(handlers));
        map.insert("demo.approval.bpmn2".to_string(), PROCESS.as_bytes().to_vec());
        map
    }

    #[test]
    fn test_valid_package() {
        let report = validate(&resources(&["Email"]));
        assert!(!report.has_errors(), "{:?}", report.lines());
        assert_eq!(report.warnings().count(), 0);
    }

    #[test]
    fn test_unregistered_handler_is_warning() {
        let report = validate(&resources(&[]));
        assert!(!report.has_errors());
        let warnings: Vec<_> = report.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].text.contains("Email"));
    }

    #[test]
    fn test_broken_references_are_errors() {
        let mut map = resources(&["Email"]);
        map.insert(
            "demo.approval.bpmn2".to_string(),
            PROCESS.replace(r#"targetRef="_3""#, r#"targetRef="_9""#).into_bytes(),
        );
        map.insert("com/acme/Bad.class".to_string(), b"nope".to_vec());
        map.remove(KMODULE_XML);

        let report = validate(&map);
        let lines = report.lines();
        assert!(report.has_errors());
        assert!(lines.iter().any(|l| l.contains("unknown node _9")));
        assert!(lines.iter().any(|l| l.contains("not a class file")));
        assert!(lines.iter().any(|l| l.contains("module marker is missing")));
    }

    #[test]
    fn test_duplicate_flow_ids_are_errors() {
        let mut map = resources(&["Email"]);
        map.insert(
            "demo.approval.bpmn2".to_string(),
            PROCESS
                .replace(r#"id="_2-_3""#, r#"id="_1-_2""#)
                .into_bytes(),
        );

        let report = validate(&map);
        assert!(report.has_errors());
        assert!(
            report
                .lines()
                .iter()
                .any(|l| l.contains("duplicate element id _1-_2"))
        );
    }

    #[test]
    fn test_duplicate_process_ids() {
        let mut map = resources(&["Email"]);
        map.insert("copy.bpmn2".to_string(), PROCESS.as_bytes().to_vec());

        let report = validate(&map);
        assert!(
            report
                .lines()
                .iter()
                .any(|l| l.contains("demo.approval is already defined"))
        );
    }
}
