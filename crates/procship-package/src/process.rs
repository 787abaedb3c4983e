// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-model authoring.
//!
//! [`ProcessBuilder`] collects nodes and connections in declaration order.
//! [`ProcessBuilder::build`] checks the graph and assigns each node the stable id
//! `_jbpm-unique-<n>` from its 1-based position, so two builds of the same
//! declaration produce the same document.

use std::collections::BTreeMap;

use minijinja::context;
use serde::Serialize;

use crate::declaration::ProcessResource;
use crate::descriptor;
use crate::error::{PackagingError, Result};

/// Handle to a node added to a [`ProcessBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef(usize);

impl NodeRef {
    /// Stable unique id of the node in the serialized process.
    pub fn unique_id(&self) -> String {
        format!("_jbpm-unique-{}", self.0 + 1)
    }
}

/// Gateway direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayDirection {
    Diverging,
    Converging,
}

/// What a node does.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End { terminate: bool },
    Script { script: String },
    UserTask { task_name: String, actors: Vec<String> },
    /// Task executed by the handler registered under `handler`.
    WorkItem {
        handler: String,
        parameters: BTreeMap<String, String>,
    },
    ExclusiveGateway { direction: GatewayDirection },
    ParallelGateway { direction: GatewayDirection },
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    name: String,
    kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
struct Connection {
    from: NodeRef,
    to: NodeRef,
    condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Variable {
    name: String,
    type_name: String,
}

/// Fluent builder for a single process definition.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    process_id: String,
    name: String,
    version: String,
    package_name: String,
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    variables: Vec<Variable>,
}

impl ProcessBuilder {
    pub fn new(
        process_id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            name: name.into(),
            version: version.into(),
            package_name: "org.jbpm".to_string(),
            nodes: Vec::new(),
            connections: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn package_name(&mut self, package_name: impl Into<String>) -> &mut Self {
        self.package_name = package_name.into();
        self
    }

    /// Declare a process variable of the given Java type.
    pub fn variable(&mut self, name: impl Into<String>, type_name: impl Into<String>) -> &mut Self {
        self.variables.push(Variable {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    fn add(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeRef {
        self.nodes.push(Node {
            name: name.into(),
            kind,
        });
        NodeRef(self.nodes.len() - 1)
    }

    pub fn start(&mut self, name: impl Into<String>) -> NodeRef {
        self.add(name, NodeKind::Start)
    }

    pub fn end(&mut self, name: impl Into<String>) -> NodeRef {
        self.add(name, NodeKind::End { terminate: false })
    }

    /// End event that terminates the whole instance.
    pub fn terminate_end(&mut self, name: impl Into<String>) -> NodeRef {
        self.add(name, NodeKind::End { terminate: true })
    }

    pub fn script_task(&mut self, name: impl Into<String>, script: impl Into<String>) -> NodeRef {
        self.add(
            name,
            NodeKind::Script {
                script: script.into(),
            },
        )
    }

    pub fn user_task(
        &mut self,
        name: impl Into<String>,
        task_name: impl Into<String>,
        actors: &[&str],
    ) -> NodeRef {
        self.add(
            name,
            NodeKind::UserTask {
                task_name: task_name.into(),
                actors: actors.iter().map(|a| a.to_string()).collect(),
            },
        )
    }

    /// Task executed by a registered handler.
    pub fn work_item(&mut self, name: impl Into<String>, handler: impl Into<String>) -> NodeRef {
        self.add(
            name,
            NodeKind::WorkItem {
                handler: handler.into(),
                parameters: BTreeMap::new(),
            },
        )
    }

    /// Set a parameter on a work item. Ignored for other node kinds.
    pub fn parameter(
        &mut self,
        node: NodeRef,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        if let Some(Node {
            kind: NodeKind::WorkItem { parameters, .. },
            ..
        }) = self.nodes.get_mut(node.0)
        {
            parameters.insert(key.into(), value.into());
        }
        self
    }

    pub fn exclusive_gateway(
        &mut self,
        name: impl Into<String>,
        direction: GatewayDirection,
    ) -> NodeRef {
        self.add(name, NodeKind::ExclusiveGateway { direction })
    }

    pub fn parallel_gateway(
        &mut self,
        name: impl Into<String>,
        direction: GatewayDirection,
    ) -> NodeRef {
        self.add(name, NodeKind::ParallelGateway { direction })
    }

    pub fn connect(&mut self, from: NodeRef, to: NodeRef) -> &mut Self {
        self.connections.push(Connection {
            from,
            to,
            condition: None,
        });
        self
    }

    /// Conditional connection, typically out of an exclusive gateway.
    pub fn connect_when(
        &mut self,
        from: NodeRef,
        to: NodeRef,
        condition: impl Into<String>,
    ) -> &mut Self {
        self.connections.push(Connection {
            from,
            to,
            condition: Some(condition.into()),
        });
        self
    }

    /// Check the graph and freeze it into a model.
    pub fn build(&self) -> Result<ProcessModel> {
        let fail = |message: String| PackagingError::process(&self.process_id, message);

        if self.process_id.trim().is_empty() {
            return Err(fail("process id is empty".to_string()));
        }
        if !self.nodes.iter().any(|n| n.kind == NodeKind::Start) {
            return Err(fail("process has no start event".to_string()));
        }

        let mut incoming = vec![0usize; self.nodes.len()];
        let mut outgoing = vec![0usize; self.nodes.len()];
        for connection in &self.connections {
            for end in [connection.from, connection.to] {
                if end.0 >= self.nodes.len() {
                    return Err(fail(format!("connection references unknown node {}", end.0 + 1)));
                }
            }
            outgoing[connection.from.0] += 1;
            incoming[connection.to.0] += 1;
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let id = NodeRef(index).unique_id();
            match node.kind {
                NodeKind::Start if incoming[index] > 0 => {
                    return Err(fail(format!("start event {} has incoming connections", id)));
                }
                NodeKind::End { .. } if outgoing[index] > 0 => {
                    return Err(fail(format!("end event {} has outgoing connections", id)));
                }
                NodeKind::Start => {}
                _ if incoming[index] == 0 => {
                    return Err(fail(format!("node {} ({}) is not reachable", id, node.name)));
                }
                _ => {}
            }
            if !matches!(node.kind, NodeKind::End { .. }) && outgoing[index] == 0 {
                return Err(fail(format!("node {} ({}) has no outgoing connection", id, node.name)));
            }
        }

        Ok(ProcessModel {
            process_id: self.process_id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            package_name: self.package_name.clone(),
            nodes: self.nodes.clone(),
            connections: self.connections.clone(),
            variables: self.variables.clone(),
        })
    }
}

/// A checked process model ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessModel {
    process_id: String,
    name: String,
    version: String,
    package_name: String,
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    variables: Vec<Variable>,
}

#[derive(Serialize)]
struct NodeView<'a> {
    id: String,
    name: &'a str,
    #[serde(flatten)]
    kind: &'a NodeKind,
}

#[derive(Serialize)]
struct FlowView<'a> {
    id: String,
    source: String,
    target: String,
    condition: Option<&'a str>,
}

impl ProcessModel {
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Handler names referenced by work items, in node order.
    pub fn handlers(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::WorkItem { handler, .. } => Some(handler.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Serialize to a BPMN2 document.
    pub fn to_bpmn2(&self) -> Result<String> {
        let nodes: Vec<NodeView<'_>> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| NodeView {
                id: NodeRef(index).unique_id(),
                name: &node.name,
                kind: &node.kind,
            })
            .collect();
        // Repeated edges between the same pair of nodes get a numeric suffix
        let mut seen: BTreeMap<(NodeRef, NodeRef), usize> = BTreeMap::new();
        let flows: Vec<FlowView<'_>> = self
            .connections
            .iter()
            .map(|c| {
                let source = c.from.unique_id();
                let target = c.to.unique_id();
                let repeat = seen.entry((c.from, c.to)).or_default();
                let id = match *repeat {
                    0 => format!("{}-{}", source, target),
                    n => format!("{}-{}-{}", source, target, n + 1),
                };
                *repeat += 1;
                FlowView {
                    id,
                    source,
                    target,
                    condition: c.condition.as_deref(),
                }
            })
            .collect();

        descriptor::render(
            "process.bpmn2",
            context! {
                process => context! {
                    id => &self.process_id,
                    name => &self.name,
                    version => &self.version,
                    package_name => &self.package_name,
                    variables => &self.variables,
                },
                nodes => nodes,
                flows => flows,
            },
        )
    }

    /// Package resource at `<processId>.bpmn2`.
    pub fn to_resource(&self) -> Result<ProcessResource> {
        Ok(ProcessResource::new(
            format!("{}.bpmn2", self.process_id),
            self.to_bpmn2()?.into_bytes(),
        ))
    }
}
