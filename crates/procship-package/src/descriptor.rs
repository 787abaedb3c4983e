// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Descriptor generation.
//!
//! Every generated document is rendered from a template under `templates/`. Values
//! are XML-escaped on the way in.

use std::collections::HashSet;

use minijinja::{AutoEscape, Environment, context};
use serde::Serialize;
use tracing::warn;

use crate::declaration::HandlerDeclaration;
use crate::error::Result;
use crate::release::Release;

/// Deployment descriptor path.
pub const DEPLOYMENT_DESCRIPTOR: &str = "META-INF/kie-deployment-descriptor.xml";
/// Module marker path.
pub const KMODULE_XML: &str = "META-INF/kmodule.xml";
/// Module metadata path.
pub const KMODULE_INFO: &str = "META-INF/kmodule.info";
/// Persistence configuration path.
pub const PERSISTENCE_XML: &str = "META-INF/persistence.xml";

/// Process event listeners registered when platform listeners are enabled.
pub const PLATFORM_EVENT_LISTENERS: &[&str] = &[
    "org.jbpm.process.audit.JPAWorkingMemoryDbLogger",
    "org.jbpm.services.task.lifecycle.listeners.BAMTaskEventListener",
];

/// Task event listeners registered when platform listeners are enabled.
pub const PLATFORM_TASK_EVENT_LISTENERS: &[&str] =
    &["org.jbpm.services.task.audit.JPATaskLifeCycleEventListener"];

const TEMPLATES: &[(&str, &str)] = &[
    (
        "kie-deployment-descriptor.xml",
        include_str!("../templates/kie-deployment-descriptor.xml"),
    ),
    ("kmodule.xml", include_str!("../templates/kmodule.xml")),
    ("kmodule.info", include_str!("../templates/kmodule.info")),
    ("persistence.xml", include_str!("../templates/persistence.xml")),
    ("pom.xml", include_str!("../templates/pom.xml")),
    ("pom.properties", include_str!("../templates/pom.properties")),
    ("process.bpmn2", include_str!("../templates/process.bpmn2")),
];

/// A generated text document and its path inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: String,
    pub content: String,
}

impl Document {
    fn new(path: impl Into<String>, content: String) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

/// Process metadata listed in the module metadata document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessEntry {
    pub id: String,
    pub name: String,
    pub version: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
struct HandlerEntry<'a> {
    name: &'a str,
    class_name: &'a str,
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|name| {
        if name.ends_with(".properties") {
            AutoEscape::None
        } else {
            AutoEscape::Html
        }
    });
    for &(name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// Render one of the bundled templates.
pub(crate) fn render(template: &str, ctx: minijinja::Value) -> Result<String> {
    let env = environment()?;
    let tmpl = env.get_template(template)?;
    Ok(tmpl.render(ctx)?)
}

/// Handler registration table: one entry per distinct name, in declaration order.
fn handler_table(handlers: &[Box<dyn HandlerDeclaration>]) -> Vec<HandlerEntry<'_>> {
    let mut seen = HashSet::new();
    let mut table = Vec::with_capacity(handlers.len());
    for handler in handlers {
        if !seen.insert(handler.name()) {
            let first = table
                .iter()
                .find(|e: &&HandlerEntry<'_>| e.name == handler.name());
            if let Some(first) = first
                && first.class_name != handler.class_name()
            {
                warn!(
                    handler = handler.name(),
                    kept = first.class_name,
                    ignored = handler.class_name(),
                    "Duplicate handler name, keeping first registration"
                );
            }
            continue;
        }
        table.push(HandlerEntry {
            name: handler.name(),
            class_name: handler.class_name(),
        });
    }
    table
}

/// Directory holding the coordinate documents for `release`.
pub fn coordinate_dir(release: &Release) -> String {
    format!("META-INF/maven/{}/{}", release.group_id(), release.artifact_id())
}

/// Render the coordinate document (`pom.xml`).
pub fn render_pom(release: &Release) -> Result<String> {
    render("pom.xml", coordinate_context(release))
}

fn coordinate_context(release: &Release) -> minijinja::Value {
    context! {
        group_id => release.group_id(),
        artifact_id => release.artifact_id(),
        version => release.version(),
        project_name => release.project_name(),
    }
}

/// Render every descriptor document for a release.
pub fn render_descriptors(
    release: &Release,
    handlers: &[Box<dyn HandlerDeclaration>],
    processes: &[ProcessEntry],
    platform_listeners: bool,
) -> Result<Vec<Document>> {
    let (event_listeners, task_event_listeners): (&[&str], &[&str]) = if platform_listeners {
        (PLATFORM_EVENT_LISTENERS, PLATFORM_TASK_EVENT_LISTENERS)
    } else {
        (&[], &[])
    };

    let descriptor = render(
        "kie-deployment-descriptor.xml",
        context! {
            handlers => handler_table(handlers),
            event_listeners => event_listeners,
            task_event_listeners => task_event_listeners,
        },
    )?;

    let info = render(
        "kmodule.info",
        context! {
            group_id => release.group_id(),
            artifact_id => release.artifact_id(),
            version => release.version(),
            project_name => release.project_name(),
            processes => processes,
        },
    )?;

    let coordinate_dir = coordinate_dir(release);
    Ok(vec![
        Document::new(DEPLOYMENT_DESCRIPTOR, descriptor),
        Document::new(KMODULE_XML, render("kmodule.xml", coordinate_context(release))?),
        Document::new(KMODULE_INFO, info),
        Document::new(PERSISTENCE_XML, render("persistence.xml", context! {})?),
        Document::new(
            format!("{}/pom.properties", coordinate_dir),
            render("pom.properties", coordinate_context(release))?,
        ),
        Document::new(format!("{}/pom.xml", coordinate_dir), render_pom(release)?),
    ])
}
