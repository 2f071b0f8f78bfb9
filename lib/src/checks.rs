//! Consistency diagnostics for the graphs derived from a model.
//! Each check inspects one model and reports problems without repairing them;
//! `ReferenceManager::reconcile` is the repair.

use crate::options::ExportScope;
use crate::references::ReferenceManager;
use crate::util::fingerprint;
use anyhow::Result;
use log::debug;
use oxigraph::model::{NamedNode, NamedNodeRef};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelProblem {
    pub check: String,
    pub model: String,
    /// Resources the problem is about, if any.
    pub resources: Vec<String>,
    pub message: String,
}

pub trait ModelCheck {
    fn name(&self) -> &str;
    fn check(
        &mut self,
        references: &ReferenceManager,
        model: NamedNodeRef<'_>,
        problems: &mut Vec<ModelProblem>,
    ) -> Result<()>;
}

pub struct Doctor {
    checks: Vec<Box<dyn ModelCheck>>,
}

impl Default for Doctor {
    fn default() -> Self {
        Self::new()
    }
}

impl Doctor {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// A doctor running every built-in check.
    pub fn with_default_checks(scope: ExportScope) -> Self {
        let mut doctor = Self::new();
        doctor.add_check(Box::new(HasPartMembership {}));
        doctor.add_check(Box::new(ExportFreshness { scope }));
        doctor.add_check(Box::new(DanglingReferences {}));
        doctor
    }

    pub fn add_check(&mut self, check: Box<dyn ModelCheck>) {
        self.checks.push(check);
    }

    pub fn run(
        &mut self,
        references: &ReferenceManager,
        model: NamedNodeRef<'_>,
    ) -> Result<Vec<ModelProblem>> {
        let mut problems = Vec::new();
        for check in &mut self.checks {
            debug!("Running check {} on {model}", check.name());
            check.check(references, model, &mut problems)?;
        }
        Ok(problems)
    }
}

fn strings(iris: impl IntoIterator<Item = NamedNode>) -> Vec<String> {
    iris.into_iter().map(NamedNode::into_string).collect()
}

/// The HasPart graph lists exactly the resources whose graphs point at the model.
pub struct HasPartMembership {}

impl ModelCheck for HasPartMembership {
    fn name(&self) -> &str {
        "HasPart Membership"
    }

    fn check(
        &mut self,
        references: &ReferenceManager,
        model: NamedNodeRef<'_>,
        problems: &mut Vec<ModelProblem>,
    ) -> Result<()> {
        let listed: BTreeSet<NamedNode> = references.member_iris(model)?.into_iter().collect();
        let defined: BTreeSet<NamedNode> =
            references.defined_members(model)?.into_iter().collect();
        let unlisted: Vec<NamedNode> = defined.difference(&listed).cloned().collect();
        if !unlisted.is_empty() {
            problems.push(ModelProblem {
                check: self.name().to_string(),
                model: model.as_str().to_string(),
                resources: strings(unlisted),
                message: "Resources defined by the model are missing from its HasPart graph"
                    .to_string(),
            });
        }
        let stray: Vec<NamedNode> = listed.difference(&defined).cloned().collect();
        if !stray.is_empty() {
            problems.push(ModelProblem {
                check: self.name().to_string(),
                model: model.as_str().to_string(),
                resources: strings(stray),
                message: "HasPart lists resources that are not defined by the model".to_string(),
            });
        }
        Ok(())
    }
}

/// The stored Export graph matches what a rebuild would produce.
pub struct ExportFreshness {
    pub scope: ExportScope,
}

impl ModelCheck for ExportFreshness {
    fn name(&self) -> &str {
        "Export Freshness"
    }

    fn check(
        &mut self,
        references: &ReferenceManager,
        model: NamedNodeRef<'_>,
        problems: &mut Vec<ModelProblem>,
    ) -> Result<()> {
        let expected = references.expected_export_graph(model, self.scope)?;
        let stored = references.export_fingerprint(model)?;
        let message = match stored {
            None if expected.is_empty() => return Ok(()),
            None => "Export graph is missing".to_string(),
            Some(stored) if stored != fingerprint(&expected) => {
                "Export graph is out of date".to_string()
            }
            Some(_) => return Ok(()),
        };
        problems.push(ModelProblem {
            check: self.name().to_string(),
            model: model.as_str().to_string(),
            resources: Vec::new(),
            message,
        });
        Ok(())
    }
}

/// Every HasPart entry has a resource graph.
pub struct DanglingReferences {}

impl ModelCheck for DanglingReferences {
    fn name(&self) -> &str {
        "Dangling References"
    }

    fn check(
        &mut self,
        references: &ReferenceManager,
        model: NamedNodeRef<'_>,
        problems: &mut Vec<ModelProblem>,
    ) -> Result<()> {
        let mut dangling = Vec::new();
        for member in references.member_iris(model)? {
            if !references.store().graph_exists(member.as_ref())? {
                dangling.push(member);
            }
        }
        if !dangling.is_empty() {
            problems.push(ModelProblem {
                check: self.name().to_string(),
                model: model.as_str().to_string(),
                resources: strings(dangling),
                message: "HasPart entries point to graphs that do not exist".to_string(),
            });
        }
        Ok(())
    }
}
