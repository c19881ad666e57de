//! CRUD boundary for workflow and phase template definitions.
//!
//! Built-in definitions are read-only here; they can only be cloned.
//! Phase lists are validated before they are stored.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::store::Store;
use crate::workflow::{
    validate_phases, PhaseTemplate, ValidationReport, Workflow, WorkflowId, WorkflowPhase,
};
use crate::{Error, Result};

pub struct DefinitionService {
    store: Arc<dyn Store>,
}

impl DefinitionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn existing_workflow(&self, id: &WorkflowId) -> Result<Workflow> {
        self.store
            .load_workflow(id)?
            .ok_or_else(|| Error::WorkflowNotFound(id.clone()))
    }

    fn mutable_workflow(&self, id: &WorkflowId) -> Result<Workflow> {
        let workflow = self.existing_workflow(id)?;
        if workflow.is_builtin {
            return Err(Error::BuiltinImmutable(id.to_string()));
        }
        Ok(workflow)
    }

    // ========== Workflows ==========

    pub fn get_workflow(&self, id: &WorkflowId) -> Result<Workflow> {
        self.existing_workflow(id)
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>> {
        self.store.list_workflows()
    }

    /// Create or replace a custom workflow.
    pub fn save_workflow(&self, mut workflow: Workflow) -> Result<Workflow> {
        if let Some(existing) = self.store.load_workflow(&workflow.id)? {
            if existing.is_builtin {
                return Err(Error::BuiltinImmutable(workflow.id.to_string()));
            }
            workflow.created_at = existing.created_at;
        }
        workflow.is_builtin = false;
        workflow.updated_at = Utc::now();
        self.store.save_workflow(&workflow)?;
        debug!(workflow = %workflow.id, "saved workflow");
        Ok(workflow)
    }

    pub fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        self.mutable_workflow(id)?;
        self.store.delete_workflow(id)?;
        info!(workflow = %id, "deleted workflow");
        Ok(())
    }

    pub fn get_workflow_phases(&self, id: &WorkflowId) -> Result<Vec<WorkflowPhase>> {
        self.existing_workflow(id)?;
        self.store.get_workflow_phases(id)
    }

    /// Replace a workflow's phases after validating the graph and
    /// checking that every referenced template exists.
    pub fn set_workflow_phases(&self, id: &WorkflowId, phases: Vec<WorkflowPhase>) -> Result<()> {
        let mut workflow = self.mutable_workflow(id)?;
        validate_phases(&phases).into_result(id)?;
        for phase in &phases {
            if self.store.get_phase_template(phase.id())?.is_none() {
                return Err(Error::PhaseTemplateNotFound(phase.id().to_string()));
            }
        }
        self.store.save_workflow_phases(id, &phases)?;
        workflow.updated_at = Utc::now();
        self.store.save_workflow(&workflow)?;
        debug!(workflow = %id, phases = phases.len(), "stored workflow phases");
        Ok(())
    }

    /// Validate the stored phase graph of a workflow.
    pub fn validate_workflow(&self, id: &WorkflowId) -> Result<ValidationReport> {
        Ok(validate_phases(&self.get_workflow_phases(id)?))
    }

    /// Copy a workflow (built-in or not) and its phases under a new id.
    /// An existing custom workflow with that id is replaced.
    pub fn clone_workflow(
        &self,
        source: &WorkflowId,
        new_id: impl Into<WorkflowId>,
        name: &str,
    ) -> Result<Workflow> {
        let new_id = new_id.into();
        if let Some(existing) = self.store.load_workflow(&new_id)? {
            if existing.is_builtin {
                return Err(Error::BuiltinImmutable(new_id.to_string()));
            }
        }
        let original = self.existing_workflow(source)?;
        let phases = self.store.get_workflow_phases(source)?;

        let now = Utc::now();
        let workflow = Workflow {
            id: new_id.clone(),
            name: name.to_string(),
            is_builtin: false,
            based_on: Some(source.clone()),
            created_at: now,
            updated_at: now,
            ..original
        };
        self.store.save_workflow(&workflow)?;
        self.store.save_workflow_phases(&new_id, &phases)?;
        info!(workflow = %new_id, based_on = %source, "cloned workflow");
        Ok(workflow)
    }

    // ========== Phase templates ==========

    pub fn get_phase_template(&self, id: &str) -> Result<PhaseTemplate> {
        self.store
            .get_phase_template(id)?
            .ok_or_else(|| Error::PhaseTemplateNotFound(id.to_string()))
    }

    pub fn list_phase_templates(&self) -> Result<Vec<PhaseTemplate>> {
        self.store.list_phase_templates()
    }

    /// Create or replace a custom phase template.
    pub fn save_phase_template(&self, mut template: PhaseTemplate) -> Result<PhaseTemplate> {
        if let Some(existing) = self.store.get_phase_template(&template.id)? {
            if existing.is_builtin {
                return Err(Error::BuiltinImmutable(template.id));
            }
            template.created_at = existing.created_at;
        }
        template.is_builtin = false;
        template.updated_at = Utc::now();
        self.store.save_phase_template(&template)?;
        Ok(template)
    }

    pub fn delete_phase_template(&self, id: &str) -> Result<()> {
        let template = self.get_phase_template(id)?;
        if template.is_builtin {
            return Err(Error::BuiltinImmutable(id.to_string()));
        }
        self.store.delete_phase_template(id)
    }

    pub fn clone_phase_template(&self, source: &str, new_id: &str, name: &str) -> Result<PhaseTemplate> {
        let now = Utc::now();
        let template = PhaseTemplate {
            id: new_id.to_string(),
            name: name.to_string(),
            is_builtin: false,
            created_at: now,
            updated_at: now,
            ..self.get_phase_template(source)?
        };
        self.save_phase_template(template)
    }
}
