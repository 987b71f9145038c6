//! Composition root for wizards.

use std::sync::Arc;

use super::base::BaseQueryWizard;
use super::item::ItemQueryWizard;
use super::list::ListQueryWizard;
use crate::config::WizardConfig;
use crate::driver::{Driver, DriverRegistry};
use crate::error::WizardResult;
use crate::model::ModelRegistry;
use crate::parameters::{ParameterSource, QueryParameters};
use crate::schema::{ContextMode, ResourceSchema};
use crate::subject::Subject;

/// Shared configuration, drivers and models; hands out request-scoped
/// wizards.
///
/// Built once at startup and cloned cheaply into handlers.
#[derive(Clone)]
pub struct QueryWizards {
    config: Arc<WizardConfig>,
    drivers: DriverRegistry,
    models: Arc<ModelRegistry>,
}

impl QueryWizards {
    pub fn new(config: WizardConfig, models: ModelRegistry) -> Self {
        Self {
            config: Arc::new(config),
            drivers: DriverRegistry::new(),
            models: Arc::new(models),
        }
    }

    pub fn with_drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Register an additional driver (or replace one by name).
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.drivers.register(driver);
        self
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Wizard over already-parsed parameters.
    pub fn base<S: Subject>(
        &self,
        subject: S,
        parameters: QueryParameters,
        mode: ContextMode,
    ) -> WizardResult<BaseQueryWizard<S>> {
        let driver = self.drivers.get(self.config.driver.as_str())?;
        Ok(BaseQueryWizard::new(
            subject,
            parameters,
            Arc::clone(&self.config),
            driver,
            Arc::clone(&self.models),
            mode,
        ))
    }

    fn parse(&self, source: &dyn ParameterSource) -> QueryParameters {
        QueryParameters::from_source(source, &self.config)
    }

    pub fn list<S: Subject>(&self, subject: S, source: &dyn ParameterSource) -> WizardResult<ListQueryWizard<S>> {
        let base = self.base(subject, self.parse(source), ContextMode::List)?;
        Ok(ListQueryWizard::new(base))
    }

    pub fn list_for<S: Subject>(
        &self,
        schema: Arc<dyn ResourceSchema>,
        subject: S,
        source: &dyn ParameterSource,
    ) -> WizardResult<ListQueryWizard<S>> {
        let base = self.base(subject, self.parse(source), ContextMode::List)?;
        Ok(ListQueryWizard::new(base.with_schema(schema)))
    }

    pub fn item<S: Subject>(&self, subject: S, source: &dyn ParameterSource) -> WizardResult<ItemQueryWizard<S>> {
        let base = self.base(subject, self.parse(source), ContextMode::Item)?;
        Ok(ItemQueryWizard::new(base))
    }

    pub fn item_for<S: Subject>(
        &self,
        schema: Arc<dyn ResourceSchema>,
        subject: S,
        source: &dyn ParameterSource,
    ) -> WizardResult<ItemQueryWizard<S>> {
        let base = self.base(subject, self.parse(source), ContextMode::Item)?;
        Ok(ItemQueryWizard::new(base.with_schema(schema)))
    }
}
