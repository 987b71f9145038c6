use std::fmt;
use std::ops::{Deref, DerefMut};

use super::base::BaseQueryWizard;
use crate::error::WizardResult;
use crate::model::RecordHandle;
use crate::subject::{Executable, Subject};

/// Wizard for collection endpoints: every phase applies.
pub struct ListQueryWizard<S> {
    inner: BaseQueryWizard<S>,
}

impl<S: Subject> ListQueryWizard<S> {
    pub fn new(inner: BaseQueryWizard<S>) -> Self {
        Self { inner }
    }

    /// Apply filters, sorts, includes, fields and appends.
    pub fn build(&mut self) -> WizardResult<&mut S> {
        self.inner.build()
    }

    pub fn into_inner(self) -> BaseQueryWizard<S> {
        self.inner
    }
}

impl<S: Executable> ListQueryWizard<S> {
    /// Build, execute and post-process.
    pub fn get(&mut self) -> WizardResult<Vec<RecordHandle>> {
        self.build()?;
        let records = self.inner.subject_mut().fetch()?;
        self.inner.process(&records)?;
        Ok(records)
    }
}

impl<S: Clone> Clone for ListQueryWizard<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Subject> fmt::Debug for ListQueryWizard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListQueryWizard").field(&self.inner).finish()
    }
}

impl<S> Deref for ListQueryWizard<S> {
    type Target = BaseQueryWizard<S>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S> DerefMut for ListQueryWizard<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
