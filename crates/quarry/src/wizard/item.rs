use std::fmt;
use std::ops::{Deref, DerefMut};

use super::base::BaseQueryWizard;
use crate::error::WizardResult;
use crate::model::RecordHandle;
use crate::subject::{Executable, Subject};

/// Wizard for single-record endpoints.
///
/// Only includes, fields and appends apply; the record is already chosen
/// by the caller, so filters and sorts are not part of item mode.
pub struct ItemQueryWizard<S> {
    inner: BaseQueryWizard<S>,
}

impl<S: Subject> ItemQueryWizard<S> {
    pub fn new(inner: BaseQueryWizard<S>) -> Self {
        Self { inner }
    }

    pub fn build(&mut self) -> WizardResult<&mut S> {
        self.inner.apply_includes()?;
        self.inner.apply_fields()?;
        self.inner.apply_appends()?;
        Ok(self.inner.subject_mut())
    }

    /// Post-process a record loaded outside the wizard.
    pub fn process_record(&mut self, record: &RecordHandle) -> WizardResult<()> {
        self.inner.process(std::slice::from_ref(record))
    }

    pub fn into_inner(self) -> BaseQueryWizard<S> {
        self.inner
    }
}

impl<S: Executable> ItemQueryWizard<S> {
    /// Build, execute and post-process the first record.
    pub fn first(&mut self) -> WizardResult<Option<RecordHandle>> {
        self.build()?;
        let Some(record) = self.inner.subject_mut().fetch()?.into_iter().next() else {
            return Ok(None);
        };
        self.process_record(&record)?;
        Ok(Some(record))
    }
}

impl<S: Clone> Clone for ItemQueryWizard<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Subject> fmt::Debug for ItemQueryWizard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ItemQueryWizard").field(&self.inner).finish()
    }
}

impl<S> Deref for ItemQueryWizard<S> {
    type Target = BaseQueryWizard<S>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S> DerefMut for ItemQueryWizard<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
