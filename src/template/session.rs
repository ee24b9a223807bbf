use std::sync::Arc;
use tracing::info;

use super::error::TemplateError;
use super::store::TemplateStore;
use super::Template;

/// Owner of the template currently being edited.
///
/// The last template is loaded once in [`start`](Session::start) and written
/// back by [`finish`](Session::finish); in between, edits replace the whole
/// value.
#[derive(Debug)]
pub struct Session {
    store: TemplateStore,
    current: Arc<Template>,
    warning: Option<TemplateError>,
}

impl Session {
    pub fn start(store: TemplateStore) -> Self {
        let loaded = store.load_last();
        Self {
            store,
            current: Arc::new(loaded.template),
            warning: loaded.warning,
        }
    }

    /// Shared handle to the current template, cheap to hand to a batch.
    pub fn current(&self) -> Arc<Template> {
        Arc::clone(&self.current)
    }

    pub fn replace(&mut self, template: Template) {
        self.current = Arc::new(template);
    }

    /// Warning from loading the last template, if it had to be reset.
    pub fn warning(&self) -> Option<&TemplateError> {
        self.warning.as_ref()
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Persist the current template as the last used one.
    pub fn finish(self) -> Result<(), TemplateError> {
        self.store.save_last(&self.current)?;
        info!("Saved last template to {:?}", self.store.last_path());
        Ok(())
    }
}
