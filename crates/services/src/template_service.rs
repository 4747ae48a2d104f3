use std::sync::Arc;

use interview_core::Clock;
use interview_core::model::{Template, TemplateDraft, TemplateId};
use storage::repository::TemplateRepository;
use tracing::{info, warn};

use crate::error::TemplateServiceError;
use crate::jobs::{Job, JobDispatcher};

/// Creates templates and schedules their question audio.
#[derive(Clone)]
pub struct TemplateService {
    clock: Clock,
    templates: Arc<dyn TemplateRepository>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl TemplateService {
    #[must_use]
    pub fn new(
        clock: Clock,
        templates: Arc<dyn TemplateRepository>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            clock,
            templates,
            dispatcher,
        }
    }

    /// Persist a draft and enqueue audio synthesis for every question.
    ///
    /// Enqueue failures are logged; the template is kept.
    ///
    /// # Errors
    ///
    /// Returns `TemplateServiceError::Storage` if persistence fails.
    pub async fn create(&self, draft: &TemplateDraft) -> Result<Template, TemplateServiceError> {
        let template = self
            .templates
            .create_template(draft, self.clock.now())
            .await?;

        for question in template.questions() {
            let job = Job::TemplateAudio {
                template_id: template.id(),
                question_id: question.id,
            };
            if let Err(err) = self.dispatcher.enqueue(job).await {
                warn!(question_id = %question.id, error = %err, "failed to enqueue question audio");
            }
        }

        info!(
            template_id = %template.id(),
            questions = template.questions().count(),
            "template created"
        );
        Ok(template)
    }

    /// Parse the JSON loader format and create the template.
    ///
    /// # Errors
    ///
    /// Returns `TemplateServiceError::Template` for malformed or invalid JSON
    /// and `TemplateServiceError::Storage` if persistence fails.
    pub async fn import_json(
        &self,
        raw: &str,
        title: Option<String>,
    ) -> Result<Template, TemplateServiceError> {
        let mut draft = TemplateDraft::from_json(raw)?;
        if let Some(title) = title {
            draft = draft.with_title(title);
        }
        self.create(&draft).await
    }

    /// Fetch a template by ID.
    ///
    /// Returns `Ok(None)` when the template does not exist.
    ///
    /// # Errors
    ///
    /// Returns `TemplateServiceError::Storage` if repository access fails.
    pub async fn get(&self, id: TemplateId) -> Result<Option<Template>, TemplateServiceError> {
        Ok(self.templates.get_template(id).await?)
    }
}
