use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::TemplateId;
use crate::model::question::Question;

/// Business segment assumed when a template does not declare one.
pub const DEFAULT_BUSINESS_SEGMENT: &str = "general";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateError {
    #[error("template has no questions")]
    Empty,

    #[error("category name cannot be empty")]
    EmptyCategoryName,

    #[error("duplicate category: {name}")]
    DuplicateCategory { name: String },

    #[error("empty question text in category {category}")]
    EmptyQuestion { category: String },

    #[error("category {category} must map to a list of strings")]
    InvalidCategory { category: String },

    #[error("template must be a JSON object of category to questions")]
    NotAnObject,

    #[error("invalid template JSON: {0}")]
    InvalidJson(String),
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unsaved template: an ordered list of categories with their question texts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateDraft {
    title: Option<String>,
    business_segment: Option<String>,
    categories: Vec<(String, Vec<String>)>,
}

impl TemplateDraft {
    /// Build a draft from ordered `(category, questions)` pairs.
    ///
    /// Category and question texts are trimmed.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if a name or question is blank, a category repeats,
    /// or the draft has no questions at all.
    pub fn new<C, Q>(categories: C) -> Result<Self, TemplateError>
    where
        C: IntoIterator<Item = (String, Q)>,
        Q: IntoIterator<Item = String>,
    {
        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        for (name, questions) in categories {
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(TemplateError::EmptyCategoryName);
            }
            if out.iter().any(|(existing, _)| *existing == name) {
                return Err(TemplateError::DuplicateCategory { name });
            }
            let mut texts = Vec::new();
            for text in questions {
                let text = text.trim().to_owned();
                if text.is_empty() {
                    return Err(TemplateError::EmptyQuestion { category: name });
                }
                texts.push(text);
            }
            out.push((name, texts));
        }

        if out.iter().all(|(_, questions)| questions.is_empty()) {
            return Err(TemplateError::Empty);
        }

        Ok(Self {
            title: None,
            business_segment: None,
            categories: out,
        })
    }

    /// Parse the loader format: a JSON object mapping category to question list.
    ///
    /// Key order of the object is the category order.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if the JSON is malformed or fails draft validation.
    pub fn from_json(raw: &str) -> Result<Self, TemplateError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| TemplateError::InvalidJson(e.to_string()))?;
        let serde_json::Value::Object(map) = value else {
            return Err(TemplateError::NotAnObject);
        };

        let mut categories = Vec::with_capacity(map.len());
        for (category, questions) in map {
            let serde_json::Value::Array(items) = questions else {
                return Err(TemplateError::InvalidCategory { category });
            };
            let mut texts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_json::Value::String(text) => texts.push(text),
                    _ => return Err(TemplateError::InvalidCategory { category }),
                }
            }
            categories.push((category, texts));
        }

        Self::new(categories)
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_business_segment(mut self, segment: impl Into<String>) -> Self {
        self.business_segment = Some(segment.into());
        self
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[must_use]
    pub fn business_segment(&self) -> Option<&str> {
        self.business_segment.as_deref()
    }

    #[must_use]
    pub fn categories(&self) -> &[(String, Vec<String>)] {
        &self.categories
    }
}

//
// ─── TEMPLATE ──────────────────────────────────────────────────────────────────
//

/// Category of a persisted template. `position` is the declared category order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub position: u32,
    pub questions: Vec<Question>,
}

/// Persisted, immutable question catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    id: TemplateId,
    title: Option<String>,
    business_segment: Option<String>,
    categories: Vec<Category>,
    created_at: DateTime<Utc>,
}

impl Template {
    /// Rehydrate a template from storage.
    ///
    /// Categories are sorted by `position` and questions by `order`.
    #[must_use]
    pub fn from_persisted(
        id: TemplateId,
        title: Option<String>,
        business_segment: Option<String>,
        mut categories: Vec<Category>,
        created_at: DateTime<Utc>,
    ) -> Self {
        categories.sort_by_key(|c| c.position);
        for category in &mut categories {
            category.questions.sort_by_key(|q| q.order);
        }
        Self {
            id,
            title,
            business_segment,
            categories,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> TemplateId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Declared business segment, falling back to [`DEFAULT_BUSINESS_SEGMENT`].
    #[must_use]
    pub fn business_segment(&self) -> &str {
        self.business_segment
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_BUSINESS_SEGMENT)
    }

    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// All questions in category-declaration then in-category order.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.categories.iter().flat_map(|c| c.questions.iter())
    }
}
