#![forbid(unsafe_code)]

pub mod ai;
pub mod app_services;
pub mod config;
pub mod error;
pub mod interview_service;
pub mod jobs;
pub mod locks;
pub mod pipelines;
pub mod prompt_assignment;
pub mod template_service;
pub mod wiki_service;

pub use interview_core::Clock;

pub use app_services::{AiClients, AppServices};
pub use config::ServiceConfig;
pub use error::{
    AiError, AppServicesError, ConfigError, InterviewError, JobError, TemplateServiceError,
    WikiError,
};
pub use interview_service::{HistoryEntry, InterviewService, PresentedQuestion};
pub use jobs::{FailedJob, Job, JobDispatcher, JobHandler, RetryPolicy, TokioJobQueue};
pub use prompt_assignment::{PromptAssignment, PromptPool};
pub use template_service::TemplateService;
pub use wiki_service::WikiService;
