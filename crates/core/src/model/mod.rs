mod ids;
mod interview;
mod prompt;
mod question;
mod rating;
mod response;
mod template;
mod wiki;

pub use ids::{
    AdditionalQuestionId, InterviewId, ParseIdError, QuestionId, RatingId, ResponseId, TemplateId,
    WikiId,
};
pub use interview::RunningInterview;
pub use prompt::{CONVERSATION_PLACEHOLDER, PromptId, PromptVariant, select_least_used};
pub use question::{
    ADDITIONAL_ORDER_START, AdditionalQuestion, AudioRef, AudioScope, NewAdditionalQuestion,
    Question, QuestionRef,
};
pub use rating::{MAX_SCORE, MIN_SCORE, NewRating, Rating, RatingError};
pub use response::{AnswerPayload, NewResponse, Response};
pub use template::{Category, DEFAULT_BUSINESS_SEGMENT, Template, TemplateDraft, TemplateError};
pub use wiki::{GENERATED_VERSION, NewWiki, Wiki, extract_title, normalize_artifact};
