use interview_core::model::{
    InterviewId, NewRating, NewWiki, Rating, RunningInterview, Wiki, WikiId,
};
use interview_core::{Clock, InterviewState};
use storage::repository::{Storage, StorageError};
use tracing::{debug, info};

use crate::error::WikiError;
use crate::locks::InterviewLocks;

/// Reviewing, editing and selecting the wikis of an interview.
#[derive(Clone)]
pub struct WikiService {
    storage: Storage,
    locks: InterviewLocks,
    clock: Clock,
}

impl WikiService {
    #[must_use]
    pub fn new(storage: Storage, locks: InterviewLocks, clock: Clock) -> Self {
        Self {
            storage,
            locks,
            clock,
        }
    }

    /// Wikis of an interview, newest first.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::Storage` if repository access fails.
    pub async fn list(&self, interview_id: InterviewId) -> Result<Vec<Wiki>, WikiError> {
        Ok(self.storage.wikis.list_wikis(interview_id).await?)
    }

    /// # Errors
    ///
    /// Returns `WikiError::Storage` if repository access fails.
    pub async fn get(&self, wiki_id: WikiId) -> Result<Option<Wiki>, WikiError> {
        Ok(self.storage.wikis.get_wiki(wiki_id).await?)
    }

    /// The interview's selected wiki, if any.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::Storage` if repository access fails.
    pub async fn selected(&self, interview_id: InterviewId) -> Result<Option<Wiki>, WikiError> {
        let wikis = self.storage.wikis.list_wikis(interview_id).await?;
        Ok(wikis.into_iter().find(|w| w.selected))
    }

    /// Save an edit and make the edited wiki the selected one.
    ///
    /// Editing a generated wiki stores a version-2 copy and leaves the original
    /// untouched; later versions are edited in place. The interview title is
    /// taken from the new content.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::WikiNotFound` for an unknown wiki and
    /// `WikiError::EmptyArtifact` for blank content.
    pub async fn update(&self, wiki_id: WikiId, content: &str) -> Result<Wiki, WikiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(WikiError::EmptyArtifact);
        }
        let wiki = self
            .storage
            .wikis
            .get_wiki(wiki_id)
            .await?
            .ok_or(WikiError::WikiNotFound(wiki_id))?;

        let _guard = self.locks.lock(wiki.interview_id).await;
        let mut interview = self.load(wiki.interview_id).await?;

        let edited = if wiki.is_generated() {
            let copy = self
                .storage
                .wikis
                .insert_wiki(NewWiki {
                    interview_id: wiki.interview_id,
                    content: content.to_string(),
                    version: wiki.version + 1,
                    prompt_id: wiki.prompt_id.clone(),
                    selected: wiki.selected,
                    created_at: self.clock.now(),
                })
                .await?;
            debug!(from = %wiki.id, to = %copy.id, "generated wiki copied for editing");
            copy
        } else {
            self.storage
                .wikis
                .update_content(wiki.id, content)
                .await
                .map_err(|err| not_found_as(err, wiki.id))?;
            Wiki {
                content: content.to_string(),
                ..wiki
            }
        };

        let edited = self.mark_selected(&mut interview, edited).await?;
        info!(interview_id = %interview.id, wiki_id = %edited.id, version = edited.version, "wiki updated");
        Ok(edited)
    }

    /// Make `wiki_id` the only selected wiki and complete a stopped interview.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::InterviewNotFound` / `WikiError::WikiNotFound` for
    /// unknown subjects, including a wiki of another interview.
    pub async fn select(
        &self,
        interview_id: InterviewId,
        wiki_id: WikiId,
    ) -> Result<Wiki, WikiError> {
        let _guard = self.locks.lock(interview_id).await;
        let mut interview = self.load(interview_id).await?;
        let wiki = self
            .storage
            .wikis
            .get_wiki(wiki_id)
            .await?
            .filter(|w| w.interview_id == interview_id)
            .ok_or(WikiError::WikiNotFound(wiki_id))?;

        if interview.state() == InterviewState::Stopped {
            interview.tracker.complete()?;
        }
        let wiki = self.mark_selected(&mut interview, wiki).await?;
        info!(interview_id = %interview_id, wiki_id = %wiki_id, state = %interview.state(), "wiki selected");
        Ok(wiki)
    }

    /// Record the subject's score for the interview's result.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::InterviewNotFound` for an unknown interview and
    /// `WikiError::Rating` for a score outside the accepted range.
    pub async fn rate(
        &self,
        interview_id: InterviewId,
        score: u8,
        feedback: Option<String>,
    ) -> Result<Rating, WikiError> {
        let rating = NewRating::new(interview_id, score, feedback, self.clock.now())?;
        self.load(interview_id).await?;
        let rating = self.storage.ratings.insert_rating(rating).await?;
        info!(interview_id = %interview_id, rating_id = %rating.id, score, "interview rated");
        Ok(rating)
    }

    /// Ratings of an interview, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::Storage` if repository access fails.
    pub async fn ratings(&self, interview_id: InterviewId) -> Result<Vec<Rating>, WikiError> {
        Ok(self.storage.ratings.list_ratings(interview_id).await?)
    }

    /// Stores the selection on both wiki and interview. Caller holds the lock.
    async fn mark_selected(
        &self,
        interview: &mut RunningInterview,
        wiki: Wiki,
    ) -> Result<Wiki, WikiError> {
        self.storage
            .wikis
            .select_wiki(interview.id, wiki.id)
            .await
            .map_err(|err| not_found_as(err, wiki.id))?;

        interview.title = wiki.title();
        interview.selected_wiki = Some(wiki.id);
        self.storage.interviews.save_interview(interview).await?;

        Ok(Wiki {
            selected: true,
            ..wiki
        })
    }

    async fn load(&self, interview_id: InterviewId) -> Result<RunningInterview, WikiError> {
        self.storage
            .interviews
            .get_interview(interview_id)
            .await?
            .ok_or(WikiError::InterviewNotFound(interview_id))
    }
}

fn not_found_as(err: StorageError, wiki_id: WikiId) -> WikiError {
    match err {
        StorageError::NotFound => WikiError::WikiNotFound(wiki_id),
        other => WikiError::Storage(other),
    }
}
