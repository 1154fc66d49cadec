use std::sync::Arc;

use quiz_core::model::{
    AnswerOption, Category, CategoryId, CategoryScope, OptionId, Question, QuestionDraft,
    QuestionId,
};
use quiz_core::scoring::{AnswerKey, ScoringError};
use storage::repository::{CategoryRepository, QuestionRepository, StorageError};

use crate::Clock;
use crate::error::ContentError;
use crate::selection;

/// Read access to categories, questions and options, plus authoring.
#[derive(Clone)]
pub struct ContentService {
    clock: Clock,
    categories: Arc<dyn CategoryRepository>,
    questions: Arc<dyn QuestionRepository>,
}

impl ContentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        categories: Arc<dyn CategoryRepository>,
        questions: Arc<dyn QuestionRepository>,
    ) -> Self {
        Self {
            clock,
            categories,
            questions,
        }
    }

    /// Create a category, replacing any existing one with the same id.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Category` for invalid input, or storage errors.
    pub async fn create_category(
        &self,
        id: CategoryId,
        name: impl Into<String>,
        description: Option<String>,
        ordering: i32,
    ) -> Result<Category, ContentError> {
        let category = Category::new(id, name, description, ordering)?;
        self.categories.upsert_category(&category).await?;
        Ok(category)
    }

    /// # Errors
    ///
    /// Returns `ContentError` on storage failures.
    pub async fn list_categories(&self) -> Result<Vec<Category>, ContentError> {
        Ok(self.categories.list_categories().await?)
    }

    /// # Errors
    ///
    /// Returns `ContentError::CategoryNotFound` if the category does not exist.
    pub async fn get_category(&self, id: CategoryId) -> Result<Category, ContentError> {
        self.categories
            .get_category(id)
            .await?
            .ok_or(ContentError::CategoryNotFound(id))
    }

    /// Validate and persist a question with its options.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Question` when the draft breaks an integrity rule,
    /// `ContentError::CategoryNotFound` for an unknown category, and
    /// `ContentError::QuestionInUse` when a session already references the
    /// question and its answer key would change.
    pub async fn save_question(&self, draft: QuestionDraft) -> Result<Question, ContentError> {
        let question_id = draft.id;
        let category_id = draft.category_id;
        let validated = draft.validate(self.clock.now())?;
        match self.questions.upsert_question(&validated).await {
            Ok(()) => {}
            Err(StorageError::NotFound) => return Err(ContentError::CategoryNotFound(category_id)),
            Err(StorageError::Conflict) => return Err(ContentError::QuestionInUse(question_id)),
            Err(e) => return Err(e.into()),
        }
        self.get_question(question_id).await
    }

    /// # Errors
    ///
    /// Returns `ContentError::QuestionNotFound` if the question does not exist.
    pub async fn get_question(&self, id: QuestionId) -> Result<Question, ContentError> {
        self.questions
            .get_question(id)
            .await?
            .ok_or(ContentError::QuestionNotFound(id))
    }

    /// Size of the question pool for a scope.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::CategoryNotFound` for an unknown category.
    pub async fn count_questions(&self, scope: CategoryScope) -> Result<usize, ContentError> {
        if let Some(category_id) = scope.category_id() {
            self.get_category(category_id).await?;
        }
        Ok(self.questions.list_questions(scope).await?.len())
    }

    /// Pick `count` questions for a scope.
    ///
    /// Candidates come ordered by category ordering then question id and are
    /// shuffled when `seed` is given. With `short_fill` a smaller pool is
    /// returned whole instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::CategoryNotFound` for an unknown category,
    /// `ContentError::InvalidCount` for a zero count, and
    /// `ContentError::NotEnoughQuestions` when the pool is empty or too small
    /// without `short_fill`.
    pub async fn get_questions(
        &self,
        scope: CategoryScope,
        count: u32,
        seed: Option<u64>,
        short_fill: bool,
    ) -> Result<Vec<Question>, ContentError> {
        if count == 0 {
            return Err(ContentError::InvalidCount);
        }
        if let Some(category_id) = scope.category_id() {
            self.get_category(category_id).await?;
        }

        let candidates = self.questions.list_questions(scope).await?;
        let requested = usize::try_from(count).unwrap_or(usize::MAX);
        let available = candidates.len();
        if available == 0 || (available < requested && !short_fill) {
            return Err(ContentError::NotEnoughQuestions {
                available,
                requested,
            });
        }

        Ok(selection::select(candidates, requested, seed))
    }

    /// Options of a question in display order.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::QuestionNotFound` for an unknown question and
    /// `ContentError::NoCorrectOption` when no option is flagged correct.
    pub async fn get_options(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerOption>, ContentError> {
        self.get_question(question_id).await?;
        let options = self.questions.get_options(question_id).await?;
        if !options.iter().any(|o| o.is_correct) {
            return Err(ContentError::NoCorrectOption(question_id));
        }
        Ok(options)
    }

    /// # Errors
    ///
    /// Returns `ContentError` on storage failures.
    pub async fn find_option(&self, id: OptionId) -> Result<Option<AnswerOption>, ContentError> {
        Ok(self.questions.get_option(id).await?)
    }

    /// Build the grading key for a question sequence.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::QuestionNotFound` or
    /// `ContentError::NoCorrectOption` when content needed for grading is
    /// missing.
    pub async fn answer_key(&self, question_ids: &[QuestionId]) -> Result<AnswerKey, ContentError> {
        let mut key = AnswerKey::new();
        for question_id in question_ids {
            let question = self.get_question(*question_id).await?;
            let options = self.questions.get_options(*question_id).await?;
            key.insert_question(*question_id, question.category_id(), &options)
                .map_err(|e| match e {
                    ScoringError::NoCorrectOption(id) => ContentError::NoCorrectOption(id),
                    _ => ContentError::NoCorrectOption(*question_id),
                })?;
        }
        Ok(key)
    }
}
