use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::CategoryId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CategoryError {
    #[error("category name cannot be empty")]
    EmptyName,

    #[error("category name is too long ({len} > {max})")]
    NameTooLong { len: usize, max: usize },
}

/// A group of questions a session can draw from.
///
/// `ordering` controls listing order and the order in which mixed sessions
/// see candidates before shuffling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    id: CategoryId,
    name: String,
    description: Option<String>,
    ordering: i32,
}

impl Category {
    pub const MAX_NAME_LEN: usize = 200;

    /// Creates a validated category.
    ///
    /// # Errors
    ///
    /// Returns `CategoryError` if the name is blank or too long.
    pub fn new(
        id: CategoryId,
        name: impl Into<String>,
        description: Option<String>,
        ordering: i32,
    ) -> Result<Self, CategoryError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(CategoryError::EmptyName);
        }
        let len = name.chars().count();
        if len > Self::MAX_NAME_LEN {
            return Err(CategoryError::NameTooLong {
                len,
                max: Self::MAX_NAME_LEN,
            });
        }
        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            name,
            description,
            ordering,
        })
    }

    #[must_use]
    pub fn id(&self) -> CategoryId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn ordering(&self) -> i32 {
        self.ordering
    }
}
