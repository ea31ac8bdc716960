use serde::{Deserialize, Serialize};

use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    #[serde(default)]
    pub quantity: i32,
    #[serde(rename = "isAvailable", default)]
    pub is_available: bool,
}

impl Book {
    /// Availability as shown in listings. The server keeps `isAvailable`
    /// and `quantity` in step; either being off means no copy can be issued.
    pub fn can_borrow(&self) -> bool {
        self.is_available && self.quantity > 0
    }
}

/// Create/update payload for a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDto {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub quantity: i32,
    #[serde(rename = "isAvailable")]
    pub is_available: bool,
}

impl BookDto {
    /// Check the required form fields before anything is sent.
    pub fn validate(&self) -> Result<(), ApiError> {
        let required = [
            ("title", &self.title),
            ("author", &self.author),
            ("isbn", &self.isbn),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ApiError::Validation(format!("{} is required", field)));
            }
        }
        if self.quantity < 0 {
            return Err(ApiError::Validation("quantity cannot be negative".to_string()));
        }
        Ok(())
    }
}

impl From<&Book> for BookDto {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            quantity: book.quantity,
            is_available: book.is_available,
        }
    }
}
