use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Book, User};

/// A single borrow. Records cannot be listed; they are only looked up by
/// the ID returned when the book was issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: i64,
    #[serde(rename = "issueDate")]
    pub issue_date: Option<String>,
    #[serde(rename = "dueDate")]
    pub due_date: Option<String>,
    #[serde(rename = "returnDate", default)]
    pub return_date: Option<String>,
    #[serde(rename = "isReturned", default)]
    pub is_returned: bool,
    pub user: Option<User>,
    pub book: Option<Book>,
}

impl IssueRecord {
    /// Due date parsed from either a plain date or a timestamp.
    pub fn due(&self) -> Option<NaiveDate> {
        self.due_date.as_deref().and_then(parse_date)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_returned && self.due().map(|due| today > due).unwrap_or(false)
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let date = value.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
