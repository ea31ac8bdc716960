use bookvault_core::models::{Book, IssueRecord};

/// Column widths for the catalog listing
const TITLE_WIDTH: usize = 32;
const AUTHOR_WIDTH: usize = 24;
const ISBN_WIDTH: usize = 17;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a date or timestamp as e.g. "Mar 15, 2024"
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if let Some(day) = date
        .get(..10)
        .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    {
        day.format("%b %d, %Y").to_string()
    } else {
        date.to_string()
    }
}

fn format_optional_date(date: &Option<String>) -> String {
    date.as_deref().map(format_date).unwrap_or_else(|| "-".to_string())
}

pub fn book_table(books: &[Book]) -> String {
    let mut out = format!(
        "{:>5}  {:<tw$}  {:<aw$}  {:<iw$}  {:>4}  {}\n",
        "ID",
        "TITLE",
        "AUTHOR",
        "ISBN",
        "QTY",
        "STATUS",
        tw = TITLE_WIDTH,
        aw = AUTHOR_WIDTH,
        iw = ISBN_WIDTH,
    );
    for book in books {
        out.push_str(&format!(
            "{:>5}  {:<tw$}  {:<aw$}  {:<iw$}  {:>4}  {}\n",
            book.id,
            truncate_string(&book.title, TITLE_WIDTH),
            truncate_string(&book.author, AUTHOR_WIDTH),
            truncate_string(&book.isbn, ISBN_WIDTH),
            book.quantity,
            availability(book),
            tw = TITLE_WIDTH,
            aw = AUTHOR_WIDTH,
            iw = ISBN_WIDTH,
        ));
    }
    out
}

pub fn book_detail(book: &Book) -> String {
    format!(
        "{}\n  by {}\n  ISBN:     {}\n  Copies:   {}\n  Status:   {}\n  ID:       {}",
        book.title,
        book.author,
        book.isbn,
        book.quantity,
        availability(book),
        book.id
    )
}

fn availability(book: &Book) -> &'static str {
    if book.can_borrow() {
        "Available"
    } else {
        "Unavailable"
    }
}

pub fn issue_record(record: &IssueRecord) -> String {
    let title = record
        .book
        .as_ref()
        .map(|b| b.title.as_str())
        .unwrap_or("(unknown book)");
    let status = if record.is_returned { "Returned" } else { "On loan" };
    format!(
        "Issue record {}\n  Book:     {}\n  Issued:   {}\n  Due:      {}\n  Returned: {}\n  Status:   {}",
        record.id,
        title,
        format_optional_date(&record.issue_date),
        format_optional_date(&record.due_date),
        format_optional_date(&record.return_date),
        status
    )
}
