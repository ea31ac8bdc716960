use std::io::{self, Write};

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, warn};

use bookvault_core::api::{ApiClient, ApiError};
use bookvault_core::auth::{Access, ForcedLogout, Requirement, Route};
use bookvault_core::config::Config;
use bookvault_core::models::{BookDto, RegisterRequest};

use crate::cli::{BookCommand, BookFields, Command};
use crate::format;

/// Environment variable consulted before prompting for a password.
const PASSWORD_ENV: &str = "BOOKVAULT_PASSWORD";

/// The shell: API client, config and the single forced-logout subscription.
pub struct Shell {
    api: ApiClient,
    config: Config,
    notices: broadcast::Receiver<ForcedLogout>,
}

impl Shell {
    pub fn new(api: ApiClient, config: Config, notices: broadcast::Receiver<ForcedLogout>) -> Self {
        Self {
            api,
            config,
            notices,
        }
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { username } => self.login(username).await,
            Command::Register {
                username,
                email,
                admin,
            } => self.register(username, email, admin).await,
            Command::Logout => {
                self.api.logout();
                println!("Logged out.");
                Ok(())
            }
            Command::Whoami => self.whoami(),
            Command::Books { action } => self.books(action).await,
            Command::Borrow { book_id } => {
                self.require(Requirement::Authenticated)?;
                let record = self.api.issue_book(book_id).await.map_err(api_error)?;
                println!("{}", format::issue_record(&record));
                println!("\nSave the issue record ID ({}) - you need it to return the book.", record.id);
                Ok(())
            }
            Command::Return { issue_record_id } => {
                self.require(Requirement::Authenticated)?;
                let record = self.api.return_book(issue_record_id).await.map_err(api_error)?;
                println!("{}", format::issue_record(&record));
                Ok(())
            }
            Command::Watch => self.watch().await,
        }
    }

    /// Print any forced-logout notices that arrived while a command ran.
    pub fn render_notices(&mut self) {
        loop {
            match self.notices.try_recv() {
                Ok(notice) => render_notice(&notice),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed forced-logout notices");
                }
                Err(_) => break,
            }
        }
    }

    /// Route guard for a command. Client-side only; the server decides.
    fn require(&self, requirement: Requirement) -> Result<()> {
        match Access::evaluate(&self.api.session().state(), requirement) {
            Access::Granted => Ok(()),
            Access::Pending => bail!("Session is still loading"),
            Access::Redirect(Route::Login) => {
                bail!("Not logged in. Run `bookvault login` first.")
            }
            Access::Redirect(Route::Dashboard) => bail!("Administrator role required."),
        }
    }

    async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(name) => name,
            None => prompt("Email: ")?,
        };
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(p) if !p.is_empty() => p,
            _ => rpassword::prompt_password("Password: ").context("Failed to read password")?,
        };

        let user = self.api.login(&username, &password).await.map_err(api_error)?;

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Logged in as {} ({}).", user.display_name, user.role());
        Ok(())
    }

    async fn register(&self, username: String, email: String, admin: bool) -> Result<()> {
        if admin {
            self.require(Requirement::Administrator)?;
        }
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(p) if !p.is_empty() => p,
            _ => {
                let first = rpassword::prompt_password("Password: ")?;
                let second = rpassword::prompt_password("Confirm password: ")?;
                if first != second {
                    bail!("Passwords do not match");
                }
                first
            }
        };
        let request = RegisterRequest {
            username,
            email,
            password,
        };

        let message = if admin {
            self.api.register_admin(&request).await
        } else {
            self.api.register(&request).await
        }
        .map_err(api_error)?;

        if message.trim().is_empty() {
            println!("Registered {}.", request.username);
        } else {
            println!("{}", message.trim());
        }
        if !admin {
            println!("Run `bookvault login` to sign in.");
        }
        Ok(())
    }

    fn whoami(&self) -> Result<()> {
        self.require(Requirement::Authenticated)?;
        let session = self.api.session();
        let user = session
            .current_user()
            .ok_or_else(|| anyhow!("Not logged in"))?;

        println!("{}", user.display_name);
        println!("  Role:    {}", user.role());
        println!("  Claims:  {}", user.roles.join(", "));
        if let Some(info) = session.credential().and_then(|c| c.info(session.now())) {
            println!("  Token:   {}", info.preview);
            if let Some(expires_at) = info.expires_at {
                println!("  Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        Ok(())
    }

    async fn books(&self, action: BookCommand) -> Result<()> {
        match action {
            BookCommand::List => {
                let books = self.api.list_books().await.map_err(api_error)?;
                if books.is_empty() {
                    println!("The catalog is empty.");
                } else {
                    print!("{}", format::book_table(&books));
                }
            }
            BookCommand::Show { id } => {
                let book = self.api.get_book(id).await.map_err(api_error)?;
                println!("{}", format::book_detail(&book));
            }
            BookCommand::Add(fields) => {
                self.require(Requirement::Administrator)?;
                let dto = fields.apply(BookDto {
                    title: String::new(),
                    author: String::new(),
                    isbn: String::new(),
                    quantity: 1,
                    is_available: true,
                });
                let book = self.api.create_book(&dto).await.map_err(api_error)?;
                println!("Added book {}.", book.id);
                println!("{}", format::book_detail(&book));
            }
            BookCommand::Update { id, fields } => {
                self.require(Requirement::Administrator)?;
                let current = self.api.get_book(id).await.map_err(api_error)?;
                let dto = fields.apply(BookDto::from(&current));
                let book = self.api.update_book(id, &dto).await.map_err(api_error)?;
                println!("{}", format::book_detail(&book));
            }
            BookCommand::Delete { id } => {
                self.require(Requirement::Administrator)?;
                let message = self.api.delete_book(id).await.map_err(api_error)?;
                if message.trim().is_empty() {
                    println!("Deleted book {}.", id);
                } else {
                    println!("{}", message.trim());
                }
            }
        }
        Ok(())
    }

    /// Keep the process alive so the background expiry check can run.
    async fn watch(&mut self) -> Result<()> {
        self.require(Requirement::Authenticated)?;
        let mut states = self.api.session().subscribe_state();
        if let Some(user) = self.api.session().current_user() {
            println!("Watching session for {} (Ctrl+C to stop)...", user.display_name);
        }

        loop {
            tokio::select! {
                notice = self.notices.recv() => match notice {
                    Ok(notice) => {
                        render_notice(&notice);
                        return Ok(());
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return Ok(()),
                },
                changed = states.changed() => {
                    if changed.is_err() || states.borrow_and_update().user.is_none() {
                        // A forced logout queues its notice before the state
                        // change; render_notices prints it.
                        return Ok(());
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    return Ok(());
                }
            }
        }
    }
}

impl BookFields {
    fn apply(self, mut dto: BookDto) -> BookDto {
        if let Some(title) = self.title {
            dto.title = title;
        }
        if let Some(author) = self.author {
            dto.author = author;
        }
        if let Some(isbn) = self.isbn {
            dto.isbn = isbn;
        }
        if let Some(quantity) = self.quantity {
            dto.quantity = quantity;
        }
        if let Some(available) = self.available {
            dto.is_available = available;
        }
        dto
    }
}

fn render_notice(notice: &ForcedLogout) {
    eprintln!("Session Expired: {}", notice.reason);
    if notice.redirect == Route::Login {
        eprintln!("Run `bookvault login` to sign in again.");
    }
}

fn api_error(e: ApiError) -> anyhow::Error {
    error!(error = %e, "Request failed");
    anyhow!(e.user_message())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> BookFields {
        BookFields {
            title: None,
            author: None,
            isbn: None,
            quantity: None,
            available: None,
        }
    }

    fn dto() -> BookDto {
        BookDto {
            title: "Kindred".into(),
            author: "Octavia E. Butler".into(),
            isbn: "9780807083697".into(),
            quantity: 2,
            is_available: true,
        }
    }

    #[test]
    fn test_apply_keeps_omitted_fields() {
        let updated = BookFields {
            quantity: Some(5),
            ..fields()
        }
        .apply(dto());
        assert_eq!(updated.quantity, 5);
        assert_eq!(updated.title, "Kindred");
    }

    #[test]
    fn test_apply_overrides_all_fields() {
        let updated = BookFields {
            title: Some("Parable of the Sower".into()),
            author: Some("O. E. Butler".into()),
            isbn: Some("9780446675505".into()),
            quantity: Some(0),
            available: Some(false),
        }
        .apply(dto());
        assert_eq!(updated.title, "Parable of the Sower");
        assert!(!updated.is_available);
        assert_eq!(updated.quantity, 0);
    }

    #[test]
    fn test_api_error_uses_user_message() {
        let err = api_error(ApiError::SessionExpired);
        assert_eq!(err.to_string(), "Session expired. Please log in again.");
    }
}
