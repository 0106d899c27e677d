use std::{
    io,
    time::{Duration, Instant},
};

use color_eyre::Result;
use crossterm::{
    event::{self, DisableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use keysafe_core::{book::CredentialBook, credentials::CredentialRecord, storage::CredentialStore};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};
use tracing::warn;

mod form;

use form::EntryForm;

/// Interactive credential list. Every change is saved immediately; `q` or
/// `Esc` saves once more and exits.
pub async fn launch<S: CredentialStore>(mut book: CredentialBook<S>) -> Result<()> {
    {
        // Guard restores the terminal even if we early-return.
        let guard = TerminalGuard::enter()?;
        let mut terminal = guard.terminal()?;
        let mut app = App::new(book.records().len());

        loop {
            app.tick(Instant::now());
            let labels = book.labels();
            terminal.draw(|frame| app.render(frame, &labels))?;

            if !event::poll(Duration::from_millis(150))? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match app.handle_key(key.code, &book) {
                Action::None => {}
                Action::Quit => break,
                Action::Add(record) => {
                    let result = book.add(record).await;
                    let len = book.records().len();
                    app.after_change(result.map(Some), len, "Entry added.");
                }
                Action::Edit(index, record) => {
                    let result = book.edit(index, record).await;
                    let len = book.records().len();
                    app.after_change(result.map(|_| Some(index)), len, "Entry edited.");
                }
                Action::Delete(index) => {
                    let result = book.delete(index).await;
                    let len = book.records().len();
                    app.after_change(result.map(|_| None), len, "Entry deleted.");
                }
            }
        }
    }

    book.close().await?;
    Ok(())
}

/// What the event loop should do after a key press.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    None,
    Quit,
    Add(CredentialRecord),
    Edit(usize, CredentialRecord),
    Delete(usize),
}

enum Mode {
    Browse,
    Form(EntryForm),
}

struct App {
    list: ListState,
    mode: Mode,
    status: Option<Status>,
}

struct Status {
    text: String,
    is_error: bool,
    /// Set for revealed secrets; the line is cleared once this passes.
    expires_at: Option<Instant>,
}

/// How long a revealed username or password stays on screen.
const REVEAL_TIMEOUT: Duration = Duration::from_secs(10);

impl App {
    fn new(len: usize) -> Self {
        let mut list = ListState::default();
        if len > 0 {
            list.select(Some(0));
        }
        Self {
            list,
            mode: Mode::Browse,
            status: None,
        }
    }

    fn handle_key<S: CredentialStore>(
        &mut self,
        code: KeyCode,
        book: &CredentialBook<S>,
    ) -> Action {
        if let Mode::Form(form) = &mut self.mode {
            return match code {
                KeyCode::Esc => {
                    self.mode = Mode::Browse;
                    self.info("Cancelled.");
                    Action::None
                }
                KeyCode::Enter => {
                    let (editing, record) = form.submit();
                    self.mode = Mode::Browse;
                    match editing {
                        Some(index) => Action::Edit(index, record),
                        None => Action::Add(record),
                    }
                }
                other => {
                    form.handle_key(other);
                    Action::None
                }
            };
        }

        // Any key in the list hides whatever the status line showed,
        // including a revealed secret.
        self.status = None;
        let len = book.records().len();
        match code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(len, 1);
                Action::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(len, -1);
                Action::None
            }
            KeyCode::Char('a') => {
                self.mode = Mode::Form(EntryForm::blank());
                Action::None
            }
            KeyCode::Char('e') => match self.selected(book) {
                Some((index, record)) => {
                    self.mode = Mode::Form(EntryForm::editing(index, record));
                    Action::None
                }
                None => self.no_selection("edit"),
            },
            KeyCode::Char('d') => match self.selected(book) {
                Some((index, _)) => Action::Delete(index),
                None => self.no_selection("delete"),
            },
            KeyCode::Char('u') => {
                match self.selected(book) {
                    Some((_, record)) => self.reveal(format!("Username: {}", record.username())),
                    None => {
                        self.no_selection("reveal");
                    }
                }
                Action::None
            }
            KeyCode::Char('p') => {
                match self.selected(book) {
                    Some((_, record)) => self.reveal(format!("Password: {}", record.password())),
                    None => {
                        self.no_selection("reveal");
                    }
                }
                Action::None
            }
            _ => Action::None,
        }
    }

    fn selected<'b, S: CredentialStore>(
        &self,
        book: &'b CredentialBook<S>,
    ) -> Option<(usize, &'b CredentialRecord)> {
        let index = self.list.selected()?;
        book.get(index).ok().map(|record| (index, record))
    }

    fn move_selection(&mut self, len: usize, delta: isize) {
        if len == 0 {
            self.list.select(None);
            return;
        }
        let current = self.list.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.list.select(Some(next as usize));
    }

    /// Update selection and status after a mutation was applied to the book.
    fn after_change<E: std::fmt::Display>(
        &mut self,
        result: std::result::Result<Option<usize>, E>,
        len: usize,
        message: &str,
    ) {
        match result {
            Ok(select) => {
                self.info(message);
                let fallback = self.list.selected().map(|i| i.min(len.saturating_sub(1)));
                let next = select.or(fallback).filter(|_| len > 0);
                self.list.select(next);
            }
            Err(err) => {
                warn!(%err, "failed to apply change");
                self.error(format!("Error: {err}"));
            }
        }
    }

    fn no_selection(&mut self, verb: &str) -> Action {
        self.error(format!("Select an entry to {verb} first."));
        Action::None
    }

    /// Drop a revealed value whose time on screen is up.
    fn tick(&mut self, now: Instant) {
        let expired = self
            .status
            .as_ref()
            .and_then(|status| status.expires_at)
            .is_some_and(|deadline| now >= deadline);
        if expired {
            self.status = None;
        }
    }

    fn info(&mut self, text: impl Into<String>) {
        self.status = Some(Status {
            text: text.into(),
            is_error: false,
            expires_at: None,
        });
    }

    fn reveal(&mut self, text: String) {
        self.status = Some(Status {
            text,
            is_error: false,
            expires_at: Some(Instant::now() + REVEAL_TIMEOUT),
        });
    }

    fn error(&mut self, text: impl Into<String>) {
        self.status = Some(Status {
            text: text.into(),
            is_error: true,
            expires_at: None,
        });
    }

    fn render(&mut self, frame: &mut Frame, labels: &[String]) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let header = Paragraph::new(Line::from(vec![
            Span::styled(
                "Keysafe",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("  {} entries", labels.len())),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded),
        );
        frame.render_widget(header, chunks[0]);

        match &self.mode {
            Mode::Form(form) => frame.render_widget(form.widget(), chunks[1]),
            Mode::Browse => {
                let items: Vec<ListItem> = labels
                    .iter()
                    .map(|label| ListItem::new(label.as_str()))
                    .collect();
                let body = List::new(items)
                    .block(Block::default().borders(Borders::ALL).title("Entries"))
                    .highlight_style(
                        Style::default()
                            .fg(Color::Black)
                            .bg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    )
                    .highlight_symbol("> ");
                frame.render_stateful_widget(body, chunks[1], &mut self.list);
            }
        }

        let footer = match (&self.status, &self.mode) {
            (Some(status), _) => Line::from(Span::styled(
                status.text.clone(),
                Style::default().fg(if status.is_error {
                    Color::Red
                } else {
                    Color::Green
                }),
            )),
            (None, Mode::Form(_)) => controls(&[
                ("Tab", "next field"),
                ("Enter", "save"),
                ("Esc", "cancel"),
            ]),
            (None, Mode::Browse) => controls(&[
                ("a", "add"),
                ("e", "edit"),
                ("d", "delete"),
                ("u", "username"),
                ("p", "password"),
                ("q", "quit"),
            ]),
        };
        let footer = Paragraph::new(footer)
            .block(Block::default().borders(Borders::ALL).title("Controls"));
        frame.render_widget(footer, chunks[2]);
    }
}

fn controls(keys: &[(&'static str, &'static str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (key, label) in keys {
        spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
        spans.push(Span::raw(format!(" {label}  ")));
    }
    Line::from(spans)
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        // Enter alternate screen to avoid polluting the shell buffer.
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }

    fn terminal(&self) -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
        let backend = CrosstermBackend::new(io::stdout());
        Ok(Terminal::new(backend)?)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Best-effort cleanup; errors are logged but not propagated from Drop.
        if let Err(err) = disable_raw_mode() {
            eprintln!("failed to disable raw mode: {err}");
        }
        if let Err(err) = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture) {
            eprintln!("failed to restore terminal: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use keysafe_core::{book::CorruptPolicy, storage::InMemoryCredentialStore};

    use super::*;

    async fn book_with(
        records: &[(&str, &str, &str)],
    ) -> CredentialBook<InMemoryCredentialStore> {
        let mut book = CredentialBook::open(InMemoryCredentialStore::new(), CorruptPolicy::Fail)
            .await
            .expect("open");
        for (app, user, pass) in records {
            book.add(CredentialRecord::new(*app, *user, *pass))
                .await
                .expect("add");
        }
        book
    }

    fn type_text(app: &mut App, book: &CredentialBook<InMemoryCredentialStore>, text: &str) {
        for c in text.chars() {
            assert_eq!(app.handle_key(KeyCode::Char(c), book), Action::None);
        }
    }

    #[tokio::test]
    async fn add_form_produces_record() {
        let book = book_with(&[]).await;
        let mut app = App::new(0);

        assert_eq!(app.handle_key(KeyCode::Char('a'), &book), Action::None);
        type_text(&mut app, &book, "Email");
        app.handle_key(KeyCode::Tab, &book);
        type_text(&mut app, &book, "alice");
        app.handle_key(KeyCode::Tab, &book);
        type_text(&mut app, &book, "p@ss1");

        let action = app.handle_key(KeyCode::Enter, &book);
        assert_eq!(action, Action::Add(CredentialRecord::new("Email", "alice", "p@ss1")));
        assert!(matches!(app.mode, Mode::Browse));
    }

    #[tokio::test]
    async fn edit_form_is_prefilled() {
        let book = book_with(&[("Email", "alice", "p@ss1"), ("Bank", "bob", "x")]).await;
        let mut app = App::new(2);

        app.handle_key(KeyCode::Down, &book);
        app.handle_key(KeyCode::Char('e'), &book);
        app.handle_key(KeyCode::Tab, &book);
        app.handle_key(KeyCode::Tab, &book);
        app.handle_key(KeyCode::Backspace, &book);
        type_text(&mut app, &book, "y");

        let action = app.handle_key(KeyCode::Enter, &book);
        assert_eq!(action, Action::Edit(1, CredentialRecord::new("Bank", "bob", "y")));
    }

    #[tokio::test]
    async fn delete_without_selection_shows_error() {
        let book = book_with(&[]).await;
        let mut app = App::new(0);

        assert_eq!(app.handle_key(KeyCode::Char('d'), &book), Action::None);
        let status = app.status.as_ref().expect("status");
        assert!(status.is_error);
        assert_eq!(status.text, "Select an entry to delete first.");
    }

    #[tokio::test]
    async fn delete_targets_selected_entry() {
        let book = book_with(&[("a", "1", "x"), ("b", "2", "y"), ("c", "3", "z")]).await;
        let mut app = App::new(3);

        app.handle_key(KeyCode::Down, &book);
        app.handle_key(KeyCode::Down, &book);
        app.handle_key(KeyCode::Down, &book);
        assert_eq!(app.handle_key(KeyCode::Char('d'), &book), Action::Delete(2));
    }

    #[tokio::test]
    async fn reveal_shows_selected_password() {
        let book = book_with(&[("Email", "alice", "p@ss1")]).await;
        let mut app = App::new(1);

        app.handle_key(KeyCode::Char('p'), &book);
        assert_eq!(app.status.as_ref().map(|s| s.text.as_str()), Some("Password: p@ss1"));
        app.handle_key(KeyCode::Char('u'), &book);
        assert_eq!(app.status.as_ref().map(|s| s.text.as_str()), Some("Username: alice"));
    }

    #[tokio::test]
    async fn next_key_hides_revealed_password() {
        let book = book_with(&[("Email", "alice", "p@ss1")]).await;
        let mut app = App::new(1);

        app.handle_key(KeyCode::Char('p'), &book);
        assert!(app.status.is_some());
        assert_eq!(app.handle_key(KeyCode::Char('x'), &book), Action::None);
        assert!(app.status.is_none(), "password must not stay on screen");
    }

    #[tokio::test]
    async fn revealed_password_expires() {
        let book = book_with(&[("Email", "alice", "p@ss1")]).await;
        let mut app = App::new(1);

        app.handle_key(KeyCode::Char('p'), &book);
        app.tick(Instant::now());
        assert!(app.status.is_some(), "still within the reveal window");

        app.tick(Instant::now() + REVEAL_TIMEOUT + Duration::from_secs(1));
        assert!(app.status.is_none());
    }

    #[test]
    fn plain_status_does_not_expire() {
        let mut app = App::new(0);
        app.info("Entry added.");
        app.tick(Instant::now() + REVEAL_TIMEOUT * 10);
        assert!(app.status.is_some());
    }

    #[tokio::test]
    async fn escape_in_form_cancels_without_action() {
        let book = book_with(&[]).await;
        let mut app = App::new(0);

        app.handle_key(KeyCode::Char('a'), &book);
        type_text(&mut app, &book, "q");
        assert_eq!(app.handle_key(KeyCode::Esc, &book), Action::None);
        assert!(matches!(app.mode, Mode::Browse));
        assert_eq!(app.handle_key(KeyCode::Char('q'), &book), Action::Quit);
    }

    #[test]
    fn selection_clamps_after_delete_of_last_row() {
        let mut app = App::new(2);
        app.list.select(Some(1));
        app.after_change::<String>(Ok(None), 1, "Entry deleted.");
        assert_eq!(app.list.selected(), Some(0));

        app.after_change::<String>(Ok(None), 0, "Entry deleted.");
        assert_eq!(app.list.selected(), None);
    }
}
