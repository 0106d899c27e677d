use std::{
    io::{BufRead, Write},
    num::NonZeroUsize,
};

use color_eyre::Result;
use keysafe_core::{
    book::CredentialBook, credentials::CredentialRecord, storage::CredentialStore,
};

use crate::cli::{EntryCommand, Field};

/// Execute an entry subcommand against an opened book.
///
/// `input` is only read when `add` needs a password that was not passed as a flag.
pub async fn handle<S: CredentialStore>(
    cmd: EntryCommand,
    book: &mut CredentialBook<S>,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    match cmd {
        EntryCommand::List => {
            if book.records().is_empty() {
                writeln!(
                    out,
                    "No entries yet. Add one with `keysafe add <app> <username>`."
                )?;
                return Ok(());
            }
            for (number, label) in book.labels().iter().enumerate() {
                writeln!(out, "{}. {label}", number + 1)?;
            }
        }
        EntryCommand::Add {
            app,
            username,
            password,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password(input)?,
            };
            let index = book
                .add(CredentialRecord::new(app, username, password))
                .await?;
            writeln!(out, "Added {}. {}", index + 1, book.labels()[index])?;
        }
        EntryCommand::Edit {
            number,
            app,
            username,
            password,
        } => {
            let index = to_index(number);
            let current = book.get(index)?;
            let updated = CredentialRecord::new(
                app.unwrap_or_else(|| current.app_name().to_string()),
                username.unwrap_or_else(|| current.username().to_string()),
                password.unwrap_or_else(|| current.password().to_string()),
            );
            book.edit(index, updated).await?;
            writeln!(out, "Edited {number}. {}", book.labels()[index])?;
        }
        EntryCommand::Delete { number } => {
            let removed = book.delete(to_index(number)).await?;
            writeln!(out, "Deleted {}", removed.display_line())?;
        }
        EntryCommand::Get { number, field } => {
            let index = to_index(number);
            let value = match field {
                Field::Username => book.username(index)?,
                Field::Password => book.password(index)?,
            };
            write!(out, "{value}")?;
            out.flush()?;
        }
    }

    Ok(())
}

fn to_index(number: NonZeroUsize) -> usize {
    number.get() - 1
}

/// Read a single line from `input`, dropping the trailing newline.
fn read_password(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        color_eyre::eyre::bail!("no password given on stdin");
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::Arc};

    use keysafe_core::{
        book::{BookError, CorruptPolicy},
        storage::InMemoryCredentialStore,
    };

    use super::*;

    fn n(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).expect("non-zero")
    }

    async fn run(
        cmd: EntryCommand,
        book: &mut CredentialBook<Arc<InMemoryCredentialStore>>,
        stdin: &str,
    ) -> Result<String> {
        let mut input = Cursor::new(stdin.as_bytes().to_vec());
        let mut out = Vec::new();
        handle(cmd, book, &mut input, &mut out).await?;
        Ok(String::from_utf8(out).expect("utf8"))
    }

    async fn open(
        store: &Arc<InMemoryCredentialStore>,
    ) -> CredentialBook<Arc<InMemoryCredentialStore>> {
        CredentialBook::open(store.clone(), CorruptPolicy::Fail)
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn list_on_empty_store_hints_at_add() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut book = open(&store).await;
        let out = run(EntryCommand::List, &mut book, "").await.expect("list");
        assert!(out.starts_with("No entries yet."));
    }

    #[tokio::test]
    async fn add_reads_password_from_stdin_and_persists() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut book = open(&store).await;
        let cmd = EntryCommand::Add {
            app: "Email".into(),
            username: "alice".into(),
            password: None,
        };
        let out = run(cmd, &mut book, "p@ss1\n").await.expect("add");
        assert_eq!(out, "Added 1. Email - alice\n");

        let mut reopened = open(&store).await;
        assert_eq!(reopened.password(0), Ok("p@ss1"));
        let out = run(EntryCommand::List, &mut reopened, "").await.expect("list");
        assert_eq!(out, "1. Email - alice\n");
    }

    #[tokio::test]
    async fn add_without_any_password_fails() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut book = open(&store).await;
        let cmd = EntryCommand::Add {
            app: "Email".into(),
            username: "alice".into(),
            password: None,
        };
        assert!(run(cmd, &mut book, "").await.is_err());
        assert!(book.records().is_empty());
    }

    #[tokio::test]
    async fn edit_keeps_unspecified_fields() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut book = open(&store).await;
        book.add(CredentialRecord::new("Email", "alice", "p@ss1"))
            .await
            .expect("add");

        let cmd = EntryCommand::Edit {
            number: n(1),
            app: None,
            username: Some("bob".into()),
            password: None,
        };
        let out = run(cmd, &mut book, "").await.expect("edit");
        assert_eq!(out, "Edited 1. Email - bob\n");
        assert_eq!(book.password(0), Ok("p@ss1"));
    }

    #[tokio::test]
    async fn get_prints_raw_value_without_newline() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut book = open(&store).await;
        book.add(CredentialRecord::new("Email", "alice", "p@ss1"))
            .await
            .expect("add");

        let out = run(
            EntryCommand::Get {
                number: n(1),
                field: Field::Password,
            },
            &mut book,
            "",
        )
        .await
        .expect("get");
        assert_eq!(out, "p@ss1");

        let out = run(
            EntryCommand::Get {
                number: n(1),
                field: Field::Username,
            },
            &mut book,
            "",
        )
        .await
        .expect("get");
        assert_eq!(out, "alice");
    }

    #[tokio::test]
    async fn delete_unknown_entry_reports_selection_error() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut book = open(&store).await;
        let err = run(EntryCommand::Delete { number: n(4) }, &mut book, "")
            .await
            .expect_err("nothing to delete");
        assert_eq!(
            err.downcast_ref::<BookError>(),
            Some(&BookError::NoSuchEntry { index: 3 })
        );
    }

    #[test]
    fn read_password_strips_crlf() {
        let mut input = Cursor::new(b"secret\r\nignored\n".to_vec());
        assert_eq!(read_password(&mut input).expect("read"), "secret");
    }
}
