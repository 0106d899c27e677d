use std::num::NonZeroUsize;

use clap::{Parser, Subcommand, ValueEnum};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "keysafe",
    about = "Keep application credentials in an encrypted local file",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to launching the TUI when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Launch the interactive list (press q or Esc to save and exit).
    Tui,
    #[command(flatten)]
    Entry(EntryCommand),
    /// Print version and exit.
    Version,
    /// Check that the credential store can be encrypted, written and read back.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Commands that operate on the saved entries. Entry numbers start at 1, as
/// printed by `list`.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EntryCommand {
    /// Show every entry as `app - username`.
    List,
    /// Add an entry. The password is read from stdin when `--password` is omitted.
    Add {
        app: String,
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Replace the given fields of an entry, keeping the others.
    Edit {
        number: NonZeroUsize,
        #[arg(long)]
        app: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Remove an entry.
    Delete { number: NonZeroUsize },
    /// Print one field of an entry to stdout, e.g. to pipe into a clipboard tool.
    Get {
        number: NonZeroUsize,
        #[arg(long, value_enum, default_value_t = Field::Password)]
        field: Field,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Password,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).expect("non-zero")
    }

    #[test]
    fn defaults_to_tui_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["keysafe"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_tui_subcommand() {
        let cli = Cli::try_parse_from(["keysafe", "tui"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Tui));
    }

    #[test]
    fn parses_add_with_password_flag() {
        let cli = Cli::try_parse_from(["keysafe", "add", "Email", "alice", "--password", "p@ss1"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Entry(EntryCommand::Add {
                app: "Email".into(),
                username: "alice".into(),
                password: Some("p@ss1".into()),
            }))
        );
    }

    #[test]
    fn parses_edit_with_partial_fields() {
        let cli = Cli::try_parse_from(["keysafe", "edit", "2", "--username", "bob"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Entry(EntryCommand::Edit {
                number: n(2),
                app: None,
                username: Some("bob".into()),
                password: None,
            }))
        );
    }

    #[test]
    fn get_defaults_to_password_field() {
        let cli = Cli::try_parse_from(["keysafe", "get", "1"]).expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Entry(EntryCommand::Get {
                number: n(1),
                field: Field::Password,
            }))
        );

        let cli = Cli::try_parse_from(["keysafe", "get", "1", "--field", "username"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Entry(EntryCommand::Get {
                number: n(1),
                field: Field::Username,
            }))
        );
    }

    #[test]
    fn rejects_entry_number_zero() {
        assert!(Cli::try_parse_from(["keysafe", "delete", "0"]).is_err());
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["keysafe", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["keysafe", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }
}
