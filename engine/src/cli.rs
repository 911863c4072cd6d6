//! CLI interface for Arbor
//!
//! Defines the commands and global flags using clap's derive API. Each
//! command is a thin call into the engine; see `handlers`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Arbor design-component governance engine
///
/// Moves components through nursery, workshop, canopy and stable under
/// multi-agent review, with an append-only audit trail.
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show every component grouped by zone
    Status,

    /// Create a component in the nursery
    Create {
        /// Component name
        name: String,

        #[arg(short, long, default_value = "")]
        category: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Promote a component to the next zone (requires a passing review)
    Promote {
        /// Component id or name
        component: String,
    },

    /// Move a component into the seed vault
    Archive {
        /// Component id or name
        component: String,

        /// Why the component is archived (kept in the decision ledger)
        #[arg(short, long)]
        reason: String,
    },

    /// Revive an archived component as a new nursery component
    Revive {
        /// Id of the archived component
        id: u64,
    },

    /// Override a failing review for a component's current zone
    Shield {
        /// Component id or name
        component: String,

        /// Who is taking responsibility for the override
        #[arg(long)]
        actor: String,

        #[arg(short, long)]
        reason: String,
    },

    /// Run a review cycle
    Review {
        /// Component id or name
        component: String,

        /// Run only this reviewer (ts, ag, pl, ca, px)
        #[arg(short, long)]
        agent: Option<String>,

        /// Review against this zone instead of the current one
        #[arg(short, long)]
        zone: Option<String>,
    },

    /// Show recent decisions
    Decisions {
        /// Only decisions for this component id
        #[arg(long)]
        component: Option<u64>,

        /// Number of decisions to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the change chain for a workspace file
    Trace {
        /// Workspace-relative file path
        file: String,
    },

    /// Send one message to the conversational assistant
    Chat {
        /// The message
        message: String,

        /// Continue this session
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["arbor", "status"]);
        assert!(matches!(cli.command, Command::Status));
        assert!(!cli.json);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["arbor", "--json", "--log", "debug", "status"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));

        let cli = Cli::parse_from(["arbor", "status", "--config", "/tmp/arbor.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/arbor.toml")));
    }

    #[test]
    fn test_create_command() {
        let cli = Cli::parse_from([
            "arbor",
            "create",
            "Toggle",
            "--category",
            "input",
            "--description",
            "Binary switch",
        ]);
        if let Command::Create {
            name,
            category,
            description,
        } = cli.command
        {
            assert_eq!(name, "Toggle");
            assert_eq!(category, "input");
            assert_eq!(description, "Binary switch");
        } else {
            panic!("Expected Create command");
        }
    }

    #[test]
    fn test_archive_requires_reason() {
        assert!(Cli::try_parse_from(["arbor", "archive", "3"]).is_err());
        let cli = Cli::parse_from(["arbor", "archive", "3", "--reason", "superseded"]);
        assert!(matches!(cli.command, Command::Archive { .. }));
    }

    #[test]
    fn test_review_command() {
        let cli = Cli::parse_from(["arbor", "review", "toggle", "--agent", "ag", "--zone", "canopy"]);
        if let Command::Review {
            component,
            agent,
            zone,
        } = cli.command
        {
            assert_eq!(component, "toggle");
            assert_eq!(agent.as_deref(), Some("ag"));
            assert_eq!(zone.as_deref(), Some("canopy"));
        } else {
            panic!("Expected Review command");
        }
    }

    #[test]
    fn test_decisions_defaults() {
        let cli = Cli::parse_from(["arbor", "decisions"]);
        if let Command::Decisions { component, limit } = cli.command {
            assert_eq!(component, None);
            assert_eq!(limit, 10);
        } else {
            panic!("Expected Decisions command");
        }
    }

    #[test]
    fn test_chat_command() {
        let cli = Cli::parse_from(["arbor", "chat", "what is in canopy?", "-s", "abc"]);
        if let Command::Chat { message, session } = cli.command {
            assert_eq!(message, "what is in canopy?");
            assert_eq!(session, Some("abc".to_string()));
        } else {
            panic!("Expected Chat command");
        }
    }
}
