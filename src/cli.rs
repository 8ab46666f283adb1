//! CLI argument parsing for the facade-leads binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "facade-leads", about = "Façade renovation leads backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve,
    /// Upload a spreadsheet to a running server and follow the import
    Import {
        /// Excel or CSV file to import
        file: PathBuf,
        /// Base URL of the server
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
        /// Source URL recorded on every contact
        #[arg(long)]
        source_url: Option<String>,
        /// Where to write the JSON report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check connectivity with Brevo, email and Google Sheets, then exit
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["facade-leads"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_command_parses() {
        let cli = Cli::parse_from(["facade-leads", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn test_cli_import_defaults_server() {
        let cli = Cli::parse_from(["facade-leads", "import", "contacts.xlsx"]);
        match cli.command {
            Some(Command::Import { file, server, source_url, report }) => {
                assert_eq!(file, PathBuf::from("contacts.xlsx"));
                assert_eq!(server, "http://localhost:3000");
                assert!(source_url.is_none());
                assert!(report.is_none());
            }
            _ => panic!("expected import command"),
        }
    }

    #[test]
    fn test_cli_import_options_parse() {
        let cli = Cli::parse_from([
            "facade-leads",
            "import",
            "contacts.csv",
            "--server",
            "https://leads.example.fr",
            "--source-url",
            "https://lp.example.fr",
            "--report",
            "out.json",
        ]);
        let Some(Command::Import { server, source_url, report, .. }) = cli.command else {
            panic!("expected import command");
        };
        assert_eq!(server, "https://leads.example.fr");
        assert_eq!(source_url.as_deref(), Some("https://lp.example.fr"));
        assert_eq!(report, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_cli_import_requires_file() {
        assert!(Cli::try_parse_from(["facade-leads", "import"]).is_err());
    }

    #[test]
    fn test_cli_check_command_parses() {
        let cli = Cli::parse_from(["facade-leads", "check"]);
        assert!(matches!(cli.command, Some(Command::Check)));
    }
}
