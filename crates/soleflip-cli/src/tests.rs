use super::*;
use soleflip_core::{RecordSchema, RecordStatus};

use crate::import::RunArgs;
use crate::token::CredentialName;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["soleflip", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["soleflip"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn import_csv_with_schema_and_delimiter() {
    let cli = Cli::try_parse_from([
        "soleflip",
        "import",
        "csv",
        "sales.csv",
        "--schema",
        "stockx-export",
        "--delimiter",
        ";",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Import {
            command: ImportCommands::Csv {
                schema: RecordSchema::StockxExport,
                delimiter: Some(';'),
                run: RunArgs {
                    dry_run: false,
                    retry_of: None
                },
                ..
            }
        })
    ));
}

#[test]
fn import_xlsx_takes_a_schema_and_dry_run() {
    let cli = Cli::try_parse_from([
        "soleflip",
        "import",
        "xlsx",
        "sales.xlsx",
        "--schema",
        "manual-sales",
        "--dry-run",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Import {
            command: ImportCommands::Xlsx {
                schema: RecordSchema::ManualSales,
                run: RunArgs { dry_run: true, .. },
                ..
            }
        })
    ));
}

#[test]
fn import_csv_requires_schema() {
    assert!(Cli::try_parse_from(["soleflip", "import", "csv", "sales.csv"]).is_err());
}

#[test]
fn import_rejects_unknown_schema() {
    let result = Cli::try_parse_from([
        "soleflip", "import", "csv", "sales.csv", "--schema", "ebay-export",
    ]);
    assert!(result.is_err());
}

#[test]
fn import_json_with_retry_of_and_dry_run() {
    let previous = "6f1c2a8e-1d5b-4c1e-9f0a-3b2c1d4e5f60";
    let cli = Cli::try_parse_from([
        "soleflip",
        "import",
        "json",
        "notion.json",
        "--schema",
        "notion-export",
        "--array-field",
        "pages",
        "--flatten",
        "--dry-run",
        "--retry-of",
        previous,
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Import {
            command:
                ImportCommands::Json {
                    schema,
                    array_field,
                    flatten,
                    run,
                    ..
                },
        }) => {
            assert_eq!(schema, RecordSchema::NotionExport);
            assert_eq!(array_field.as_deref(), Some("pages"));
            assert!(flatten);
            assert!(run.dry_run);
            assert_eq!(run.retry_of.map(|id| id.to_string()).as_deref(), Some(previous));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn sync_orders_parses_dates() {
    let cli = Cli::try_parse_from([
        "soleflip",
        "sync",
        "orders",
        "--from",
        "2025-01-01",
        "--to",
        "2025-03-31",
        "--status",
        "COMPLETED",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Sync {
            command: SyncCommands::Orders { from, to, status, .. },
        }) => {
            assert_eq!(from, chrono::NaiveDate::from_ymd_opt(2025, 1, 1));
            assert_eq!(to, chrono::NaiveDate::from_ymd_opt(2025, 3, 31));
            assert_eq!(status.as_deref(), Some("COMPLETED"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn sync_orders_rejects_malformed_date() {
    let result = Cli::try_parse_from(["soleflip", "sync", "orders", "--from", "14.03.2025"]);
    assert!(result.is_err());
}

#[test]
fn batch_list_defaults_limit() {
    let cli = Cli::try_parse_from(["soleflip", "batch", "list"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Batch {
            command: BatchCommands::List { limit: 20 }
        })
    ));
}

#[test]
fn batch_records_filters_by_status() {
    let cli = Cli::try_parse_from([
        "soleflip",
        "batch",
        "records",
        "6f1c2a8e-1d5b-4c1e-9f0a-3b2c1d4e5f60",
        "--status",
        "invalid",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Batch {
            command: BatchCommands::Records {
                status: Some(RecordStatus::Invalid),
                limit: 50,
                ..
            }
        })
    ));
}

#[test]
fn batch_status_requires_a_uuid() {
    assert!(Cli::try_parse_from(["soleflip", "batch", "status", "latest"]).is_err());
}

#[test]
fn token_check_parses() {
    let cli = Cli::try_parse_from(["soleflip", "token", "check"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Token {
            command: TokenCommands::Check
        })
    ));
}

#[test]
fn token_set_parses_credential_name_and_optional_value() {
    let cli = Cli::try_parse_from(["soleflip", "token", "set", "client-secret", "s3cret"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Token {
            command: TokenCommands::Set {
                name: CredentialName::ClientSecret,
                value: Some(_),
            }
        })
    ));

    let cli = Cli::try_parse_from(["soleflip", "token", "set", "refresh-token"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Token {
            command: TokenCommands::Set { value: None, .. }
        })
    ));
    assert!(Cli::try_parse_from(["soleflip", "token", "set", "password"]).is_err());
}
