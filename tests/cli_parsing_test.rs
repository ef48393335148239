use clap::{CommandFactory, Parser};
use demand_corpus::cli::{Cli, Commands, JobCommands};

#[test]
fn test_command_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn test_grow_parses_categories_and_limits() {
    let cli = Cli::try_parse_from(["demand-corpus", "grow", "razors", "blades", "--valid", "800", "-m", "6"]).unwrap();

    match cli.command {
        Commands::Grow {
            target,
            valid,
            max_attempts,
        } => {
            assert_eq!(target.categories, ["razors", "blades"]);
            assert!(!target.all);
            assert_eq!(valid, Some(800));
            assert_eq!(max_attempts, Some(6));
        }
        other => panic!("Expected grow, got {other:?}"),
    }
}

#[test]
fn test_all_conflicts_with_explicit_categories() {
    let result = Cli::try_parse_from(["demand-corpus", "validate", "razors", "--all"]);
    assert!(result.is_err());

    let cli = Cli::try_parse_from(["demand-corpus", "validate", "--all"]).unwrap();
    assert!(matches!(cli.command, Commands::Validate { target } if target.all));
}

#[test]
fn test_certify_defaults() {
    let cli = Cli::try_parse_from(["demand-corpus", "certify", "razors", "--json"]).unwrap();
    assert!(cli.json);

    match cli.command {
        Commands::Certify {
            tier, policy, dry_run, ..
        } => {
            assert_eq!(tier, "full");
            assert_eq!(policy, "standard");
            assert!(!dry_run);
        }
        other => panic!("Expected certify, got {other:?}"),
    }
}

#[test]
fn test_job_commands() {
    let cli = Cli::try_parse_from([
        "demand-corpus",
        "-c",
        "corpus.yaml",
        "job",
        "list",
        "--category",
        "razors",
        "-s",
        "running",
    ])
    .unwrap();
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("corpus.yaml")));

    match cli.command {
        Commands::Job(JobCommands::List {
            category,
            status,
            kind,
            limit,
        }) => {
            assert_eq!(category.as_deref(), Some("razors"));
            assert_eq!(status.as_deref(), Some("running"));
            assert!(kind.is_none());
            assert_eq!(limit, 50);
        }
        other => panic!("Expected job list, got {other:?}"),
    }

    let cli = Cli::try_parse_from(["demand-corpus", "job", "stop", "3f2a"]).unwrap();
    assert!(matches!(cli.command, Commands::Job(JobCommands::Stop { id }) if id == "3f2a"));
}
