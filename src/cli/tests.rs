//! Tests for argument parsing, configuration building and the subcommands'
//! `run` paths against the in-memory data API.

use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use super::common::{ControlArgs, Environment, parse_record};
use super::{Cli, Commands};
use crate::metadata::LinkShape;
use crate::test_utils::{InMemoryDataApi, StoreFixture, ids};

fn env() -> (Arc<InMemoryDataApi>, Environment) {
    let api = Arc::new(StoreFixture::sample().build());
    let env = Environment::new(api.clone(), 10);
    (api, env)
}

fn parse(args: &[&str]) -> Commands {
    Cli::try_parse_from(args).unwrap().command
}

#[test]
fn test_global_flags() {
    let cli = Cli::try_parse_from(["polylookup", "--verbose", "fields", "--template", "x"]).unwrap();
    assert_eq!(cli.build_config().log_level.as_deref(), Some("debug"));

    let cli = Cli::try_parse_from(["polylookup", "fields", "-q", "--template", "x"]).unwrap();
    assert_eq!(cli.build_config().log_level, None);

    let cli = Cli::try_parse_from(["polylookup", "-c", "/tmp/p.toml", "fields"]).unwrap();
    let config = cli.build_config();
    assert_eq!(config.log_level.as_deref(), Some("info"));
    assert_eq!(config.config_path.unwrap().to_str(), Some("/tmp/p.toml"));

    assert!(Cli::try_parse_from(["polylookup", "-v", "-q", "fields"]).is_err());
}

#[test]
fn test_shape_flag() {
    let Commands::List(cmd) = parse(&[
        "polylookup",
        "list",
        "-e",
        "account",
        "-r",
        "account_connections1",
        "--link-relationship",
        "contact_connections2",
        "--shape",
        "Connection",
    ]) else {
        panic!("expected list");
    };
    assert_eq!(cmd.control.shape, Some(LinkShape::Connection));

    assert!(Cli::try_parse_from(["polylookup", "list", "--shape", "polymorphic"]).is_err());
}

#[tokio::test]
async fn test_control_file_is_overridden_by_flags() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("control.toml");
    std::fs::write(&path, "entity = \"account\"\nrelationship = \"account_contacts\"\npage_size = 5\n").unwrap();

    let args = ControlArgs {
        control: Some(path),
        page_size: Some(3),
        search_columns: vec!["emailaddress1".to_string()],
        ..ControlArgs::default()
    };
    let config = args.to_control_config().await.unwrap();
    assert_eq!(config.relationship, "account_contacts");
    assert_eq!(config.page_size, Some(3));
    assert_eq!(config.search_columns, vec!["emailaddress1"]);
}

#[tokio::test]
async fn test_missing_control_is_reported() {
    let err = ControlArgs::default().to_control_config().await.unwrap_err();
    assert!(err.to_string().contains("No control given"));

    let args = ControlArgs {
        entity: Some("account".to_string()),
        ..ControlArgs::default()
    };
    assert!(args.to_control_config().await.is_err());
}

#[test]
fn test_parse_record() {
    let record = parse_record(Some(r#"{"parentcustomerid": {"id": "a1"}}"#)).unwrap();
    assert_eq!(record.get("parentcustomerid"), Some(&json!({"id": "a1"})));
    assert!(parse_record(Some("[1, 2]")).is_err());
    assert!(parse_record(None).unwrap().values().is_empty());
}

#[tokio::test]
async fn test_resolve_run() {
    let (_, env) = env();
    let Commands::Resolve(cmd) =
        parse(&["polylookup", "resolve", "--entity", "account", "--relationship", "account_contacts"])
    else {
        panic!("expected resolve");
    };
    let value = cmd.run(&env).await.unwrap();
    assert_eq!(value["target_entity"]["logical_name"], "contact");
    assert_eq!(value["shape"]["kind"], "many-to-many");
}

#[tokio::test]
async fn test_associate_list_disassociate_run() {
    let (api, env) = env();
    let control = ["--entity", "account", "--relationship", "account_contacts"];

    let mut args = vec!["polylookup", "associate"];
    args.extend(control);
    args.extend(["--id", ids::ACCOUNT, "--target", ids::CONTACT_BOB]);
    let Commands::Associate(cmd) = parse(&args) else {
        panic!("expected associate");
    };
    let value = cmd.run(&env).await.unwrap();
    assert_eq!(value["link_row_id"], serde_json::Value::Null);

    let mut args = vec!["polylookup", "list"];
    args.extend(control);
    args.extend(["--id", ids::ACCOUNT]);
    let Commands::List(cmd) = parse(&args) else {
        panic!("expected list");
    };
    let listed = cmd.run(&env).await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["target_display_name"], "Bob Baker");

    let mut args = vec!["polylookup", "disassociate"];
    args.extend(control);
    args.extend(["--id", ids::ACCOUNT, "--link", ids::CONTACT_BOB]);
    let Commands::Disassociate(cmd) = parse(&args) else {
        panic!("expected disassociate");
    };
    cmd.run(&env).await.unwrap();
    assert_eq!(api.calls("disassociate"), 1);
}

#[tokio::test]
async fn test_search_run_pages() {
    let api = Arc::new(StoreFixture::sample().with_generated_contacts(5).build());
    let env = Environment::new(api, 10);
    let Commands::Search(cmd) = parse(&[
        "polylookup",
        "search",
        "-e",
        "account",
        "-r",
        "account_contacts",
        "--page-size",
        "2",
    ]) else {
        panic!("expected search");
    };
    assert_eq!(cmd.text, "");
    let page = cmd.run(&env).await.unwrap();
    assert_eq!(page["records"].as_array().unwrap().len(), 2);
    assert_eq!(page["has_more"], true);
}

#[tokio::test]
async fn test_fields_run() {
    let (_, env) = env();
    let Commands::Fields(cmd) =
        parse(&["polylookup", "fields", "--template", "{{ a.id }} {{ b }} {{ a.name }}"])
    else {
        panic!("expected fields");
    };
    assert_eq!(cmd.run(&env).await.unwrap(), json!(["a", "b"]));

    let Commands::Fields(cmd) = parse(&[
        "polylookup",
        "fields",
        "-e",
        "account",
        "-r",
        "account_contacts",
        "--view",
        "Contacts by Parent",
    ]) else {
        panic!("expected fields");
    };
    assert_eq!(cmd.run(&env).await.unwrap(), json!(["parentcustomerid"]));

    let Commands::Fields(cmd) = parse(&["polylookup", "fields"]) else {
        panic!("expected fields");
    };
    assert!(cmd.run(&env).await.is_err());
}
