//! End-to-end tests against the real `hclint-ruleset-testing` binary.

use hclint_core::helper::{assert_issues, test_runner_with_config};
use hclint_core::{Config, RuleSetHandle};
use hclint_plugin::protocol::{MAGIC_COOKIE_KEY, NOT_A_COMMAND};
use hclint_plugin::{binary_name, find_plugin, start_plugins, ClientOptions, PluginClient};
use std::path::PathBuf;
use std::process::Command;

const MAIN: &str = r#"variable "instance_type" {
  default = "t2.micro"
}

variable "password" {}

resource "aws_instance" "web" {
  instance_type = var.instance_type
}
"#;

fn plugin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_hclint-ruleset-testing"))
}

fn start() -> PluginClient {
    PluginClient::start("testing", &plugin_path(), ClientOptions::default()).unwrap()
}

#[test]
fn test_refuses_to_run_by_hand() {
    let output = Command::new(plugin_path())
        .env_remove(MAGIC_COOKIE_KEY)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), NOT_A_COMMAND);
}

#[test]
fn test_handshake_and_metadata() {
    let client = start();
    assert_eq!(client.get_name().unwrap(), "testing");
    assert_eq!(
        client.get_rule_names().unwrap(),
        vec![
            "testing_instance_type",
            "testing_forbidden_variables",
            "testing_always_fails"
        ]
    );
    client.verify().unwrap();
}

#[test]
fn test_check_over_process_boundary() {
    let source = r#"
rule "testing_forbidden_variables" {
  enabled = true
  names   = ["password"]
}

plugin "testing" {
  enabled        = true
  module_summary = true
}
"#;
    let config = Config::parse(".hclint.hcl", source).unwrap();
    let mut client = start();
    client.configure(&config).unwrap();

    let runner = test_runner_with_config(&[("main.tf", MAIN)], config).unwrap();
    RuleSetHandle::check(&mut client, &runner).unwrap();
    assert_issues(
        &runner.issues(),
        &[
            ("testing_instance_type", "instance type is t2.micro", "main.tf:8,19-36"),
            ("testing_forbidden_variables", "variable \"password\" is forbidden", "main.tf:5,1-20"),
            ("testing_module_summary", "module has 1 file(s)", ""),
        ],
    );
}

#[test]
fn test_failing_rule_over_process_boundary() {
    let config = Config {
        only: vec!["testing_always_fails".to_string()],
        ..Config::default()
    };
    let mut client = start();
    client.configure(&config).unwrap();
    let runner = test_runner_with_config(&[("main.tf", MAIN)], config).unwrap();
    let err = RuleSetHandle::check(&mut client, &runner).unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to check \"testing_always_fails\" rule: this rule always fails"
    );
    client.close();
}

#[test]
fn test_discovery_starts_enabled_plugin() {
    let tmp = tempfile::tempdir().unwrap();
    let installed = tmp.path().join(binary_name("testing"));
    std::fs::copy(plugin_path(), &installed).unwrap();
    assert_eq!(find_plugin(tmp.path(), "testing").unwrap(), installed);

    let config = Config::parse(".hclint.hcl", "plugin \"testing\" {\n  enabled = true\n}\n").unwrap();
    let mut clients = start_plugins(&config, tmp.path(), &ClientOptions::default()).unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(RuleSetHandle::name(&clients[0]), "testing");
    assert_eq!(clients[0].rule_names().unwrap().len(), 3);
}
