use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn help_lists_top_level_commands() {
    let mut cmd = Command::cargo_bin("kb").unwrap();
    cmd.arg("--help");
    cmd.assert().success().stdout(contains("draft")).stdout(contains("run")).stdout(contains("kb"));
}

#[test]
fn missing_subcommand_fails() {
    let mut cmd = Command::cargo_bin("kb").unwrap();
    cmd.assert().failure();
}

#[test]
fn draft_requires_tenant_flags() {
    let mut cmd = Command::cargo_bin("kb").unwrap();
    cmd.env_remove("KB_ORG_ID")
        .env_remove("KB_WORKSPACE_ID")
        .env_remove("KB_USER_ID")
        .args(["draft", "create", "docs"]);
    cmd.assert().failure().stderr(contains("org-id"));
}
