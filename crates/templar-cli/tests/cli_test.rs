//! End-to-end tests of the `templar` binary.

mod common;

use std::fs;

use common::{TestContext, LOCAL_CONFIG};
use predicates::prelude::*;
use test_case::test_case;

#[test]
fn test_help_lists_commands() {
    TestContext::new()
        .command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("publish"));
}

#[test]
fn test_no_arguments_prints_usage() {
    TestContext::new()
        .command()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test_case(r#"["a", "b"]"# ; "array")]
#[test_case("not json" ; "invalid json")]
fn test_data_must_be_a_dictionary(data: &str) {
    TestContext::new()
        .command()
        .args(["serve", "--data", data])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--data must be a dictionary"));
}

#[test]
fn test_unknown_run_config_is_reported() {
    let ctx = TestContext::new().with_config(LOCAL_CONFIG);
    ctx.command()
        .args(["publish", "nope", "-t", "template", "-o", "out", "-n"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nope"));
    assert!(!ctx.path().join("out/project").exists());
}

#[test]
fn test_publish_needs_an_output_directory() {
    let ctx = TestContext::new().with_config(LOCAL_CONFIG);
    ctx.command()
        .args(["publish", "-t", "template", "-n"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("--out"));
}

#[test]
fn test_publish_renders_then_updates() {
    let ctx = TestContext::new()
        .with_config(LOCAL_CONFIG)
        .with_template_file("{{ q1 }}.txt.jinja", "{{ q2 }}");
    let rendered = ctx.path().join("out/project/a1.txt");

    ctx.command()
        .args(["publish", "-t", "template", "-o", "out", "-n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published"));
    assert_eq!(fs::read_to_string(&rendered).unwrap(), "1");

    ctx.write_template_file("{{ q1 }}.txt.jinja", "new content {{ q2 }}");
    ctx.command()
        .args(["publish", "-t", "template", "-o", "out", "-n"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&rendered).unwrap(), "new content 1");
}

#[test]
fn test_publish_uses_run_config_out_root() {
    let config = format!("{LOCAL_CONFIG}  release:\n    publish:\n      out_root: published\n");
    let ctx = TestContext::new()
        .with_config(&config)
        .with_template_file("a.txt.jinja", "{{ q1 }}\n");

    ctx.command()
        .args(["publish", "release", "-t", "template", "-n"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(ctx.path().join("published/project/a.txt")).unwrap(),
        "a1\n"
    );
}

const THREE_PROFILES: &str = "\
data:
  default:
    data:
      q1: a1
      q2: 1
    folder_name: default
  one:
    extends: default
    folder_name: out-one
  two:
    extends: default
    folder_name: out-two
run_configs:
  default: {}
  one:
    publish:
      data_name: one
  two:
    publish:
      data_name: two
";

#[test_case(&[], &["out-one", "out-two"], &["default"] ; "default left out")]
#[test_case(&["--include-default"], &["default", "out-one", "out-two"], &[] ; "default included")]
#[test_case(&["--exclude", "one"], &["out-two"], &["default", "out-one"] ; "excluded")]
fn test_publish_all(extra: &[&str], published: &[&str], skipped: &[&str]) {
    let ctx = TestContext::new()
        .with_config(THREE_PROFILES)
        .with_template_file("{{ q1 }}.txt.jinja", "{{ q2 }}");

    ctx.command()
        .args(["publish", "--all", "-t", "template", "-o", "out", "-n"])
        .args(extra)
        .assert()
        .success();

    for folder in published {
        assert_eq!(fs::read_to_string(ctx.path().join("out").join(folder).join("a1.txt")).unwrap(), "1");
    }
    for folder in skipped {
        assert!(!ctx.path().join("out").join(folder).exists(), "{folder} was published");
    }
}
