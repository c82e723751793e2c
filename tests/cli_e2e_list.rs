//! End-to-end tests for the `pve-templates list` command.

#[allow(dead_code)]
mod common;
use common::prelude::*;

#[test]
fn test_list_builtin_catalog() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("debian12"))
        .stdout(predicate::str::contains("Ubuntu-24.04"))
        .stdout(predicate::str::contains("9002"))
        .stdout(predicate::str::contains("9102"))
        .stdout(predicate::str::contains("Groups:"));
}

#[test]
fn test_list_with_base() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .args(["list", "--vmid-base", "800"])
        .assert()
        .success()
        .stdout(predicate::str::contains("812"))
        .stdout(predicate::str::contains("912"));
}

#[test]
fn test_list_tree() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .args(["list", "--tree"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("all"))
        .stdout(predicate::str::contains("rocky9 (Rocky-9)"));
}

#[test]
fn test_list_custom_catalog() {
    let fixture = TestFixture::new().with_file(
        "catalog.yaml",
        r#"
distros:
  - id: debian12
    display_name: Debian-12
    offset: 2
    source: https://cloud.debian.org/images/cloud/bookworm/latest/debian-12-genericcloud-amd64.qcow2
  - id: arch
    display_name: Arch-Linux
    offset: 60
    source: https://geo.mirror.pkgbuild.com/images/latest/Arch-Linux-x86_64-cloudimg.qcow2
groups:
  lab: [debian12, arch]
"#,
    );
    fixture
        .command()
        .args(["list", "--catalog", "catalog.yaml", "--vmid-base", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Arch-Linux"))
        .stdout(predicate::str::contains("1060"))
        .stdout(predicate::str::contains("lab"))
        .stdout(predicate::str::contains("ubuntu2404").not());
}

#[test]
fn test_list_rejects_invalid_catalog() {
    let fixture = TestFixture::new().with_file(
        "catalog.yaml",
        r#"
distros:
  - id: one
    display_name: One
    offset: 5
    source: https://example.com/one.qcow2
  - id: two
    display_name: Two
    offset: 5
    source: https://example.com/two.qcow2
"#,
    );
    fixture
        .command()
        .args(["list", "--catalog", "catalog.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Offset 5"));
}
