use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use anyhow::Result;
use assert_cmd::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        Ok(Self { dir: tempdir()? })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn database(&self) -> PathBuf {
        self.path().join("data").join("bakery.db")
    }

    fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    fn bakery(&self, args: &[&str]) -> Command {
        let binary = assert_cmd::cargo::cargo_bin!("bakery");
        let mut cmd = Command::new(binary);
        cmd.current_dir(self.path())
            .env_remove("RUST_LOG")
            .env("BAKERY__DATABASE__PATH", self.database())
            .arg("--config")
            .arg(self.path())
            .args(args);
        cmd
    }

    fn submit(&self, date: &str, entries: &str) -> Result<String> {
        let file = self.write(&format!("entries-{date}.json"), entries)?;
        let output = self
            .bakery(&["submit", "--date", date, "--file", file.to_str().unwrap()])
            .output()?;
        assert!(output.status.success(), "submit failed: {output:?}");
        Ok(String::from_utf8(output.stdout)?)
    }

    fn summary(&self, date: &str) -> Result<Vec<Value>> {
        let output = self
            .bakery(&["summary", "--date", date, "--json"])
            .output()?;
        assert!(output.status.success(), "summary failed: {output:?}");
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.bakery(args).output()?;
        assert!(output.status.success(), "{args:?} failed: {output:?}");
        Ok(String::from_utf8(output.stdout)?)
    }
}

fn amount(row: &Value, field: &str) -> Decimal {
    let raw = row[field].as_str().unwrap_or_else(|| panic!("{field} missing"));
    Decimal::from_str(raw).unwrap()
}

#[test]
fn submissions_chain_dues_and_cascade_corrections() -> Result<()> {
    let ws = Workspace::new()?;
    ws.bakery(&["salesman", "add", "s-1", "Ana"]).assert().success();

    ws.submit(
        "2024-01-01",
        r#"[{"salesmanId":"s-1","categories":[{"name":"bread","total":10}],"deposit":0}]"#,
    )?;
    ws.submit(
        "2024-01-02",
        r#"[{"salesmanId":"s-1","categories":[{"name":"bread","total":"20"}],"deposit":5}]"#,
    )?;

    let day = ws.summary("2024-01-02")?;
    assert_eq!(day.len(), 1);
    assert_eq!(day[0]["name"], "Ana");
    assert_eq!(amount(&day[0], "prevDue"), Decimal::from(10));
    assert_eq!(amount(&day[0], "currDue"), Decimal::from(25));

    let output = ws.submit(
        "2024-01-01",
        r#"[{"salesmanId":"s-1","categories":[{"name":"bread","total":40}],"deposit":0}]"#,
    )?;
    assert!(output.contains("removed 1 records"));
    assert!(output.contains("cascade s-1@2024-01-01"));

    let day = ws.summary("2024-01-02")?;
    assert_eq!(amount(&day[0], "prevDue"), Decimal::from(40));
    assert_eq!(amount(&day[0], "currDue"), Decimal::from(55));

    let idle = ws.summary("2024-01-05")?;
    assert_eq!(idle[0]["hasRecord"], false);
    assert_eq!(amount(&idle[0], "currDue"), Decimal::from(55));
    Ok(())
}

#[test]
fn recalc_reports_and_rejects_blank_salesman() -> Result<()> {
    let ws = Workspace::new()?;
    ws.submit(
        "2024-02-01",
        r#"[{"salesmanId":"s-7","categories":[{"name":"cake","total":12.5}],"deposit":2}]"#,
    )?;

    let output = ws.stdout(&["recalc", "--salesman", "s-7", "--date", "2024-01-31"])?;
    assert!(output.contains("no earlier record"));
    assert!(output.contains("closing due 10.5"));

    // Unlisted salesmen still show up with their carried due.
    let day = ws.summary("2024-02-02")?;
    assert_eq!(day.len(), 1);
    assert_eq!(day[0]["salesmanId"], "s-7");
    assert_eq!(amount(&day[0], "currDue"), Decimal::from_str("10.5")?);

    ws.bakery(&["recalc", "--salesman", " ", "--date", "2024-02-01"])
        .assert()
        .failure();
    ws.bakery(&["recalc", "--salesman", "s-7", "--date", "yesterday"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn audit_repairs_imported_legacy_chain() -> Result<()> {
    let ws = Workspace::new()?;
    let legacy = ws.write(
        "legacy.json",
        r#"[
            {"salesman":"s-1","date":"2024-01-01","categories":[{"name":"bread","total":10}],
             "deposit":0,"prevDue":0,"totalAmount":10,"totalDue":10,"currentDue":10},
            {"salesman":"s-1","date":"2024-01-02","categories":[{"name":"bread","total":5}],
             "deposit":0,"prevDue":3,"totalAmount":5,"totalDue":8,"currDue":8}
        ]"#,
    )?;
    let output = ws.stdout(&["import", "--file", legacy.to_str().unwrap()])?;
    assert!(output.contains("imported 2 documents"));

    let output = ws.stdout(&["audit"])?;
    assert!(output.contains("1 breaks"));
    assert!(output.contains("repair anchor: 2024-01-01"));

    let output = ws.stdout(&["audit", "--salesman", "s-1", "--repair"])?;
    assert!(output.contains("cascade s-1@2024-01-01"));

    let output = ws.stdout(&["audit"])?;
    assert!(output.contains("chain consistent"));
    let day = ws.summary("2024-01-02")?;
    assert_eq!(amount(&day[0], "currDue"), Decimal::from(15));
    Ok(())
}

#[test]
fn config_file_selects_database() -> Result<()> {
    let ws = Workspace::new()?;
    ws.write(
        "default.toml",
        "[database]\npath = \"from-file.db\"\n\n[recalc]\nqueue_capacity = 2\n",
    )?;
    let binary = assert_cmd::cargo::cargo_bin!("bakery");
    Command::new(binary)
        .current_dir(ws.path())
        .env_remove("BAKERY__DATABASE__PATH")
        .args(["--config", ".", "salesman", "add", "s-2", "Bo", "--inactive"])
        .assert()
        .success();
    assert!(ws.path().join("from-file.db").exists());

    let output = Command::new(binary)
        .current_dir(ws.path())
        .env_remove("BAKERY__DATABASE__PATH")
        .args(["--config", ".", "salesman", "list"])
        .output()?;
    assert!(String::from_utf8(output.stdout)?.contains("s-2\tBo\tinactive"));
    Ok(())
}
