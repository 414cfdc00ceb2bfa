#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// Direct handle on the workspace database, for seeding rows the IPC surface refuses to write.
pub fn open_workspace_db(workspace: &Path) -> rusqlite::Connection {
    rusqlite::Connection::open(workspace.join("classpoints.sqlite3")).expect("open workspace db")
}

/// A running daemon plus its pipes. Killed on drop.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        Self::spawn_with_env(&[])
    }

    pub fn spawn_with_env(env: &[(&str, &str)]) -> Self {
        let exe = env!("CARGO_BIN_EXE_classpointsd");
        let mut cmd = Command::new(exe);
        cmd.env_remove("CLASSPOINTS_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd.spawn().expect("spawn classpointsd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Full response envelope.
    pub fn request(
        &mut self,
        user: Option<&str>,
        method: &str,
        params: serde_json::Value,
    ) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(u) = user {
            payload["userId"] = json!(u);
        }
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(
        &mut self,
        user: Option<&str>,
        method: &str,
        params: serde_json::Value,
    ) -> serde_json::Value {
        let value = self.request(user, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Error code of a request expected to fail.
    pub fn request_err(
        &mut self,
        user: Option<&str>,
        method: &str,
        params: serde_json::Value,
    ) -> String {
        let value = self.request(user, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"].as_str().unwrap_or("").to_string()
    }

    pub fn select_workspace(&mut self, workspace: &Path) {
        self.request_ok(
            None,
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
    }

    pub fn load_classes(&mut self, user: &str) -> Vec<serde_json::Value> {
        let result = self.request_ok(Some(user), "roster.load", json!({}));
        result["classes"].as_array().cloned().expect("classes array")
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn str_field<'a>(v: &'a serde_json::Value, key: &str) -> &'a str {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
}

/// Class `class_id` from a roster, panicking when absent.
pub fn find_class<'a>(classes: &'a [serde_json::Value], class_id: &str) -> &'a serde_json::Value {
    classes
        .iter()
        .find(|c| c["class_id"] == class_id)
        .unwrap_or_else(|| panic!("class {} not in roster", class_id))
}

pub fn find_student<'a>(students: &'a serde_json::Value, student_id: &str) -> &'a serde_json::Value {
    students
        .as_array()
        .and_then(|arr| arr.iter().find(|s| s["student_id"] == student_id))
        .unwrap_or_else(|| panic!("student {} not in list", student_id))
}
