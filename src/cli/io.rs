//! JSON output for the CLI
//!
//! One JSON object per invocation on stdout, UTF-8:
//! `{"status":"ok","data":...}` or `{"status":"error","code":...,"message":...}`.

use std::io::{self, Write};

use serde_json::{json, Value};

use super::errors::CliResult;

/// Render a success envelope
pub fn ok_envelope(data: Value) -> Value {
    json!({
        "status": "ok",
        "data": data
    })
}

/// Render an error envelope
pub fn error_envelope(code: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_json(&ok_envelope(data))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_json(&error_envelope(code, message))
}

fn write_json(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope() {
        let v = ok_envelope(json!({"principal": "uid:alice"}));
        assert_eq!(v["status"], "ok");
        assert_eq!(v["data"]["principal"], "uid:alice");
    }

    #[test]
    fn test_error_envelope() {
        let v = error_envelope("AERO_GRANT_FIELD_OVERFLOW", "too long");
        assert_eq!(v["status"], "error");
        assert_eq!(v["code"], "AERO_GRANT_FIELD_OVERFLOW");
        assert_eq!(v["message"], "too long");
        assert!(v.get("data").is_none());
    }
}
