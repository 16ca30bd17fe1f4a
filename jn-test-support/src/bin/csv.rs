//! Fixture CSV format plugin: role=format, modes=[read, write], matches
//! [`\.csv$`]. Good enough to drive jn-engine integration tests; not a
//! general-purpose CSV implementation (no quoting/escaping support).

use std::io::{BufRead, Write};

fn metadata() -> serde_json::Value {
    serde_json::json!({
        "name": "jn-fixture-csv",
        "version": "0.1.0",
        "role": "format",
        "modes": ["read", "write"],
        "matches": [r"\.csv$"],
        "config_params": [],
    })
}

fn main() {
    let meta = metadata();
    if jn_test_support::maybe_self_describe(&meta) {
        return;
    }

    match jn_test_support::mode_arg().as_deref() {
        Some("read") => read_mode(),
        Some("write") => write_mode(),
        other => {
            eprintln!("jn-fixture-csv: unsupported mode {other:?}");
            std::process::exit(2);
        }
    }
}

fn read_mode() {
    let path = jn_test_support::first_positional().expect("csv read mode requires a source path");
    let file = std::fs::File::open(&path).unwrap_or_else(|e| {
        eprintln!("jn-fixture-csv: cannot open {path}: {e}");
        std::process::exit(1);
    });
    let mut lines = std::io::BufReader::new(file).lines();
    let Some(Ok(header_line)) = lines.next() else {
        return;
    };
    let headers: Vec<String> = header_line.split(',').map(str::to_string).collect();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in lines.map_while(Result::ok) {
        let fields: Vec<&str> = line.split(',').collect();
        let mut record = serde_json::Map::new();
        for (h, v) in headers.iter().zip(fields.iter()) {
            record.insert(h.clone(), serde_json::Value::String(v.to_string()));
        }
        let _ = writeln!(out, "{}", serde_json::Value::Object(record));
    }
}

fn write_mode() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut header_written = false;
    let mut headers: Vec<String> = Vec::new();

    for line in stdin.lock().lines().map_while(Result::ok) {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(serde_json::Value::Object(record)) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        if !header_written {
            headers = record.keys().cloned().collect();
            let _ = writeln!(out, "{}", headers.join(","));
            header_written = true;
        }
        let row: Vec<String> = headers
            .iter()
            .map(|h| record.get(h).map(value_to_cell).unwrap_or_default())
            .collect();
        let _ = writeln!(out, "{}", row.join(","));
    }
}

fn value_to_cell(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
