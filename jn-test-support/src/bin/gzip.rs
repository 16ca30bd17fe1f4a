//! Fixture gzip compression plugin: role=compression, modes=[read, write],
//! matches [`^gz$`]. Compression stages operate on raw bytes, outside the
//! NDJSON framing the format stage deals in.

use std::io::{Read, Write};

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;

fn metadata() -> serde_json::Value {
    serde_json::json!({
        "name": "jn-fixture-gzip",
        "version": "0.1.0",
        "role": "compression",
        "modes": ["read", "write"],
        "matches": ["^gz$"],
        "config_params": [],
    })
}

fn main() {
    let meta = metadata();
    if jn_test_support::maybe_self_describe(&meta) {
        return;
    }

    let mut input = Vec::new();
    std::io::stdin().read_to_end(&mut input).expect("read stdin");

    let mut output = Vec::new();
    match jn_test_support::mode_arg().as_deref() {
        Some("read") => {
            GzDecoder::new(&input[..]).read_to_end(&mut output).unwrap_or_else(|e| {
                eprintln!("jn-fixture-gzip: decompress failed: {e}");
                std::process::exit(1);
            });
        }
        Some("write") => {
            GzEncoder::new(&input[..], Compression::default())
                .read_to_end(&mut output)
                .unwrap_or_else(|e| {
                    eprintln!("jn-fixture-gzip: compress failed: {e}");
                    std::process::exit(1);
                });
        }
        other => {
            eprintln!("jn-fixture-gzip: unsupported mode {other:?}");
            std::process::exit(2);
        }
    }

    std::io::stdout().write_all(&output).expect("write stdout");
}
