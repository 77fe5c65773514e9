//! Mock device gateway for integration testing
//!
//! Implements the gateway protocol against an in-memory point table so the
//! CLI can be exercised without a controller on the network.

use clap::Parser;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mock_gateway", about = "In-memory device gateway")]
struct Args {
    /// Initial point value, NAME=VALUE (repeatable)
    #[arg(long = "point", value_parser = parse_pair)]
    points: Vec<(String, String)>,

    /// Mirror writes to INPUT onto OUTPUT, INPUT=OUTPUT (repeatable)
    #[arg(long = "link", value_parser = parse_pair)]
    links: Vec<(String, String)>,

    /// Reject writes to this point (repeatable)
    #[arg(long = "read-only")]
    read_only: Vec<String>,

    /// Hold back the answer to the first read for this many milliseconds
    #[arg(long)]
    delay_first_read_ms: Option<u64>,
}

fn parse_pair(text: &str) -> Result<(String, String), String> {
    text.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", text))
}

fn parse_value(text: &str) -> Value {
    text.parse::<f64>()
        .map(|n| json!(n))
        .unwrap_or_else(|_| json!(text))
}

fn main() {
    let args = Args::parse();
    let mut state = MockState {
        values: args
            .points
            .iter()
            .map(|(k, v)| (k.clone(), parse_value(v)))
            .collect(),
        links: args.links.into_iter().collect(),
        read_only: args.read_only,
        connected: false,
        read_delay: args.delay_first_read_ms.map(Duration::from_millis),
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    loop {
        // Read Content-Length header
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).unwrap_or(0) == 0 {
            break; // EOF
        }

        if !header_line.starts_with("Content-Length:") {
            continue;
        }

        let content_length: usize = header_line
            .trim_start_matches("Content-Length:")
            .trim()
            .parse()
            .unwrap_or(0);

        // Read empty line
        let mut empty_line = String::new();
        reader.read_line(&mut empty_line).ok();

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            break;
        }

        let request: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let seq = request.get("seq").and_then(Value::as_i64).unwrap_or(0);
        let command = request.get("command").and_then(Value::as_str).unwrap_or("");
        let arguments = request.get("arguments").cloned().unwrap_or(Value::Null);

        let response = match state.handle(command, &arguments) {
            Ok(body) => json!({ "request_seq": seq, "success": true, "body": body }),
            Err(message) => json!({ "request_seq": seq, "success": false, "message": message }),
        };
        send_message(&mut writer, &response);

        if command == "disconnect" {
            break;
        }
    }
}

fn send_message<W: Write>(writer: &mut W, message: &Value) {
    let body = message.to_string();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).ok();
    writer.write_all(body.as_bytes()).ok();
    writer.flush().ok();
}

struct MockState {
    values: HashMap<String, Value>,
    links: HashMap<String, String>,
    read_only: Vec<String>,
    connected: bool,
    read_delay: Option<Duration>,
}

impl MockState {
    fn handle(&mut self, command: &str, arguments: &Value) -> Result<Value, String> {
        match command {
            "connect" => {
                self.connected = true;
                Ok(json!({ "deviceName": "mock-controller", "pointCount": self.values.len() }))
            }
            "read" => {
                self.require_connection()?;
                let point = point_argument(arguments)?;
                if let Some(delay) = self.read_delay.take() {
                    std::thread::sleep(delay);
                }
                self.values
                    .get(point)
                    .map(|value| json!({ "value": value }))
                    .ok_or_else(|| format!("unknown point '{}'", point))
            }
            "write" => {
                self.require_connection()?;
                let point = point_argument(arguments)?.to_string();
                if self.read_only.contains(&point) {
                    return Err(format!("write access denied on '{}'", point));
                }
                let value = arguments.get("value").cloned().unwrap_or(Value::Null);
                if let Some(output) = self.links.get(&point) {
                    self.values.insert(output.clone(), value.clone());
                }
                self.values.insert(point, value);
                Ok(Value::Null)
            }
            "disconnect" => {
                self.connected = false;
                Ok(Value::Null)
            }
            other => Err(format!("unsupported command '{}'", other)),
        }
    }

    fn require_connection(&self) -> Result<(), String> {
        if self.connected {
            Ok(())
        } else {
            Err("not connected".to_string())
        }
    }
}

fn point_argument(arguments: &Value) -> Result<&str, String> {
    arguments
        .get("point")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'point' argument".to_string())
}
