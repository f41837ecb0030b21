use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use trackport_server::ShutdownReport;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    kind: &'static str,
    peer: String,
    sent: usize,
    reply_size: usize,
    reply: String,
    reply_hex: String,
    closed_by_peer: bool,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
}

/// What a device would have seen after sending a frame.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub bytes: Vec<u8>,
    pub closed_by_peer: bool,
}

impl Reply {
    /// Tag echoed back in an `ACK,<TAG>,<seq>` or `NACK,<TAG>` line.
    pub fn tag(&self) -> Option<&str> {
        let text = std::str::from_utf8(&self.bytes).ok()?;
        text.trim_end().split(',').nth(1)
    }
}

pub fn print_reply(reply: &Reply, peer: SocketAddr, sent: usize, format: OutputFormat) {
    let preview = payload_preview(reply.bytes.trim_ascii_end());
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                kind: "reply",
                peer: peer.to_string(),
                sent,
                reply_size: reply.bytes.len(),
                reply: preview,
                reply_hex: hex::encode(&reply.bytes),
                closed_by_peer: reply.closed_by_peer,
                timestamp: now_unix_seconds(),
                tag: reply.tag(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "SENT", "REPLY", "CLOSED"])
                .add_row(vec![
                    peer.to_string(),
                    sent.to_string(),
                    preview,
                    reply.closed_by_peer.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} sent={} reply={} closed={}",
                peer, sent, preview, reply.closed_by_peer
            );
        }
        OutputFormat::Raw => print_raw(&reply.bytes),
    }
}

#[derive(Serialize)]
struct ListeningOutput {
    kind: &'static str,
    addrs: Vec<String>,
    timestamp: String,
}

pub fn print_listening(addrs: &[SocketAddr], format: OutputFormat) {
    let addrs: Vec<String> = addrs.iter().map(ToString::to_string).collect();
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                kind: "listening",
                addrs,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["LISTENING"]);
            for addr in addrs {
                table.add_row(vec![addr]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("listening on {}", addrs.join(", "));
        }
    }
    let _ = std::io::stdout().flush();
}

#[derive(Serialize)]
struct StoppedOutput {
    kind: &'static str,
    evicted: usize,
    forced: usize,
    final_processed: usize,
    final_failed: usize,
}

pub fn print_stopped(report: &ShutdownReport, format: OutputFormat) {
    let pass = report.final_pass.unwrap_or_default();
    match format {
        OutputFormat::Json => {
            let out = StoppedOutput {
                kind: "stopped",
                evicted: report.evicted,
                forced: report.forced,
                final_processed: pass.processed,
                final_failed: pass.failed,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["EVICTED", "FORCED", "FINAL PARSED", "FINAL FAILED"])
                .add_row(vec![
                    report.evicted.to_string(),
                    report.forced.to_string(),
                    pass.processed.to_string(),
                    pass.failed.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "stopped evicted={} forced={} final_parsed={} final_failed={}",
                report.evicted, report.forced, pass.processed, pass.failed
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_tag_comes_from_ack_line() {
        let ack = Reply {
            bytes: b"ACK,V100,15\r\n".to_vec(),
            closed_by_peer: true,
        };
        assert_eq!(ack.tag(), Some("V100"));

        let nack = Reply {
            bytes: b"NACK,V114\r\n".to_vec(),
            closed_by_peer: false,
        };
        assert_eq!(nack.tag(), Some("V114"));

        assert_eq!(Reply::default().tag(), None);
    }

    #[test]
    fn binary_preview_is_summarised() {
        assert_eq!(payload_preview(&[0xFF, 0xFE]), "<binary 2 bytes>");
        assert_eq!(payload_preview(b"ACK"), "ACK");
    }
}
