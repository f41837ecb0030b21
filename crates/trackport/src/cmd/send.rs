use std::fs;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_reply, OutputFormat, Reply};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let mut stream = TcpStream::connect_timeout(&args.addr, wait_timeout)
        .map_err(|err| io_error("connect failed", err))?;
    stream
        .write_all(&payload)
        .map_err(|err| io_error("send failed", err))?;
    debug!(peer = %args.addr, len = payload.len(), "payload sent");
    if args.half_close {
        stream
            .shutdown(Shutdown::Write)
            .map_err(|err| io_error("half-close failed", err))?;
    }

    let reply = read_reply(&mut stream, wait_timeout).map_err(|err| io_error("receive failed", err))?;
    if reply.bytes.is_empty() && !reply.closed_by_peer {
        return Err(CliError::new(
            TIMEOUT,
            format!("no reply from {} within {:?}", args.addr, wait_timeout),
        ));
    }

    print_reply(&reply, args.addr, payload.len(), format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    let mut payload = if let Some(data) = &args.data {
        data.as_bytes().to_vec()
    } else if let Some(path) = &args.file {
        fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?
    } else if let Some(text) = &args.hex {
        let compact: String = text.split_whitespace().collect();
        hex::decode(compact)
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")))?
    } else {
        return Err(CliError::new(USAGE, "one of --data, --file or --hex is required"));
    };
    if args.nul {
        payload.push(0);
    }
    Ok(payload)
}

/// Read until the peer closes, a CRLF-terminated line arrives, or `timeout`
/// elapses. A timeout with nothing read is reported as an empty reply.
fn read_reply<R: Read + SetReadTimeout>(reader: &mut R, timeout: Duration) -> io::Result<Reply> {
    let deadline = Instant::now() + timeout;
    let mut reply = Reply::default();
    let mut buf = [0u8; 512];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(reply);
        }
        reader.set_timeout(remaining)?;
        match reader.read(&mut buf) {
            Ok(0) => {
                reply.closed_by_peer = true;
                return Ok(reply);
            }
            Ok(n) => {
                reply.bytes.extend_from_slice(&buf[..n]);
                if reply.bytes.ends_with(b"\r\n") {
                    return Ok(reply);
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(reply);
            }
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {
                reply.closed_by_peer = true;
                return Ok(reply);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

trait SetReadTimeout {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl SetReadTimeout for TcpStream {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }
}
