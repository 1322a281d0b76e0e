use std::io::{BufRead, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use lineport_frame::{is_noise, split_fragments, LineWriter};
use lineport_transport::LinkStream;

use crate::cmd::SendArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_line, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let addr = resolve_addr(&args.addr)?;

    let stream =
        lineport_transport::connect(addr).map_err(|err| transport_error("connect failed", err))?;
    let mut writer = LineWriter::new(stream);

    for line in resolve_lines(&args)? {
        writer
            .send_line(&line)
            .map_err(|err| frame_error("send failed", err))?;
    }

    if args.wait {
        let peer = addr.to_string();
        let response = wait_for_response(writer.into_inner(), wait_timeout)?;
        print_line(&response, &peer, format);
    }

    Ok(SUCCESS)
}

fn resolve_addr(input: &str) -> CliResult<SocketAddr> {
    input
        .to_socket_addrs()
        .map_err(|err| CliError::new(USAGE, format!("invalid address {input}: {err}")))?
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("address {input} resolved to nothing")))
}

fn resolve_lines(args: &SendArgs) -> CliResult<Vec<String>> {
    if let Some(data) = &args.data {
        return Ok(vec![data.clone()]);
    }
    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return Ok(content.lines().map(str::to_string).collect());
    }

    let stdin = std::io::stdin();
    let mut lines = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| crate::exit::io_error("failed reading stdin", err))?;
        lines.push(line);
    }
    Ok(lines)
}

/// Read until one non-noise fragment arrives or the timeout elapses.
fn wait_for_response(mut stream: LinkStream, timeout: Duration) -> CliResult<String> {
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|err| transport_error("receive failed", err))?;

    let deadline = Instant::now() + timeout;
    let mut chunk = [0u8; 1024];
    while Instant::now() < deadline {
        match stream.read(&mut chunk) {
            Ok(0) => return Err(CliError::new(FAILURE, "connection closed by endpoint")),
            Ok(read) => {
                if let Some(line) = split_fragments(&chunk[..read])
                    .into_iter()
                    .find(|fragment| !is_noise(fragment))
                {
                    return Ok(line);
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                break;
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(crate::exit::io_error("receive failed", err)),
        }
    }

    Err(CliError::new(TIMEOUT, "timed out waiting for response"))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn resolve_addr_accepts_socket_addr() {
        let addr = resolve_addr("127.0.0.1:9876").unwrap();
        assert_eq!(addr.port(), 9876);
    }

    #[test]
    fn resolve_addr_rejects_garbage() {
        let err = resolve_addr("not-an-address").unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
