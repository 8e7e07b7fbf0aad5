//! Communication with the companion tools running on the device.

use std::io::Write as _;
use std::net::TcpStream;
use std::net::UdpSocket;
use std::str::from_utf8;
use std::thread::sleep;
use std::time::Duration;

use anyhow::Context as _;
use anyhow::Result;

use regex::Regex;

use tracing::debug;

use crate::render::COLOR_BLUE;
use crate::render::COLOR_END;
use crate::render::COLOR_RED;


/// The TCP port the companion server accepts commands on.
const COMMAND_PORT: u16 = 1338;
/// The UDP port the device broadcasts log messages to.
const LOG_PORT: u16 = 31338;

/// The shape of a log line as emitted by the device: a level tag, an
/// optional application tag, a microsecond timestamp, and the message.
const LOG_LINE_PATTERN: &str =
    r"^\[(?P<level>[A-Z]+?)\]: (?P<chiaki>\[CHIAKI\] )?(?P<timestamp>\d+) (?P<msg>.+)$";


fn send_cmd(host: &str, cmd: &str) -> Result<()> {
    let mut stream = TcpStream::connect((host, COMMAND_PORT))
        .with_context(|| format!("failed to connect to {host}:{COMMAND_PORT}"))?;
    let () = stream
        .write_all(format!("{cmd}\n").as_bytes())
        .with_context(|| format!("failed to send command `{cmd}`"))?;
    Ok(())
}

/// Stop whatever title is running and launch the one identified by
/// `title_id`.
///
/// A running title cannot be replaced, so it is destroyed first, with a
/// grace period for the system to finish the teardown.
pub fn launch(host: &str, title_id: &str) -> Result<()> {
    let () = send_cmd(host, "destroy")?;
    let () = sleep(Duration::from_secs(1));
    let () = send_cmd(host, &format!("launch {title_id}"))?;
    Ok(())
}


/// Reformat a raw log line for terminal consumption.
///
/// Lines not matching the expected shape produce `None` and are meant
/// to be dropped silently.
fn render_line(pattern: &Regex, line: &str) -> Option<String> {
    let line = line.replace("[VITA]", "");
    let captures = pattern.captures(line.trim_end())?;

    let timestamp = captures["timestamp"].parse::<u64>().ok()?;
    let secs = timestamp as f64 / 1e6;
    let msg = &captures["msg"];

    let level = &captures["level"];
    let color = match level {
        "ERROR" => COLOR_RED,
        "INFO" => COLOR_BLUE,
        _ => "",
    };
    let level = if captures.name("chiaki").is_some() {
        format!("[CHIAKI-{level}]")
    } else {
        format!("[{level}]")
    };

    Some(format!("{color}{secs:>8.4} {level:<16} {msg}{COLOR_END}"))
}

/// Bind the log port and reprint everything the device broadcasts,
/// indefinitely.
pub fn relay_logs() -> Result<()> {
    let pattern = Regex::new(LOG_LINE_PATTERN).context("failed to compile log line pattern")?;
    let socket = UdpSocket::bind(("0.0.0.0", LOG_PORT))
        .with_context(|| format!("failed to bind UDP port {LOG_PORT}"))?;

    let mut buf = [0u8; 4096];
    loop {
        let (len, _peer) = socket
            .recv_from(&mut buf)
            .context("failed to receive log datagram")?;
        // Undecodable datagrams are dropped, same as unparsable lines.
        let Ok(text) = from_utf8(&buf[..len]) else {
            debug!("dropping undecodable log datagram");
            continue
        };
        for line in text.lines() {
            if let Some(rendered) = render_line(&pattern, line) {
                println!("{rendered}");
            }
        }
    }
}
