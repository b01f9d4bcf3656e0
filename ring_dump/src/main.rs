//! `ring_dump <file>` (or `-` for stdin)
//! Prints every `EventContext` in a capture of length-prefixed frames as one
//! JSON object per line. A torn or malformed frame is reported on stderr
//! with its offset; decoding continues with the next frame when possible.

use std::{
    fs,
    io::{self, Read, Write},
};

use anyhow::{bail, Context};
use serde::Serialize;
use shared::{events::FrameReader, EventContext};
use umfs_driver::helpers::major_function_name;

#[derive(Debug, Serialize)]
struct Record<'a> {
    offset: usize,
    serial_number: u64,
    major_function: &'a str,
    process_id: u32,
    security_information: String,
    context: u64,
    buffer_length: u32,
    file_name: String,
}

impl<'a> Record<'a> {
    fn new(offset: usize, ev: &EventContext) -> Self {
        Self {
            offset,
            serial_number: ev.serial_number,
            major_function: major_function_name(ev.major_function),
            process_id: ev.process_id,
            security_information: ev.security_information.to_string(),
            context: ev.context,
            buffer_length: ev.buffer_length,
            file_name: ev.file_name_lossy(),
        }
    }
}

/// Write one JSON line per decodable frame; returns (decoded, bad).
fn dump(raw: &[u8], out: &mut impl Write, err: &mut impl Write) -> anyhow::Result<(usize, usize)> {
    let mut frames = FrameReader::new(raw);
    let (mut decoded, mut bad) = (0, 0);
    loop {
        let offset = frames.offset();
        let Some(frame) = frames.next() else { break };
        let parsed = frame.and_then(EventContext::decode);
        match parsed {
            Ok(ev) => {
                serde_json::to_writer(&mut *out, &Record::new(offset, &ev))?;
                writeln!(out)?;
                decoded += 1;
            }
            Err(e) => {
                writeln!(err, "offset {offset}: {e}")?;
                bad += 1;
            }
        }
    }
    Ok((decoded, bad))
}

fn main() -> anyhow::Result<()> {
    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: ring_dump <capture-file | ->");
    };
    let raw = if path == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf).context("reading stdin")?;
        buf
    } else {
        fs::read(&path).with_context(|| format!("reading {path}"))?
    };

    let stdout = io::stdout();
    let stderr = io::stderr();
    let (decoded, bad) = dump(&raw, &mut stdout.lock(), &mut stderr.lock())?;
    eprintln!("{decoded} event(s), {bad} bad frame(s)");
    Ok(())
}
