use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

/// Line-oriented progress: `[DOWNLOAD]`/`[OK]` on stdout, `[WARN]` on stderr.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_summary(summary: &RunSummary) {
        let document = if summary.document_written {
            "document updated"
        } else {
            "document unchanged"
        };
        println!(
            "[DONE] {} item(s), {} downloaded, {} failed, {}",
            summary.items,
            summary.downloads.len(),
            summary.failures.len(),
            document
        );
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Download { url, .. } => println!("[DOWNLOAD] {url}"),
            ProgressEvent::Saved { path, size_bytes } => {
                println!("[OK] {path} ({size_bytes} bytes)")
            }
            ProgressEvent::Planned { url, path } => println!("[PLAN] {url} -> {path}"),
            ProgressEvent::Skipped { url } => println!("[SKIP] {url} (already recorded)"),
            ProgressEvent::Warning { message } => eprintln!("[WARN] {message}"),
        }
    }
}

/// Keeps stdout clean for the final JSON summary; warnings still go to stderr.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        if let ProgressEvent::Warning { message } = event {
            eprintln!("[WARN] {message}");
        }
    }
}
