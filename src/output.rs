use std::io::{self, Write};

use serde::Serialize;

use crate::app::ExportResult;
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_export(result: &ExportResult) -> io::Result<()> {
        Self::print_json(result)
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
    fn event(&self, _event: ProgressEvent) {}
}

pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_summary(result: &ExportResult) {
        let green = "\x1b[32m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!(
            "{green}exported {} icons from the {} source in {} ms{reset}",
            result.assets.len(),
            result.source,
            result.elapsed_ms
        );
        println!("{cyan}   manifest: {}{reset}", result.manifest_path);
        println!("{cyan}   assets:   {}/svg{reset}", result.output);
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr().lock();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(
                stderr,
                "[{:>6.1}s] {}",
                elapsed.as_secs_f64(),
                event.message
            ),
            None => writeln!(stderr, "{}", event.message),
        };
    }
}
