use std::io::{self, Write};

use serde::Serialize;

use crate::app::{FileList, SearchResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Json,
    Plain,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_files(result: &FileList) -> io::Result<()> {
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

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

pub struct PlainOutput;

impl PlainOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "Local file count: {}", result.local.len())?;
        for path in &result.local {
            writeln!(stdout, "=  {path}")?;
        }
        writeln!(stdout, "Non-local file count: {}", result.remote.len())?;
        for id in &result.remote {
            writeln!(stdout, "+  {id}")?;
        }
        Ok(())
    }

    pub fn print_files(result: &FileList) -> io::Result<()> {
        let mut stdout = io::stdout();
        for path in &result.files {
            writeln!(stdout, "{path}")?;
        }
        Ok(())
    }
}
