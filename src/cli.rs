use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Remap tabular addresses onto the current administrative units", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect which columns of a table hold address parts and group them
    Detect(DetectArgs),
    /// Rewrite a table's address columns onto the current unit scheme
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Input CSV/TSV file to inspect ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Reference mapping JSON (old units to current units)
    #[arg(short = 'r', long = "reference")]
    pub reference: PathBuf,
    /// Save the detected groups as JSON for later convert runs
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Number of rows to sample during detection (0 picks one automatically)
    #[arg(long, default_value_t = 0)]
    pub sample_rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Input CSV/TSV file to convert ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Reference mapping JSON (old units to current units)
    #[arg(short = 'r', long = "reference")]
    pub reference: PathBuf,
    /// Address group JSON produced by `detect` (detected on the fly if omitted)
    #[arg(short = 'g', long = "groups")]
    pub groups: Option<PathBuf>,
    /// Worker threads for chunked conversion (defaults to available cores)
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,
    /// Name of the per-row outcome column appended to the output
    #[arg(long = "status-column", default_value = "conversion_status")]
    pub status_column: String,
    /// Number of rows to sample when detecting groups (0 picks one automatically)
    #[arg(long, default_value_t = 0)]
    pub sample_rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Output delimiter (defaults to the output path's extension, else the input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
