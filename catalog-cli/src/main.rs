//! Catalog Decoder CLI Application
//!
//! This is the command-line interface for the catalog decoder.
//! It uses the catalog-decoder library and adds:
//! - candump log parsing and raw serial capture reading
//! - Session configuration files
//! - Text and JSON reports

use anyhow::{Context, Result};
use catalog_decoder::catalog::{self, Catalog};
use catalog_decoder::{
    DecodedEvent, Decoder, DecoderConfig, FramerConfig, FramingEncoding, Frame, Protocol,
    SerialDecoder,
};
use clap::Parser;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

mod config;
mod input;
mod report;

use config::{AppConfig, FilteringConfig, OutputFormat};

/// Catalog Decoder - Decode field-bus traffic with TOML catalogs
#[derive(Parser, Debug)]
#[command(name = "catalog-cli")]
#[command(about = "Decode CAN logs and serial captures with a frame catalog", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the catalog file
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// candump log file(s) to decode (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    log: Vec<PathBuf>,

    /// Raw serial capture file(s) to decode (can be repeated)
    #[arg(long, value_name = "FILE")]
    serial: Vec<PathBuf>,

    /// Serial framing, overriding the catalog (raw, slip, modbus_rtu)
    #[arg(long, value_name = "ENCODING", value_parser = parse_framing)]
    framing: Option<FramingEncoding>,

    /// Raw framing delimiter as hex bytes (e.g. 0D0A)
    #[arg(long, value_name = "HEX", value_parser = parse_hex_delimiter)]
    delimiter: Option<Vec<u8>>,

    /// Only accept Modbus RTU frames from this device address
    #[arg(long, value_name = "ADDR")]
    device_address: Option<u8>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Output file for decoded events (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of frames to decode per input
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<usize>,

    /// Also report frames missing from the catalog
    #[arg(long)]
    unknown: bool,

    /// Print catalog statistics before decoding
    #[arg(long)]
    summary: bool,

    /// Print the catalog back as TOML and exit
    #[arg(long)]
    dump_catalog: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn parse_framing(text: &str) -> std::result::Result<FramingEncoding, String> {
    text.parse().map_err(|e: catalog_decoder::DecoderError| e.to_string())
}

fn parse_hex_delimiter(text: &str) -> std::result::Result<Vec<u8>, String> {
    let text = text.trim_start_matches("0x");
    if text.is_empty() || text.len() % 2 != 0 {
        return Err(format!("expected an even number of hex digits, got '{}'", text));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

/// Everything a run needs, merged from the config file and the command line
#[derive(Debug)]
struct Session {
    catalog: PathBuf,
    logs: Vec<PathBuf>,
    serials: Vec<PathBuf>,
    framing: Option<FramerConfig>,
    decoder_config: DecoderConfig,
    format: OutputFormat,
    output: Option<PathBuf>,
    summary: bool,
    max_frames: Option<usize>,
}

impl Session {
    /// Command line values override the config file
    fn build(args: &Args, config: Option<AppConfig>) -> Option<Self> {
        let (mut session, filtering) = match config {
            Some(config) => (
                Session {
                    catalog: config.input.catalog,
                    logs: config.input.files,
                    serials: config.input.serial_files,
                    framing: config.framing,
                    decoder_config: DecoderConfig::new(),
                    format: config.output.format,
                    output: config.output.path,
                    summary: config.output.include_summary,
                    max_frames: None,
                },
                config.filtering,
            ),
            None => (
                Session {
                    catalog: args.catalog.clone()?,
                    logs: Vec::new(),
                    serials: Vec::new(),
                    framing: None,
                    decoder_config: DecoderConfig::new(),
                    format: OutputFormat::default(),
                    output: None,
                    summary: false,
                    max_frames: None,
                },
                FilteringConfig::default(),
            ),
        };

        if let Some(catalog) = &args.catalog {
            session.catalog = catalog.clone();
        }
        if !args.log.is_empty() {
            session.logs = args.log.clone();
        }
        if !args.serial.is_empty() {
            session.serials = args.serial.clone();
        }
        if args.framing.is_some() || args.delimiter.is_some() || args.device_address.is_some() {
            let mut framing = session.framing.take().unwrap_or_default();
            if let Some(encoding) = args.framing {
                framing.encoding = encoding;
            }
            if let Some(delimiter) = &args.delimiter {
                framing.delimiter = delimiter.clone();
            }
            if args.device_address.is_some() {
                framing.device_address = args.device_address;
            }
            session.framing = Some(framing);
        }
        if let Some(format) = args.format {
            session.format = format;
        }
        if args.output.is_some() {
            session.output = args.output.clone();
        }
        session.summary |= args.summary;
        session.max_frames = args.max_frames;

        let mut filtering = filtering;
        filtering.emit_unknown |= args.unknown;
        session.decoder_config = filtering.decoder_config();

        Some(session)
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Catalog Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", catalog_decoder::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            Some(config::load_config(path)?)
        }
        None => None,
    };

    let Some(session) = Session::build(&args, app_config) else {
        // No catalog - show help
        println!("Catalog Decoder - No catalog specified");
        println!("\nQuick Start:");
        println!("  catalog-cli --catalog vehicle.toml --log candump.log");
        println!("  catalog-cli --catalog sensors.toml --serial capture.bin --framing slip");
        println!("\nFor session files:");
        println!("  catalog-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    };

    let catalog = catalog::load_file(&session.catalog)
        .with_context(|| format!("Failed to load catalog: {:?}", session.catalog))?;

    let mut out: Box<dyn Write> = match &session.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output: {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if args.dump_catalog {
        write!(out, "{}", catalog.to_toml_string()?)?;
        out.flush()?;
        return Ok(());
    }

    run(&session, catalog, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Decode every input of a session and write the report
fn run<W: Write>(session: &Session, catalog: Catalog, out: &mut W) -> Result<()> {
    if session.summary {
        report::write_summary(&mut *out, catalog.meta.name.as_deref(), &catalog.stats())?;
    }

    let decoder = Decoder::with_config(catalog, session.decoder_config.clone());
    let mut total = 0usize;

    for path in &session.logs {
        let mut frames = input::read_candump(path)?;
        if let Some(max) = session.max_frames {
            frames.truncate(max);
        }
        let events = decode_parallel(&decoder, Protocol::Can, &frames);
        total += events.len();
        report::write_events(&mut *out, &events, session.format)?;
    }

    for path in &session.serials {
        let mut serial = match &session.framing {
            Some(framing) => SerialDecoder::with_framing(decoder.clone(), framing),
            None => SerialDecoder::new(decoder.clone()),
        };
        let mut events = input::decode_serial_capture(path, &mut serial)?;
        if let Some(max) = session.max_frames {
            events.truncate(max);
        }
        total += events.len();
        report::write_events(&mut *out, &events, session.format)?;
    }

    log::info!("Decoded {} events", total);
    Ok(())
}

/// Decode frames across threads, keeping input order
fn decode_parallel(decoder: &Decoder, protocol: Protocol, frames: &[Frame]) -> Vec<DecodedEvent> {
    frames
        .par_iter()
        .filter_map(|frame| decoder.decode_frame(protocol, frame))
        .collect()
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_delimiter() {
        assert_eq!(parse_hex_delimiter("0D0A").unwrap(), vec![0x0D, 0x0A]);
        assert_eq!(parse_hex_delimiter("0x00").unwrap(), vec![0x00]);
        assert!(parse_hex_delimiter("ABC").is_err());
        assert!(parse_hex_delimiter("ZZ").is_err());
    }

    #[test]
    fn test_session_from_args() {
        let args = Args::parse_from([
            "catalog-cli",
            "--catalog",
            "vehicle.toml",
            "--serial",
            "capture.bin",
            "--framing",
            "slip",
            "--format",
            "json",
            "--unknown",
        ]);
        let session = Session::build(&args, None).unwrap();

        assert_eq!(session.catalog, PathBuf::from("vehicle.toml"));
        assert_eq!(session.framing.unwrap().encoding, FramingEncoding::Slip);
        assert_eq!(session.format, OutputFormat::Json);
        assert!(session.decoder_config.emit_unknown_frames);
    }

    #[test]
    fn test_session_requires_catalog() {
        let args = Args::parse_from(["catalog-cli", "--log", "candump.log"]);
        assert!(Session::build(&args, None).is_none());
    }

    #[test]
    fn test_run_decodes_candump() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("candump.log");
        std::fs::write(&log_path, "(1.0) can0 100#0040\n(1.1) can0 100#01AB\n").unwrap();

        let catalog = catalog::resolve(
            r#"
[frame.can."0x100".mux]
start_bit = 0
bit_length = 8

[[frame.can."0x100".mux."0".signals]]
name = "temp"
start_bit = 8
bit_length = 8
factor = 0.5
offset = -40

[[frame.can."0x100".mux."1".signals]]
name = "flags"
start_bit = 8
bit_length = 8
format = "hex"
"#,
        )
        .unwrap();

        let args = Args::parse_from(["catalog-cli", "--catalog", "unused.toml"]);
        let mut session = Session::build(&args, None).unwrap();
        session.logs = vec![log_path];

        let mut out = Vec::new();
        run(&session, catalog, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("temp=-8"));
        assert!(text.contains("flags=AB"));
    }
}
