//! Codec probe command.

use anyhow::Result;
use comfy_table::{Cell, Color};
use serde::Serialize;
use spillway_common::SpillConfig;
use spillway_core::{CodecAvailability, CodecRegistry};

use crate::OutputFormat;
use crate::output::{self, Format};

/// One probed codec name.
#[derive(Serialize)]
struct ProbeOutput {
    name: String,
    available: bool,
    codec: Option<&'static str>,
}

/// Probe results plus what a spill would actually use.
#[derive(Serialize)]
struct CodecsOutput {
    compression_enabled: bool,
    probes: Vec<ProbeOutput>,
    resolved: Option<&'static str>,
}

/// Run the codecs command.
pub fn run(config: &SpillConfig, names: &[String], format: OutputFormat, quiet: bool) -> Result<()> {
    let registry = CodecRegistry::builtin();

    // Explicit names win, then the configured list, then everything known.
    let names: Vec<String> = if !names.is_empty() {
        names.to_vec()
    } else if !config.codecs.is_empty() {
        config.codecs.clone()
    } else {
        registry.entries().map(|(name, _)| name.to_string()).collect()
    };

    let probes: Vec<ProbeOutput> = names
        .iter()
        .map(|name| {
            let availability = registry.probe(name);
            ProbeOutput {
                name: name.clone(),
                available: matches!(availability, CodecAvailability::Available(_)),
                codec: availability.codec().map(|c| c.name()),
            }
        })
        .collect();

    let output = CodecsOutput {
        compression_enabled: config.compress,
        probes,
        resolved: registry.resolve(names.as_slice(), config.compress).map(|c| c.name()),
    };

    let fmt: Format = format.into();
    match fmt {
        Format::Json => output::print_json(&output, quiet)?,
        Format::Table => {
            if quiet {
                return Ok(());
            }
            let mut table = output::create_table();
            output::add_header(&mut table, &["Name", "Status", "Codec"]);
            for probe in &output.probes {
                let status = if probe.available {
                    Cell::new("available").fg(Color::Green)
                } else {
                    Cell::new("unavailable").fg(Color::Red)
                };
                table.add_row(vec![
                    Cell::new(&probe.name),
                    status,
                    Cell::new(probe.codec.unwrap_or("-")),
                ]);
            }
            println!("{table}");

            let resolved = match (output.compression_enabled, output.resolved) {
                (false, _) => "none (compression disabled)".to_string(),
                (true, None) => "none (uncompressed fallback)".to_string(),
                (true, Some(codec)) => codec.to_string(),
            };
            output::status(&format!("Spills will use: {resolved}"), quiet);
        }
    }

    Ok(())
}
