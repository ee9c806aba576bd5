// avrstack: static worst-case stack-depth and memory-footprint analyzer
// for AVR firmware.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use avrstack::config::Config;

#[derive(Parser, Debug)]
#[command(name = "avrstack", about = "Static worst-case stack and memory footprint analyzer for AVR firmware")]
struct Args {
    /// Per-function stack-usage listing (e.g. avr-gcc -fstack-usage output)
    frame_listing: PathBuf,

    /// objdump-style disassembly listing
    disassembly: PathBuf,

    /// Section-size summary (avr-size output)
    sections: PathBuf,

    /// RON configuration file; overrides the named MCU preset when both are given
    #[arg(long)]
    config: Option<PathBuf>,

    /// Named MCU preset (atmega328p, atmega2560, attiny85); used when --config is absent
    #[arg(long)]
    mcu: Option<String>,

    /// Override the device RAM size in bytes
    #[arg(long)]
    ram_total: Option<u32>,

    /// Override the per-call return-address overhead in bytes
    #[arg(long)]
    call_overhead_bytes: Option<u32>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Raise the tracing filter from `warn` to `debug`
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum Format {
    Text,
    Json,
}

fn load_config(args: &Args) -> Result<Config, String> {
    let mut config = if let Some(path) = &args.config {
        Config::from_file(path).map_err(|e| e.to_string())?
    } else {
        let mcu = args.mcu.as_deref().unwrap_or("atmega328p");
        Config::preset(mcu).ok_or_else(|| format!("no built-in preset for mcu `{}`; pass --config", mcu))?
    };

    if let Some(ram_total) = args.ram_total {
        config.ram_total = ram_total;
    }
    if let Some(overhead) = args.call_overhead_bytes {
        config.call_overhead_bytes = overhead;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("avrstack: {}", msg);
            return ExitCode::from(2);
        }
    };

    let result = avrstack::analyze(&args.frame_listing, &args.disassembly, &args.sections, &config);

    match result {
        Ok(report) => {
            let rendered = match args.format {
                Format::Text => report.to_text(),
                Format::Json => match report.to_json() {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("avrstack: couldn't render JSON report: {}", e);
                        return ExitCode::from(2);
                    }
                },
            };
            println!("{}", rendered);
            ExitCode::from(report.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("avrstack: {}", e);
            ExitCode::from(2)
        }
    }
}
