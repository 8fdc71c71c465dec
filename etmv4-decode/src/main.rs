use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result};
use etmv4::{demultiplex, DecodeContext, Decoder, VmidWidth};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    about = "An ARM CoreSight ETF/ETMv4 packet protocol decoder. Report bugs and request features at <https://github.com/coresight-trace/etmv4>."
)]
struct Opt {
    #[structopt(long = "--etf", help = "Treat FILE as a raw ETF capture and demultiplex it first.")]
    etf: bool,

    #[structopt(long = "--id", default_value = "0", help = "Trace ID to replay when --etf is set.")]
    id: u8,

    #[structopt(long = "--disidchk", help = "Concatenate all observed IDs instead of filtering to --id.")]
    disidchk: bool,

    #[structopt(long = "--keeptmpbin", help = "Persist each demuxed ID's bytes to <FILE>.id<N>.bin.")]
    keeptmpbin: bool,

    #[structopt(long = "--noetfsync", help = "Accepted for CLI compatibility; ETF framing has no marker to search for.")]
    noetfsync: bool,

    #[structopt(long = "--debug", help = "Verbose diagnostics.")]
    debug: bool,

    #[structopt(long = "--vmid-width", default_value = "1", help = "Context packet VMID width in bytes: 1 or 4.")]
    vmid_width: u8,

    #[structopt(name = "FILE", parse(from_os_str), help = "Raw trace input file.")]
    file: PathBuf,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let level = if opt.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).init();

    let raw = fs::read(&opt.file).context("failed to read file")?;

    let vmid_width = match opt.vmid_width {
        4 => VmidWidth::Four,
        _ => VmidWidth::One,
    };
    let ctx = DecodeContext {
        vmid_width,
        debug: opt.debug,
    };

    let bytes = if opt.etf {
        let _ = opt.noetfsync;
        let sinks = demultiplex(Cursor::new(raw))?;

        if opt.keeptmpbin {
            for (id, data) in &sinks {
                let mut out = opt.file.clone().into_os_string();
                out.push(format!(".id{}.bin", id));
                fs::write(&out, data).with_context(|| format!("failed to write {:?}", out))?;
            }
        }

        if opt.disidchk {
            sinks.into_values().flatten().collect::<Vec<u8>>()
        } else {
            sinks.get(&opt.id).cloned().unwrap_or_default()
        }
    } else {
        raw
    };

    let mut decoder = Decoder::new(Cursor::new(bytes), ctx);
    for packet in decoder.singles() {
        match packet {
            Ok(p) => println!("{:?}", p),
            Err(e) => {
                eprintln!("fatal: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}
