//! mau-emu: behavioral model of a match-action pipeline stage

use std::env;
use std::path::Path;

use anyhow::{bail, Context};
use mau_emu::config::Config;
use mau_emu::device::{ContainerId, StageState};
use mau_emu::mau::{HardwareErratum, StageOutput};
use mau_emu::parser::regblob::REGBLOB_MAGIC;
use mau_emu::parser::{RegBlob, RegScript};
use mau_emu::testing::VectorRunner;

const USAGE: &str = "usage: mau-emu <script|blob> [--dump-regs] [--errata a,b]
       mau-emu --vectors <manifest.toml|dir> [--errata a,b]
       mau-emu --sample-config";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = Config::get();

    let mut dump_regs = false;
    let mut errata_arg = None;
    let mut vectors = None;
    let mut path = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dump-regs" => dump_regs = true,
            "--errata" => errata_arg = Some(iter.next().context("--errata needs a list")?.clone()),
            "--vectors" => vectors = Some(iter.next().context("--vectors needs a path")?.clone()),
            "--sample-config" => {
                print!("{}", Config::sample_config());
                if let Some(p) = Config::user_config_path() {
                    eprintln!("(user config location: {})", p.display());
                }
                return Ok(());
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            other if other.starts_with('-') => bail!("unknown option '{}'\n{}", other, USAGE),
            other => path = Some(other.to_string()),
        }
    }

    // Command-line errata replace the configured list
    let errata = match &errata_arg {
        Some(list) => HardwareErratum::parse_list(list)?,
        None => config.errata()?,
    };

    if let Some(v) = vectors {
        return run_vectors(Path::new(&v), errata);
    }

    let Some(path) = path else {
        bail!("{}", USAGE);
    };
    println!("Loading: {}", path);
    println!();

    let data = std::fs::read(&path).with_context(|| format!("reading {}", path))?;
    let mut state = StageState::new();

    if data.get(4..8) == Some(&REGBLOB_MAGIC.to_le_bytes()[..]) {
        let blob = RegBlob::parse(&data)?;
        blob.print_summary();
        state.apply_blob(&blob)?;
        println!();
        state.print_summary();
        if dump_regs {
            println!();
            state.regs.print_dump();
        }

        let stage = state.build_stage(&errata)?;
        println!();
        println!(
            "Stage configured: {} TCAM entries, {} exact ways, {} instructions",
            stage.config().tcam.entries_len(),
            stage.config().exact.ways().len(),
            stage.config().imem.len()
        );
        return Ok(());
    }

    let text = String::from_utf8(data).context("input is neither a register blob nor UTF-8 text")?;
    let script = RegScript::parse(&text)?;
    let outputs = script.run(&mut state, &errata)?;

    state.print_summary();
    if dump_regs {
        println!();
        state.regs.print_dump();
    }

    let mut undefined = 0;
    for (i, out) in outputs.iter().enumerate() {
        println!();
        print_output(i, out);
        undefined += out.undefined.len();
    }

    if undefined > 0 && config.fail_on_undefined() {
        bail!("{} undefined operand read(s)", undefined);
    }
    Ok(())
}

/// Print one packet's results.
fn print_output(idx: usize, out: &StageOutput) {
    println!("Packet #{} ({:?})", idx, out.phv.direction());
    for t in &out.tables {
        println!("  table {:2}: {}", t.logical_table, t.outcome);
        println!("            {}", t.addresses);
    }
    for u in &out.undefined {
        println!("  undefined: {}", u);
    }

    let valid: Vec<String> = ContainerId::all()
        .filter_map(|c| out.phv.value(c).map(|v| format!("{}=0x{:X}", c, v)))
        .collect();
    println!("  PHV: {}", if valid.is_empty() { "(empty)".to_string() } else { valid.join(" ") });
}

/// Run one manifest or every manifest in a directory.
fn run_vectors(path: &Path, errata: Vec<HardwareErratum>) -> anyhow::Result<()> {
    let files = if path.is_dir() { VectorRunner::discover(path)? } else { vec![path.to_path_buf()] };
    let runner = VectorRunner::new().with_errata(errata);

    let mut failed = 0;
    for file in &files {
        let result = runner.run_file(file);
        if result.passed {
            println!("PASS {} ({} packets)", result.name, result.packets);
            continue;
        }
        failed += 1;
        println!("FAIL {}", result.name);
        if let Some(e) = &result.error {
            println!("  error: {}", e);
        }
        for m in result.mismatches.iter().take(10) {
            println!("  {}", m);
        }
        if result.mismatches.len() > 10 {
            println!("  ... {} more", result.mismatches.len() - 10);
        }
    }

    println!();
    println!("{} of {} vectors passed", files.len() - failed, files.len());
    if failed > 0 {
        bail!("{} vector(s) failed", failed);
    }
    Ok(())
}
