//! Imprint CLI: headless embed, extract, phash, capacity, and batch verify
//! for scripts and pipeline workers.
//! Build with: cargo build --release --bin imprint-cli

use base64::Engine;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use imprint::registry::MemoryRegistry;
use imprint::{capacity, codec, ecc, verify, WatermarkParams};

fn usage() -> &'static str {
    r#"imprint-cli — image watermark codec command-line interface

Usage:
  imprint-cli embed <cover> -o <out> --claim <string|@file> [options]
  imprint-cli extract <image> [options]                Recover the embedded digest (56 hex chars)
  imprint-cli phash <image>                            Print the 64-bit perceptual hash (16 hex chars)
  imprint-cli capacity <image> [options]               Print the capacity plan as JSON
  imprint-cli verify <dir> --registry <records.json> [options]
                                                       Verify every image under <dir>, print reports JSON

Embed:
  --claim <string>        Ownership claim as UTF-8 text
  --claim @<path>         Claim text from file
  --claim-base64 <b64>    Claim as base64-encoded UTF-8
  -o, --output <path>     Output image path (required). The container follows
                          the input: JPEG (quality 100), PNG, or WebP.
  Prints the digest, perceptual hash, and capacity report as JSON on stdout.

Options (must match between embed and extract):
  --q <n>                 Quantization step (default 85)
  --redundancy <n>        Reed-Solomon redundancy percent (default 50)
  --margin <n>            Margin blocks excluded from each edge (default 0)
  -v                      Info logging (-vv for debug)
"#
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let verbosity = args.iter().filter(|a| a.as_str() == "-v").count()
        + 2 * args.iter().filter(|a| a.as_str() == "-vv").count();
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    simple_logger::SimpleLogger::new().with_level(level).init().ok();

    if args.len() < 2 {
        eprintln!("{}", usage());
        std::process::exit(1);
    }
    let sub = args[1].as_str();
    let rest = &args[2..];
    let result = match sub {
        "embed" => run_embed(rest),
        "extract" => run_extract(rest),
        "phash" => run_phash(rest),
        "capacity" => run_capacity(rest),
        "verify" => run_verify(rest),
        _ => {
            eprintln!("{}", usage());
            std::process::exit(1);
        }
    };
    if let Err(e) = result {
        eprintln!("{} error: {}", sub, e);
        std::process::exit(1);
    }
}

/// Shared --q/--redundancy/--margin handling. Returns true when the flag at
/// `i` was consumed (possibly advancing `i` past its value).
fn take_param(
    args: &[String],
    i: &mut usize,
    params: &mut WatermarkParams,
) -> Result<bool, String> {
    let a = args[*i].as_str();
    match a {
        "--q" => {
            *i += 1;
            params.q = parse_u32(args.get(*i), "--q")?;
        }
        "--redundancy" => {
            *i += 1;
            params.redundancy_percent = parse_u32(args.get(*i), "--redundancy")?;
        }
        "--margin" => {
            *i += 1;
            params.margin_blocks = parse_u32(args.get(*i), "--margin")? as usize;
        }
        "-v" | "-vv" => {}
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_u32(value: Option<&String>, flag: &str) -> Result<u32, String> {
    let v = value.ok_or_else(|| format!("missing value for {}", flag))?;
    v.parse::<u32>().map_err(|e| format!("bad value for {}: {}", flag, e))
}

fn run_embed(args: &[String]) -> Result<(), String> {
    let mut cover: Option<&str> = None;
    let mut output: Option<&str> = None;
    let mut claim: Option<String> = None;
    let mut params = WatermarkParams::default();

    let mut i = 0;
    while i < args.len() {
        let a = &args[i];
        if take_param(args, &mut i, &mut params)? {
        } else if a == "-o" || a == "--output" {
            i += 1;
            output = Some(args.get(i).ok_or("missing value for -o/--output")?);
        } else if a == "--claim" {
            i += 1;
            let v = args.get(i).ok_or("missing value for --claim")?;
            if let Some(path) = v.strip_prefix('@') {
                claim = Some(fs::read_to_string(path).map_err(|e| e.to_string())?);
            } else {
                claim = Some(v.clone());
            }
        } else if a == "--claim-base64" {
            i += 1;
            let b64 = args.get(i).ok_or("missing value for --claim-base64")?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|e| e.to_string())?;
            claim = Some(String::from_utf8(bytes).map_err(|e| e.to_string())?);
        } else if !a.starts_with('-') && cover.is_none() {
            cover = Some(a);
        }
        i += 1;
    }

    let cover_path = cover.ok_or("embed requires <cover>")?;
    let output_path = output.ok_or("embed requires -o/--output <out>")?;
    let claim = claim.ok_or("embed requires --claim <string|@file> or --claim-base64 <b64>")?;

    let cover_bytes = fs::read(cover_path).map_err(|e| e.to_string())?;
    let outcome = codec::embed(&cover_bytes, &claim, &params).map_err(|e| e.to_string())?;
    fs::write(output_path, &outcome.image).map_err(|e| e.to_string())?;
    eprintln!("Wrote {}", output_path);

    let report = serde_json::json!({
        "digest": outcome.digest_hex,
        "phash": outcome.phash.to_string(),
        "codeword_bits": outcome.codeword_bits,
        "matrix_size": outcome.matrix_size,
        "redundancy_ratio": outcome.redundancy_ratio,
        "capacity": outcome.capacity,
    });
    println!("{}", serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?);
    Ok(())
}

fn run_extract(args: &[String]) -> Result<(), String> {
    let mut image: Option<&str> = None;
    let mut params = WatermarkParams::default();
    let mut i = 0;
    while i < args.len() {
        let a = &args[i];
        if take_param(args, &mut i, &mut params)? {
        } else if !a.starts_with('-') && image.is_none() {
            image = Some(a);
        }
        i += 1;
    }
    let path = image.ok_or("extract requires <image>")?;
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let digest = codec::extract(&bytes, &params).map_err(|e| e.to_string())?;
    io::stdout().write_all(digest.as_bytes()).map_err(|e| e.to_string())?;
    println!();
    Ok(())
}

fn run_phash(args: &[String]) -> Result<(), String> {
    let path = args
        .iter()
        .find(|a| !a.starts_with('-'))
        .ok_or("phash requires <image>")?;
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let phash = codec::perceptual_hash(&bytes).map_err(|e| e.to_string())?;
    println!("{}", phash);
    Ok(())
}

fn run_capacity(args: &[String]) -> Result<(), String> {
    let mut image: Option<&str> = None;
    let mut params = WatermarkParams::default();
    let mut i = 0;
    while i < args.len() {
        let a = &args[i];
        if take_param(args, &mut i, &mut params)? {
        } else if !a.starts_with('-') && image.is_none() {
            image = Some(a);
        }
        i += 1;
    }
    let path = image.ok_or("capacity requires <image>")?;
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let img = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())?;

    let plan = capacity::plan(img.width(), img.height(), params.margin_blocks);
    let needed = ecc::codeword_len(params.redundancy_percent) * 8;
    let fits = plan.fits(needed);
    let report = serde_json::json!({
        "plan": plan,
        "required_bits": needed,
        "fits": fits,
    });
    println!("{}", serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?);
    Ok(())
}

fn run_verify(args: &[String]) -> Result<(), String> {
    let mut dir: Option<&str> = None;
    let mut registry_path: Option<&str> = None;
    let mut params = WatermarkParams::default();
    let mut i = 0;
    while i < args.len() {
        let a = &args[i];
        if take_param(args, &mut i, &mut params)? {
        } else if a == "--registry" {
            i += 1;
            registry_path = Some(args.get(i).ok_or("missing value for --registry")?);
        } else if !a.starts_with('-') && dir.is_none() {
            dir = Some(a);
        }
        i += 1;
    }
    let dir = dir.ok_or("verify requires <dir>")?;
    let registry_path = registry_path.ok_or("verify requires --registry <records.json>")?;

    let registry =
        MemoryRegistry::from_json_file(Path::new(registry_path)).map_err(|e| e.to_string())?;
    eprintln!("Loaded {} registry records", registry.len());

    let (reports, summary) = verify::verify_directory(Path::new(dir), &params, &registry);
    let out = serde_json::json!({
        "summary": summary,
        "reports": reports,
    });
    println!("{}", serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?);
    Ok(())
}
