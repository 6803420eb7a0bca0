//! Build script: render the `vigil.1` manual page into `OUT_DIR`.

use std::{env, fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;
use time::{OffsetDateTime, format_description::well_known::Iso8601};

#[path = "src/cli.rs"]
#[allow(dead_code, reason = "the build script only renders the command tree")]
mod cli;

const FALLBACK_DATE: &str = "1970-01-01";

/// Reproducible date from `SOURCE_DATE_EPOCH`, else the epoch.
fn manual_date() -> String {
    let Ok(raw) = env::var("SOURCE_DATE_EPOCH") else {
        return FALLBACK_DATE.into();
    };
    let parsed = raw
        .parse::<i64>()
        .ok()
        .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok())
        .and_then(|date| date.format(&Iso8601::DATE).ok());
    parsed.unwrap_or_else(|| {
        println!(
            "cargo:warning=Invalid SOURCE_DATE_EPOCH '{raw}'; falling back to {FALLBACK_DATE}"
        );
        FALLBACK_DATE.into()
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    let version = env::var("CARGO_PKG_VERSION")?;
    let man = Man::new(cli::Cli::command())
        .section("1")
        .source(format!("vigil {version}"))
        .date(manual_date());
    let mut page = Vec::new();
    man.render(&mut page)?;

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").ok_or("OUT_DIR must be set by Cargo")?);
    fs::write(out_dir.join("vigil.1"), page)?;
    Ok(())
}
