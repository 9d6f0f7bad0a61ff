use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tern_core::{FsLoader, compile, compile_lib};

#[derive(Parser, Debug)]
#[command(version, about = "Compile Tern units to C", long_about = None)]
struct Cli {
    #[arg(short, long, help = "Main unit source file (.tn)")]
    input: String,

    #[arg(
        long,
        value_name = "DIR",
        help = "Directory for the generated C files (defaults to the input's directory)"
    )]
    out_dir: Option<String>,

    #[arg(long, help = "Compile as a library (no entry file is written)")]
    lib: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let input = PathBuf::from(&cli.input);
    let root = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("input path {} has no file name", input.display()))?;

    let out_dir = cli.out_dir.map(PathBuf::from).unwrap_or_else(|| root.clone());
    let loader = FsLoader::new(root.clone());
    let compiled = if cli.lib {
        compile_lib(&loader, stem)?
    } else {
        compile(&loader, stem)?
    };

    for warning in &compiled.warnings {
        eprintln!("warning: {}", warning.message);
    }
    for unit in &compiled.units {
        write_output(&out_dir.join(format!("{}.h", unit.name)), &unit.header)?;
        write_output(&out_dir.join(format!("{}.c", unit.name)), &unit.body)?;
        if let Some(entry) = &unit.entry {
            write_output(&out_dir.join(format!("{}_main.c", unit.name)), entry)?;
        }
    }
    Ok(())
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, text).with_context(|| format!("failed to write output file {}", path.display()))
}
