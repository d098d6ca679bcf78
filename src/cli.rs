// Command-line front end for ipsy.
//
// Subcommands map one-to-one onto the file-level helpers in `crate::io`;
// this module only resolves paths, applies the overwrite policy and
// reports results.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::diff::DiffOptions;
use crate::io::{self, IoError, MergeOptions, PatchOptions};
use crate::ips::reader::{self, ReadOptions, ReadWarning};
use crate::ips::record::{EOF_OFFSET, MAX_RECORD_SIZE, MAX_UNPATCHED, MIN_COMPRESS, MIN_PATCH};

const BUF_SIZE: usize = 64 * 1024;

/// Stem used to name a merged patch when `-o` is not given.
const MERGE_STEM: &str = "ipsy_merge";

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Apply an IPS patch, diff two files into a patch, or merge IPS files.
#[derive(Parser, Debug)]
#[command(
    name = "ipsy",
    version,
    about = "IPS patch tool",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Name for the new file.
    #[arg(short = 'o', long, global = true, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply a patch to a copy of an unpatched file.
    Patch(PatchArgs),
    /// Generate an IPS file by diffing the unpatched and patched versions.
    Diff(DiffArgs),
    /// Combine several IPS files into one.
    Merge(MergeArgs),
    /// List the records of an IPS file.
    Records(RecordsArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// The unpatched file.
    #[arg(value_hint = ValueHint::FilePath)]
    unpatched: PathBuf,

    /// IPS file to apply.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Ignore "EOF" markers unless they are actually at the end of the file.
    #[arg(long = "eof-continue", visible_alias = "eof")]
    eof_continue: bool,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// The original, unpatched file.
    #[arg(value_hint = ValueHint::FilePath)]
    unpatched: PathBuf,

    /// The modified or already patched file.
    #[arg(value_hint = ValueHint::FilePath)]
    patched: PathBuf,

    /// Compress runs of identical bytes into RLE records.
    #[arg(long)]
    rle: bool,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// File the patches are meant for; lets the merged patch be cleaned up.
    #[arg(short = 'd', long = "destination", value_hint = ValueHint::FilePath)]
    destination: Option<PathBuf>,

    /// IPS files, in application order.
    #[arg(value_hint = ValueHint::FilePath, required = true)]
    patches: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct RecordsArgs {
    /// IPS file to list.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Ignore "EOF" markers unless they are actually at the end of the file.
    #[arg(long = "eof-continue", visible_alias = "eof")]
    eof_continue: bool,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Patch,
    Diff,
    Merge,
    Records,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    eof_continue: bool,
    rle: bool,
    inputs: Vec<PathBuf>,
    destination: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

impl Options {
    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            continue_past_eof: self.eof_continue,
        }
    }

    fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, _) => "debug",
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        eof_continue: false,
        rle: false,
        inputs: Vec::new(),
        destination: None,
        output_file: cli.output,
    };

    match cli.command {
        Cmd::Patch(args) => {
            opts.command = Command::Patch;
            opts.eof_continue = args.eof_continue;
            opts.inputs = vec![args.unpatched, args.patch];
        }
        Cmd::Diff(args) => {
            opts.command = Command::Diff;
            opts.rle = args.rle;
            opts.inputs = vec![args.unpatched, args.patched];
        }
        Cmd::Merge(args) => {
            opts.command = Command::Merge;
            opts.destination = args.destination;
            opts.inputs = args.patches;
        }
        Cmd::Records(args) => {
            opts.command = Command::Records;
            opts.eof_continue = args.eof_continue;
            opts.inputs = vec![args.patch];
        }
        Cmd::Config => {}
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("ipsy".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let opts = resolve_options(cli);
        let _ = opts.log_filter();
        let _ = output_path(&opts);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Where the command writes, `-o` first, then the historical default name.
fn output_path(opts: &Options) -> Option<PathBuf> {
    if let Some(path) = &opts.output_file {
        return Some(path.clone());
    }
    match opts.command {
        Command::Patch => opts.inputs.first().map(|p| io::default_output_name(p)),
        Command::Diff => opts.inputs.first().map(|p| io::default_patch_name(p)),
        Command::Merge => Some(io::default_patch_name(Path::new(MERGE_STEM))),
        Command::Records | Command::Config => None,
    }
}

/// Refuse to clobber an existing file unless `-f` was given.
fn check_overwrite(opts: &Options, path: &Path) -> bool {
    if path.exists() && !opts.force {
        eprintln!(
            "ipsy: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return false;
    }
    true
}

fn report_warnings(opts: &Options, warnings: &[ReadWarning]) {
    if opts.quiet {
        return;
    }
    for w in warnings {
        eprintln!("ipsy: warning: {w}");
    }
}

fn emit_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("ipsy: json: {e}"),
    }
}

fn hex_digest(digest: Option<[u8; 32]>) -> Option<String> {
    digest.map(|d| d.iter().map(|b| format!("{b:02x}")).collect())
}

fn fail(context: &str, err: IoError) -> i32 {
    eprintln!("ipsy: {context}: {err}");
    1
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("ipsy version {version} (Rust)");
    eprintln!("Licensed under the MIT License");

    let file_io = cfg!(feature = "file-io") as u8;
    eprintln!("FILE_IO={file_io}");
    eprintln!("MIN_PATCH={MIN_PATCH}");
    eprintln!("MIN_COMPRESS={MIN_COMPRESS}");
    eprintln!("MAX_RECORD_SIZE={MAX_RECORD_SIZE}");
    eprintln!("MAX_UNPATCHED={MAX_UNPATCHED}");
    eprintln!("EOF_OFFSET={EOF_OFFSET:#08X}");

    0
}

// ---------------------------------------------------------------------------
// Patch command
// ---------------------------------------------------------------------------

fn cmd_patch(opts: &Options) -> i32 {
    let [unpatched, patch] = opts.inputs.as_slice() else {
        eprintln!("ipsy: patch requires an unpatched file and a patch");
        return 1;
    };
    let Some(output) = output_path(opts) else {
        return 1;
    };
    if !check_overwrite(opts, &output) {
        return 1;
    }

    let stats = match io::patch_file(
        unpatched,
        patch,
        &output,
        PatchOptions {
            read: opts.read_options(),
        },
    ) {
        Ok(s) => s,
        Err(e) => return fail("patch", e),
    };

    report_warnings(opts, &stats.warnings);
    if !opts.quiet {
        println!("Applied {} records from patch.", stats.records_applied);
    }
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "ipsy: patch: target size: {}, patch size: {}, output size: {}",
            stats.target_size, stats.patch_size, stats.output_size
        );
    }
    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "patch",
            "output": output.display().to_string(),
            "target_size": stats.target_size,
            "patch_size": stats.patch_size,
            "output_size": stats.output_size,
            "records_applied": stats.records_applied,
            "warnings": stats.warnings.len(),
            "output_sha256": hex_digest(stats.output_sha256),
        }));
    }
    0
}

// ---------------------------------------------------------------------------
// Diff command
// ---------------------------------------------------------------------------

fn cmd_diff(opts: &Options) -> i32 {
    let [unpatched, patched] = opts.inputs.as_slice() else {
        eprintln!("ipsy: diff requires an unpatched and a patched file");
        return 1;
    };
    let Some(output) = output_path(opts) else {
        return 1;
    };
    if !check_overwrite(opts, &output) {
        return 1;
    }

    let stats = match io::diff_file(unpatched, patched, &output, DiffOptions { rle: opts.rle }) {
        Ok(s) => s,
        Err(e) => return fail("diff", e),
    };

    if !opts.quiet {
        if stats.records == 0 {
            println!("No differences found.");
        }
        println!(
            "Patch created, {} bytes, {} records.",
            stats.patch_size, stats.records
        );
    }
    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "diff",
            "output": output.display().to_string(),
            "input_size": stats.input_size,
            "patch_size": stats.patch_size,
            "records": stats.records,
            "rle": opts.rle,
            "unpatched_sha256": hex_digest(stats.unpatched_sha256),
            "patched_sha256": hex_digest(stats.patched_sha256),
        }));
    }
    0
}

// ---------------------------------------------------------------------------
// Merge command
// ---------------------------------------------------------------------------

fn cmd_merge(opts: &Options) -> i32 {
    let Some(output) = output_path(opts) else {
        return 1;
    };
    if !check_overwrite(opts, &output) {
        return 1;
    }

    let merge_opts = MergeOptions {
        target: opts.destination.clone(),
    };
    let stats = match io::merge_files(&opts.inputs, &output, &merge_opts) {
        Ok(s) => s,
        Err(e) => return fail("merge", e),
    };

    report_warnings(opts, &stats.warnings);
    if !opts.quiet {
        println!("Merged {} IPS files into one.", stats.patches);
    }
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "ipsy: merge: {} records, output {} bytes{}",
            stats.records,
            stats.patch_size,
            if stats.cleaned_up { " (cleaned up)" } else { "" }
        );
    }
    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "merge",
            "output": output.display().to_string(),
            "patches": stats.patches,
            "records": stats.records,
            "patch_size": stats.patch_size,
            "cleaned_up": stats.cleaned_up,
            "warnings": stats.warnings.len(),
        }));
    }
    0
}

// ---------------------------------------------------------------------------
// Records command
// ---------------------------------------------------------------------------

fn cmd_records(opts: &Options) -> i32 {
    let [path] = opts.inputs.as_slice() else {
        eprintln!("ipsy: records requires a patch file");
        return 1;
    };
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ipsy: {}: {e}", path.display());
            return 1;
        }
    };

    let input = BufReader::with_capacity(BUF_SIZE, file);
    let read = match reader::read_patch(input, opts.read_options()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("ipsy: {}: {e}", path.display());
            return 1;
        }
    };

    for record in &read.records {
        println!("{record}");
    }
    report_warnings(opts, &read.warnings);

    if opts.json_output {
        let rle = read.records.iter().filter(|r| r.is_rle()).count();
        let bytes: usize = read.records.iter().map(|r| r.len()).sum();
        emit_json(serde_json::json!({
            "command": "records",
            "records": read.records.len(),
            "rle_records": rle,
            "bytes_written": bytes,
            "warnings": read.warnings.len(),
        }));
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(opts.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Patch => cmd_patch(&opts),
        Command::Diff => cmd_diff(&opts),
        Command::Merge => cmd_merge(&opts),
        Command::Records => cmd_records(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
