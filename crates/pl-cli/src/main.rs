//! privlog - tools for privacy-aware logs
//!
//! - generate signing and recipient keys
//! - verify signed template streams
//! - render templates in the sanitized or critical view, disclosing
//!   encrypted values with the matching keys
//! - open key escrow documents

use base64::Engine;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pl_audit::{SignedTemplate, SigningIdentity, TemplateReader, View};
use pl_cli::disclose::{DEFAULT_ASYMMETRIC_ID, DEFAULT_SYMMETRIC_ID};
use pl_cli::{init_logging, load_escrows, DisclosureKeys, ExitCode, LogConfig, LogFormat, LogLevel};
use pl_redact::RecipientSecret;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Tools for privacy-aware logs and signed audit templates
#[derive(Parser)]
#[command(name = "privlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair
    Keygen(KeygenArgs),

    /// Verify every template in a template stream
    Verify(VerifyArgs),

    /// Render templates, optionally disclosing critical or encrypted values
    Render(RenderArgs),

    /// Decrypt and print key escrow documents
    OpenEscrow(OpenEscrowArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KeyKind {
    /// ECDSA key for signing templates
    Signing,
    /// Key for encrypted parameters, escrow documents and disclosure
    Recipient,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    #[arg(value_enum)]
    kind: KeyKind,

    /// Write the secret key to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Template stream (JSON lines)
    file: PathBuf,

    /// Require templates to be signed by this key (base64)
    #[arg(long, env = "PRIVLOG_TRUSTED_SIGNER")]
    signer: Option<String>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Template stream (JSON lines)
    file: PathBuf,

    /// Render the critical view instead of the sanitized one
    #[arg(long)]
    disclose: bool,

    /// Require templates to be signed by this key (base64)
    #[arg(long, env = "PRIVLOG_TRUSTED_SIGNER")]
    signer: Option<String>,

    /// Skip signature verification
    #[arg(long)]
    no_verify: bool,

    /// Recipient secret key (base64) for asymmetric tokens and sealed escrow
    #[arg(long, env = "PRIVLOG_RECIPIENT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Key escrow file for symmetric tokens
    #[arg(long)]
    escrow: Option<PathBuf>,

    /// The escrow file is sealed to the recipient key
    #[arg(long, requires = "secret")]
    sealed_escrow: bool,

    /// Symmetric tokens were produced with IV rotation
    #[arg(long)]
    rotate_iv: bool,

    /// Identifier of symmetric tokens
    #[arg(long, default_value = DEFAULT_SYMMETRIC_ID)]
    sym_id: String,

    /// Identifier of asymmetric tokens
    #[arg(long, default_value = DEFAULT_ASYMMETRIC_ID)]
    asym_id: String,
}

#[derive(Args, Debug)]
struct OpenEscrowArgs {
    /// Sealed escrow file
    file: PathBuf,

    /// Recipient secret key (base64)
    #[arg(long, env = "PRIVLOG_RECIPIENT_SECRET", hide_env_values = true)]
    secret: String,
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let exit_code = match &cli.command {
        Commands::Keygen(args) => run_keygen(&cli.global, args),
        Commands::Verify(args) => run_verify(&cli.global, args),
        Commands::Render(args) => run_render(&cli.global, args),
        Commands::OpenEscrow(args) => run_open_escrow(&cli.global, args),
    };

    std::process::exit(exit_code.as_i32());
}

fn fail(global: &GlobalOpts, code: ExitCode, message: impl std::fmt::Display) -> ExitCode {
    error!(code = code.code_name(), "{}", message);
    if global.format == OutputFormat::Json {
        println!(
            "{}",
            json!({ "error": message.to_string(), "code": code.code_name() })
        );
    } else {
        eprintln!("privlog: {}", message);
    }
    code
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("privlog: failed to serialize output: {}", e),
    }
}

// ============================================================================
// keygen
// ============================================================================

fn run_keygen(global: &GlobalOpts, args: &KeygenArgs) -> ExitCode {
    let (secret, public) = match args.kind {
        KeyKind::Signing => {
            let identity = SigningIdentity::generate();
            (identity.to_base64(), identity.public_key_base64())
        }
        KeyKind::Recipient => {
            let secret = RecipientSecret::generate();
            (secret.to_base64(), secret.public_key().to_base64())
        }
    };
    let kind = match args.kind {
        KeyKind::Signing => "signing",
        KeyKind::Recipient => "recipient",
    };

    if let Some(path) = &args.out {
        if let Err(e) = write_secret(path, &secret) {
            return fail(global, ExitCode::IoError, format!("{}: {}", path.display(), e));
        }
        info!(kind, path = %path.display(), "Wrote secret key");
    }

    let shown_secret = if args.out.is_some() { None } else { Some(&secret) };
    match global.format {
        OutputFormat::Json => print_json(&json!({
            "kind": kind,
            "public": public,
            "secret": shown_secret,
        })),
        OutputFormat::Text => {
            println!("public: {}", public);
            if let Some(secret) = shown_secret {
                println!("secret: {}", secret);
            }
        }
    }
    ExitCode::Clean
}

fn write_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    writeln!(file, "{}", secret)
}

// ============================================================================
// verify
// ============================================================================

fn read_templates(global: &GlobalOpts, path: &Path) -> Result<Vec<SignedTemplate>, ExitCode> {
    let reader = TemplateReader::open(path).map_err(|e| {
        fail(global, ExitCode::from(&e), format!("{}: {}", path.display(), e))
    })?;
    reader
        .read_all()
        .map_err(|e| fail(global, ExitCode::from(&e), format!("{}: {}", path.display(), e)))
}

fn verify_one(template: &SignedTemplate, signer: Option<&str>) -> pl_audit::Result<()> {
    match signer {
        Some(signer) => template.verify_signed_by(signer),
        None => template.verify(),
    }
}

fn run_verify(global: &GlobalOpts, args: &VerifyArgs) -> ExitCode {
    let templates = match read_templates(global, &args.file) {
        Ok(t) => t,
        Err(code) => return code,
    };

    let mut results = Vec::with_capacity(templates.len());
    let mut failed = 0usize;
    for template in &templates {
        let outcome = verify_one(template, args.signer.as_deref());
        if outcome.is_err() {
            failed += 1;
        }
        results.push((template, outcome));
    }

    match global.format {
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = results
                .iter()
                .map(|(t, outcome)| {
                    json!({
                        "id": t.id(),
                        "name": t.name(),
                        "created_at": t.created_at().to_rfc3339(),
                        "signer": t.signature.signer,
                        "valid": outcome.is_ok(),
                        "error": outcome.as_ref().err().map(ToString::to_string),
                    })
                })
                .collect();
            print_json(&json!({
                "file": args.file.display().to_string(),
                "templates": templates.len(),
                "failed": failed,
                "results": entries,
            }));
        }
        OutputFormat::Text => {
            for (t, outcome) in &results {
                match outcome {
                    Ok(()) => println!("✓ {} ({} entries)", t.name(), t.entries().len()),
                    Err(e) => println!("✗ {}: {}", t.name(), e),
                }
            }
            println!("{} templates, {} failed", templates.len(), failed);
        }
    }

    info!(templates = templates.len(), failed, "Verification finished");
    if failed > 0 {
        ExitCode::VerifyFailed
    } else {
        ExitCode::Clean
    }
}

// ============================================================================
// render
// ============================================================================

fn decode_secret(global: &GlobalOpts, encoded: &str) -> Result<RecipientSecret, ExitCode> {
    RecipientSecret::from_base64(encoded)
        .map_err(|e| fail(global, ExitCode::KeyError, format!("recipient secret: {}", e)))
}

fn disclosure_keys(global: &GlobalOpts, args: &RenderArgs) -> Result<DisclosureKeys, ExitCode> {
    let recipient = match &args.secret {
        Some(encoded) => Some(decode_secret(global, encoded)?),
        None => None,
    };
    let escrows = match &args.escrow {
        Some(path) => {
            let sealed_with = if args.sealed_escrow {
                recipient.as_ref()
            } else {
                None
            };
            load_escrows(path, sealed_with).map_err(|e| {
                fail(global, ExitCode::from(&e), format!("{}: {}", path.display(), e))
            })?
        }
        None => Vec::new(),
    };
    Ok(DisclosureKeys {
        recipient,
        escrows,
        symmetric_id: args.sym_id.clone(),
        asymmetric_id: args.asym_id.clone(),
        rotate_iv: args.rotate_iv,
    })
}

fn run_render(global: &GlobalOpts, args: &RenderArgs) -> ExitCode {
    let keys = match disclosure_keys(global, args) {
        Ok(k) => k,
        Err(code) => return code,
    };
    let templates = match read_templates(global, &args.file) {
        Ok(t) => t,
        Err(code) => return code,
    };

    if !args.no_verify {
        for template in &templates {
            if let Err(e) = verify_one(template, args.signer.as_deref()) {
                return fail(global, ExitCode::from(&e), e);
            }
        }
    }

    let view = if args.disclose {
        View::Critical
    } else {
        View::Sanitized
    };

    let mut failed = 0;
    let mut rendered = Vec::with_capacity(templates.len());
    for template in &templates {
        let text = template.render(view);
        let text = if keys.is_empty() {
            text
        } else {
            let disclosed = keys.disclose(&text);
            failed += disclosed.failed;
            disclosed.text
        };
        rendered.push((template, text));
    }

    match global.format {
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = rendered
                .iter()
                .map(|(t, text)| json!({ "id": t.id(), "name": t.name(), "text": text }))
                .collect();
            print_json(&json!({
                "view": if args.disclose { "critical" } else { "sanitized" },
                "undisclosed": failed,
                "templates": entries,
            }));
        }
        OutputFormat::Text => {
            for (_, text) in &rendered {
                print!("{}", text);
                if !text.ends_with('\n') {
                    println!();
                }
            }
        }
    }

    if failed > 0 {
        ExitCode::PartialDisclosure
    } else {
        ExitCode::Clean
    }
}

// ============================================================================
// open-escrow
// ============================================================================

fn run_open_escrow(global: &GlobalOpts, args: &OpenEscrowArgs) -> ExitCode {
    let secret = match decode_secret(global, &args.secret) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let escrows = match load_escrows(&args.file, Some(&secret)) {
        Ok(e) => e,
        Err(e) => {
            return fail(
                global,
                ExitCode::from(&e),
                format!("{}: {}", args.file.display(), e),
            )
        }
    };

    match global.format {
        OutputFormat::Json => {
            let b64 = &base64::engine::general_purpose::STANDARD;
            let entries: Vec<serde_json::Value> = escrows
                .iter()
                .map(|escrow| {
                    json!({
                        "starting_date": escrow.starting_date,
                        "secret_key": escrow.secret_key.as_ref().map(|k| b64.encode(k.as_slice())),
                        "init_vector": escrow.init_vector.as_ref().map(|iv| b64.encode(iv)),
                    })
                })
                .collect();
            print_json(&json!({ "escrows": entries }));
        }
        OutputFormat::Text => {
            for (i, escrow) in escrows.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print!("{}", escrow.to_document());
            }
        }
    }
    ExitCode::Clean
}
