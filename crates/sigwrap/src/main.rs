#![forbid(unsafe_code)]

//! sigwrap CLI: verify, sign, canonicalize, attack and forge XML-DSig documents.

use clap::{Args, Parser, Subcommand};
use sigwrap::attack;
use sigwrap::config::{parse_c14n_mode, CliConfig};
use sigwrap_core::{algorithm, Error};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "sigwrap",
    about = "XML signature wrapping analysis for XML-DSig protected documents",
    version
)]
struct Cli {
    #[command(flatten)]
    shared: Shared,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Shared {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Trusted CA certificate (PEM or DER), repeatable
    #[arg(long, global = true)]
    trust: Vec<PathBuf>,

    /// Register additional ID attribute names (ID, wsu:Id, {uri}Id)
    #[arg(long = "id-attr", global = true)]
    id_attr: Vec<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate signature-wrapping candidates that still verify
    Attack {
        /// Signed XML file
        file: PathBuf,

        /// Write each candidate into this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Stop after this many candidates
        #[arg(short, long)]
        limit: Option<usize>,

        /// Rewrite leaf text in forged payloads (LOCAL=TEXT[;LOCAL=TEXT]), repeatable
        #[arg(long = "rewrite")]
        rewrite: Vec<String>,
    },

    /// Strip or re-sign a signed document for replay against a relying party
    Forge {
        /// Signed XML file
        file: PathBuf,

        /// Directory the forgeries are written into
        #[arg(short, long)]
        out: PathBuf,

        /// Re-sign with this private key instead of a throwaway one
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// Certificate to embed with --key
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,

        /// Rewrite leaf text in forged payloads (LOCAL=TEXT[;LOCAL=TEXT]), repeatable
        #[arg(long = "rewrite")]
        rewrite: Vec<String>,
    },

    /// Verify every signature of an XML document
    Verify {
        /// Input XML file
        file: PathBuf,
    },

    /// Sign an XML template
    Sign {
        /// Template XML file (with empty DigestValue/SignatureValue)
        template: PathBuf,

        /// Private key (PEM or DER)
        #[arg(short = 'k', long)]
        key: PathBuf,

        /// Certificate to embed in KeyInfo
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Canonicalize a whole document
    C14n {
        /// Input XML file
        file: PathBuf,

        /// Algorithm URI or short name (c14n, c14n11, exc-c14n, ...#WithComments)
        #[arg(short, long, default_value = "exc-c14n")]
        mode: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List supported algorithms and strategies
    Info,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.shared.verbose);

    let result = match cli.command {
        Commands::Attack {
            file,
            out,
            limit,
            rewrite,
        } => cmd_attack(&cli.shared, &file, out.as_deref(), limit, &rewrite),
        Commands::Forge {
            file,
            out,
            key,
            cert,
            rewrite,
        } => cmd_forge(&cli.shared, &file, &out, key.as_deref(), cert.as_deref(), &rewrite),
        Commands::Verify { file } => cmd_verify(&cli.shared, &file),
        Commands::Sign {
            template,
            key,
            cert,
            output,
        } => cmd_sign(&cli.shared, &template, &key, cert.as_deref(), output.as_deref()),
        Commands::C14n { file, mode, output } => cmd_c14n(&file, &mode, output.as_deref()),
        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `warn`, or `debug` with `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// File configuration with the command-line flags appended.
fn load_config(shared: &Shared) -> Result<CliConfig, Error> {
    let mut config = match &shared.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    config.trust_anchors.extend(shared.trust.iter().cloned());
    config.id_attrs.extend(shared.id_attr.iter().cloned());
    Ok(config)
}

fn cmd_attack(
    shared: &Shared,
    file: &Path,
    out: Option<&Path>,
    limit: Option<usize>,
    rewrite: &[String],
) -> Result<(), Error> {
    let mut config = load_config(shared)?;
    for rules in rewrite {
        config.add_rewrites(rules)?;
    }
    if limit.is_some() {
        config.max_candidates = limit;
    }
    let attack_config = config.attack_config()?;

    let doc = sigwrap_xml::parse(&read_file(file)?)?;
    let mut run = attack::run(&doc, &attack_config);
    if run.signatures().is_empty() {
        return Err(Error::MissingElement(format!("no Signature in {}", file.display())));
    }
    if !run.is_baseline_valid() {
        eprintln!("warning: {} does not verify as given", file.display());
        if shared.verbose {
            for verdict in &run.baseline().verdicts {
                eprintln!("{verdict}");
            }
        }
    }
    if let Some(dir) = out {
        std::fs::create_dir_all(dir)?;
    }

    for (n, candidate) in run.by_ref().enumerate() {
        let index = n + 1;
        println!(
            "{index:03} {} divergence={}",
            candidate.strategy(),
            candidate.divergence()
        );
        if let Some(dir) = out {
            let path = dir.join(format!("{index:03}-{}.xml", candidate.strategy().slug()));
            write_output(Some(&path), &candidate.to_bytes()?)?;
        }
    }
    if run.accepted() == 0 {
        eprintln!("no candidate survived verification");
    }
    Ok(())
}

fn cmd_forge(
    shared: &Shared,
    file: &Path,
    out: &Path,
    key: Option<&Path>,
    cert: Option<&Path>,
    rewrite: &[String],
) -> Result<(), Error> {
    let mut config = load_config(shared)?;
    for rules in rewrite {
        config.add_rewrites(rules)?;
    }
    let attack_config = config.attack_config()?;

    let doc = sigwrap_xml::parse(&read_file(file)?)?;
    let extraction = sigwrap_dsig::extract(&doc);
    if extraction.signatures.is_empty() {
        return Err(Error::MissingElement(format!("no Signature in {}", file.display())));
    }
    std::fs::create_dir_all(out)?;

    for (n, signature) in extraction.signatures.iter().enumerate() {
        let forger = match key {
            Some(path) => {
                let mut key = sigwrap_keys::loader::load_key_file(path)?;
                if let Some(path) = cert {
                    key.x509_chain = sigwrap_keys::loader::load_certificate_file(path)?;
                }
                attack::Forger::from_key(key)?
            }
            // Same subject as the genuine signer, fresh key.
            None => {
                let leaf = signature.key_info.as_ref().and_then(|ki| ki.leaf_certificate());
                attack::Forger::generate(leaf)?
            }
        };
        for forgery in attack::Forgery::ALL {
            match forger.forge(&doc, signature, forgery, &attack_config) {
                Ok(forged) => {
                    let path = out.join(format!("{:03}-{forgery}.xml", n + 1));
                    write_output(Some(&path), &sigwrap_xml::writer::to_bytes(&forged)?)?;
                    println!("{} {forgery} -> {}", signature.path, path.display());
                }
                Err(e) => eprintln!("{} {forgery}: {e}", signature.path),
            }
        }
    }
    Ok(())
}

fn cmd_verify(shared: &Shared, file: &Path) -> Result<(), Error> {
    let ctx = load_config(shared)?.verify_context()?;
    if shared.verbose {
        eprintln!("Verifying: {}", file.display());
    }

    let doc = sigwrap_xml::parse(&read_file(file)?)?;
    let verdict = sigwrap_dsig::verify_document(&doc, &ctx);
    if verdict.signature_count() == 0 {
        eprintln!("INVALID: no Signature in {}", file.display());
        process::exit(1);
    }
    for v in &verdict.verdicts {
        println!("{v}");
    }
    for u in &verdict.unreadable {
        println!("Signature at {}: unreadable: {}", u.path, u.error);
    }
    if verdict.is_valid() {
        println!("OK");
        Ok(())
    } else {
        eprintln!("INVALID");
        process::exit(1);
    }
}

fn cmd_sign(
    shared: &Shared,
    template: &Path,
    key: &Path,
    cert: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), Error> {
    let ctx = load_config(shared)?.verify_context()?;
    let mut key = sigwrap_keys::loader::load_key_file(key)?;
    if let Some(path) = cert {
        key.x509_chain = sigwrap_keys::loader::load_certificate_file(path)?;
    }
    if shared.verbose {
        eprintln!("Signing: {}", template.display());
    }

    let doc = sigwrap_xml::parse(&read_file(template)?)?;
    let signed = sigwrap_dsig::sign(&doc, &key, &ctx)?;
    write_output(output, &sigwrap_xml::writer::to_bytes(&signed)?)
}

fn cmd_c14n(file: &Path, mode: &str, output: Option<&Path>) -> Result<(), Error> {
    let mode = parse_c14n_mode(mode)?;
    let doc = sigwrap_xml::parse(&read_file(file)?)?;
    let canonical = sigwrap_c14n::canonicalize_document(&doc, mode)?;
    write_output(output, &canonical)
}

fn cmd_info() -> Result<(), Error> {
    let names = |uris: &[&str]| {
        uris.iter()
            .map(|u| algorithm::short_name(u))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("sigwrap: XML signature wrapping analysis");
    println!();
    println!("Digest algorithms:");
    println!(
        "  {}",
        names(&[algorithm::SHA1, algorithm::SHA256, algorithm::SHA384, algorithm::SHA512])
    );
    println!("Signature algorithms:");
    println!(
        "  {}",
        names(&[algorithm::RSA_SHA1, algorithm::RSA_SHA256, algorithm::ECDSA_SHA256])
    );
    println!("Canonicalization:");
    let modes: Vec<&str> = sigwrap_c14n::C14nMode::ALL.iter().map(|m| m.uri()).collect();
    println!("  {}", names(&modes[..]));
    println!("Transforms:");
    println!("  {}, the C14N family", names(&[algorithm::ENVELOPED_SIGNATURE, algorithm::BASE64]));
    println!("Strategies (priority order):");
    for class in attack::StrategyClass::ALL {
        println!("  {class}");
    }
    println!("Key formats:");
    println!("  PEM, DER (RSA, EC P-256), X.509 certificates");
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    tracing::debug!(path = %path.display(), "reading");
    Ok(std::fs::read(path)?)
}

fn write_output(path: Option<&Path>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => Ok(std::fs::write(p, data)?),
        None => {
            use std::io::Write;
            Ok(std::io::stdout().write_all(data)?)
        }
    }
}
