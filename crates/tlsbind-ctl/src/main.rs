//! tlsbind-ctl — probe a TLS endpoint through the session-binding layer.

use std::io::{Read, Write};
use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use tlsbind_core::config::TlsbindConfig;
use tlsbind_core::registry;
use tlsbind_core::{BindError, MemoryReporter, Reporter, SecureSocketFactory, TracingReporter};
use tlsbind_rustls::RustlsSocketFactory;

const DEFAULT_PORT: u16 = 443;

// ── Reporting ─────────────────────────────────────────────────────────────────

/// Logs through tracing and keeps a copy for the summary.
struct ProbeReporter {
    log: TracingReporter,
    memory: MemoryReporter,
}

impl Reporter for ProbeReporter {
    fn detail(&self, message: &str) {
        self.log.detail(message);
        self.memory.detail(message);
    }

    fn warning(&self, message: &str) {
        self.log.warning(message);
        self.memory.warning(message);
    }
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

struct ProbeArgs {
    host: String,
    port: u16,
    count: u32,
    local: Option<IpAddr>,
    request: bool,
}

fn cmd_probe(config: &TlsbindConfig, args: &ProbeArgs) -> Result<()> {
    let slot = registry::global();
    slot.set_default(Arc::new(
        RustlsSocketFactory::from_config(config).context("failed to build TLS client")?,
    ));

    let reporter = Arc::new(ProbeReporter {
        log: TracingReporter::new(config.report.detail),
        memory: MemoryReporter::new(),
    });
    slot.install(reporter.clone());

    for n in 0..args.count {
        let factory = slot.default_factory();
        let mut socket = match args.local {
            Some(local) => factory.connect_host_from(&args.host, args.port, local, 0),
            None => factory.connect_host(&args.host, args.port),
        }
        .with_context(|| format!("failed to connect to {}:{}", args.host, args.port))?;

        if args.request {
            let request = format!(
                "HEAD / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
                args.host
            );
            socket.write_all(request.as_bytes()).context("request failed")?;
            let mut status = [0u8; 12];
            let read = socket.read(&mut status).context("response failed")?;
            tracing::info!(
                connection = n,
                status = %String::from_utf8_lossy(&status[..read]),
                "response received"
            );
        } else {
            socket.start_handshake().context("handshake failed")?;
        }
        if let Err(e) = socket.close() {
            tracing::debug!(error = %e, "close failed");
        }
    }

    let record = match slot.actual_session() {
        Ok(record) => record,
        Err(BindError::State) => bail!("no handshake completed"),
        Err(e) => return Err(e).context("session binding unavailable"),
    };
    let (handshakes, mismatches) = slot
        .with_binding(|b| (b.handshake_count(), b.mismatch_count()))
        .context("session binding unavailable")?;

    println!("═══════════════════════════════════════");
    println!("  Session Binding");
    println!("═══════════════════════════════════════");
    println!("  Endpoint     : {}:{}", args.host, args.port);
    println!("  Session id   : {}", record.id());
    println!("  Cipher suite : {}", record.cipher_suite());
    println!("  Handshakes   : {}", handshakes);
    println!("  Mismatches   : {}", mismatches);

    let warnings = reporter.memory.warnings();
    if !warnings.is_empty() {
        println!("\n  Warnings:");
        for w in &warnings {
            println!("  - {}", w);
        }
    }

    Ok(())
}

fn cmd_ciphers(config: &TlsbindConfig) -> Result<()> {
    let factory =
        RustlsSocketFactory::from_config(config).context("failed to build TLS client")?;
    let defaults = factory.default_cipher_suites();

    println!("Cipher suites ({} supported, * = default):", factory.supported_cipher_suites().len());
    for suite in factory.supported_cipher_suites() {
        let mark = if defaults.contains(&suite) { "*" } else { " " };
        println!("  {} {}", mark, suite);
    }
    Ok(())
}

fn cmd_config(config: &TlsbindConfig) -> Result<()> {
    println!("# {}", TlsbindConfig::file_path().display());
    print!("{}", config.to_toml()?);
    Ok(())
}

fn print_usage() {
    println!("Usage: tlsbind-ctl <command>");
    println!();
    println!("Commands:");
    println!("  probe <host> [options]   Connect through the binding layer and show the bound session");
    println!("  ciphers                  List supported and default cipher suites");
    println!("  config                   Show the effective configuration");
    println!();
    println!("Probe options:");
    println!("  --port <port>     Endpoint port (default: {})", DEFAULT_PORT);
    println!("  --count <n>       Number of connections to open (default: 1)");
    println!("  --local <addr>    Local address to bind");
    println!("  --request         Send an HTTP HEAD request instead of a bare handshake");
}

fn parse_probe(args: &[&str]) -> Result<ProbeArgs> {
    let mut probe = ProbeArgs {
        host: String::new(),
        port: DEFAULT_PORT,
        count: 1,
        local: None,
        request: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i] {
            "--port" => {
                i += 1;
                probe.port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--count" => {
                i += 1;
                probe.count = args
                    .get(i)
                    .context("--count requires a value")?
                    .parse()
                    .context("--count must be a number")?;
            }
            "--local" => {
                i += 1;
                probe.local = Some(
                    args.get(i)
                        .context("--local requires a value")?
                        .parse()
                        .context("--local must be an IP address")?,
                );
            }
            "--request" => probe.request = true,
            host if probe.host.is_empty() && !host.starts_with('-') => {
                probe.host = host.to_string();
            }
            other => bail!("unexpected argument: {other}"),
        }
        i += 1;
    }
    if probe.host.is_empty() {
        bail!("probe requires a host");
    }
    if probe.count == 0 {
        bail!("--count must be at least 1");
    }
    Ok(probe)
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = TlsbindConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = TlsbindConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        TlsbindConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["probe", rest @ ..] => cmd_probe(&config, &parse_probe(rest)?),
        ["ciphers"] => cmd_ciphers(&config),
        ["config"] => cmd_config(&config),
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
