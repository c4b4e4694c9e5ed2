//! Certified-email verification CLI
//!
//! Command-line interface over the verification engine: artifact
//! verification with trusted-time cross-checking, time-authority
//! connectivity testing and configuration management.

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use pec_verifier::{
    infra::config::{ConfigManager, ExportFormat},
    services::verification::report_path_for,
    CaseInfo, FindingStatus, NtpServerAddr, TrustedTime, TrustedTimeSource, VerifyRequest,
    VerifyWorkflow,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pec-verify")]
#[command(about = "Certified-email (PEC) integrity verification with trusted time")]
#[command(long_about = "
PEC Verifier - certified-email transport receipt verification

EXAMPLES:
    # Verify a transport receipt, obtaining trusted time over the network
    pec-verify verify receipt.eml --case-name case-042

    # Verify against an explicitly supplied trusted time
    pec-verify verify receipt.eml --case-name case-042 \\
        --trusted-time 2023-06-15T10:30:45Z

    # Test time authority connectivity
    pec-verify test-time-source

    # Show current configuration
    pec-verify config show

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a certified-email transport receipt
    Verify {
        /// Transport receipt to verify (.eml)
        #[arg(value_name = "EML_FILE")]
        eml_file: PathBuf,

        /// Case name for the report header
        #[arg(long, value_name = "NAME")]
        case_name: String,

        /// Case storage folder for the report header
        #[arg(long, value_name = "DIR", default_value = ".")]
        cases_folder: PathBuf,

        /// Time authority to query (overrides config)
        #[arg(short, long, value_name = "HOST[:PORT]")]
        ntp_server: Option<String>,

        /// Use this RFC 3339 instant as trusted time instead of querying
        #[arg(long, value_name = "TIMESTAMP")]
        trusted_time: Option<String>,

        /// Trusted root PEM bundle (overrides config)
        #[arg(long, value_name = "PEM_FILE")]
        trusted_roots: Option<PathBuf>,

        /// Skip revocation checking
        #[arg(long)]
        no_revocation: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Test time authority connectivity
    TestTimeSource {
        /// Test a specific authority instead of the configured ones
        #[arg(short, long, value_name = "HOST[:PORT]")]
        server: Option<String>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },
    /// Show the configuration file path
    Path,
    /// Export configuration in a portable format
    Export {
        #[arg(long, value_enum, default_value = "toml")]
        format: ExportFormatArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormatArg {
    Toml,
    Json,
    Yaml,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Toml => ExportFormat::Toml,
            ExportFormatArg::Json => ExportFormat::Json,
            ExportFormatArg::Yaml => ExportFormat::Yaml,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            eml_file,
            case_name,
            cases_folder,
            ntp_server,
            trusted_time,
            trusted_roots,
            no_revocation,
            verbose,
        } => {
            let manager = ConfigManager::new().into_diagnostic()?;
            let mut config = manager.load_or_create_default().into_diagnostic()?;
            if let Some(roots) = trusted_roots {
                config.trusted_roots_path = Some(roots);
            }
            if no_revocation {
                config.check_revocation = false;
            }
            config.verbose = config.verbose || verbose;

            let time_source = match trusted_time {
                Some(value) => {
                    let at = chrono::DateTime::parse_from_rfc3339(&value)
                        .into_diagnostic()?
                        .with_timezone(&chrono::Utc);
                    TrustedTimeSource::Provided(TrustedTime::new(at, "caller-supplied"))
                }
                None => {
                    let server = ntp_server.unwrap_or_else(|| config.ntp_server.clone());
                    TrustedTimeSource::Authority(
                        NtpServerAddr::new(server).into_diagnostic()?,
                    )
                }
            };

            let case = CaseInfo::new(case_name, cases_folder).into_diagnostic()?;
            let request = VerifyRequest {
                eml_path: eml_file.clone(),
                case,
                time_source,
            };

            let workflow = VerifyWorkflow::new(config).into_diagnostic()?;
            let verdict = workflow.run(&request).into_diagnostic()?;

            println!("Overall verdict: {}", verdict.overall);
            match &verdict.trusted_time_used {
                Some(trusted) => println!("Trusted time:    {trusted}"),
                None => println!("Trusted time:    unavailable"),
            }
            println!("Findings:");
            for (index, finding) in verdict.findings.iter().enumerate() {
                println!(
                    "  {}. [{}] {} - {}",
                    index + 1,
                    finding.status.marker(),
                    finding.category,
                    finding.detail
                );
                if let FindingStatus::Indeterminate { reason } = &finding.status {
                    println!("        reason: {reason}");
                }
            }
            println!("Report: {}", report_path_for(&eml_file).display());
        }

        Commands::TestTimeSource { server } => {
            let manager = ConfigManager::new().into_diagnostic()?;
            let config = manager.load_or_create_default().into_diagnostic()?;
            let primary = match server {
                Some(s) => NtpServerAddr::new(s).into_diagnostic()?,
                None => NtpServerAddr::new(&config.ntp_server).into_diagnostic()?,
            };
            let fallbacks: Vec<NtpServerAddr> = config
                .fallback_ntp_servers
                .iter()
                .filter_map(|s| NtpServerAddr::new(s).ok())
                .collect();
            let client = pec_verifier::adapters::ntp_client::NtpClient::new(
                pec_verifier::adapters::ntp_client::NtpClientConfig {
                    primary,
                    fallbacks,
                    timeout: config.network_timeout(),
                    retries_per_server: config.retry_attempts,
                    retry_delay: config.retry_delay(),
                },
            );
            let time = client.fetch_trusted_time().into_diagnostic()?;
            println!("Trusted time: {time}");
        }

        Commands::Config(command) => {
            let manager = ConfigManager::new().into_diagnostic()?;
            manager.load_or_create_default().into_diagnostic()?;
            match command {
                ConfigCommands::Show => {
                    let exported = manager.export_config(ExportFormat::Toml).into_diagnostic()?;
                    println!("{exported}");
                }
                ConfigCommands::Set { key, value } => {
                    manager.update_value(&key, &value).into_diagnostic()?;
                    println!("Updated {key}");
                }
                ConfigCommands::Path => {
                    println!("{}", manager.config_path().display());
                }
                ConfigCommands::Export { format } => {
                    let exported = manager.export_config(format.into()).into_diagnostic()?;
                    println!("{exported}");
                }
            }
        }
    }

    Ok(())
}
