use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use shelf_kernel::settings::{Settings, StoreBackend};

#[derive(Debug, Parser)]
#[command(name = "shelf", version, about = "Book catalogue HTTP API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server until SIGINT or SIGTERM
    Serve(ServeArgs),
    /// Apply pending database migrations and exit
    Migrate {
        /// PostgreSQL connection string
        #[arg(long)]
        db_dsn: Option<String>,
    },
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Environment (development|staging|production)
    #[arg(long)]
    env: Option<String>,

    /// PostgreSQL connection string
    #[arg(long)]
    db_dsn: Option<String>,

    /// Enable or disable per-client rate limiting
    #[arg(long, value_name = "BOOL")]
    limiter_enabled: Option<bool>,
}

impl ServeArgs {
    fn apply(self, settings: &mut Settings) -> anyhow::Result<()> {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(env) = self.env {
            settings.environment = env.parse()?;
        }
        if let Some(dsn) = self.db_dsn {
            settings.database.backend = StoreBackend::Postgres;
            settings.database.url = dsn;
        }
        if let Some(enabled) = self.limiter_enabled {
            settings.limiter.enabled = enabled;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load().with_context(|| "failed to load shelf settings")?;

    match cli.command {
        Command::Serve(args) => {
            args.apply(&mut settings)?;
            shelf_telemetry::init(&settings.telemetry)?;
            shelf_app::run(settings).await
        }
        Command::Migrate { db_dsn } => {
            if let Some(dsn) = db_dsn {
                settings.database.url = dsn;
            }
            shelf_telemetry::init(&settings.telemetry)?;

            let applied = shelf_app::migrate(&settings).await?;
            tracing::info!(applied, "migrations complete");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "shelf",
            "serve",
            "--port",
            "8080",
            "--env",
            "staging",
            "--db-dsn",
            "postgres://localhost/other",
            "--limiter-enabled",
            "false",
        ])
        .unwrap();

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        let mut settings = Settings::default();
        settings.database.backend = StoreBackend::Memory;
        args.apply(&mut settings).unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.environment.as_str(), "staging");
        assert_eq!(settings.database.backend, StoreBackend::Postgres);
        assert_eq!(settings.database.url, "postgres://localhost/other");
        assert!(!settings.limiter.enabled);
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let cli = Cli::try_parse_from(["shelf", "serve", "--env", "qa"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };

        assert!(args.apply(&mut Settings::default()).is_err());
    }

    #[test]
    fn a_subcommand_is_required() {
        assert!(Cli::try_parse_from(["shelf"]).is_err());
    }
}
