use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mailforward_lib::{
    Config, DnsMxResolver, ForwardObserver, Forwarder, Listener, SmtpTransportFactory,
    TracingObserver, run_listeners,
};
use tracing::{error, info};

#[path = "mailforward-server/args.rs"]
mod args;
#[path = "mailforward-server/logging.rs"]
mod logging;

use args::{Cli, Commands, find_config_file};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let path = find_config_file(cli.config.as_ref())?;
    let config =
        Config::load(&path).with_context(|| format!("loading {}", path.display()))?;

    match cli.cmd.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            logging::init();
            info!(config = %path.display(), "starting mailforward-server");
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckConfig => {
            let rules = config.rule_set()?;
            println!("{}: {} rule(s)", path.display(), rules.len());
            for (index, rule) in rules.iter().enumerate() {
                println!("  {index:>3}. {rule}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Match { addresses } => {
            let rules = config.rule_set()?;
            let mut all_matched = true;
            for address in &addresses {
                let address = address.trim();
                match rules.find(address) {
                    Some(rule) => println!("{address}: {rule}"),
                    None => {
                        all_matched = false;
                        println!("{address}: no matching rule");
                    }
                }
            }
            Ok(if all_matched {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let rules = config.register_rules()?;
    let resolver = DnsMxResolver::from_system_conf().context("creating DNS resolver")?;
    let transports = SmtpTransportFactory::new(config.transport_options())
        .context("creating SMTP transport")?;
    let observer: Arc<dyn ForwardObserver> = Arc::new(TracingObserver);
    let forwarder = Arc::new(
        Forwarder::new(
            rules,
            Arc::new(resolver),
            Arc::new(transports),
            config.forward_options(),
        )
        .with_observer(observer),
    );
    let options = Arc::new(config.server_options());

    let mut listeners = Vec::with_capacity(config.listen.len());
    for address in &config.listen {
        let listener = Listener::bind(address.as_str(), Arc::clone(&forwarder), Arc::clone(&options))
            .await
            .with_context(|| format!("binding {address}"))?;
        listeners.push(listener);
    }

    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C, shutting down: {err}");
        }
    };
    run_listeners(listeners, ctrl_c)
        .await
        .context("serving mail")
}
